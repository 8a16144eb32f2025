//! Sessions: the request/response state machine over one channel.
//!
//! ```text
//! Idle -> Authenticating -> Ready <-> Streaming
//!                           Ready <-> InTransaction (<-> Streaming)
//! any -> Failed on FAILURE or transport failure; reset() -> Ready
//! any -> Closed on close()
//! ```
//!
//! A [`ResultStream`] or [`Pipeline`] holds the session mutably, so nothing
//! else can be sent while one is alive. A stream dropped before it was
//! exhausted is drained by the next operation that needs the channel.

use std::collections::HashMap;

use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::channel::{Channel, Connector, TcpConnector};
use super::config::{Bookmark, ConnectionDescriptor, SessionConfig};
use super::error::{DriverError, DriverResult};
use super::failure::ServerFailure;
use super::pipeline::{Pipeline, ResultCollection};
use super::statement::{Statement, StatementInput};
use super::stream::ResultStream;
use super::transaction::{TransactionConfig, TransactionExtra};
use crate::bolt::error::{BoltError, BoltResult};
use crate::bolt::handshake::BoltVersion;
use crate::bolt::message::{BeginMessage, BoltRequest, BoltResponse, InitMessage, RunMessage, SuccessMessage};

// ============================================================================
// SessionState
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No channel
    Idle,
    /// Channel open, INIT/HELLO in flight
    Authenticating,
    /// Authenticated and able to run statements
    Ready,
    /// A result is being pulled
    Streaming,
    /// Inside BEGIN, waiting for COMMIT or ROLLBACK
    InTransaction,
    /// The server reported a failure or the transport died; only reset() and close() work
    Failed,
    Closed,
}

// ============================================================================
// Drained responses
// ============================================================================

/// Terminal responses seen while reading everything in flight.
#[derive(Debug, Default)]
pub(crate) struct Drained {
    pub last_success: Option<SuccessMessage>,
    pub failure: Option<ServerFailure>,
    pub ignored: bool,
}

/// Read until no request is pending. RECORDs are dropped.
pub(crate) async fn drain<S>(channel: &mut Channel<S>) -> BoltResult<Drained>
where
    S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin + Send,
{
    let mut drained = Drained::default();
    while channel.pending() > 0 {
        match channel.receive().await? {
            BoltResponse::Success(s) => drained.last_success = Some(s),
            BoltResponse::Failure(f) => {
                drained.failure.get_or_insert_with(|| ServerFailure::from(f));
            }
            BoltResponse::Ignored => drained.ignored = true,
            BoltResponse::Record(_) => {}
        }
    }
    Ok(drained)
}

// ============================================================================
// Session
// ============================================================================

/// One authenticated conversation with a server over a single channel.
pub struct Session<C: Connector = TcpConnector> {
    descriptor: ConnectionDescriptor,
    config: SessionConfig,
    connector: C,
    channel: Option<Channel<C::Stream>>,
    state: SessionState,
    /// Settings of the open explicit transaction
    transaction: Option<TransactionConfig>,
    /// Sent with the next BEGIN or auto-commit RUN
    bookmarks: Vec<Bookmark>,
    server_agent: Option<String>,
}

impl Session<TcpConnector> {
    /// A session that connects over TCP. Nothing is opened until [`Session::connect`].
    pub fn new(descriptor: ConnectionDescriptor, config: SessionConfig) -> Self {
        Self::with_connector(descriptor, config, TcpConnector)
    }
}

impl<C: Connector> Session<C> {
    /// A session that opens its channel through `connector`.
    pub fn with_connector(descriptor: ConnectionDescriptor, config: SessionConfig, connector: C) -> Self {
        let bookmarks = config.bookmarks.clone();
        Self {
            descriptor,
            config,
            connector,
            channel: None,
            state: SessionState::Idle,
            transaction: None,
            bookmarks,
            server_agent: None,
        }
    }

    /// Current state. See [`SessionState`] for what each one allows.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Settings this session was created with.
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Negotiated version, once connected.
    pub fn version(&self) -> Option<BoltVersion> {
        self.channel.as_ref().map(Channel::version)
    }

    /// The `server` string from the INIT/HELLO reply, e.g. `Neo4j/4.4.0`.
    pub fn server_agent(&self) -> Option<&str> {
        self.server_agent.as_deref()
    }

    /// Bookmark of the last committed transaction or auto-commit statement.
    pub fn last_bookmark(&self) -> Option<&Bookmark> {
        self.bookmarks.last()
    }

    pub fn in_transaction(&self) -> bool {
        self.transaction.is_some()
    }

    fn channel_is_open(&self) -> bool {
        self.channel.as_ref().is_some_and(Channel::is_open)
    }

    /// The channel, if it can still carry requests.
    pub(crate) fn channel_mut(&mut self) -> DriverResult<&mut Channel<C::Stream>> {
        match self.channel.as_mut() {
            Some(channel) if channel.is_open() => Ok(channel),
            _ => Err(DriverError::ChannelClosed),
        }
    }

    /// Open a channel and authenticate, unless a healthy one already exists.
    ///
    /// Connect, handshake and INIT together are bounded by the descriptor's
    /// connect timeout. A refused INIT leaves the session Idle.
    pub async fn connect(&mut self) -> DriverResult<bool> {
        if self.state == SessionState::Closed {
            return Err(DriverError::invalid_state("Cannot connect a closed session"));
        }
        if self.channel_is_open() {
            return Ok(true);
        }

        self.channel = None;
        self.transaction = None;
        self.state = SessionState::Authenticating;
        let deadline = Instant::now() + self.descriptor.connect_timeout;

        let mut channel = match Channel::open(&self.connector, &self.descriptor).await {
            Ok(channel) => channel,
            Err(e) => {
                self.state = SessionState::Idle;
                return Err(e.into());
            }
        };
        if let Some(timeout) = self.config.query_timeout {
            channel.set_io_timeout(Some(timeout));
        }

        let init = BoltRequest::Init(InitMessage {
            user_agent: self.descriptor.user_agent.clone(),
            auth: self.descriptor.auth.clone(),
        });
        let reply = tokio::time::timeout_at(deadline, async {
            channel.send(&init).await?;
            channel.receive().await
        })
        .await;

        self.state = SessionState::Idle;
        let address = &self.descriptor.address;
        match reply {
            Err(_) => Err(DriverError::Connect(format!(
                "Timed out authenticating with {}",
                address
            ))),
            Ok(Err(e)) => Err(e.into()),
            Ok(Ok(BoltResponse::Success(meta))) => {
                info!(
                    %address,
                    version = %channel.version(),
                    server = meta.server().unwrap_or("unknown"),
                    "session connected"
                );
                self.server_agent = meta.server().map(str::to_string);
                self.channel = Some(channel);
                self.state = SessionState::Ready;
                Ok(true)
            }
            Ok(Ok(BoltResponse::Failure(f))) => {
                let failure = ServerFailure::from(f);
                warn!(%address, code = %failure.code, "authentication refused");
                channel.close().await;
                Err(DriverError::Authentication(failure))
            }
            Ok(Ok(other)) => Err(DriverError::protocol(format!(
                "Unexpected {} in reply to INIT",
                other.name()
            ))),
        }
    }

    /// Check the session can take `op` in one of the `allowed` states.
    fn ensure_state(&self, op: &str, allowed: &[SessionState]) -> DriverResult<()> {
        match self.state {
            SessionState::Closed => Err(DriverError::invalid_state(format!(
                "Cannot {} on a closed session",
                op
            ))),
            SessionState::Idle | SessionState::Authenticating => Err(DriverError::invalid_state(
                format!("Cannot {} before connect()", op),
            )),
            _ if !self.channel_is_open() => Err(DriverError::ChannelClosed),
            state if allowed.contains(&state) => Ok(()),
            SessionState::Failed => Err(DriverError::invalid_state(format!(
                "Cannot {}: the session failed and needs reset()",
                op
            ))),
            state => Err(DriverError::invalid_state(format!("Cannot {} while {:?}", op, state))),
        }
    }

    pub(crate) fn ensure_runnable(&self, op: &str) -> DriverResult<()> {
        self.ensure_state(op, &[SessionState::Ready, SessionState::InTransaction])
    }

    fn negotiated_version(&self) -> DriverResult<BoltVersion> {
        self.version().ok_or(DriverError::ChannelClosed)
    }

    pub(crate) fn mark_streaming(&mut self) {
        self.state = SessionState::Streaming;
    }

    pub(crate) fn mark_failed(&mut self) {
        self.state = SessionState::Failed;
    }

    /// A transport error: the channel has already judged whether it is broken.
    pub(crate) fn transport_failed(&mut self, err: BoltError) -> DriverError {
        if err.is_fatal() {
            self.state = SessionState::Failed;
        }
        err.into()
    }

    /// The server sent something that does not fit the exchange.
    pub(crate) fn protocol_violation(&mut self, msg: impl Into<String>) -> DriverError {
        if let Some(channel) = self.channel.as_mut() {
            channel.mark_broken();
        }
        self.state = SessionState::Failed;
        DriverError::protocol(msg)
    }

    /// A result ended with SUCCESS. Auto-commit bookmarks replace the old ones.
    pub(crate) fn finish_stream(&mut self, bookmark: Option<String>) {
        if self.transaction.is_some() {
            self.state = SessionState::InTransaction;
        } else {
            self.state = SessionState::Ready;
            if let Some(bookmark) = bookmark {
                self.bookmarks = vec![Bookmark::new(bookmark)];
            }
        }
    }

    /// Turn a drained exchange into its last SUCCESS, or the first failure.
    fn conclude(&mut self, drained: Drained) -> DriverResult<SuccessMessage> {
        if let Some(failure) = drained.failure {
            self.state = SessionState::Failed;
            return Err(DriverError::Statement(failure));
        }
        if drained.ignored {
            self.state = SessionState::Failed;
            return Err(DriverError::Ignored(
                "request skipped after an earlier failure".to_string(),
            ));
        }
        Ok(drained.last_success.unwrap_or_default())
    }

    /// Drain a result stream that was dropped before it was exhausted.
    pub(crate) async fn settle(&mut self) -> DriverResult<()> {
        if self.state != SessionState::Streaming {
            return Ok(());
        }
        debug!("draining an abandoned result");
        let channel = match self.channel_mut() {
            Ok(channel) => channel,
            Err(e) => {
                self.state = SessionState::Failed;
                return Err(e);
            }
        };
        let drained = match drain(channel).await {
            Ok(drained) => drained,
            Err(e) => return Err(self.transport_failed(e)),
        };
        let last = self.conclude(drained)?;
        self.finish_stream(last.bookmark().map(str::to_string));
        Ok(())
    }

    /// Queue `requests`, flush, and read every reply.
    async fn exchange(&mut self, requests: &[BoltRequest]) -> DriverResult<SuccessMessage> {
        let channel = self.channel_mut()?;
        channel.queue_all(requests)?;
        let outcome = async {
            channel.flush().await?;
            drain(channel).await
        }
        .await;
        match outcome {
            Ok(drained) => self.conclude(drained),
            Err(e) => Err(self.transport_failed(e)),
        }
    }

    /// RUN for `statement`; outside a transaction it carries the auto-commit extras.
    pub(crate) fn run_request(&self, statement: &Statement) -> DriverResult<BoltRequest> {
        let version = self.negotiated_version()?;
        let extra = if self.transaction.is_some() {
            HashMap::new()
        } else {
            let config = TransactionConfig::default();
            TransactionExtra {
                bookmarks: &self.bookmarks,
                database: self.config.database.as_deref(),
                access_mode: self.config.access_mode,
                config: &config,
            }
            .to_map(version)?
        };
        let run = RunMessage::new(statement.text.clone())
            .with_parameters(statement.encoded_parameters()?)
            .with_extra(extra);
        Ok(BoltRequest::Run(run))
    }

    /// Run a statement and stream its records.
    ///
    /// RUN and PULL_ALL go out together; the RUN reply is read before this
    /// returns, so a rejected statement fails here rather than on the stream.
    pub async fn run(&mut self, statement: impl Into<Statement>) -> DriverResult<ResultStream<'_, C>> {
        let statement = statement.into();
        if statement.is_empty() {
            return Err(DriverError::invalid_argument("Expected a non-empty statement"));
        }
        self.settle().await?;
        self.ensure_runnable("run")?;

        let run = self.run_request(&statement)?;
        self.channel_mut()?.queue_all(&[run, BoltRequest::PullAll])?;
        self.state = SessionState::Streaming;

        let channel = self.channel_mut()?;
        let reply = async {
            channel.flush().await?;
            channel.receive().await
        }
        .await;
        match reply {
            Ok(BoltResponse::Success(meta)) => Ok(ResultStream::new(self, statement, meta)),
            Ok(BoltResponse::Failure(f)) => {
                let failure = ServerFailure::from(f);
                debug!(code = %failure.code, "statement rejected");
                self.discard_pending().await;
                self.state = SessionState::Failed;
                Err(DriverError::Statement(failure))
            }
            Ok(BoltResponse::Ignored) => {
                self.discard_pending().await;
                self.state = SessionState::Failed;
                Err(DriverError::Ignored("RUN was ignored".to_string()))
            }
            Ok(BoltResponse::Record(_)) => {
                Err(self.protocol_violation("RECORD received before the RUN reply"))
            }
            Err(e) => Err(self.transport_failed(e)),
        }
    }

    /// Read and drop whatever is in flight. Transport errors leave the
    /// channel broken, which the next operation reports.
    async fn discard_pending(&mut self) {
        if let Ok(channel) = self.channel_mut() {
            if let Err(e) = drain(channel).await {
                debug!(error = %e, "could not drain pending responses");
                self.state = SessionState::Failed;
            }
        }
    }

    /// Start a pipeline: statements queued now, sent together by [`Pipeline::run`].
    pub fn pipeline(&mut self) -> Pipeline<'_, C> {
        Pipeline::new(self)
    }

    /// Run single statements and stacks in one pipeline, in order.
    pub async fn run_mixed(&mut self, inputs: Vec<StatementInput>) -> DriverResult<ResultCollection> {
        let mut pipeline = self.pipeline();
        for input in inputs {
            pipeline = pipeline.push_input(input);
        }
        pipeline.run().await
    }

    /// Legacy transaction control for v1/v2: the statement text plus DISCARD_ALL.
    fn legacy_control(text: &str) -> Vec<BoltRequest> {
        vec![BoltRequest::Run(RunMessage::new(text)), BoltRequest::DiscardAll]
    }

    pub async fn begin_transaction(&mut self, config: TransactionConfig) -> DriverResult<()> {
        self.settle().await?;
        self.ensure_state("begin a transaction", &[SessionState::Ready])?;
        let version = self.negotiated_version()?;
        let requests = if version.has_explicit_transactions() {
            let extra = TransactionExtra {
                bookmarks: &self.bookmarks,
                database: self.config.database.as_deref(),
                access_mode: self.config.access_mode,
                config: &config,
            }
            .to_map(version)?;
            vec![BoltRequest::Begin(BeginMessage { extra })]
        } else {
            Self::legacy_control("BEGIN")
        };
        self.exchange(&requests).await?;
        self.transaction = Some(config);
        self.state = SessionState::InTransaction;
        debug!("transaction started");
        Ok(())
    }

    pub async fn commit(&mut self) -> DriverResult<()> {
        self.settle().await?;
        self.ensure_state("commit", &[SessionState::InTransaction])?;
        let requests = if self.negotiated_version()?.has_explicit_transactions() {
            vec![BoltRequest::Commit]
        } else {
            Self::legacy_control("COMMIT")
        };
        self.transaction = None;
        let reply = self.exchange(&requests).await?;
        if let Some(bookmark) = reply.bookmark() {
            self.bookmarks = vec![Bookmark::new(bookmark)];
        }
        self.state = SessionState::Ready;
        debug!("transaction committed");
        Ok(())
    }

    pub async fn rollback(&mut self) -> DriverResult<()> {
        self.settle().await?;
        self.ensure_state("roll back", &[SessionState::InTransaction])?;
        let requests = if self.negotiated_version()?.has_explicit_transactions() {
            vec![BoltRequest::Rollback]
        } else {
            Self::legacy_control("ROLLBACK")
        };
        self.transaction = None;
        self.exchange(&requests).await?;
        self.state = SessionState::Ready;
        debug!("transaction rolled back");
        Ok(())
    }

    /// Send RESET and discard everything in flight before its reply.
    ///
    /// Clears a failure and any server-side transaction.
    pub async fn reset(&mut self) -> DriverResult<()> {
        if self.state == SessionState::Closed {
            return Err(DriverError::invalid_state("Cannot reset a closed session"));
        }
        let channel = self.channel_mut()?;
        channel.queue(&BoltRequest::Reset)?;
        let outcome = async {
            channel.flush().await?;
            let mut last = None;
            while channel.pending() > 0 {
                last = Some(channel.receive().await?);
            }
            Ok::<_, BoltError>(last)
        }
        .await;

        self.transaction = None;
        match outcome {
            Ok(Some(BoltResponse::Success(_))) => {
                self.state = SessionState::Ready;
                debug!("session reset");
                Ok(())
            }
            Ok(Some(BoltResponse::Failure(f))) => {
                self.state = SessionState::Failed;
                Err(DriverError::Statement(ServerFailure::from(f)))
            }
            Ok(_) => Err(self.protocol_violation("RESET was not acknowledged")),
            Err(e) => Err(self.transport_failed(e)),
        }
    }

    /// Roll back an open transaction, say GOODBYE and drop the channel.
    ///
    /// A failed rollback is logged, not returned. Closing twice is fine.
    pub async fn close(&mut self) -> DriverResult<()> {
        if self.state == SessionState::Closed {
            return Ok(());
        }
        if self.transaction.is_some() && self.channel_is_open() && self.state != SessionState::Failed {
            if let Err(e) = self.rollback().await {
                warn!(error = %e, "rollback on close failed");
            }
        }
        if let Some(mut channel) = self.channel.take() {
            channel.close().await;
        }
        self.transaction = None;
        self.state = SessionState::Closed;
        info!(address = %self.descriptor.address, "session closed");
        Ok(())
    }
}

impl<C: Connector> std::fmt::Debug for Session<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("address", &self.descriptor.address)
            .field("state", &self.state)
            .field("version", &self.version())
            .field("in_transaction", &self.transaction.is_some())
            .finish()
    }
}
