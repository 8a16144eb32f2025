//! Scripted in-memory Bolt server for session tests.
//!
//! Negotiates a version, then answers each request through a script. It
//! behaves like a real server after a FAILURE: later requests are IGNORED
//! until RESET (or ACK_FAILURE) clears the failure.

use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::io::{duplex, AsyncReadExt, AsyncWriteExt, DuplexStream};
use tokio::task::JoinHandle;
use tokio_util::codec::Framed;

use super::channel::StreamConnector;
use super::config::{ConnectionDescriptor, ServerAddress, SessionConfig};
use super::session::Session;
use crate::bolt::codec::ServerCodec;
use crate::bolt::handshake::{BoltVersion, VersionSelector, HANDSHAKE_SIZE};
use crate::bolt::message::{
    AuthToken, BoltRequest, BoltResponse, FailureMessage, RecordMessage, SuccessMessage,
};
use crate::bolt::packstream::PackStreamValue;

/// What the script wants done with a request.
pub(crate) enum Reply {
    Send(Vec<BoltResponse>),
    /// Never answer
    Silence,
    /// Close the connection
    HangUp,
}

pub(crate) fn success() -> BoltResponse {
    BoltResponse::Success(SuccessMessage::new())
}

pub(crate) fn fields(names: &[&str]) -> BoltResponse {
    let names = names.iter().map(|n| PackStreamValue::from(*n)).collect::<Vec<_>>();
    BoltResponse::Success(SuccessMessage::new().with("fields", names).with("t_first", 1i64))
}

pub(crate) fn record(values: Vec<PackStreamValue>) -> BoltResponse {
    BoltResponse::Record(RecordMessage::new(values))
}

pub(crate) fn failure(code: &str, message: &str) -> BoltResponse {
    BoltResponse::Failure(FailureMessage::new(code, message))
}

/// Text of a RUN request, or the message name for anything else.
pub(crate) fn describe(request: &BoltRequest) -> String {
    match request {
        BoltRequest::Run(run) => format!("RUN {}", run.statement),
        other => other.name().to_string(),
    }
}

/// Replies every statement script shares: INIT succeeds, PULL_ALL and
/// DISCARD_ALL end with an empty SUCCESS.
pub(crate) fn baseline(request: &BoltRequest) -> Option<Reply> {
    match request {
        BoltRequest::Init(_) => Some(Reply::Send(vec![BoltResponse::Success(
            SuccessMessage::new()
                .with("server", "Neo4j/4.4.0")
                .with("connection_id", "bolt-1"),
        )])),
        BoltRequest::PullAll | BoltRequest::DiscardAll => Some(Reply::Send(vec![BoltResponse::Success(
            SuccessMessage::new().with("type", "r").with("t_last", 0i64),
        )])),
        BoltRequest::Begin(_) | BoltRequest::Commit | BoltRequest::Rollback => {
            Some(Reply::Send(vec![success()]))
        }
        _ => None,
    }
}

pub(crate) struct ScriptedServer {
    /// Every request received, in order, as rendered by [`describe`]
    pub log: JoinHandle<Vec<String>>,
}

impl ScriptedServer {
    pub async fn requests(self) -> Vec<String> {
        self.log.await.unwrap_or_default()
    }
}

/// Start a server speaking `version` and return a client stream connected to it.
pub(crate) fn serve<F>(version: BoltVersion, script: F) -> (DuplexStream, ScriptedServer)
where
    F: FnMut(&BoltRequest) -> Reply + Send + 'static,
{
    let (client, server) = duplex(64 * 1024);
    let log = tokio::spawn(run_server(server, vec![version], script));
    (client, ScriptedServer { log })
}

async fn run_server<F>(mut io: DuplexStream, supported: Vec<BoltVersion>, mut script: F) -> Vec<String>
where
    F: FnMut(&BoltRequest) -> Reply,
{
    let mut log = Vec::new();
    let mut preamble = [0u8; HANDSHAKE_SIZE];
    if io.read_exact(&mut preamble).await.is_err() {
        return log;
    }
    let outcome = VersionSelector::new(supported).select(&preamble);
    if io.write_all(&VersionSelector::reply(&outcome)).await.is_err() || outcome.is_err() {
        return log;
    }

    let mut framed = Framed::new(io, ServerCodec::new());
    let mut failed = false;
    while let Some(Ok(request)) = framed.next().await {
        log.push(describe(&request));
        let replies = match request {
            BoltRequest::Goodbye => break,
            BoltRequest::Reset | BoltRequest::AckFailure => {
                failed = false;
                vec![success()]
            }
            _ if failed => vec![BoltResponse::Ignored],
            ref other => match script(other) {
                Reply::Send(replies) => replies,
                Reply::Silence => {
                    // keep the connection open without answering
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    vec![]
                }
                Reply::HangUp => break,
            },
        };
        for reply in replies {
            failed |= matches!(reply, BoltResponse::Failure(_));
            if framed.send(reply).await.is_err() {
                return log;
            }
        }
    }
    log
}

/// A session wired to a scripted server, not yet connected.
pub(crate) fn session_with<F>(
    version: BoltVersion,
    config: SessionConfig,
    script: F,
) -> (Session<StreamConnector<DuplexStream>>, ScriptedServer)
where
    F: FnMut(&BoltRequest) -> Reply + Send + 'static,
{
    let (client, server) = serve(version, script);
    let descriptor = ConnectionDescriptor::builder(ServerAddress::new("loopback", 7687))
        .with_auth(AuthToken::basic("neo4j", "secret"))
        .with_connect_timeout(Duration::from_secs(2))
        .with_io_timeout(Duration::from_secs(2))
        .build();
    let session = Session::with_connector(descriptor, config, StreamConnector::new(client));
    (session, server)
}

/// A connected session on `version`.
pub(crate) async fn connected<F>(
    version: BoltVersion,
    script: F,
) -> (Session<StreamConnector<DuplexStream>>, ScriptedServer)
where
    F: FnMut(&BoltRequest) -> Reply + Send + 'static,
{
    let (mut session, server) = session_with(version, SessionConfig::default(), script);
    session.connect().await.unwrap();
    (session, server)
}
