//! A single Bolt connection: transport, handshake and message exchange.
//!
//! A channel queues encoded requests in a write buffer, flushes them in one
//! write, and reads responses strictly in order. It counts the requests still
//! waiting for their terminal response so callers can drain what is in flight.
//! Once a read, write or decode fails the channel is `Broken` for good.

use std::future::Future;
use std::io;
use std::time::Duration;

use bytes::BytesMut;
use futures::future::BoxFuture;
use parking_lot::Mutex;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_util::codec::{Decoder, Encoder};
use tracing::{debug, info, trace, warn};

use super::config::{ConnectionDescriptor, ServerAddress};
use crate::bolt::codec::{ChunkCodec, ClientCodec, DEFAULT_CHUNK_SIZE};
use crate::bolt::error::{BoltError, BoltResult, HandshakeError};
use crate::bolt::handshake::{
    client_preamble, interpret_reply, BoltVersion, VersionProposal, HANDSHAKE_RESPONSE_SIZE,
};
use crate::bolt::message::{BoltRequest, BoltResponse};

const BUFFER_CAPACITY: usize = 8 * 1024;

// ============================================================================
// Connector
// ============================================================================

/// Produces the byte stream a channel runs over.
pub trait Connector: Send + Sync {
    type Stream: AsyncRead + AsyncWrite + Unpin + Send;

    fn connect<'a>(&'a self, address: &'a ServerAddress) -> BoxFuture<'a, io::Result<Self::Stream>>;
}

/// Plain TCP with Nagle disabled.
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpConnector;

impl Connector for TcpConnector {
    type Stream = TcpStream;

    fn connect<'a>(&'a self, address: &'a ServerAddress) -> BoxFuture<'a, io::Result<TcpStream>> {
        Box::pin(async move {
            let stream = TcpStream::connect(address.to_socket_addr()).await?;
            stream.set_nodelay(true)?;
            Ok(stream)
        })
    }
}

/// Hands out a stream the caller already established, exactly once.
///
/// Useful for tunnelled transports and for in-memory tests. A second
/// connect attempt fails with `NotConnected`.
pub struct StreamConnector<S> {
    stream: Mutex<Option<S>>,
}

impl<S> StreamConnector<S> {
    pub fn new(stream: S) -> Self {
        Self {
            stream: Mutex::new(Some(stream)),
        }
    }
}

impl<S> Connector for StreamConnector<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    type Stream = S;

    fn connect<'a>(&'a self, _address: &'a ServerAddress) -> BoxFuture<'a, io::Result<S>> {
        let stream = self.stream.lock().take();
        Box::pin(async move {
            stream.ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "stream already handed out"))
        })
    }
}

// ============================================================================
// Channel
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Ready,
    /// A transport or framing error left the stream in an unknown position
    Broken,
    Closed,
}

pub struct Channel<S> {
    stream: S,
    codec: ClientCodec,
    read_buffer: BytesMut,
    write_buffer: BytesMut,
    state: ChannelState,
    address: ServerAddress,
    io_timeout: Option<Duration>,
    /// Requests written or queued whose terminal response has not arrived
    pending: usize,
}

async fn with_timeout<T>(
    limit: Option<Duration>,
    fut: impl Future<Output = BoltResult<T>>,
) -> BoltResult<T> {
    match limit {
        Some(limit) => tokio::time::timeout(limit, fut)
            .await
            .map_err(|_| BoltError::Timeout)?,
        None => fut.await,
    }
}

async fn handshake<S>(stream: &mut S, proposals: &[VersionProposal]) -> BoltResult<BoltVersion>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let preamble = client_preamble(proposals)?;
    stream.write_all(&preamble).await?;
    stream.flush().await?;

    let mut reply = [0u8; HANDSHAKE_RESPONSE_SIZE];
    if let Err(e) = stream.read_exact(&mut reply).await {
        return Err(match e.kind() {
            io::ErrorKind::UnexpectedEof => HandshakeError::ConnectionClosed.into(),
            _ => e.into(),
        });
    }
    Ok(interpret_reply(reply, proposals)?)
}

impl<S> Channel<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    /// Connect and negotiate a version, both within the descriptor's connect timeout.
    pub async fn open<C>(connector: &C, descriptor: &ConnectionDescriptor) -> BoltResult<Self>
    where
        C: Connector<Stream = S>,
    {
        let address = &descriptor.address;
        debug!(%address, "opening channel");
        let establish = async {
            let mut stream = connector
                .connect(address)
                .await
                .map_err(|e| BoltError::Connection(format!("Failed to connect to {}: {}", address, e)))?;
            let version = handshake(&mut stream, &descriptor.versions).await?;
            Ok::<_, BoltError>((stream, version))
        };
        let (stream, version) = tokio::time::timeout(descriptor.connect_timeout, establish)
            .await
            .map_err(|_| {
                BoltError::Connection(format!(
                    "Timed out connecting to {} after {:?}",
                    address, descriptor.connect_timeout
                ))
            })??;
        info!(%address, %version, "negotiated protocol version");

        let chunks = ChunkCodec::with_limits(DEFAULT_CHUNK_SIZE, descriptor.max_message_size);
        Ok(Self {
            stream,
            codec: ClientCodec::with_chunks(version, chunks),
            read_buffer: BytesMut::with_capacity(BUFFER_CAPACITY),
            write_buffer: BytesMut::with_capacity(BUFFER_CAPACITY),
            state: ChannelState::Ready,
            address: address.clone(),
            io_timeout: descriptor.io_timeout,
            pending: 0,
        })
    }

    pub fn version(&self) -> BoltVersion {
        self.codec.version()
    }

    pub fn state(&self) -> ChannelState {
        self.state
    }

    pub fn is_open(&self) -> bool {
        self.state == ChannelState::Ready
    }

    pub fn address(&self) -> &ServerAddress {
        &self.address
    }

    pub fn pending(&self) -> usize {
        self.pending
    }

    pub fn set_io_timeout(&mut self, timeout: Option<Duration>) {
        self.io_timeout = timeout;
    }

    fn ensure_open(&self) -> BoltResult<()> {
        match self.state {
            ChannelState::Ready => Ok(()),
            ChannelState::Broken | ChannelState::Closed => Err(BoltError::ChannelClosed),
        }
    }

    /// Record `err`, marking the channel broken when the stream position is lost.
    fn fail(&mut self, err: BoltError) -> BoltError {
        if err.is_fatal() && self.state == ChannelState::Ready {
            warn!(address = %self.address, error = %err, "channel broken");
            self.state = ChannelState::Broken;
        }
        err
    }

    /// Mark the channel unusable after the peer broke protocol.
    pub fn mark_broken(&mut self) {
        if self.state == ChannelState::Ready {
            warn!(address = %self.address, "channel broken by unexpected message");
            self.state = ChannelState::Broken;
        }
    }

    /// Encode `request` into the write buffer without sending it.
    ///
    /// An encode failure leaves the buffer as it was and the channel usable.
    pub fn queue(&mut self, request: &BoltRequest) -> BoltResult<()> {
        self.ensure_open()?;
        self.codec.encode(request, &mut self.write_buffer)?;
        if request.expects_response() {
            self.pending += 1;
        }
        trace!(message = request.name(), "queued");
        Ok(())
    }

    /// Queue several requests, all or none.
    pub fn queue_all(&mut self, requests: &[BoltRequest]) -> BoltResult<()> {
        self.ensure_open()?;
        let (mark, pending) = (self.write_buffer.len(), self.pending);
        for request in requests {
            if let Err(e) = self.queue(request) {
                self.write_buffer.truncate(mark);
                self.pending = pending;
                return Err(e);
            }
        }
        Ok(())
    }

    /// Write everything queued in one go.
    pub async fn flush(&mut self) -> BoltResult<()> {
        self.ensure_open()?;
        if self.write_buffer.is_empty() {
            return Ok(());
        }
        let limit = self.io_timeout;
        let Self {
            stream,
            write_buffer,
            ..
        } = self;
        let result = with_timeout(limit, async {
            stream.write_all(&write_buffer[..]).await?;
            stream.flush().await?;
            Ok(())
        })
        .await;
        match result {
            Ok(()) => {
                trace!(bytes = self.write_buffer.len(), "flushed");
                self.write_buffer.clear();
                Ok(())
            }
            Err(e) => Err(self.fail(e)),
        }
    }

    pub async fn send(&mut self, request: &BoltRequest) -> BoltResult<()> {
        self.queue(request)?;
        self.flush().await
    }

    /// Read the next response. RECORDs leave the pending count alone;
    /// terminal responses settle one request.
    pub async fn receive(&mut self) -> BoltResult<BoltResponse> {
        self.ensure_open()?;
        if self.pending == 0 {
            return Err(BoltError::Decode("No request is waiting for a response".to_string()));
        }
        let limit = self.io_timeout;
        let Self {
            stream,
            codec,
            read_buffer,
            ..
        } = self;
        let result = with_timeout(limit, async {
            loop {
                if let Some(response) = codec.decode(read_buffer)? {
                    return Ok(response);
                }
                if stream.read_buf(read_buffer).await? == 0 {
                    return Err(BoltError::Io(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "connection closed by server",
                    )));
                }
            }
        })
        .await;
        match result {
            Ok(response) => {
                if response.is_terminal() {
                    self.pending -= 1;
                }
                trace!(message = response.name(), pending = self.pending, "received");
                Ok(response)
            }
            Err(e) => Err(self.fail(e)),
        }
    }

    /// Say GOODBYE where the version has it and shut the transport. Idempotent.
    pub async fn close(&mut self) {
        if self.state == ChannelState::Closed {
            return;
        }
        if self.state == ChannelState::Ready && self.version().has_explicit_transactions() {
            if let Err(e) = self.send(&BoltRequest::Goodbye).await {
                debug!(error = %e, "GOODBYE not delivered");
            }
        }
        if let Err(e) = self.stream.shutdown().await {
            debug!(error = %e, "transport shutdown failed");
        }
        self.state = ChannelState::Closed;
        debug!(address = %self.address, "channel closed");
    }
}

impl<S> std::fmt::Debug for Channel<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Channel")
            .field("address", &self.address)
            .field("version", &self.codec.version())
            .field("state", &self.state)
            .field("pending", &self.pending)
            .finish()
    }
}
