//! Transport Layer
//!
//! A [`Session`] is one duplex byte stream to the coordinator, framed into
//! envelopes. [`Connector`] implementations know how to dial one; the
//! production connector is [`quic::QuicConnector`].

pub mod quic;

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::{FramedRead, FramedWrite};

use crate::bandwidth::TrafficMeter;
use crate::protocol::{Envelope, EnvelopeCodec, ProtocolError};

pub use quic::QuicConnector;

/// Errors related to establishing a session stream.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("invalid coordinator address: {0}")]
    InvalidAddress(String),

    #[error("tls configuration failed: {0}")]
    Tls(String),

    #[error("connect to {addr} failed: {reason}")]
    ConnectFailed { addr: String, reason: String },

    #[error("stream open failed: {0}")]
    StreamFailed(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Boxed read half of a session stream.
pub type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;

/// Boxed write half of a session stream.
pub type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Envelope stream over the read half.
pub type SessionReader = FramedRead<BoxedReader, EnvelopeCodec>;

/// Envelope sink over the write half.
pub type SessionWriter = FramedWrite<BoxedWriter, EnvelopeCodec>;

/// Keeps transport resources (endpoint, connection) alive with the session.
pub type SessionGuard = Box<dyn Any + Send + Sync>;

/// An established, not yet authenticated, session stream.
pub struct Session {
    remote: String,
    reader: SessionReader,
    writer: SessionWriter,
    guard: Option<SessionGuard>,
}

impl Session {
    /// Frame a pair of stream halves.
    pub fn new<R, W>(
        remote: impl Into<String>,
        reader: R,
        writer: W,
        meter: Option<Arc<TrafficMeter>>,
    ) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let (read_codec, write_codec) = match meter {
            Some(meter) => (
                EnvelopeCodec::new().with_meter(meter.clone()),
                EnvelopeCodec::new().with_meter(meter),
            ),
            None => (EnvelopeCodec::new(), EnvelopeCodec::new()),
        };
        Self {
            remote: remote.into(),
            reader: FramedRead::new(Box::new(reader) as BoxedReader, read_codec),
            writer: FramedWrite::new(Box::new(writer) as BoxedWriter, write_codec),
            guard: None,
        }
    }

    /// Frame a single bidirectional stream.
    pub fn from_stream<S>(remote: impl Into<String>, stream: S) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (reader, writer) = tokio::io::split(stream);
        Self::new(remote, reader, writer, None)
    }

    /// Attach resources that must outlive the stream.
    pub fn with_guard(mut self, guard: SessionGuard) -> Self {
        self.guard = Some(guard);
        self
    }

    /// Remote address this session was dialed to.
    pub fn remote(&self) -> &str {
        &self.remote
    }

    /// Encode and flush one envelope.
    pub async fn send(&mut self, envelope: Envelope) -> Result<(), ProtocolError> {
        self.writer.send(envelope).await
    }

    /// Wait for the next envelope. End of stream is an error.
    pub async fn recv(&mut self) -> Result<Envelope, ProtocolError> {
        read_next(&mut self.reader).await
    }

    /// Split into independently lockable halves.
    pub fn into_halves(self) -> (SessionReader, SessionSink) {
        (
            self.reader,
            SessionSink {
                remote: self.remote,
                writer: self.writer,
                _guard: self.guard,
            },
        )
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("remote", &self.remote)
            .finish_non_exhaustive()
    }
}

/// Write half of an installed session. Owns the transport guard, so the
/// connection closes when the sink is dropped.
pub struct SessionSink {
    remote: String,
    writer: SessionWriter,
    _guard: Option<SessionGuard>,
}

impl SessionSink {
    pub fn remote(&self) -> &str {
        &self.remote
    }

    pub async fn send(&mut self, envelope: Envelope) -> Result<(), ProtocolError> {
        self.writer.send(envelope).await
    }
}

/// Read the next envelope from a framed reader.
pub async fn read_next(reader: &mut SessionReader) -> Result<Envelope, ProtocolError> {
    match reader.next().await {
        Some(result) => result,
        None => Err(ProtocolError::Io(std::io::Error::new(
            std::io::ErrorKind::UnexpectedEof,
            "session stream closed",
        ))),
    }
}

/// Dials the coordinator and opens one bidirectional stream.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self) -> Result<Session, TransportError>;
}
