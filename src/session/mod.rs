//! Session Manager
//!
//! Owns the single authenticated stream to the coordinator. All writes go
//! through one async mutex over the write half; a rebuild takes that lock,
//! interrupts any blocked reader, takes the read lock, dials and joins a
//! fresh stream, and installs both halves before releasing either lock. A
//! reader or writer therefore only ever sees the old session or the new
//! one.
//!
//! A write failure triggers exactly one rejoin and the failed message is
//! dropped. A read failure is logged and reported as the empty envelope;
//! it never triggers a rejoin.

mod certs;
mod join;

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::protocol::{Envelope, JoinResponse, ProtocolError};
use crate::transport::{read_next, Connector, SessionReader, SessionSink};

pub use certs::{CertStore, CERT_FILE, PRIVATE_KEY_FILE};
pub use join::{JoinError, JoinHandshake, Joined};

/// Errors returned by [`SessionManager::send`].
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("rejoin failed: {0}")]
    Rejoin(#[from] JoinError),

    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),
}

/// What happened to an envelope handed to [`SessionManager::send`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SendOutcome {
    /// Written to the current session.
    Delivered,
    /// The write failed, the session was rebuilt and the envelope dropped.
    Rejoined,
}

/// The installed write half and the join expiry it was signed with.
struct Current {
    sink: SessionSink,
    expires: i64,
}

/// Keeps one joined session to the coordinator.
pub struct SessionManager {
    connector: Arc<dyn Connector>,
    handshake: JoinHandshake,
    writer: Mutex<Option<Current>>,
    reader: Mutex<Option<SessionReader>>,
    interrupt: std::sync::Mutex<CancellationToken>,
}

impl SessionManager {
    pub fn new(connector: Arc<dyn Connector>, handshake: JoinHandshake) -> Self {
        Self {
            connector,
            handshake,
            writer: Mutex::new(None),
            reader: Mutex::new(None),
            interrupt: std::sync::Mutex::new(CancellationToken::new()),
        }
    }

    /// Dial, join and install a new session, replacing any current one.
    pub async fn join(&self) -> Result<JoinResponse, JoinError> {
        let mut writer = self.writer.lock().await;
        self.rebuild(&mut writer).await
    }

    /// Send one envelope.
    ///
    /// On a transport failure, or when no session is installed, rebuilds
    /// the session once. The envelope is not resent.
    pub async fn send(&self, envelope: Envelope) -> Result<SendOutcome, SessionError> {
        let mut writer = self.writer.lock().await;

        let failure = match writer.as_mut() {
            Some(current) => match current.sink.send(envelope).await {
                Ok(()) => return Ok(SendOutcome::Delivered),
                Err(e) if e.is_transport() => e.to_string(),
                Err(e) => {
                    error!(error = %e, "Failed to encode message");
                    return Err(e.into());
                }
            },
            None => "no active session".to_string(),
        };

        error!(error = %failure, "Failed to send message, rejoining");
        self.rebuild(&mut writer).await?;
        Ok(SendOutcome::Rejoined)
    }

    /// Wait for the next envelope.
    ///
    /// Returns the empty envelope when no session is installed, when the
    /// read fails, or when a rebuild interrupts the wait.
    pub async fn receive(&self) -> Envelope {
        let token = self.current_token();
        let mut reader = self.reader.lock().await;
        let Some(stream) = reader.as_mut() else {
            return Envelope::default();
        };

        let result = tokio::select! {
            biased;
            _ = token.cancelled() => return Envelope::default(),
            result = read_next(stream) => result,
        };

        match result {
            Ok(envelope) => envelope,
            Err(e) => {
                error!(error = %e, "Failed to read message");
                // The stream is dead; stop reading until the next rebuild.
                if e.is_transport() {
                    *reader = None;
                }
                Envelope::default()
            }
        }
    }

    /// Whether a joined session is installed.
    pub async fn is_connected(&self) -> bool {
        self.writer.lock().await.is_some()
    }

    /// Expiry signed into the current session's join request.
    pub async fn expires(&self) -> Option<i64> {
        self.writer.lock().await.as_ref().map(|c| c.expires)
    }

    /// Remote address of the current session.
    pub async fn remote(&self) -> Option<String> {
        self.writer
            .lock()
            .await
            .as_ref()
            .map(|c| c.sink.remote().to_string())
    }

    /// Drop the current session.
    pub async fn close(&self) {
        let mut writer = self.writer.lock().await;
        self.current_token().cancel();
        let mut reader = self.reader.lock().await;
        *reader = None;
        *writer = None;
        self.replace_token();
        debug!("Session closed");
    }

    fn current_token(&self) -> CancellationToken {
        self.interrupt
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn replace_token(&self) {
        *self.interrupt.lock().unwrap_or_else(|e| e.into_inner()) = CancellationToken::new();
    }

    /// Must be called with the writer lock held.
    async fn rebuild(&self, writer: &mut Option<Current>) -> Result<JoinResponse, JoinError> {
        self.current_token().cancel();
        let mut reader = self.reader.lock().await;

        let result = self.dial_and_join().await;
        match result {
            Ok((read_half, current, response)) => {
                info!(remote = %current.sink.remote(), expires = current.expires, "Session established");
                *reader = Some(read_half);
                *writer = Some(current);
                self.replace_token();
                Ok(response)
            }
            Err(e) => {
                error!(error = %e, "Join failed");
                *reader = None;
                *writer = None;
                self.replace_token();
                Err(e)
            }
        }
    }

    async fn dial_and_join(&self) -> Result<(SessionReader, Current, JoinResponse), JoinError> {
        let mut session = self.connector.connect().await?;
        let joined = self.handshake.perform(&mut session).await?;
        let (read_half, sink) = session.into_halves();
        Ok((
            read_half,
            Current {
                sink,
                expires: joined.expires,
            },
            joined.response,
        ))
    }
}

#[cfg(test)]
pub(crate) mod testing;
