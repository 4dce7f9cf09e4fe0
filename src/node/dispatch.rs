//! Command dispatcher.
//!
//! Polls the session for coordinator commands, runs the matching
//! diagnostic, and replies with its result under the same service tag.
//! Envelopes that are not commands are dropped without a reply.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::diagnostics::Diagnostics;
use crate::protocol::{Envelope, ServiceTag};
use crate::session::SessionManager;

/// A coordinator command.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Command {
    /// Port reachability plus one speed-test measurement.
    SpeedTest,
    /// Port reachability only.
    PortCheck,
}

impl Command {
    /// The command a tag requests, if any.
    pub fn from_tag(tag: ServiceTag) -> Option<Self> {
        match tag {
            ServiceTag::SPEED_TEST => Some(Command::SpeedTest),
            ServiceTag::PORT_CHECK => Some(Command::PortCheck),
            _ => None,
        }
    }

    pub fn tag(&self) -> ServiceTag {
        match self {
            Command::SpeedTest => ServiceTag::SPEED_TEST,
            Command::PortCheck => ServiceTag::PORT_CHECK,
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.tag())
    }
}

/// Periodic command reader.
pub struct CommandDispatcher {
    session: Arc<SessionManager>,
    diagnostics: Diagnostics,
    interval: Duration,
}

impl CommandDispatcher {
    pub fn new(session: Arc<SessionManager>, diagnostics: Diagnostics, interval: Duration) -> Self {
        Self {
            session,
            diagnostics,
            interval,
        }
    }

    /// Run the command carried by `envelope`, returning the reply.
    pub async fn handle(&self, envelope: &Envelope) -> Option<Envelope> {
        let command = match Command::from_tag(envelope.service) {
            Some(command) => command,
            None => {
                if !envelope.is_empty() {
                    debug!(service = %envelope.service, "Ignoring non-command envelope");
                }
                return None;
            }
        };

        info!(command = %command, "Running coordinator command");
        let result = match command {
            Command::SpeedTest => self.diagnostics.node_test().await,
            Command::PortCheck => self.diagnostics.port_check().await,
        };

        match Envelope::new(command.tag(), &result) {
            Ok(reply) => Some(reply),
            Err(e) => {
                error!(command = %command, error = %e, "Failed to encode command result");
                None
            }
        }
    }

    /// Receive one envelope and answer it if it is a command.
    pub async fn poll(&self) {
        let envelope = self.session.receive().await;
        if let Some(reply) = self.handle(&envelope).await {
            if let Err(e) = self.session.send(reply).await {
                error!(error = %e, "Failed to send command result");
            }
        }
    }

    /// Poll for commands until `shutdown` fires.
    pub async fn run(self, shutdown: CancellationToken) {
        let mut ticker = interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        debug!(interval_ms = self.interval.as_millis() as u64, "Command dispatcher started");
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {}
            }
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = self.poll() => {}
            }
        }
        debug!("Command dispatcher stopped");
    }
}
