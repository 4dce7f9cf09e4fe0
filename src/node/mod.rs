//! Node Entity
//!
//! Top-level structure for a running node. The Node owns the identity,
//! the session manager and the diagnostic providers, performs the initial
//! join, and runs the heartbeat emitter and command dispatcher as two
//! tasks until stopped.

mod dispatch;
mod heartbeat;
mod lifecycle;

pub use dispatch::{Command, CommandDispatcher};
pub use heartbeat::HeartbeatEmitter;

use crate::bandwidth::{BandwidthCounter, TrafficMeter};
use crate::diagnostics::Diagnostics;
use crate::session::{CertStore, JoinError, JoinHandshake, SessionManager};
use crate::transport::{Connector, QuicConnector};
use crate::{Config, ConfigError, Identity};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Errors related to node operations.
#[derive(Debug, Error)]
pub enum NodeError {
    #[error("node not started")]
    NotStarted,

    #[error("node already started")]
    AlreadyStarted,

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("join failed: {0}")]
    Join(#[from] JoinError),

    #[error("http client setup failed: {0}")]
    HttpClient(#[from] reqwest::Error),
}

/// Node operational state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NodeState {
    /// Created but not started.
    Created,
    /// Joining the coordinator.
    Starting,
    /// Joined; heartbeat and dispatcher running.
    Running,
    /// Shutting down.
    Stopping,
    /// Stopped.
    Stopped,
}

impl NodeState {
    /// Check if node is operational.
    pub fn is_operational(&self) -> bool {
        matches!(self, NodeState::Running)
    }

    /// Check if node can be started.
    pub fn can_start(&self) -> bool {
        matches!(self, NodeState::Created | NodeState::Stopped)
    }

    /// Check if node can be stopped.
    pub fn can_stop(&self) -> bool {
        matches!(self, NodeState::Running)
    }
}

impl fmt::Display for NodeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            NodeState::Created => "created",
            NodeState::Starting => "starting",
            NodeState::Running => "running",
            NodeState::Stopping => "stopping",
            NodeState::Stopped => "stopped",
        };
        write!(f, "{}", s)
    }
}

/// A node attached to the coordinator network.
pub struct Node {
    config: Config,
    identity: Arc<Identity>,
    session: Arc<SessionManager>,
    diagnostics: Diagnostics,
    counter: Arc<dyn BandwidthCounter>,
    state: NodeState,
    shutdown: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl Node {
    /// Build a node with the default QUIC connector and HTTP providers.
    ///
    /// Session traffic is metered on a [`TrafficMeter`], which also serves
    /// as the heartbeat's bandwidth counter.
    pub fn new(config: Config) -> Result<Self, NodeError> {
        config.validate()?;
        let identity = Arc::new(config.create_identity()?);
        let meter = Arc::new(TrafficMeter::new());
        let connector = Arc::new(QuicConnector::new(&config.coordinator).with_meter(meter.clone()));
        let diagnostics = Diagnostics::from_config(&config)?;
        Ok(Self::with_components(
            config,
            identity,
            connector,
            diagnostics,
            meter,
        ))
    }

    /// Build a node from explicit collaborators.
    pub fn with_components(
        config: Config,
        identity: Arc<Identity>,
        connector: Arc<dyn Connector>,
        diagnostics: Diagnostics,
        counter: Arc<dyn BandwidthCounter>,
    ) -> Self {
        let handshake = JoinHandshake::new(
            identity.clone(),
            diagnostics.address_probe(),
            CertStore::new(config.node.data_dir()),
            config.coordinator.expires_secs(),
            config.coordinator.join_timeout(),
        )
        .with_probe_timeout(config.diagnostics.timeout() * 2);
        let session = Arc::new(SessionManager::new(connector, handshake));

        Self {
            config,
            identity,
            session,
            diagnostics,
            counter,
            state: NodeState::Created,
            shutdown: CancellationToken::new(),
            tasks: Vec::new(),
        }
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn state(&self) -> NodeState {
        self.state
    }

    /// The session manager shared by the node's tasks.
    pub fn session(&self) -> &Arc<SessionManager> {
        &self.session
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("node_id", &self.identity.node_id())
            .field("state", &self.state)
            .field("tasks", &self.tasks.len())
            .finish_non_exhaustive()
    }
}
