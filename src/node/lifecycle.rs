//! Node lifecycle management: start and stop.

use super::{CommandDispatcher, HeartbeatEmitter, Node, NodeError, NodeState};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

impl Node {
    /// Join the coordinator and start the heartbeat and command tasks.
    ///
    /// A failed initial join leaves the node stopped; nothing is spawned.
    pub async fn start(&mut self) -> Result<(), NodeError> {
        if !self.state.can_start() {
            return Err(NodeError::AlreadyStarted);
        }
        self.state = NodeState::Starting;
        info!(node_id = %self.identity.node_id(), api = %self.config.coordinator.api(), "Node starting");

        if let Err(e) = self.session.join().await {
            error!(error = %e, "Initial join failed");
            self.state = NodeState::Stopped;
            return Err(e.into());
        }

        if self.shutdown.is_cancelled() {
            self.shutdown = CancellationToken::new();
        }

        let heartbeat = HeartbeatEmitter::new(
            self.session.clone(),
            self.counter.clone(),
            self.config.node.heartbeat_interval(),
        );
        let dispatcher = CommandDispatcher::new(
            self.session.clone(),
            self.diagnostics.clone(),
            self.config.node.command_interval(),
        );

        self.tasks
            .push(tokio::spawn(heartbeat.run(self.shutdown.child_token())));
        self.tasks
            .push(tokio::spawn(dispatcher.run(self.shutdown.child_token())));

        self.state = NodeState::Running;
        info!(state = %self.state, "Node started");
        Ok(())
    }

    /// Stop both tasks and close the session.
    pub async fn stop(&mut self) -> Result<(), NodeError> {
        if !self.state.can_stop() {
            return Err(NodeError::NotStarted);
        }
        self.state = NodeState::Stopping;
        info!(state = %self.state, "Node stopping");

        self.shutdown.cancel();
        for handle in self.tasks.drain(..) {
            if let Err(e) = handle.await {
                warn!(error = %e, "Node task ended abnormally");
            }
        }
        debug!("Node tasks stopped");

        self.session.close().await;

        self.state = NodeState::Stopped;
        info!(state = %self.state, "Node stopped");
        Ok(())
    }
}
