//! Heartbeat emitter.
//!
//! Once per interval, snapshot the bandwidth counter and send a heartbeat
//! through the session manager. Ticks missed while a send (or rejoin) is in
//! flight are skipped, never queued.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, trace};

use crate::bandwidth::BandwidthCounter;
use crate::protocol::{Envelope, HeartbeatRequest, ProtocolError, ServiceTag, Stats};
use crate::session::{SendOutcome, SessionManager};

/// Periodic telemetry writer.
pub struct HeartbeatEmitter {
    session: Arc<SessionManager>,
    counter: Arc<dyn BandwidthCounter>,
    interval: Duration,
}

impl HeartbeatEmitter {
    pub fn new(
        session: Arc<SessionManager>,
        counter: Arc<dyn BandwidthCounter>,
        interval: Duration,
    ) -> Self {
        Self {
            session,
            counter,
            interval,
        }
    }

    /// Current counter values as heartbeat stats.
    pub fn stats(&self) -> Stats {
        let totals = self.counter.totals();
        Stats {
            storage: self.counter.stored_bytes(),
            total_in: totals.total_in,
            total_out: totals.total_out,
            ingress: totals.rate_in,
            egress: totals.rate_out,
        }
    }

    fn envelope(&self) -> Result<Envelope, ProtocolError> {
        Envelope::new(
            ServiceTag::HEARTBEAT,
            &HeartbeatRequest {
                stats: self.stats(),
            },
        )
    }

    /// Build and send one heartbeat. Errors are logged.
    pub async fn beat(&self) {
        let envelope = match self.envelope() {
            Ok(envelope) => envelope,
            Err(e) => {
                error!(error = %e, "Failed to build heartbeat");
                return;
            }
        };

        match self.session.send(envelope).await {
            Ok(SendOutcome::Delivered) => trace!("Heartbeat sent"),
            Ok(SendOutcome::Rejoined) => debug!("Heartbeat dropped, session rebuilt"),
            Err(e) => error!(error = %e, "Heartbeat failed"),
        }
    }

    /// Emit heartbeats until `shutdown` fires.
    pub async fn run(self, shutdown: CancellationToken) {
        let mut ticker = interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        debug!(interval_ms = self.interval.as_millis() as u64, "Heartbeat started");
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {}
            }
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = self.beat() => {}
            }
        }
        debug!("Heartbeat stopped");
    }
}
