//! Node configuration (`node.*`).
//!
//! Identity source, the id presented to the coordinator, the data
//! directory certificates are written under, and the cadence of the two
//! session loops.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::IdentityConfig;

/// Default heartbeat period (1 s).
const DEFAULT_HEARTBEAT_INTERVAL_MS: u64 = 1000;

/// Default command poll period (250 ms).
const DEFAULT_COMMAND_INTERVAL_MS: u64 = 250;

/// Data directory name under the home directory when none is configured.
const DEFAULT_DATA_DIR_NAME: &str = ".nodelink";

/// Node configuration (`node.*`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NodeConfig {
    /// Identity configuration (`node.identity.*`).
    #[serde(default)]
    pub identity: IdentityConfig,

    /// Node id presented to the coordinator (`node.id`).
    /// Defaults to the identity's npub.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// Root directory for persisted state (`node.data_dir`).
    /// Certificates land in `<data_dir>/certs/<ip>/`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<PathBuf>,

    /// Heartbeat period in milliseconds (`node.heartbeat_interval_ms`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub heartbeat_interval_ms: Option<u64>,

    /// Command poll period in milliseconds (`node.command_interval_ms`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command_interval_ms: Option<u64>,
}

impl NodeConfig {
    /// Get the data directory, falling back to `~/.nodelink` (or
    /// `./.nodelink` when no home directory is known).
    pub fn data_dir(&self) -> PathBuf {
        match &self.data_dir {
            Some(dir) => dir.clone(),
            None => dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(DEFAULT_DATA_DIR_NAME),
        }
    }

    /// Get the heartbeat period.
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(
            self.heartbeat_interval_ms
                .unwrap_or(DEFAULT_HEARTBEAT_INTERVAL_MS)
                .max(1),
        )
    }

    /// Get the command poll period.
    pub fn command_interval(&self) -> Duration {
        Duration::from_millis(
            self.command_interval_ms
                .unwrap_or(DEFAULT_COMMAND_INTERVAL_MS)
                .max(1),
        )
    }

    pub(super) fn merge(&mut self, other: NodeConfig) {
        if other.identity.nsec.is_some() {
            self.identity.nsec = other.identity.nsec;
        }
        if other.id.is_some() {
            self.id = other.id;
        }
        if other.data_dir.is_some() {
            self.data_dir = other.data_dir;
        }
        if other.heartbeat_interval_ms.is_some() {
            self.heartbeat_interval_ms = other.heartbeat_interval_ms;
        }
        if other.command_interval_ms.is_some() {
            self.command_interval_ms = other.command_interval_ms;
        }
    }
}
