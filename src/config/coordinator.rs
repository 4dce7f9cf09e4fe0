//! Coordinator connection configuration (`coordinator.*`).

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::ConfigError;

/// Default coordinator domain.
const DEFAULT_DOMAIN: &str = "localhost";

/// Default coordinator API address.
const DEFAULT_API: &str = "127.0.0.1:4242";

/// Default join validity window in seconds.
const DEFAULT_EXPIRES_SECS: i64 = 3600;

/// Longest accepted join validity window (ten years).
const MAX_EXPIRES_SECS: i64 = 10 * 365 * 24 * 60 * 60;

/// Application protocol identifier negotiated with the coordinator.
pub const DEFAULT_ALPN: &str = "wq-vvv-01";

/// Default upper bound on the wait for a join response.
const DEFAULT_JOIN_TIMEOUT_SECS: u64 = 30;

/// Coordinator configuration (`coordinator.*`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CoordinatorConfig {
    /// Network domain (`coordinator.domain`). The IP-info endpoints are
    /// `http://ip4.<domain>` and `http://ip6.<domain>`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,

    /// Coordinator address as `host:port` (`coordinator.api`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api: Option<String>,

    /// Join expiry TTL in seconds (`coordinator.expires_secs`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_secs: Option<i64>,

    /// ALPN identifier (`coordinator.alpn`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alpn: Option<String>,

    /// TLS server name (`coordinator.server_name`). Defaults to the host
    /// part of `api`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_name: Option<String>,

    /// Join response wait limit in seconds (`coordinator.join_timeout_secs`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub join_timeout_secs: Option<u64>,
}

impl CoordinatorConfig {
    /// Get the domain, using default if not configured.
    pub fn domain(&self) -> &str {
        self.domain.as_deref().unwrap_or(DEFAULT_DOMAIN)
    }

    /// Get the API address, using default if not configured.
    pub fn api(&self) -> &str {
        self.api.as_deref().unwrap_or(DEFAULT_API)
    }

    /// Get the join expiry TTL in seconds.
    pub fn expires_secs(&self) -> i64 {
        self.expires_secs.unwrap_or(DEFAULT_EXPIRES_SECS)
    }

    /// Get the ALPN identifier.
    pub fn alpn(&self) -> &str {
        self.alpn.as_deref().unwrap_or(DEFAULT_ALPN)
    }

    /// Get the TLS server name: explicit value, else the host part of `api`.
    pub fn server_name(&self) -> &str {
        if let Some(name) = self.server_name.as_deref() {
            return name;
        }
        let api = self.api();
        let host = match api.rsplit_once(':') {
            Some((host, _port)) => host,
            None => api,
        };
        host.trim_start_matches('[').trim_end_matches(']')
    }

    /// Get the join response wait limit.
    pub fn join_timeout(&self) -> Duration {
        Duration::from_secs(self.join_timeout_secs.unwrap_or(DEFAULT_JOIN_TIMEOUT_SECS))
    }

    pub(super) fn validate(&self) -> Result<(), ConfigError> {
        if let Some(secs) = self.expires_secs {
            if secs <= 0 || secs > MAX_EXPIRES_SECS {
                return Err(ConfigError::Invalid {
                    field: "coordinator.expires_secs",
                    reason: format!("{} is outside 1..={}", secs, MAX_EXPIRES_SECS),
                });
            }
        }
        Ok(())
    }

    pub(super) fn merge(&mut self, other: CoordinatorConfig) {
        if other.domain.is_some() {
            self.domain = other.domain;
        }
        if other.api.is_some() {
            self.api = other.api;
        }
        if other.expires_secs.is_some() {
            self.expires_secs = other.expires_secs;
        }
        if other.alpn.is_some() {
            self.alpn = other.alpn;
        }
        if other.server_name.is_some() {
            self.server_name = other.server_name;
        }
        if other.join_timeout_secs.is_some() {
            self.join_timeout_secs = other.join_timeout_secs;
        }
    }
}
