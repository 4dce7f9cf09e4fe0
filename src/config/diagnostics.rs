//! Diagnostic provider configuration (`diagnostics.*`).

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default HTTP timeout for probe and IP-info lookups.
const DEFAULT_TIMEOUT_SECS: u64 = 2;

/// Default speed-test server list.
const DEFAULT_SPEEDTEST_SERVERS_URL: &str = "https://www.speedtest.net/api/js/servers?engine=js";

/// Default measurement window per direction.
const DEFAULT_SPEEDTEST_WINDOW_SECS: u64 = 5;

/// Diagnostics configuration (`diagnostics.*`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DiagnosticsConfig {
    /// Timeout for probe lookups in seconds (`diagnostics.timeout_secs`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,

    /// IPv4 reachability endpoint (`diagnostics.ipv4_probe_url`).
    /// Defaults to `http://ip4.<coordinator.domain>`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ipv4_probe_url: Option<String>,

    /// IPv6 reachability endpoint (`diagnostics.ipv6_probe_url`).
    /// Defaults to `http://ip6.<coordinator.domain>`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ipv6_probe_url: Option<String>,

    /// Speed-test server list URL (`diagnostics.speedtest_servers_url`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speedtest_servers_url: Option<String>,

    /// Measurement window per direction in seconds
    /// (`diagnostics.speedtest_window_secs`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speedtest_window_secs: Option<u64>,
}

impl DiagnosticsConfig {
    /// Get the probe timeout.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS))
    }

    /// Get the IPv4 probe URL for the given coordinator domain.
    pub fn ipv4_probe_url(&self, domain: &str) -> String {
        self.ipv4_probe_url
            .clone()
            .unwrap_or_else(|| format!("http://ip4.{}", domain))
    }

    /// Get the IPv6 probe URL for the given coordinator domain.
    pub fn ipv6_probe_url(&self, domain: &str) -> String {
        self.ipv6_probe_url
            .clone()
            .unwrap_or_else(|| format!("http://ip6.{}", domain))
    }

    /// Get the speed-test server list URL.
    pub fn speedtest_servers_url(&self) -> &str {
        self.speedtest_servers_url
            .as_deref()
            .unwrap_or(DEFAULT_SPEEDTEST_SERVERS_URL)
    }

    /// Get the measurement window per direction.
    pub fn speedtest_window(&self) -> Duration {
        Duration::from_secs(
            self.speedtest_window_secs
                .unwrap_or(DEFAULT_SPEEDTEST_WINDOW_SECS)
                .max(1),
        )
    }

    pub(super) fn merge(&mut self, other: DiagnosticsConfig) {
        if other.timeout_secs.is_some() {
            self.timeout_secs = other.timeout_secs;
        }
        if other.ipv4_probe_url.is_some() {
            self.ipv4_probe_url = other.ipv4_probe_url;
        }
        if other.ipv6_probe_url.is_some() {
            self.ipv6_probe_url = other.ipv6_probe_url;
        }
        if other.speedtest_servers_url.is_some() {
            self.speedtest_servers_url = other.speedtest_servers_url;
        }
        if other.speedtest_window_secs.is_some() {
            self.speedtest_window_secs = other.speedtest_window_secs;
        }
    }
}
