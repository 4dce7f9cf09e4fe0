//! Typed payloads carried inside envelopes.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Observed address and port reachability for one IP version.
///
/// Returned both by the IP-info endpoints consulted during join and by the
/// reachability probes. Missing fields decode as empty/closed.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IpInfo {
    #[serde(default)]
    pub ip: String,
    /// Data-exchange (swarm) port reachable from the internet.
    #[serde(default, rename = "swarm", alias = "swarm_open")]
    pub swarm_open: bool,
    /// Gateway port reachable from the internet.
    #[serde(default, rename = "gateway", alias = "gateway_open")]
    pub gateway_open: bool,
}

impl IpInfo {
    /// The fail-safe result: nothing known, every port closed.
    pub fn closed() -> Self {
        Self::default()
    }

    /// Both ports are reachable.
    pub fn is_open(&self) -> bool {
        self.swarm_open && self.gateway_open
    }
}

/// Join request (node → coordinator).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinRequest {
    /// Node id.
    pub address: String,
    pub ipv4: IpInfo,
    pub ipv6: IpInfo,
    /// Signature over `address ++ "." ++ expires`.
    pub signature: Vec<u8>,
    /// Unix seconds after which the signature is stale.
    pub expires: i64,
}

impl JoinRequest {
    /// The exact bytes a join signature covers.
    pub fn signed_bytes(address: &str, expires: i64) -> Vec<u8> {
        format!("{}.{}", address, expires).into_bytes()
    }
}

/// Certificate material issued for one IP address.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertPair {
    #[serde(rename = "privkey")]
    pub private_key_pem: String,
    #[serde(rename = "cert")]
    pub cert_pem: String,
}

/// Join response (coordinator → node).
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinResponse {
    pub success: bool,
    #[serde(default)]
    pub message: String,
    /// Issued certificates keyed by IP address string.
    #[serde(default)]
    pub certs: BTreeMap<String, CertPair>,
}

/// Heartbeat statistics snapshot.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Stats {
    /// Bytes stored by the node.
    pub storage: u64,
    /// Cumulative bytes received.
    #[serde(rename = "in")]
    pub total_in: u64,
    /// Cumulative bytes sent.
    #[serde(rename = "out")]
    pub total_out: u64,
    /// Instantaneous inbound rate, bytes/s.
    pub ingress: f64,
    /// Instantaneous outbound rate, bytes/s.
    pub egress: f64,
}

/// Heartbeat request (node → coordinator).
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct HeartbeatRequest {
    pub stats: Stats,
}

/// Result of a diagnostic command.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TestResult {
    /// Port reachability keyed by `"v4"` / `"v6"`.
    pub ports: BTreeMap<String, IpInfo>,
    /// Download throughput in Mbit/s (0 when not measured).
    pub download: f64,
    /// Upload throughput in Mbit/s (0 when not measured).
    pub upload: f64,
    /// Whether the throughput figures look plausible.
    pub valid: bool,
}

impl TestResult {
    /// Whether at least one IP version has both ports open.
    pub fn reachable(&self) -> bool {
        self.ports.values().any(IpInfo::is_open)
    }
}
