//! Diagnostic Providers
//!
//! Reachability probes and the speed test, run on coordinator command.
//! Every provider resolves failure to a negative result (closed ports, no
//! throughput) instead of an error, and every call is bounded by an outer
//! timeout so a hung provider cannot stall the command loop.

mod probe;
mod speedtest;

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::protocol::{IpInfo, TestResult};

pub use probe::HttpAddressProbe;
pub use speedtest::{HttpSpeedTester, SpeedTestError};

/// Port the swarm listens on, for log messages.
const SWARM_PORT: u16 = 4001;

/// Port the gateway listens on, for log messages.
const GATEWAY_PORT: u16 = 443;

/// Extra time granted to a probe beyond its own HTTP timeout.
const PROBE_GRACE: Duration = Duration::from_secs(1);

/// Extra time granted to the speed test beyond its two measurement windows.
const SPEED_TEST_GRACE: Duration = Duration::from_secs(30);

/// Speeds further apart than this factor are considered implausible.
const MAX_SPEED_RATIO: f64 = 100.0;

/// IP protocol version.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum IpVersion {
    V4,
    V6,
}

impl IpVersion {
    /// Key used in [`TestResult::ports`].
    pub fn key(&self) -> &'static str {
        match self {
            IpVersion::V4 => "v4",
            IpVersion::V6 => "v6",
        }
    }
}

impl fmt::Display for IpVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IpVersion::V4 => write!(f, "IPv4"),
            IpVersion::V6 => write!(f, "IPv6"),
        }
    }
}

/// Observed address and port reachability for one IP version.
///
/// Implementations never fail: any error resolves to [`IpInfo::closed`].
#[async_trait]
pub trait AddressProbe: Send + Sync {
    async fn probe(&self, version: IpVersion) -> IpInfo;
}

/// One download/upload measurement in Mbit/s.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SpeedReport {
    pub download: f64,
    pub upload: f64,
    pub valid: bool,
}

impl SpeedReport {
    /// Build a report, judging plausibility: both speeds positive and
    /// within a factor of 100 of each other.
    pub fn new(download: f64, upload: f64) -> Self {
        let valid = download > 0.0
            && upload > 0.0
            && download / upload <= MAX_SPEED_RATIO
            && upload / download <= MAX_SPEED_RATIO;
        Self {
            download,
            upload,
            valid,
        }
    }
}

/// Network throughput measurement. `None` means no result.
#[async_trait]
pub trait SpeedTester: Send + Sync {
    async fn run(&self) -> Option<SpeedReport>;
}

/// Runs diagnostic commands against the configured providers.
#[derive(Clone)]
pub struct Diagnostics {
    probe: Arc<dyn AddressProbe>,
    speed: Arc<dyn SpeedTester>,
    probe_timeout: Duration,
    speed_timeout: Duration,
}

impl Diagnostics {
    pub fn new(
        probe: Arc<dyn AddressProbe>,
        speed: Arc<dyn SpeedTester>,
        probe_timeout: Duration,
        speed_timeout: Duration,
    ) -> Self {
        Self {
            probe,
            speed,
            probe_timeout,
            speed_timeout,
        }
    }

    /// HTTP providers configured from `config`.
    pub fn from_config(config: &Config) -> Result<Self, reqwest::Error> {
        let diag = &config.diagnostics;
        let probe = HttpAddressProbe::from_config(config)?;
        let speed = HttpSpeedTester::new(
            diag.speedtest_servers_url(),
            diag.speedtest_window(),
            diag.timeout(),
        )?;
        Ok(Self::new(
            Arc::new(probe),
            Arc::new(speed),
            diag.timeout() + PROBE_GRACE,
            diag.speedtest_window() * 2 + SPEED_TEST_GRACE,
        ))
    }

    /// The address probe, shared with the join handshake.
    pub fn address_probe(&self) -> Arc<dyn AddressProbe> {
        self.probe.clone()
    }

    /// Probe one IP version, closed on timeout.
    pub async fn probe(&self, version: IpVersion) -> IpInfo {
        match tokio::time::timeout(self.probe_timeout, self.probe.probe(version)).await {
            Ok(info) => info,
            Err(_) => {
                warn!(version = %version, "Port probe timed out");
                IpInfo::closed()
            }
        }
    }

    /// Reachability of both IP versions, keyed `"v4"` / `"v6"`.
    pub async fn ports(&self) -> BTreeMap<String, IpInfo> {
        let (v4, v6) = tokio::join!(self.probe(IpVersion::V4), self.probe(IpVersion::V6));

        for (version, info) in [(IpVersion::V4, &v4), (IpVersion::V6, &v6)] {
            if !info.swarm_open {
                warn!(version = %version, port = SWARM_PORT, "Swarm port is not open to the internet");
            }
            if !info.gateway_open {
                warn!(version = %version, port = GATEWAY_PORT, "Gateway port is not open to the internet");
            }
        }
        if !v4.is_open() && !v6.is_open() {
            error!("Node ports are not open to the internet");
        }

        let mut ports = BTreeMap::new();
        ports.insert(IpVersion::V4.key().to_string(), v4);
        ports.insert(IpVersion::V6.key().to_string(), v6);
        ports
    }

    /// One speed-test run, `None` on failure or timeout.
    pub async fn speed(&self) -> Option<SpeedReport> {
        match tokio::time::timeout(self.speed_timeout, self.speed.run()).await {
            Ok(report) => report,
            Err(_) => {
                warn!("Speed test timed out");
                None
            }
        }
    }

    /// Ports only; throughput zero and not valid.
    pub async fn port_check(&self) -> TestResult {
        TestResult {
            ports: self.ports().await,
            download: 0.0,
            upload: 0.0,
            valid: false,
        }
    }

    /// Full node test: ports, then one speed-test measurement.
    pub async fn node_test(&self) -> TestResult {
        let ports = self.ports().await;
        let mut result = TestResult {
            ports,
            ..Default::default()
        };

        if let Some(report) = self.speed().await {
            info!(
                download_mbps = format_args!("{:.2}", report.download),
                upload_mbps = format_args!("{:.2}", report.upload),
                "Speed test complete"
            );
            if !report.valid {
                warn!("Speed test result looks implausible");
            }
            result.download = report.download;
            result.upload = report.upload;
            result.valid = report.valid;
        }
        result
    }
}

#[cfg(test)]
mod tests;
