//! HTTP address probe.
//!
//! The coordinator network exposes `http://ip4.<domain>` and
//! `http://ip6.<domain>`, which answer with the caller's observed address
//! and whether its swarm and gateway ports are reachable.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, warn};

use super::{AddressProbe, IpVersion};
use crate::config::Config;
use crate::protocol::IpInfo;

/// Queries the per-version IP-info endpoints over HTTP.
#[derive(Clone, Debug)]
pub struct HttpAddressProbe {
    client: Client,
    ipv4_url: String,
    ipv6_url: String,
}

impl HttpAddressProbe {
    pub fn new(
        ipv4_url: impl Into<String>,
        ipv6_url: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            ipv4_url: ipv4_url.into(),
            ipv6_url: ipv6_url.into(),
        })
    }

    pub fn from_config(config: &Config) -> Result<Self, reqwest::Error> {
        let domain = config.coordinator.domain();
        Self::new(
            config.diagnostics.ipv4_probe_url(domain),
            config.diagnostics.ipv6_probe_url(domain),
            config.diagnostics.timeout(),
        )
    }

    pub(super) fn url(&self, version: IpVersion) -> &str {
        match version {
            IpVersion::V4 => &self.ipv4_url,
            IpVersion::V6 => &self.ipv6_url,
        }
    }
}

#[async_trait]
impl AddressProbe for HttpAddressProbe {
    async fn probe(&self, version: IpVersion) -> IpInfo {
        let url = self.url(version);
        let response = match self.client.get(url).send().await {
            Ok(resp) => resp,
            Err(e) => {
                warn!(version = %version, url = %url, error = %e, "Failed to check port forwarding");
                return IpInfo::closed();
            }
        };

        match response.json::<IpInfo>().await {
            Ok(info) => {
                debug!(version = %version, ip = %info.ip, swarm = info.swarm_open, gateway = info.gateway_open, "Address probe");
                info
            }
            Err(e) => {
                warn!(version = %version, error = %e, "Failed to decode port forwarding data");
                IpInfo::closed()
            }
        }
    }
}
