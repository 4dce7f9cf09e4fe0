//! Join handshake.
//!
//! The first exchange on every new session: the node sends a signed
//! [`JoinRequest`] with its observed addresses and waits for the
//! coordinator's [`JoinResponse`]. Issued certificates are persisted
//! before the session is handed back.

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use thiserror::Error;
use tracing::{debug, info, warn};

use super::CertStore;
use crate::diagnostics::{AddressProbe, IpVersion};
use crate::protocol::{Envelope, IpInfo, JoinRequest, JoinResponse, ProtocolError, ServiceTag};
use crate::transport::{Session, TransportError};
use crate::Identity;

/// Outer bound on each IP-info lookup.
const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(3);

/// Errors from a join attempt.
#[derive(Debug, Error)]
pub enum JoinError {
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("no join response within {0:?}")]
    Timeout(Duration),

    #[error("join rejected: {0}")]
    Rejected(String),
}

/// A successful join: the response and the expiry that was signed.
#[derive(Clone, Debug)]
pub struct Joined {
    pub response: JoinResponse,
    pub expires: i64,
}

/// Performs the join exchange on freshly dialed sessions.
pub struct JoinHandshake {
    identity: Arc<Identity>,
    probe: Arc<dyn AddressProbe>,
    certs: CertStore,
    expires_secs: i64,
    response_timeout: Duration,
    probe_timeout: Duration,
}

impl JoinHandshake {
    pub fn new(
        identity: Arc<Identity>,
        probe: Arc<dyn AddressProbe>,
        certs: CertStore,
        expires_secs: i64,
        response_timeout: Duration,
    ) -> Self {
        Self {
            identity,
            probe,
            certs,
            expires_secs,
            response_timeout,
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
        }
    }

    /// Override the per-lookup IP-info timeout.
    pub fn with_probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    /// Build a signed join request expiring `expires_secs` after `now`.
    ///
    /// The expiry saturates at `i64::MAX` instead of wrapping into the past.
    pub fn request(&self, ipv4: IpInfo, ipv6: IpInfo, now: i64) -> JoinRequest {
        let expires = now.saturating_add(self.expires_secs);
        let address = self.identity.node_id().to_string();
        let signature = self
            .identity
            .sign(&JoinRequest::signed_bytes(&address, expires));
        JoinRequest {
            address,
            ipv4,
            ipv6,
            signature,
            expires,
        }
    }

    async fn ip_info(&self, version: IpVersion) -> IpInfo {
        match tokio::time::timeout(self.probe_timeout, self.probe.probe(version)).await {
            Ok(info) => info,
            Err(_) => {
                warn!(version = %version, "IP info lookup timed out");
                IpInfo::closed()
            }
        }
    }

    /// Run the exchange on `session`.
    pub async fn perform(&self, session: &mut Session) -> Result<Joined, JoinError> {
        let (ipv4, ipv6) = tokio::join!(self.ip_info(IpVersion::V4), self.ip_info(IpVersion::V6));
        let request = self.request(ipv4, ipv6, unix_now());
        let expires = request.expires;

        debug!(
            node_id = %request.address,
            expires,
            remote = %session.remote(),
            "Sending join request"
        );
        session
            .send(Envelope::new(ServiceTag::JOIN, &request)?)
            .await?;

        let reply = tokio::time::timeout(self.response_timeout, session.recv())
            .await
            .map_err(|_| JoinError::Timeout(self.response_timeout))??;
        let response: JoinResponse = reply.expect_payload(ServiceTag::JOIN)?;

        if !response.success {
            return Err(JoinError::Rejected(response.message));
        }

        let written = self.certs.persist(&response.certs).await;
        info!(
            remote = %session.remote(),
            expires,
            certs = response.certs.len(),
            files = written,
            "Joined coordinator"
        );

        Ok(Joined { response, expires })
    }
}

/// Current Unix time in seconds.
fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}
