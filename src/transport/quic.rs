//! QUIC connector.
//!
//! Dials the coordinator's API address, negotiates the session ALPN and
//! opens a single bidirectional stream.
//!
//! The coordinator's certificate is NOT validated: any certificate is
//! accepted as long as the handshake signatures are consistent with it.
//! The session is authenticated in the other direction only (the node signs
//! its join request). This is a known weakness of the protocol.

use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use quinn::crypto::rustls::QuicClientConfig;
use quinn::{ClientConfig, Endpoint};
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::CryptoProvider;
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{DigitallySignedStruct, SignatureScheme};
use tracing::{debug, info};

use super::{Connector, Session, TransportError};
use crate::bandwidth::TrafficMeter;
use crate::config::CoordinatorConfig;

/// Connection resources kept alive by the session.
struct QuicGuard {
    _endpoint: Endpoint,
    _connection: quinn::Connection,
}

/// Connects to the coordinator over QUIC.
pub struct QuicConnector {
    api: String,
    server_name: String,
    alpn: String,
    meter: Option<Arc<TrafficMeter>>,
}

impl QuicConnector {
    pub fn new(config: &CoordinatorConfig) -> Self {
        Self {
            api: config.api().to_string(),
            server_name: config.server_name().to_string(),
            alpn: config.alpn().to_string(),
            meter: None,
        }
    }

    /// Account session traffic on `meter`.
    pub fn with_meter(mut self, meter: Arc<TrafficMeter>) -> Self {
        self.meter = Some(meter);
        self
    }

    fn client_config(&self) -> Result<ClientConfig, TransportError> {
        let provider = Arc::new(rustls::crypto::ring::default_provider());
        let mut tls = rustls::ClientConfig::builder_with_provider(provider.clone())
            .with_safe_default_protocol_versions()
            .map_err(|e| TransportError::Tls(e.to_string()))?
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(SkipServerVerification(provider)))
            .with_no_client_auth();
        tls.alpn_protocols = vec![self.alpn.as_bytes().to_vec()];

        let quic =
            QuicClientConfig::try_from(tls).map_err(|e| TransportError::Tls(e.to_string()))?;
        Ok(ClientConfig::new(Arc::new(quic)))
    }

    async fn resolve(&self) -> Result<SocketAddr, TransportError> {
        tokio::net::lookup_host(self.api.as_str())
            .await
            .map_err(|e| TransportError::InvalidAddress(format!("{}: {}", self.api, e)))?
            .next()
            .ok_or_else(|| TransportError::InvalidAddress(self.api.clone()))
    }
}

#[async_trait]
impl Connector for QuicConnector {
    async fn connect(&self) -> Result<Session, TransportError> {
        let addr = self.resolve().await?;
        let bind: SocketAddr = if addr.is_ipv4() {
            SocketAddr::from(([0, 0, 0, 0], 0))
        } else {
            SocketAddr::from(([0u16; 8], 0))
        };

        let mut endpoint = Endpoint::client(bind)?;
        endpoint.set_default_client_config(self.client_config()?);

        debug!(addr = %addr, server_name = %self.server_name, "Dialing coordinator");
        let connecting = endpoint
            .connect(addr, &self.server_name)
            .map_err(|e| TransportError::ConnectFailed {
                addr: addr.to_string(),
                reason: e.to_string(),
            })?;
        let connection = connecting
            .await
            .map_err(|e| TransportError::ConnectFailed {
                addr: addr.to_string(),
                reason: e.to_string(),
            })?;

        let (send, recv) = connection
            .open_bi()
            .await
            .map_err(|e| TransportError::StreamFailed(e.to_string()))?;

        info!(addr = %addr, alpn = %self.alpn, "Coordinator stream open");

        let guard = QuicGuard {
            _endpoint: endpoint,
            _connection: connection,
        };
        Ok(
            Session::new(addr.to_string(), recv, send, self.meter.clone())
                .with_guard(Box::new(guard)),
        )
    }
}

/// Accepts any server certificate, checking only handshake signatures.
#[derive(Debug)]
struct SkipServerVerification(Arc<CryptoProvider>);

impl ServerCertVerifier for SkipServerVerification {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls12_signature(
            message,
            cert,
            dss,
            &self.0.signature_verification_algorithms,
        )
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls13_signature(
            message,
            cert,
            dss,
            &self.0.signature_verification_algorithms,
        )
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.0.signature_verification_algorithms.supported_schemes()
    }
}
