//! HTTP speed test.
//!
//! Uses the public speedtest.net server list: picks the closest server,
//! streams its `random<N>x<N>.jpg` images for one window to measure
//! download, then POSTs fixed-size bodies to its upload URL for one window
//! to measure upload. The two directions are measured independently; a
//! failed direction reports zero and leaves the result invalid.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::Client;
use serde::Deserialize;
use thiserror::Error;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, warn};

use super::{SpeedReport, SpeedTester};

/// Side length of the downloaded test image.
const DOWNLOAD_IMAGE_SIZE: u32 = 1000;

/// Size of each upload body.
const UPLOAD_CHUNK_SIZE: usize = 256 * 1024;

/// Errors from a speed-test run.
#[derive(Debug, Error)]
pub enum SpeedTestError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("server list is empty")]
    NoServers,

    #[error("invalid server url: {0}")]
    InvalidServerUrl(String),

    #[error("no data transferred")]
    NoData,
}

/// Server ids arrive as numbers or strings depending on the list endpoint.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum ServerId {
    Number(u64),
    Text(String),
}

/// One entry of the server list.
#[derive(Clone, Debug, Deserialize)]
pub struct SpeedTestServer {
    #[serde(default)]
    pub id: Option<ServerId>,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub sponsor: String,
    /// Upload endpoint; download images live next to it.
    pub url: String,
    #[serde(default)]
    pub host: String,
    #[serde(default)]
    pub distance: f64,
}

impl SpeedTestServer {
    /// URL of the download test image.
    pub fn download_url(&self) -> Result<String, SpeedTestError> {
        let base = match self.url.rfind('/') {
            Some(idx) if idx > "https://".len() => &self.url[..=idx],
            _ => return Err(SpeedTestError::InvalidServerUrl(self.url.clone())),
        };
        Ok(format!(
            "{}random{}x{}.jpg",
            base, DOWNLOAD_IMAGE_SIZE, DOWNLOAD_IMAGE_SIZE
        ))
    }
}

/// Measures throughput against a speedtest.net-compatible server.
#[derive(Clone, Debug)]
pub struct HttpSpeedTester {
    client: Client,
    servers_url: String,
    window: Duration,
    request_timeout: Duration,
}

impl HttpSpeedTester {
    pub fn new(
        servers_url: impl Into<String>,
        window: Duration,
        request_timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        let client = Client::builder().connect_timeout(request_timeout).build()?;
        Ok(Self {
            client,
            servers_url: servers_url.into(),
            window,
            request_timeout,
        })
    }

    /// Fetch the server list, closest first.
    pub async fn servers(&self) -> Result<Vec<SpeedTestServer>, SpeedTestError> {
        let servers = self
            .client
            .get(&self.servers_url)
            .timeout(self.request_timeout * 5)
            .send()
            .await?
            .error_for_status()?
            .json::<Vec<SpeedTestServer>>()
            .await?;
        Ok(servers)
    }

    /// Download for one window; Mbit/s.
    pub async fn download(&self, server: &SpeedTestServer) -> Result<f64, SpeedTestError> {
        let url = server.download_url()?;
        let start = Instant::now();
        let deadline = start + self.window;
        let mut total: u64 = 0;

        'window: while Instant::now() < deadline {
            let mut response = match timeout_at(deadline, self.client.get(&url).send()).await {
                Ok(resp) => resp?.error_for_status()?,
                Err(_) => break,
            };
            loop {
                match timeout_at(deadline, response.chunk()).await {
                    Ok(Ok(Some(chunk))) => total += chunk.len() as u64,
                    Ok(Ok(None)) => break,
                    Ok(Err(e)) => return Err(e.into()),
                    Err(_) => break 'window,
                }
            }
        }

        mbps(total, start.elapsed())
    }

    /// Upload for one window; Mbit/s.
    pub async fn upload(&self, server: &SpeedTestServer) -> Result<f64, SpeedTestError> {
        let body = Bytes::from(vec![0u8; UPLOAD_CHUNK_SIZE]);
        let start = Instant::now();
        let deadline = start + self.window;
        let mut total: u64 = 0;

        while Instant::now() < deadline {
            let request = self.client.post(&server.url).body(body.clone()).send();
            match timeout_at(deadline, request).await {
                Ok(resp) => {
                    resp?.error_for_status()?;
                    total += body.len() as u64;
                }
                Err(_) => break,
            }
        }

        mbps(total, start.elapsed())
    }

    async fn measure(&self) -> Result<SpeedReport, SpeedTestError> {
        let servers = self.servers().await?;
        let server = servers.first().ok_or(SpeedTestError::NoServers)?;
        debug!(
            name = %server.name,
            sponsor = %server.sponsor,
            host = %server.host,
            distance = server.distance,
            "Speed test server selected"
        );

        let download = self.download(server).await;
        if let Err(e) = &download {
            warn!(error = %e, "Download test failed");
        }
        let upload = self.upload(server).await;
        if let Err(e) = &upload {
            warn!(error = %e, "Upload test failed");
        }

        match (download, upload) {
            (Err(e), Err(_)) => Err(e),
            (download, upload) => Ok(SpeedReport::new(
                download.unwrap_or(0.0),
                upload.unwrap_or(0.0),
            )),
        }
    }
}

#[async_trait]
impl SpeedTester for HttpSpeedTester {
    async fn run(&self) -> Option<SpeedReport> {
        match self.measure().await {
            Ok(report) => Some(report),
            Err(e) => {
                warn!(error = %e, "Speed test failed");
                None
            }
        }
    }
}

fn mbps(bytes: u64, elapsed: Duration) -> Result<f64, SpeedTestError> {
    let secs = elapsed.as_secs_f64();
    if bytes == 0 || secs <= 0.0 {
        return Err(SpeedTestError::NoData);
    }
    Ok(bytes as f64 * 8.0 / 1_000_000.0 / secs)
}
