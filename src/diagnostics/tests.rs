use super::*;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::net::TcpListener;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

// ============================================================================
// HTTP helpers
// ============================================================================

/// Base URL of a port with nothing listening on it.
async fn unreachable_base() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());
    drop(listener);
    base
}

fn server_list(base: &str) -> String {
    format!(
        r#"[{{"url":"{}/speedtest/upload.php","name":"local","sponsor":"test","id":"1","host":"local","distance":0}}]"#,
        base
    )
}

async fn mount_server_list(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/servers"))
        .respond_with(ResponseTemplate::new(200).set_body_string(server_list(&server.uri())))
        .mount(server)
        .await;
}

// ============================================================================
// Mock providers
// ============================================================================

struct FixedProbe {
    v4: IpInfo,
    v6: IpInfo,
}

#[async_trait]
impl AddressProbe for FixedProbe {
    async fn probe(&self, version: IpVersion) -> IpInfo {
        match version {
            IpVersion::V4 => self.v4.clone(),
            IpVersion::V6 => self.v6.clone(),
        }
    }
}

struct HangingProbe;

#[async_trait]
impl AddressProbe for HangingProbe {
    async fn probe(&self, _version: IpVersion) -> IpInfo {
        std::future::pending().await
    }
}

struct FixedSpeed {
    report: Option<SpeedReport>,
    runs: AtomicUsize,
}

impl FixedSpeed {
    fn new(report: Option<SpeedReport>) -> Self {
        Self {
            report,
            runs: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl SpeedTester for FixedSpeed {
    async fn run(&self) -> Option<SpeedReport> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        self.report
    }
}

struct HangingSpeed;

#[async_trait]
impl SpeedTester for HangingSpeed {
    async fn run(&self) -> Option<SpeedReport> {
        std::future::pending().await
    }
}

fn open(ip: &str) -> IpInfo {
    IpInfo {
        ip: ip.to_string(),
        swarm_open: true,
        gateway_open: true,
    }
}

fn diagnostics(probe: Arc<dyn AddressProbe>, speed: Arc<dyn SpeedTester>) -> Diagnostics {
    Diagnostics::new(probe, speed, Duration::from_secs(3), Duration::from_secs(40))
}

// ============================================================================
// SpeedReport
// ============================================================================

#[test]
fn test_speed_report_validity() {
    assert!(SpeedReport::new(100.0, 20.0).valid);
    assert!(SpeedReport::new(100.0, 1.0).valid);
    assert!(!SpeedReport::new(100.0, 0.5).valid);
    assert!(!SpeedReport::new(0.5, 100.0).valid);
    assert!(!SpeedReport::new(0.0, 10.0).valid);
    assert!(!SpeedReport::new(10.0, 0.0).valid);
}

#[test]
fn test_ip_version_keys() {
    assert_eq!(IpVersion::V4.key(), "v4");
    assert_eq!(IpVersion::V6.key(), "v6");
    assert_eq!(IpVersion::V6.to_string(), "IPv6");
}

// ============================================================================
// Diagnostics runner
// ============================================================================

#[tokio::test]
async fn test_port_check_reports_both_versions() {
    let speed = Arc::new(FixedSpeed::new(Some(SpeedReport::new(50.0, 10.0))));
    let diag = diagnostics(
        Arc::new(FixedProbe {
            v4: open("1.2.3.4"),
            v6: IpInfo::closed(),
        }),
        speed.clone(),
    );

    let result = diag.port_check().await;
    assert_eq!(result.ports.len(), 2);
    assert_eq!(result.ports["v4"], open("1.2.3.4"));
    assert_eq!(result.ports["v6"], IpInfo::closed());
    assert_eq!(result.download, 0.0);
    assert_eq!(result.upload, 0.0);
    assert!(!result.valid);
    assert_eq!(speed.runs.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_node_test_includes_speed() {
    let diag = diagnostics(
        Arc::new(FixedProbe {
            v4: open("1.2.3.4"),
            v6: open("::1"),
        }),
        Arc::new(FixedSpeed::new(Some(SpeedReport::new(50.0, 10.0)))),
    );

    let result = diag.node_test().await;
    assert_eq!(result.download, 50.0);
    assert_eq!(result.upload, 10.0);
    assert!(result.valid);
    assert!(result.ports["v6"].is_open());
}

#[tokio::test]
async fn test_node_test_without_speed_result() {
    let diag = diagnostics(
        Arc::new(FixedProbe {
            v4: IpInfo::closed(),
            v6: IpInfo::closed(),
        }),
        Arc::new(FixedSpeed::new(None)),
    );

    let result = diag.node_test().await;
    assert_eq!(result.download, 0.0);
    assert_eq!(result.upload, 0.0);
    assert!(!result.valid);
}

#[tokio::test(start_paused = true)]
async fn test_hung_probe_resolves_closed() {
    let diag = diagnostics(Arc::new(HangingProbe), Arc::new(FixedSpeed::new(None)));

    let start = tokio::time::Instant::now();
    let info = diag.probe(IpVersion::V4).await;
    assert_eq!(info, IpInfo::closed());
    assert!(start.elapsed() >= Duration::from_secs(3));
}

#[tokio::test(start_paused = true)]
async fn test_hung_providers_do_not_stall_node_test() {
    let diag = diagnostics(Arc::new(HangingProbe), Arc::new(HangingSpeed));

    let result = diag.node_test().await;
    assert_eq!(result.ports["v4"], IpInfo::closed());
    assert_eq!(result.ports["v6"], IpInfo::closed());
    assert_eq!(result.download, 0.0);
    assert!(!result.valid);
}

// ============================================================================
// HTTP address probe
// ============================================================================

#[tokio::test]
async fn test_http_probe_decodes_response() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v4"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(r#"{"ip":"1.2.3.4","swarm":true,"gateway":true}"#),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v6"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(r#"{"ip":"::1","swarm":false,"gateway":true}"#),
        )
        .mount(&server)
        .await;

    let probe = HttpAddressProbe::new(
        format!("{}/v4", server.uri()),
        format!("{}/v6", server.uri()),
        Duration::from_secs(2),
    )
    .unwrap();

    assert_eq!(probe.probe(IpVersion::V4).await, open("1.2.3.4"));
    let v6 = probe.probe(IpVersion::V6).await;
    assert_eq!(v6.ip, "::1");
    assert!(!v6.swarm_open);
    assert!(v6.gateway_open);
}

#[tokio::test]
async fn test_http_probe_bad_body_is_closed() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
        .mount(&server)
        .await;

    let probe =
        HttpAddressProbe::new(server.uri(), server.uri(), Duration::from_secs(2)).unwrap();
    assert_eq!(probe.probe(IpVersion::V4).await, IpInfo::closed());
}

#[tokio::test]
async fn test_http_probe_unreachable_is_closed() {
    let base = unreachable_base().await;

    let probe = HttpAddressProbe::new(&base, &base, Duration::from_secs(2)).unwrap();
    assert_eq!(probe.probe(IpVersion::V6).await, IpInfo::closed());
}

#[tokio::test]
async fn test_http_probe_timeout_is_closed() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(r#"{"ip":"1.2.3.4","swarm":true,"gateway":true}"#)
                .set_delay(Duration::from_secs(5)),
        )
        .mount(&server)
        .await;

    let probe =
        HttpAddressProbe::new(server.uri(), server.uri(), Duration::from_millis(200)).unwrap();
    assert_eq!(probe.probe(IpVersion::V4).await, IpInfo::closed());
}

#[test]
fn test_http_probe_urls_from_config() {
    let mut config = Config::new();
    config.coordinator.domain = Some("net.example".to_string());
    config.diagnostics.ipv6_probe_url = Some("http://probe6.example/check".to_string());

    let probe = HttpAddressProbe::from_config(&config).unwrap();
    assert_eq!(probe.url(IpVersion::V4), "http://ip4.net.example");
    assert_eq!(probe.url(IpVersion::V6), "http://probe6.example/check");
}

// ============================================================================
// HTTP speed test
// ============================================================================

#[test]
fn test_server_list_parsing() {
    let json = r#"[
        {"url":"http://a.example:8080/speedtest/upload.php","lat":"1","name":"A","sponsor":"S","id":"123","host":"a.example:8080","distance":12},
        {"url":"http://b.example/upload.php","id":7}
    ]"#;
    let servers: Vec<speedtest::SpeedTestServer> = serde_json::from_str(json).unwrap();
    assert_eq!(servers.len(), 2);
    assert_eq!(
        servers[0].id,
        Some(speedtest::ServerId::Text("123".to_string()))
    );
    assert_eq!(servers[0].distance, 12.0);
    assert_eq!(servers[1].id, Some(speedtest::ServerId::Number(7)));
    assert_eq!(
        servers[0].download_url().unwrap(),
        "http://a.example:8080/speedtest/random1000x1000.jpg"
    );
    assert_eq!(
        servers[1].download_url().unwrap(),
        "http://b.example/random1000x1000.jpg"
    );
}

#[test]
fn test_download_url_requires_path() {
    let server: speedtest::SpeedTestServer =
        serde_json::from_str(r#"{"url":"http://bare.example"}"#).unwrap();
    assert!(server.download_url().is_err());
}

#[tokio::test]
async fn test_http_speed_test_measures_both_directions() {
    let server = MockServer::start().await;
    mount_server_list(&server).await;
    Mock::given(method("GET"))
        .and(path("/speedtest/random1000x1000.jpg"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0xAB; 64 * 1024]))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/speedtest/upload.php"))
        .respond_with(ResponseTemplate::new(200).set_body_string("size=262144"))
        .expect(1..)
        .mount(&server)
        .await;

    let tester = HttpSpeedTester::new(
        format!("{}/servers", server.uri()),
        Duration::from_millis(200),
        Duration::from_secs(2),
    )
    .unwrap();

    let report = tester.run().await.expect("speed test result");
    assert!(report.download > 0.0);
    assert!(report.upload > 0.0);
}

#[tokio::test]
async fn test_http_speed_test_keeps_upload_when_download_fails() {
    let server = MockServer::start().await;
    mount_server_list(&server).await;
    Mock::given(method("GET"))
        .and(path("/speedtest/random1000x1000.jpg"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/speedtest/upload.php"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1..)
        .mount(&server)
        .await;

    let tester = HttpSpeedTester::new(
        format!("{}/servers", server.uri()),
        Duration::from_millis(200),
        Duration::from_secs(2),
    )
    .unwrap();

    let report = tester.run().await.expect("partial speed test result");
    assert_eq!(report.download, 0.0);
    assert!(report.upload > 0.0);
    assert!(!report.valid);
}

#[tokio::test]
async fn test_http_speed_test_keeps_download_when_upload_fails() {
    let server = MockServer::start().await;
    mount_server_list(&server).await;
    Mock::given(method("GET"))
        .and(path("/speedtest/random1000x1000.jpg"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0xAB; 64 * 1024]))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(403))
        .mount(&server)
        .await;

    let tester = HttpSpeedTester::new(
        format!("{}/servers", server.uri()),
        Duration::from_millis(200),
        Duration::from_secs(2),
    )
    .unwrap();

    let report = tester.run().await.expect("partial speed test result");
    assert!(report.download > 0.0);
    assert_eq!(report.upload, 0.0);
    assert!(!report.valid);
}

#[tokio::test]
async fn test_http_speed_test_both_directions_failing_is_no_result() {
    let server = MockServer::start().await;
    mount_server_list(&server).await;
    Mock::given(method("GET"))
        .and(path("/speedtest/random1000x1000.jpg"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let tester = HttpSpeedTester::new(
        format!("{}/servers", server.uri()),
        Duration::from_millis(100),
        Duration::from_secs(2),
    )
    .unwrap();
    assert!(tester.run().await.is_none());
}

#[tokio::test]
async fn test_http_speed_test_empty_list_is_no_result() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("[]"))
        .mount(&server)
        .await;

    let tester = HttpSpeedTester::new(
        server.uri(),
        Duration::from_millis(100),
        Duration::from_secs(2),
    )
    .unwrap();
    assert!(tester.run().await.is_none());
}

#[tokio::test]
async fn test_http_speed_test_unreachable_is_no_result() {
    let base = unreachable_base().await;

    let tester =
        HttpSpeedTester::new(&base, Duration::from_millis(100), Duration::from_secs(2)).unwrap();
    assert!(tester.run().await.is_none());
}
