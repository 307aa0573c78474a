//! speedtest.net provider tests against a mock HTTP server

use serde_json::json;
use speedtest_recorder::{
    config::SpeedtestSettings,
    speedtest::{SpeedtestNetProvider, TransferPlan},
    AppError, LogLevel, Logger, MeasurementProvider, SpeedTestRunner,
};
use std::time::Duration;
use wiremock::matchers::{method, path, path_regex};
use wiremock::{Mock, MockServer, ResponseTemplate};

const IMAGE_BYTES: usize = 4096;

fn settings_for(server: &MockServer) -> SpeedtestSettings {
    SpeedtestSettings {
        server_list_url: format!("{}/api/js/servers", server.uri()),
        config_url: format!("{}/speedtest-config.php", server.uri()),
        timeout: Duration::from_secs(5),
        secure: false,
        candidates: 5,
        test_length: Duration::from_secs(30),
    }
}

fn small_plan() -> TransferPlan {
    TransferPlan {
        download_sizes: vec![350],
        download_repeats: 2,
        upload_sizes: vec![1024],
        upload_repeats: 3,
    }
}

async fn mount_server_list(server: &MockServer, entries: serde_json::Value) {
    Mock::given(method("GET"))
        .and(path("/api/js/servers"))
        .respond_with(ResponseTemplate::new(200).set_body_json(entries))
        .mount(server)
        .await;
}

fn entry(server: &MockServer, dir: &str, name: &str) -> serde_json::Value {
    json!({
        "url": format!("{}/{}/upload.php", server.uri(), dir),
        "name": name,
        "sponsor": "Mock ISP",
        "country": "Testland",
        "host": "localhost",
        "id": dir,
        "distance": 3
    })
}

async fn mount_healthy(server: &MockServer, dir: &str) {
    Mock::given(method("GET"))
        .and(path(format!("/{}/latency.txt", dir)))
        .respond_with(ResponseTemplate::new(200).set_body_string("test=test\n"))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_full_cycle_against_best_server() {
    let server = MockServer::start().await;
    mount_server_list(
        &server,
        json!([entry(&server, "broken", "Broken"), entry(&server, "good", "Good")]),
    )
    .await;

    Mock::given(method("GET"))
        .and(path("/broken/latency.txt"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;
    mount_healthy(&server, "good").await;

    Mock::given(method("GET"))
        .and(path_regex(r"^/good/random\d+x\d+\.jpg$"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0u8; IMAGE_BYTES]))
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/good/upload.php"))
        .respond_with(ResponseTemplate::new(200).set_body_string("size=1024"))
        .expect(3)
        .mount(&server)
        .await;

    let provider = SpeedtestNetProvider::new(settings_for(&server))
        .unwrap()
        .with_plan(small_plan());
    let (logger, sink) = Logger::in_memory("provider");

    let mut runner = SpeedTestRunner::new(provider, &logger);
    let timed = runner.run().await.unwrap();
    let measurement = &timed.measurement;

    assert!(measurement.download > 0.0);
    assert!(measurement.upload > 0.0);
    assert!(timed.elapsed > Duration::ZERO);

    assert_eq!(measurement.metadata["bytes_received"], json!(2 * IMAGE_BYTES));
    assert_eq!(measurement.metadata["bytes_sent"], json!(3 * 1024));
    assert_eq!(measurement.metadata["server"]["name"], json!("Good"));
    assert_eq!(measurement.metadata["server"]["id"], json!("good"));
    assert!(measurement.metadata["ping"].as_f64().unwrap() < 3_600_000.0);
    assert!(measurement.metadata["timestamp"].is_string());

    let provider = runner.into_provider();
    let best = provider.best_server().unwrap();
    assert_eq!(best.server.name, "Good");

    assert_eq!(sink.lines_at(LogLevel::Info).len(), 1);
}

#[tokio::test]
async fn test_empty_server_list() {
    let server = MockServer::start().await;
    mount_server_list(&server, json!([])).await;

    let mut provider = SpeedtestNetProvider::new(settings_for(&server)).unwrap();
    let err = provider.select_best_server().await.unwrap_err();

    match err {
        AppError::Measurement(message) => assert_eq!(message, "no speedtest servers available"),
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_all_servers_unreachable() {
    let server = MockServer::start().await;
    mount_server_list(&server, json!([entry(&server, "down", "Down")])).await;
    Mock::given(method("GET"))
        .and(path("/down/latency.txt"))
        .respond_with(ResponseTemplate::new(200).set_body_string("maintenance"))
        .mount(&server)
        .await;

    let mut provider = SpeedtestNetProvider::new(settings_for(&server)).unwrap();
    let err = provider.select_best_server().await.unwrap_err();

    assert!(matches!(err, AppError::Measurement(_)));
    assert!(err.to_string().contains("no reachable speedtest server"));
    assert!(provider.best_server().is_none());
}

#[tokio::test]
async fn test_server_list_error_status() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/js/servers"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let mut provider = SpeedtestNetProvider::new(settings_for(&server)).unwrap();
    let err = provider.select_best_server().await.unwrap_err();
    assert!(matches!(err, AppError::Measurement(_)));
}

#[tokio::test]
async fn test_failed_download_stops_the_cycle() {
    let server = MockServer::start().await;
    mount_server_list(&server, json!([entry(&server, "good", "Good")])).await;
    mount_healthy(&server, "good").await;
    Mock::given(method("GET"))
        .and(path_regex(r"^/good/random\d+x\d+\.jpg$"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/good/upload.php"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let provider = SpeedtestNetProvider::new(settings_for(&server))
        .unwrap()
        .with_plan(small_plan());
    let (logger, sink) = Logger::in_memory("provider");

    let err = SpeedTestRunner::new(provider, &logger).run().await.unwrap_err();

    assert!(matches!(err, AppError::Measurement(_)));
    assert!(sink.lines_at(LogLevel::Info).is_empty());
}

#[tokio::test]
async fn test_transfer_crossing_the_deadline_keeps_earlier_bytes() {
    let server = MockServer::start().await;
    mount_server_list(&server, json!([entry(&server, "good", "Good")])).await;
    mount_healthy(&server, "good").await;
    Mock::given(method("GET"))
        .and(path("/good/random350x350.jpg"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0u8; IMAGE_BYTES]))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/good/random500x500.jpg"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_bytes(vec![0u8; IMAGE_BYTES])
                .set_delay(Duration::from_secs(3)),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/good/random750x750.jpg"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0u8; IMAGE_BYTES]))
        .expect(0)
        .mount(&server)
        .await;

    let mut settings = settings_for(&server);
    settings.test_length = Duration::from_secs(1);
    let plan = TransferPlan {
        download_sizes: vec![350, 500, 750],
        download_repeats: 1,
        ..small_plan()
    };
    let mut provider = SpeedtestNetProvider::new(settings).unwrap().with_plan(plan);
    provider.select_best_server().await.unwrap();

    let started = std::time::Instant::now();
    let download = provider.download(1).await.unwrap();

    // the delayed image is cut off at the deadline, the last one never starts
    assert!(started.elapsed() < Duration::from_millis(2500));
    assert!(download > 0.0);
    let received = provider.results().metadata["bytes_received"].as_u64().unwrap();
    assert_eq!(received, IMAGE_BYTES as u64);
}

#[tokio::test]
async fn test_stalled_transfer_does_not_fail_the_direction() {
    let server = MockServer::start().await;
    mount_server_list(&server, json!([entry(&server, "good", "Good")])).await;
    mount_healthy(&server, "good").await;
    Mock::given(method("GET"))
        .and(path("/good/random350x350.jpg"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0u8; IMAGE_BYTES]))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/good/random500x500.jpg"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_bytes(vec![0u8; IMAGE_BYTES])
                .set_delay(Duration::from_millis(1500)),
        )
        .mount(&server)
        .await;

    let mut settings = settings_for(&server);
    settings.timeout = Duration::from_secs(1);
    let plan = TransferPlan {
        download_sizes: vec![350, 500],
        download_repeats: 1,
        ..small_plan()
    };
    let mut provider = SpeedtestNetProvider::new(settings).unwrap().with_plan(plan);
    provider.select_best_server().await.unwrap();

    provider.download(2).await.unwrap();

    let received = provider.results().metadata["bytes_received"].as_u64().unwrap();
    assert_eq!(received, IMAGE_BYTES as u64);
}

#[tokio::test]
async fn test_lost_latency_sample_keeps_server_selectable() {
    let server = MockServer::start().await;
    mount_server_list(&server, json!([entry(&server, "flaky", "Flaky")])).await;
    Mock::given(method("GET"))
        .and(path("/flaky/latency.txt"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    mount_healthy(&server, "flaky").await;

    let mut provider = SpeedtestNetProvider::new(settings_for(&server)).unwrap();
    provider.select_best_server().await.unwrap();

    let best = provider.best_server().unwrap();
    assert_eq!(best.server.name, "Flaky");
    // one penalised sample out of three
    assert!(best.latency_ms > 1_000_000.0);
    assert!(best.latency_ms < 3_600_000.0);
}

#[tokio::test]
async fn test_client_identity_is_recorded() {
    let server = MockServer::start().await;
    mount_server_list(&server, json!([entry(&server, "good", "Good")])).await;
    mount_healthy(&server, "good").await;
    Mock::given(method("GET"))
        .and(path("/speedtest-config.php"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<settings><client ip="198.51.100.23" lat="59.91" lon="10.75" isp="Fjord Fiber" country="NO" /></settings>"#,
        ))
        .expect(1)
        .mount(&server)
        .await;

    let mut provider = SpeedtestNetProvider::new(settings_for(&server)).unwrap();
    provider.select_best_server().await.unwrap();
    let results = provider.results();

    assert_eq!(results.metadata["client"]["ip"], json!("198.51.100.23"));
    assert_eq!(results.metadata["client"]["isp"], json!("Fjord Fiber"));
    assert_eq!(results.metadata["share"], json!(null));
}

#[tokio::test]
async fn test_missing_client_identity_is_not_fatal() {
    let server = MockServer::start().await;
    mount_server_list(&server, json!([entry(&server, "good", "Good")])).await;
    mount_healthy(&server, "good").await;
    Mock::given(method("GET"))
        .and(path("/speedtest-config.php"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let mut provider = SpeedtestNetProvider::new(settings_for(&server)).unwrap();
    provider.select_best_server().await.unwrap();

    assert!(provider.results().metadata.get("client").is_none());
}
