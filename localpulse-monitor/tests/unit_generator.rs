use std::sync::Arc;
use std::time::Duration;

use localpulse_common::PulseError;
use localpulse_monitor::endpoint::Endpoint;
use localpulse_monitor::generator::{tick_interval, LoadGenerator, DEFAULT_RPS};
use localpulse_monitor::metrics::MetricsWindow;
use localpulse_monitor::tester::TesterOptions;

fn monitored(url: &str) -> (Arc<Endpoint>, Arc<MetricsWindow>) {
    (Arc::new(Endpoint::new(url).unwrap()), Arc::new(MetricsWindow::new(1000)))
}

fn small_options() -> TesterOptions {
    TesterOptions {
        concurrency: 2,
        max_concurrency: 10,
        ..TesterOptions::default()
    }
}

#[test]
fn test_tick_interval() {
    assert_eq!(tick_interval(1), Duration::from_secs(1));
    assert_eq!(tick_interval(10), Duration::from_millis(100));
    assert_eq!(tick_interval(4), Duration::from_millis(250));
    assert_eq!(tick_interval(0), Duration::from_secs(1));
}

#[test]
fn test_default_rps() {
    let generator = LoadGenerator::default();
    assert_eq!(generator.rps(), DEFAULT_RPS);
    assert!(!generator.is_running());
}

#[test]
fn test_set_rps_clamps_to_one() {
    let generator = LoadGenerator::default();
    generator.set_rps(25);
    assert_eq!(generator.rps(), 25);
    generator.set_rps(0);
    assert_eq!(generator.rps(), 1);
}

#[test]
fn test_increase_decrease_rps() {
    let generator = LoadGenerator::default();
    generator.set_rps(10);

    generator.increase_rps();
    assert_eq!(generator.rps(), 15);

    generator.decrease_rps();
    generator.decrease_rps();
    assert_eq!(generator.rps(), 5);

    generator.decrease_rps();
    assert_eq!(generator.rps(), 1);

    generator.decrease_rps();
    assert_eq!(generator.rps(), 1);
}

#[tokio::test]
async fn test_add_tester_is_idempotent() {
    let generator = LoadGenerator::new(small_options());
    let (endpoint, metrics) = monitored("localhost:3000");

    generator.add_tester(endpoint.clone(), metrics.clone()).await.unwrap();
    generator.add_tester(endpoint, metrics).await.unwrap();
    assert_eq!(generator.tester_count().await, 1);

    // Same identity after normalization.
    let (endpoint, metrics) = monitored("http://localhost:3000/");
    generator.add_tester(endpoint, metrics).await.unwrap();
    assert_eq!(generator.tester_count().await, 1);
}

#[tokio::test]
async fn test_tester_receives_options() {
    let generator = LoadGenerator::new(small_options());
    let (endpoint, metrics) = monitored("localhost:3000");
    generator.add_tester(endpoint, metrics).await.unwrap();

    let tester = generator.tester("http://localhost:3000").await.expect("tester registered");
    assert_eq!(tester.concurrency(), 2);
    assert_eq!(tester.max_concurrency(), 10);
}

#[tokio::test]
async fn test_remove_tester() {
    let generator = LoadGenerator::new(small_options());
    for url in ["localhost:3000", "localhost:4000"] {
        let (endpoint, metrics) = monitored(url);
        generator.add_tester(endpoint, metrics).await.unwrap();
    }
    assert_eq!(generator.urls().await, vec!["http://localhost:3000", "http://localhost:4000"]);

    generator.remove_tester("http://localhost:3000").await;
    assert_eq!(generator.urls().await, vec!["http://localhost:4000"]);

    // Unknown URL is a no-op.
    generator.remove_tester("http://localhost:9999").await;
    assert_eq!(generator.tester_count().await, 1);
}

#[tokio::test]
async fn test_start_stop() {
    let generator = LoadGenerator::new(small_options());
    let (endpoint, metrics) = monitored("localhost:3000");
    generator.add_tester(endpoint, metrics).await.unwrap();

    generator.start(0).await.unwrap();
    assert!(generator.is_running());
    assert_eq!(generator.rps(), 1);

    let tester = generator.tester("http://localhost:3000").await.unwrap();
    assert!(tester.is_running());

    assert!(matches!(generator.start(5).await, Err(PulseError::AlreadyRunning(_))));

    generator.stop().await;
    assert!(!generator.is_running());
    assert!(!tester.is_running());

    generator.stop().await;
    assert!(!generator.is_running());
}

#[tokio::test]
async fn test_start_with_no_testers() {
    let generator = LoadGenerator::default();
    generator.start(10).await.unwrap();
    assert!(generator.is_running());
    generator.stop().await;
    assert!(!generator.is_running());
}

#[tokio::test]
async fn test_generation_records_requests() {
    let mut server = mockito::Server::new_async().await;
    server.mock("GET", "/").with_status(200).with_body("pong").create_async().await;

    let generator = LoadGenerator::new(small_options());
    let (endpoint, metrics) = monitored(&server.url());
    generator.add_tester(endpoint, metrics.clone()).await.unwrap();

    generator.start(50).await.unwrap();
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    while metrics.total_requests() < 5 {
        assert!(tokio::time::Instant::now() < deadline, "no load was generated");
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    generator.stop().await;

    let stats = metrics.snapshot();
    assert!(stats.total_requests >= 5);
    assert_eq!(stats.total_errors, 0);
    assert_eq!(stats.status_2xx, stats.total_requests);
}

#[tokio::test]
async fn test_no_requests_after_stop() {
    let mut server = mockito::Server::new_async().await;
    server.mock("GET", "/").with_status(200).create_async().await;

    let generator = LoadGenerator::new(small_options());
    let (endpoint, metrics) = monitored(&server.url());
    generator.add_tester(endpoint, metrics.clone()).await.unwrap();

    generator.start(100).await.unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;
    generator.stop().await;

    let recorded = metrics.total_requests();
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(metrics.total_requests(), recorded);
}

#[tokio::test]
async fn test_rps_change_while_running() {
    let generator = LoadGenerator::new(small_options());
    let (endpoint, metrics) = monitored("localhost:3000");
    generator.add_tester(endpoint, metrics).await.unwrap();

    generator.start(10).await.unwrap();
    generator.increase_rps();
    assert_eq!(generator.rps(), 15);
    generator.set_rps(2);
    assert_eq!(generator.rps(), 2);
    generator.stop().await;
}
