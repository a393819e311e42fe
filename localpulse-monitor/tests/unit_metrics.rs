use std::time::Duration;

use localpulse_monitor::metrics::{
    percentile, MetricsWindow, RequestResult, DEFAULT_WINDOW_CAPACITY,
};

fn ms(n: u64) -> Duration {
    Duration::from_millis(n)
}

fn ok(latency_ms: u64, status: u16) -> RequestResult {
    RequestResult::success(ms(latency_ms), status, 100)
}

#[test]
fn test_zero_capacity_uses_default() {
    assert_eq!(MetricsWindow::new(0).capacity(), DEFAULT_WINDOW_CAPACITY);
    assert_eq!(MetricsWindow::default().capacity(), DEFAULT_WINDOW_CAPACITY);
}

#[test]
fn test_record_counts_up_to_capacity() {
    let window = MetricsWindow::new(100);
    for i in 0..50 {
        window.record(ok(i, 200));
    }
    assert_eq!(window.total_requests(), 50);
    assert_eq!(window.len(), 50);
}

#[test]
fn test_record_evicts_oldest_beyond_capacity() {
    let window = MetricsWindow::new(5);
    for i in 1..=8 {
        window.record(ok(i, 200));
    }

    assert_eq!(window.total_requests(), 8);
    assert_eq!(window.len(), 5);
    assert_eq!(window.recent_latencies(100), vec![ms(4), ms(5), ms(6), ms(7), ms(8)]);

    let results = window.recent_results(100);
    assert_eq!(results.len(), 5);
    assert_eq!(results[0].latency, ms(4));
    assert_eq!(results[4].latency, ms(8));
}

#[test]
fn test_percentile_scenario() {
    // 10ms..100ms, n=10: p50 -> idx ceil(4.5)=5 -> 60ms; p95/p99 -> idx 9 -> 100ms
    let window = MetricsWindow::new(100);
    for i in 1..=10 {
        window.record(ok(i * 10, 200));
    }

    let stats = window.snapshot();
    assert!(stats.p50 >= ms(40) && stats.p50 <= ms(60), "p50 = {:?}", stats.p50);
    assert_eq!(stats.p50, ms(60));
    assert!(stats.p95 >= ms(80));
    assert!(stats.p99 >= ms(90));
    assert_eq!(stats.min_latency, ms(10));
    assert_eq!(stats.max_latency, ms(100));
    assert_eq!(stats.avg_latency, ms(55));
    assert_eq!(stats.status_2xx, 10);
    assert_eq!(stats.total_requests, 10);
    assert_eq!(stats.total_errors, 0);
    assert_eq!(stats.error_rate, 0.0);
}

#[test]
fn test_percentiles_unsorted_input() {
    let window = MetricsWindow::new(100);
    for latency in [50, 10, 40, 20, 30] {
        window.record(ok(latency, 200));
    }
    let stats = window.snapshot();
    // n=5: p50 -> idx 2, p95 -> idx ceil(3.8)=4
    assert_eq!(stats.p50, ms(30));
    assert_eq!(stats.p95, ms(50));
    assert_eq!(stats.p99, ms(50));
    assert!(stats.p50 <= stats.p95 && stats.p95 <= stats.p99);
}

#[test]
fn test_single_sample_percentiles() {
    let window = MetricsWindow::new(10);
    window.record(ok(42, 200));
    let stats = window.snapshot();
    assert_eq!(stats.p50, ms(42));
    assert_eq!(stats.p95, ms(42));
    assert_eq!(stats.p99, ms(42));
}

#[test]
fn test_percentile_helper() {
    assert_eq!(percentile(&[], 50.0), Duration::ZERO);
    assert_eq!(percentile(&[ms(1), ms(2), ms(3)], 0.0), ms(1));
    assert_eq!(percentile(&[ms(1), ms(2), ms(3)], 100.0), ms(3));
}

#[test]
fn test_empty_snapshot_is_all_zero() {
    let stats = MetricsWindow::new(10).snapshot();
    assert_eq!(stats.total_requests, 0);
    assert_eq!(stats.error_rate, 0.0);
    assert!(!stats.error_rate.is_nan());
    assert_eq!(stats.avg_latency, Duration::ZERO);
    assert_eq!(stats.p50, Duration::ZERO);
    assert_eq!(stats.avg_size, 0);
}

#[test]
fn test_errors_and_status_classes() {
    let window = MetricsWindow::new(100);
    window.record(ok(10, 200));
    window.record(ok(10, 204));
    window.record(ok(10, 301));
    window.record(ok(10, 404));
    window.record(ok(10, 503));
    window.record(RequestResult::failure(ms(10), "connection refused"));

    let stats = window.snapshot();
    assert_eq!(stats.total_requests, 6);
    assert_eq!(stats.total_errors, 1);
    assert_eq!(stats.status_2xx, 2);
    assert_eq!(stats.status_4xx, 1);
    assert_eq!(stats.status_5xx, 1);
    assert!((stats.error_rate - 100.0 / 6.0).abs() < 1e-9);
    // 5 successes x 100 bytes spread over 6 requests
    assert_eq!(stats.avg_size, 83);
}

#[test]
fn test_error_rate_bounds() {
    let window = MetricsWindow::new(10);
    for _ in 0..4 {
        window.record(RequestResult::failure(ms(1), "timeout"));
    }
    let stats = window.snapshot();
    assert_eq!(stats.error_rate, 100.0);
    assert_eq!(stats.total_errors, 4);
    assert_eq!(window.total_errors(), 4);
}

#[test]
fn test_reset_clears_everything() {
    let window = MetricsWindow::new(10);
    for i in 0..20 {
        window.record(ok(i, 200));
    }
    window.record(RequestResult::failure(ms(1), "boom"));
    window.reset();

    let stats = window.snapshot();
    assert_eq!(stats.total_requests, 0);
    assert_eq!(stats.total_errors, 0);
    assert_eq!(stats.status_2xx, 0);
    assert_eq!(stats.p50, Duration::ZERO);
    assert_eq!(stats.p99, Duration::ZERO);
    assert_eq!(stats.max_latency, Duration::ZERO);
    assert!(window.is_empty());
    assert!(window.recent_results(10).is_empty());
}

#[test]
fn test_throughput_is_positive_after_records() {
    let window = MetricsWindow::new(10);
    std::thread::sleep(Duration::from_millis(5));
    window.record(ok(1, 200));
    let stats = window.snapshot();
    assert!(stats.throughput > 0.0);
}

#[test]
fn test_recent_latencies_limits_count() {
    let window = MetricsWindow::new(10);
    for i in 1..=5 {
        window.record(ok(i, 200));
    }
    assert_eq!(window.recent_latencies(2), vec![ms(4), ms(5)]);
    assert!(window.recent_latencies(0).is_empty());
}
