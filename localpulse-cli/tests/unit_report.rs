use std::time::Duration;

use localpulse_cli::report::{
    endpoint_line, endpoint_summary, final_lines, format_bytes, format_elapsed, format_latency,
    progress_header, system_line,
};
use localpulse_monitor::{Endpoint, EndpointStatus, Stats, SystemMetrics};

#[test]
fn test_format_latency() {
    assert_eq!(format_latency(Duration::ZERO), "0µs");
    assert_eq!(format_latency(Duration::from_micros(850)), "850µs");
    assert_eq!(format_latency(Duration::from_micros(12_300)), "12.3ms");
    assert_eq!(format_latency(Duration::from_millis(500)), "500.0ms");
    assert_eq!(format_latency(Duration::from_millis(1500)), "1.50s");
}

#[test]
fn test_format_bytes() {
    assert_eq!(format_bytes(0), "0 B");
    assert_eq!(format_bytes(1023), "1023 B");
    assert_eq!(format_bytes(1536), "1.5 KB");
    assert_eq!(format_bytes(5 * 1024 * 1024), "5.0 MB");
    assert_eq!(format_bytes(16 * 1024 * 1024 * 1024), "16.0 GB");
}

#[test]
fn test_format_elapsed() {
    assert_eq!(format_elapsed(Duration::from_secs(0)), "[00:00]");
    assert_eq!(format_elapsed(Duration::from_secs(65)), "[01:05]");
    assert_eq!(format_elapsed(Duration::from_secs(3600)), "[60:00]");
}

#[test]
fn test_progress_header() {
    assert_eq!(progress_header(Duration::from_secs(5), 20), "[00:05] target 20 req/s per endpoint");
}

#[test]
fn test_endpoint_line() {
    let endpoint = Endpoint::new("localhost:3000/health").unwrap();
    endpoint.set_health(EndpointStatus::Healthy, Duration::from_millis(5));
    let stats = Stats {
        p50: Duration::from_millis(12),
        p95: Duration::from_millis(40),
        p99: Duration::from_millis(90),
        throughput: 19.5,
        error_rate: 2.5,
        total_requests: 40,
        total_errors: 1,
        status_2xx: 38,
        status_4xx: 1,
        ..Stats::default()
    };

    let line = endpoint_line(&endpoint, &stats);
    assert!(line.starts_with("🟢 localhost:3000/health"));
    assert!(line.contains("reqs     40"));
    assert!(line.contains("err   2.5%"));
    assert!(line.contains("p50   12.0ms"));
    assert!(line.contains("p99   90.0ms"));
    assert!(line.contains("19.5 req/s"));
    assert!(line.ends_with("38/1/0"));
}

#[test]
fn test_system_line() {
    let metrics = SystemMetrics {
        cpu_percent: 12.5,
        ram_used: 4 * 1024 * 1024 * 1024,
        ram_total: 16 * 1024 * 1024 * 1024,
        ram_percent: 25.0,
    };
    assert_eq!(system_line(&metrics), "cpu  12.5%  ram 4.0 GB / 16.0 GB (25.0%)");
}

#[test]
fn test_endpoint_summary_unchecked() {
    let endpoint = Endpoint::new("localhost:8080").unwrap();
    let line = endpoint_summary(&endpoint);
    assert!(line.starts_with("⚪ http://localhost:8080"));
    assert!(line.contains("unknown"));
    assert!(line.ends_with('-'));
}

#[test]
fn test_endpoint_summary_checked() {
    let endpoint = Endpoint::new("localhost:8080").unwrap();
    endpoint.set_health(EndpointStatus::Slow, Duration::from_millis(750));
    let line = endpoint_summary(&endpoint);
    assert!(line.starts_with("🟡 http://localhost:8080"));
    assert!(line.contains("slow"));
    assert!(line.ends_with("750.0ms"));
}

#[test]
fn test_final_lines() {
    let endpoint = Endpoint::new("localhost:3000").unwrap();
    let stats = Stats {
        total_requests: 10,
        total_errors: 5,
        error_rate: 50.0,
        status_5xx: 2,
        ..Stats::default()
    };

    let lines = final_lines(&endpoint, &stats);
    assert_eq!(lines.len(), 4);
    assert!(lines[0].ends_with("http://localhost:3000"));
    assert!(lines[1].contains("requests 10  errors 5 (50.0%)"));
    assert!(lines[3].contains("5xx 2"));
}
