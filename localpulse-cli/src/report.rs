//! Plain-text report lines printed by the `localpulse` binary.

use std::time::Duration;

use localpulse_monitor::{Endpoint, Stats, SystemMetrics};

const KIB: f64 = 1024.0;
const MIB: f64 = KIB * 1024.0;
const GIB: f64 = MIB * 1024.0;

/// `850µs`, `12.3ms` or `1.50s`.
pub fn format_latency(latency: Duration) -> String {
    let micros = latency.as_micros();
    if micros < 1_000 {
        format!("{micros}µs")
    } else if micros < 1_000_000 {
        format!("{:.1}ms", latency.as_secs_f64() * 1000.0)
    } else {
        format!("{:.2}s", latency.as_secs_f64())
    }
}

pub fn format_bytes(bytes: u64) -> String {
    let b = bytes as f64;
    if b < KIB {
        format!("{bytes} B")
    } else if b < MIB {
        format!("{:.1} KB", b / KIB)
    } else if b < GIB {
        format!("{:.1} MB", b / MIB)
    } else {
        format!("{:.1} GB", b / GIB)
    }
}

/// `[mm:ss]`; minutes keep counting past 59.
pub fn format_elapsed(elapsed: Duration) -> String {
    let secs = elapsed.as_secs();
    format!("[{:02}:{:02}]", secs / 60, secs % 60)
}

pub fn progress_header(elapsed: Duration, rps: u32) -> String {
    format!(
        "{} target {} req/s per endpoint",
        format_elapsed(elapsed),
        rps
    )
}

/// One endpoint's status and window statistics.
pub fn endpoint_line(endpoint: &Endpoint, stats: &Stats) -> String {
    format!(
        "{} {:<32} reqs {:>6}  err {:>5.1}%  p50 {:>8}  p95 {:>8}  p99 {:>8}  {:>7.1} req/s  {}/{}/{}",
        endpoint.status_icon(),
        endpoint.name(),
        stats.total_requests,
        stats.error_rate,
        format_latency(stats.p50),
        format_latency(stats.p95),
        format_latency(stats.p99),
        stats.throughput,
        stats.status_2xx,
        stats.status_4xx,
        stats.status_5xx,
    )
}

pub fn system_line(metrics: &SystemMetrics) -> String {
    format!(
        "cpu {:>5.1}%  ram {} / {} ({:.1}%)",
        metrics.cpu_percent,
        format_bytes(metrics.ram_used),
        format_bytes(metrics.ram_total),
        metrics.ram_percent,
    )
}

/// A discovered or configured endpoint without load statistics.
pub fn endpoint_summary(endpoint: &Endpoint) -> String {
    let health = endpoint.health();
    let latency = match health.last_check {
        Some(_) => format_latency(health.last_latency),
        None => "-".to_string(),
    };
    format!(
        "{} {:<40} {:<8} {}",
        endpoint.status_icon(),
        endpoint.url(),
        health.status.as_str(),
        latency
    )
}

/// Closing block for one endpoint after a load run.
pub fn final_lines(endpoint: &Endpoint, stats: &Stats) -> Vec<String> {
    vec![
        format!("{} {}", endpoint.status_icon(), endpoint.url()),
        format!(
            "    requests {}  errors {} ({:.1}%)  throughput {:.1} req/s  avg size {}",
            stats.total_requests,
            stats.total_errors,
            stats.error_rate,
            stats.throughput,
            format_bytes(stats.avg_size),
        ),
        format!(
            "    latency min {}  avg {}  p50 {}  p95 {}  p99 {}  max {}",
            format_latency(stats.min_latency),
            format_latency(stats.avg_latency),
            format_latency(stats.p50),
            format_latency(stats.p95),
            format_latency(stats.p99),
            format_latency(stats.max_latency),
        ),
        format!(
            "    status 2xx {}  4xx {}  5xx {}",
            stats.status_2xx, stats.status_4xx, stats.status_5xx
        ),
    ]
}
