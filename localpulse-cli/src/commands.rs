use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use localpulse_common::{EndpointConfig, PulseConfig, PulseError, Result};
use localpulse_monitor::{
    Endpoint, LoadGenerator, Registry, Scanner, ScannerConfig, SystemMonitor, TesterOptions,
};
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::config::DEFAULT_REPORT_INTERVAL;
use crate::report;

/// Normalize `url` and append it to the config at `path`.
/// Returns the normalized URL and whether it was newly added.
pub fn add_endpoint(path: &Path, url: &str, name: Option<&str>) -> Result<(String, bool)> {
    let endpoint = Endpoint::new(url)?;
    let mut config = PulseConfig::load_from(path)?;
    let added = config.add_endpoint(endpoint.url(), name);
    if added {
        config.save_to(path)?;
    }
    Ok((endpoint.url().to_string(), added))
}

/// Remove `url` from the config at `path`. The URL is matched after
/// normalization, or verbatim if it does not parse.
pub fn remove_endpoint(path: &Path, url: &str) -> Result<bool> {
    let key = Endpoint::new(url)
        .map(|e| e.url().to_string())
        .unwrap_or_else(|_| url.to_string());
    let mut config = PulseConfig::load_from(path)?;
    let removed = config.remove_endpoint(&key);
    if removed {
        config.save_to(path)?;
    }
    Ok(removed)
}

/// Run discovery and optionally persist every endpoint found.
pub async fn scan(
    scanner_config: ScannerConfig,
    save_to: Option<&Path>,
) -> Result<Vec<Arc<Endpoint>>> {
    let scanner = Scanner::new(scanner_config)?;
    let endpoints = scanner.discover_endpoints().await;

    if let Some(path) = save_to {
        let mut config = PulseConfig::load_from(path)?;
        let added = endpoints
            .iter()
            .filter(|e| config.add_endpoint(e.url(), Some(e.name())))
            .count();
        config.save_to(path)?;
        tracing::info!(added, path = %path.display(), "saved discovered endpoints");
    }
    Ok(endpoints)
}

/// Build the registry for a load run: explicit URLs if any, else the configured endpoints.
pub fn build_registry(urls: &[String], config: &PulseConfig) -> Result<Registry> {
    let mut registry = Registry::default();
    if urls.is_empty() {
        registry.seed(&config.endpoints);
    } else {
        for url in urls {
            let config = EndpointConfig {
                url: url.clone(),
                name: None,
            };
            registry.add(Arc::new(Endpoint::from_config(&config)?));
        }
    }
    Ok(registry)
}

#[derive(Debug, Clone)]
pub struct LoadSettings {
    pub rps: u32,
    pub tester: TesterOptions,
    /// `None` runs until shutdown is requested.
    pub duration: Option<Duration>,
    pub report_interval: Duration,
    /// Error-rate percentage above which an endpoint fails the run.
    pub max_error_rate: Option<f64>,
}

impl Default for LoadSettings {
    fn default() -> Self {
        Self {
            rps: localpulse_monitor::generator::DEFAULT_RPS,
            tester: TesterOptions::default(),
            duration: None,
            report_interval: DEFAULT_REPORT_INTERVAL,
            max_error_rate: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoadSummary {
    pub total_requests: u64,
    pub total_errors: u64,
    /// URLs whose error rate exceeded the configured maximum.
    pub failing: Vec<String>,
}

impl LoadSummary {
    pub fn passed(&self) -> bool {
        self.failing.is_empty()
    }
}

/// Generate load against every registry entry until `settings.duration`
/// elapses or `shutdown` is cancelled, emitting report lines through `emit`.
///
/// Generation is fully stopped, with queued results drained, before the
/// final report is produced.
pub async fn run_load(
    registry: &Registry,
    settings: &LoadSettings,
    shutdown: CancellationToken,
    mut emit: impl FnMut(&str),
) -> Result<LoadSummary> {
    if registry.is_empty() {
        return Err(PulseError::Config("no endpoints to load test".to_string()));
    }

    let generator = LoadGenerator::new(settings.tester.clone());
    for entry in registry.entries() {
        generator
            .add_tester(entry.endpoint.clone(), entry.metrics.clone())
            .await?;
        entry.endpoint.set_active(true);
    }

    let mut system = SystemMonitor::new();
    generator.start(settings.rps).await?;

    let started = Instant::now();
    let deadline = settings.duration.map(|d| started + d);
    let period = settings.report_interval.max(Duration::from_millis(10));
    let mut ticker = interval_at(started + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                tracing::info!("shutdown requested");
                break;
            }
            _ = wait_until(deadline) => break,
            _ = ticker.tick() => {
                emit(&report::progress_header(started.elapsed(), generator.rps()));
                for entry in registry.entries() {
                    emit(&report::endpoint_line(&entry.endpoint, &entry.metrics.snapshot()));
                }
                emit(&report::system_line(&system.sample()));
            }
        }
    }

    generator.stop().await;

    let mut summary = LoadSummary::default();
    emit(&format!(
        "Final report after {}",
        report::format_latency(started.elapsed())
    ));
    for entry in registry.entries() {
        entry.endpoint.set_active(false);
        let stats = entry.metrics.snapshot();
        for line in report::final_lines(&entry.endpoint, &stats) {
            emit(&line);
        }

        summary.total_requests += stats.total_requests;
        summary.total_errors += stats.total_errors;
        if settings.max_error_rate.is_some_and(|max| stats.error_rate > max) {
            summary.failing.push(entry.endpoint.url().to_string());
        }
    }

    if !summary.passed() {
        tracing::warn!(
            failing = summary.failing.len(),
            "error-rate threshold exceeded"
        );
    }
    Ok(summary)
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
