use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, SystemTime};

use localpulse_common::{EndpointConfig, PulseError, Result};
use parking_lot::RwLock;
use url::Url;

/// Latency above which a responding endpoint is classified as [`EndpointStatus::Slow`].
pub const SLOW_THRESHOLD: Duration = Duration::from_millis(500);

/// Health classification of an endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum EndpointStatus {
    Healthy,
    Slow,
    Down,
    #[default]
    Unknown,
}

impl EndpointStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EndpointStatus::Healthy => "healthy",
            EndpointStatus::Slow => "slow",
            EndpointStatus::Down => "down",
            EndpointStatus::Unknown => "unknown",
        }
    }

    /// Single-glyph marker used in reports.
    pub fn icon(&self) -> &'static str {
        match self {
            EndpointStatus::Healthy => "🟢",
            EndpointStatus::Slow => "🟡",
            EndpointStatus::Down => "🔥",
            EndpointStatus::Unknown => "⚪",
        }
    }
}

impl std::fmt::Display for EndpointStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Last observed health of an endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Health {
    pub status: EndpointStatus,
    /// `None` until the first probe or request completes.
    pub last_check: Option<SystemTime>,
    pub last_latency: Duration,
}

/// One monitored URL.
///
/// Identity (`url`, `name`, `is_https`) is fixed at construction. The health
/// fields are written by the collector of the endpoint's load tester and read
/// by the display layer, so they sit behind their own lock.
#[derive(Debug)]
pub struct Endpoint {
    url: String,
    name: String,
    is_https: bool,
    active: AtomicBool,
    health: RwLock<Health>,
}

impl Endpoint {
    /// Parse and normalize `raw_url`.
    ///
    /// A missing scheme defaults to `http://`, a missing port to 80/443, and a
    /// bare `/` path is dropped, so `localhost:8080`, `http://localhost:8080`
    /// and `http://localhost:8080/` all yield `http://localhost:8080`.
    pub fn new(raw_url: &str) -> Result<Self> {
        let raw_url = raw_url.trim();
        let lowered = raw_url.to_ascii_lowercase();
        let with_scheme = if lowered.starts_with("http://") || lowered.starts_with("https://") {
            raw_url.to_string()
        } else if raw_url.contains("://") {
            return Err(PulseError::InvalidUrl(format!("{raw_url}: unsupported scheme")));
        } else {
            format!("http://{raw_url}")
        };

        let parsed = Url::parse(&with_scheme)
            .map_err(|e| PulseError::InvalidUrl(format!("{raw_url}: {e}")))?;
        let host = parsed
            .host_str()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| PulseError::InvalidUrl(format!("{raw_url}: missing host")))?;
        // Only http and https reach this point, both of which have a known default.
        let port = parsed
            .port_or_known_default()
            .ok_or_else(|| PulseError::InvalidUrl(format!("{raw_url}: missing port")))?;

        let authority = format!("{host}:{port}");
        let path = match parsed.path() {
            "/" => "",
            p => p,
        };
        let query = parsed.query().map(|q| format!("?{q}")).unwrap_or_default();

        let name = format!("{authority}{path}");
        let url = format!("{}://{authority}{path}{query}", parsed.scheme());

        Ok(Self {
            url,
            name,
            is_https: parsed.scheme() == "https",
            active: AtomicBool::new(true),
            health: RwLock::new(Health::default()),
        })
    }

    /// Build an endpoint from a persisted entry; a configured name overrides the derived one.
    pub fn from_config(config: &EndpointConfig) -> Result<Self> {
        let mut endpoint = Self::new(&config.url)?;
        if let Some(name) = config.name.as_deref().filter(|n| !n.is_empty()) {
            endpoint.name = name.to_string();
        }
        Ok(endpoint)
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_https(&self) -> bool {
        self.is_https
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Relaxed)
    }

    pub fn set_active(&self, active: bool) {
        self.active.store(active, Ordering::Relaxed);
    }

    /// Copy of the current health fields.
    pub fn health(&self) -> Health {
        *self.health.read()
    }

    pub fn status(&self) -> EndpointStatus {
        self.health.read().status
    }

    pub fn last_latency(&self) -> Duration {
        self.health.read().last_latency
    }

    pub fn status_icon(&self) -> &'static str {
        self.status().icon()
    }

    /// Update health from one completed request or probe.
    pub fn record_observation(&self, latency: Duration, error: Option<&str>) {
        self.set_health(determine_status(latency, error.is_some()), latency);
    }

    /// Overwrite health with an externally classified status (scanner results).
    pub fn set_health(&self, status: EndpointStatus, latency: Duration) {
        let mut health = self.health.write();
        health.status = status;
        health.last_latency = latency;
        health.last_check = Some(SystemTime::now());
    }

    /// The `{url, name}` pair persisted in the config file.
    pub fn to_config(&self) -> EndpointConfig {
        EndpointConfig {
            url: self.url.clone(),
            name: Some(self.name.clone()),
        }
    }
}

/// `failed` → Down, latency strictly above [`SLOW_THRESHOLD`] → Slow, otherwise Healthy.
pub fn determine_status(latency: Duration, failed: bool) -> EndpointStatus {
    if failed {
        EndpointStatus::Down
    } else if latency > SLOW_THRESHOLD {
        EndpointStatus::Slow
    } else {
        EndpointStatus::Healthy
    }
}
