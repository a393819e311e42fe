//! Discovery of HTTP services listening on local ports.
//!
//! Every probe is a single GET with no shared state, fanned out in parallel.
//! Ports that refuse the connection, time out or fail the TLS handshake simply
//! produce no result.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use localpulse_common::{PulseError, Result, USER_AGENT};
use tokio::net::TcpStream;
use tokio::task::JoinSet;

use crate::endpoint::{determine_status, Endpoint, EndpointStatus};

pub const DEFAULT_SCAN_PORTS: [u16; 10] =
    [3000, 3001, 8080, 8000, 5000, 9000, 4000, 4200, 5173, 1313];

/// Paths probed on every responsive port during discovery.
pub const COMMON_PATHS: [&str; 8] = [
    "/",
    "/health",
    "/api",
    "/status",
    "/ping",
    "/api/health",
    "/healthz",
    "/ready",
];

pub const DEFAULT_SCAN_TIMEOUT: Duration = Duration::from_secs(2);

/// Timeout for each TCP connect in [`quick_scan`].
pub const QUICK_SCAN_TIMEOUT: Duration = Duration::from_millis(500);

/// One responsive URL found by a scan.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanResult {
    pub port: u16,
    pub url: String,
    pub is_https: bool,
    pub status: EndpointStatus,
    pub latency: Duration,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScannerConfig {
    pub host: String,
    pub ports: Vec<u16>,
    pub timeout: Duration,
    /// Skip the plain-http probe of each port.
    pub https_only: bool,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            ports: DEFAULT_SCAN_PORTS.to_vec(),
            timeout: DEFAULT_SCAN_TIMEOUT,
            https_only: false,
        }
    }
}

pub struct Scanner {
    pub config: ScannerConfig,
    client: reqwest::Client,
}

impl Scanner {
    pub fn new(config: ScannerConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(config.timeout)
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| PulseError::HttpClient(e.to_string()))?;
        Ok(Self { config, client })
    }

    /// Base URL for `port` on the configured host.
    pub fn base_url(&self, port: u16, https: bool) -> String {
        let scheme = if https { "https" } else { "http" };
        format!("{}://{}:{}", scheme, self.config.host, port)
    }

    /// Probe every configured port over http and https in parallel.
    /// Results are ordered by port, http before https.
    pub async fn scan(&self) -> Vec<ScanResult> {
        let mut probes = JoinSet::new();

        for &port in &self.config.ports {
            let schemes: &[bool] = if self.config.https_only {
                &[true]
            } else {
                &[false, true]
            };
            for &https in schemes {
                let client = self.client.clone();
                let url = self.base_url(port, https);
                probes.spawn(async move {
                    probe_url(&client, &url).await.map(|(status, latency)| ScanResult {
                        port,
                        url,
                        is_https: https,
                        status,
                        latency,
                    })
                });
            }
        }

        let mut results = Vec::new();
        while let Some(joined) = probes.join_next().await {
            match joined {
                Ok(Some(result)) => results.push(result),
                Ok(None) => {}
                Err(e) => tracing::warn!(error = %e, "scan probe task failed"),
            }
        }
        results.sort_by(|a, b| (a.port, a.is_https).cmp(&(b.port, b.is_https)));
        results
    }

    /// Scan, then probe [`COMMON_PATHS`] on every port that did not answer 5xx.
    ///
    /// Returned endpoints carry their probe classification, are unique by URL
    /// and are sorted by URL.
    pub async fn discover_endpoints(&self) -> Vec<Arc<Endpoint>> {
        let hits = self.scan().await;
        tracing::debug!(hits = hits.len(), "port scan finished");

        let mut found: BTreeMap<String, Arc<Endpoint>> = BTreeMap::new();
        let mut probes = JoinSet::new();

        for hit in hits.into_iter().filter(|h| h.status != EndpointStatus::Down) {
            match Endpoint::new(&hit.url) {
                Ok(endpoint) => {
                    endpoint.set_health(hit.status, hit.latency);
                    found.insert(endpoint.url().to_string(), Arc::new(endpoint));
                }
                Err(e) => {
                    tracing::debug!(url = %hit.url, error = %e, "skipping unparseable scan hit");
                    continue;
                }
            }

            for path in COMMON_PATHS {
                let client = self.client.clone();
                let url = format!("{}{}", hit.url, path);
                probes.spawn(async move {
                    probe_url(&client, &url)
                        .await
                        .map(|probe| (url, probe))
                });
            }
        }

        while let Some(joined) = probes.join_next().await {
            let Ok(Some((url, (status, latency)))) = joined else {
                continue;
            };
            let Ok(endpoint) = Endpoint::new(&url) else {
                continue;
            };
            // A base-URL hit already recorded under the same identity wins.
            found.entry(endpoint.url().to_string()).or_insert_with(|| {
                endpoint.set_health(status, latency);
                Arc::new(endpoint)
            });
        }

        tracing::info!(endpoints = found.len(), "discovery finished");
        found.into_values().collect()
    }
}

/// GET `url` and classify the response; `None` if no response was received.
async fn probe_url(client: &reqwest::Client, url: &str) -> Option<(EndpointStatus, Duration)> {
    let start = Instant::now();
    let response = client.get(url).send().await.ok()?;
    let latency = start.elapsed();
    Some((status_from_response(response.status().as_u16(), latency), latency))
}

/// 5xx → Down, otherwise the latency-based classification.
pub fn status_from_response(status_code: u16, latency: Duration) -> EndpointStatus {
    if status_code >= 500 {
        EndpointStatus::Down
    } else {
        determine_status(latency, false)
    }
}

/// Whether a TCP connection to `host:port` succeeds within `timeout`.
pub async fn check_port(host: &str, port: u16, timeout: Duration) -> bool {
    matches!(
        tokio::time::timeout(timeout, TcpStream::connect((host, port))).await,
        Ok(Ok(_))
    )
}

/// Ports among `ports` that accept a TCP connection, ascending.
pub async fn quick_scan(host: &str, ports: &[u16]) -> Vec<u16> {
    let mut checks = JoinSet::new();
    for &port in ports {
        let host = host.to_string();
        checks.spawn(async move {
            check_port(&host, port, QUICK_SCAN_TIMEOUT)
                .await
                .then_some(port)
        });
    }

    let mut open = Vec::new();
    while let Some(joined) = checks.join_next().await {
        if let Ok(Some(port)) = joined {
            open.push(port);
        }
    }
    open.sort_unstable();
    open
}
