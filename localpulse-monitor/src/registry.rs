use std::sync::Arc;

use localpulse_common::EndpointConfig;

use crate::endpoint::{Endpoint, EndpointStatus};
use crate::metrics::{MetricsWindow, DEFAULT_WINDOW_CAPACITY};

/// An endpoint together with its metrics window.
#[derive(Clone)]
pub struct Monitored {
    pub endpoint: Arc<Endpoint>,
    pub metrics: Arc<MetricsWindow>,
}

/// Insertion-ordered set of monitored endpoints, unique by URL.
pub struct Registry {
    window_capacity: usize,
    entries: Vec<Monitored>,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW_CAPACITY)
    }
}

impl Registry {
    pub fn new(window_capacity: usize) -> Self {
        Self {
            window_capacity,
            entries: Vec::new(),
        }
    }

    /// Register `endpoint` with a fresh metrics window.
    /// Returns `false` (and changes nothing) if its URL is already present.
    pub fn add(&mut self, endpoint: Arc<Endpoint>) -> bool {
        if self.get(endpoint.url()).is_some() {
            return false;
        }
        let metrics = Arc::new(MetricsWindow::new(self.window_capacity));
        self.entries.push(Monitored { endpoint, metrics });
        true
    }

    pub fn remove(&mut self, url: &str) -> Option<Monitored> {
        let idx = self.entries.iter().position(|m| m.endpoint.url() == url)?;
        Some(self.entries.remove(idx))
    }

    pub fn get(&self, url: &str) -> Option<&Monitored> {
        self.entries.iter().find(|m| m.endpoint.url() == url)
    }

    pub fn entries(&self) -> &[Monitored] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Register every configured endpoint; entries with unparseable URLs are skipped.
    /// Returns the number of endpoints added.
    pub fn seed(&mut self, configs: &[EndpointConfig]) -> usize {
        let mut added = 0;
        for config in configs {
            match Endpoint::from_config(config) {
                Ok(endpoint) => {
                    if self.add(Arc::new(endpoint)) {
                        added += 1;
                    }
                }
                Err(e) => {
                    tracing::warn!(url = %config.url, error = %e, "skipping configured endpoint")
                }
            }
        }
        added
    }

    pub fn to_configs(&self) -> Vec<EndpointConfig> {
        self.entries.iter().map(|m| m.endpoint.to_config()).collect()
    }

    /// Counts of (healthy, slow, down) endpoints; unknown ones are not counted.
    pub fn status_counts(&self) -> (usize, usize, usize) {
        self.entries
            .iter()
            .fold((0, 0, 0), |(healthy, slow, down), m| match m.endpoint.status() {
                EndpointStatus::Healthy => (healthy + 1, slow, down),
                EndpointStatus::Slow => (healthy, slow + 1, down),
                EndpointStatus::Down => (healthy, slow, down + 1),
                EndpointStatus::Unknown => (healthy, slow, down),
            })
    }
}
