use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant, SystemTime};

use parking_lot::RwLock;

/// Default number of results and latencies retained per window.
pub const DEFAULT_WINDOW_CAPACITY: usize = 1000;

/// One observed request outcome.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestResult {
    pub timestamp: SystemTime,
    pub latency: Duration,
    /// `0` when no response was received.
    pub status_code: u16,
    pub size: u64,
    pub is_error: bool,
    pub error_message: Option<String>,
}

impl RequestResult {
    /// A request that received a response, whatever its status.
    pub fn success(latency: Duration, status_code: u16, size: u64) -> Self {
        Self {
            timestamp: SystemTime::now(),
            latency,
            status_code,
            size,
            is_error: false,
            error_message: None,
        }
    }

    /// A request that failed at the transport level.
    pub fn failure(latency: Duration, message: impl Into<String>) -> Self {
        Self {
            timestamp: SystemTime::now(),
            latency,
            status_code: 0,
            size: 0,
            is_error: true,
            error_message: Some(message.into()),
        }
    }
}

/// Point-in-time statistics derived from a [`MetricsWindow`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Stats {
    pub p50: Duration,
    pub p95: Duration,
    pub p99: Duration,
    pub avg_latency: Duration,
    pub min_latency: Duration,
    pub max_latency: Duration,
    /// Requests per second since the window started.
    pub throughput: f64,
    /// Percentage in `[0, 100]`.
    pub error_rate: f64,
    pub avg_size: u64,
    pub total_requests: u64,
    pub total_errors: u64,
    pub status_2xx: u64,
    pub status_4xx: u64,
    pub status_5xx: u64,
}

struct WindowState {
    total_requests: u64,
    total_errors: u64,
    total_bytes: u64,
    total_latency: Duration,
    recent_results: VecDeque<RequestResult>,
    latencies: VecDeque<Duration>,
    status_codes: HashMap<u16, u64>,
    window_start: Instant,
}

impl WindowState {
    fn new(capacity: usize) -> Self {
        Self {
            total_requests: 0,
            total_errors: 0,
            total_bytes: 0,
            total_latency: Duration::ZERO,
            recent_results: VecDeque::with_capacity(capacity),
            latencies: VecDeque::with_capacity(capacity),
            status_codes: HashMap::new(),
            window_start: Instant::now(),
        }
    }
}

/// Bounded history of request outcomes for one endpoint, plus cumulative counters.
///
/// `record` takes the write lock and `snapshot` the read lock, so a reader
/// never observes a half-applied record.
pub struct MetricsWindow {
    capacity: usize,
    state: RwLock<WindowState>,
}

impl Default for MetricsWindow {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW_CAPACITY)
    }
}

impl MetricsWindow {
    /// A zero capacity is replaced by [`DEFAULT_WINDOW_CAPACITY`].
    pub fn new(capacity: usize) -> Self {
        let capacity = if capacity == 0 { DEFAULT_WINDOW_CAPACITY } else { capacity };
        Self {
            capacity,
            state: RwLock::new(WindowState::new(capacity)),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn record(&self, result: RequestResult) {
        let mut state = self.state.write();

        state.total_requests += 1;
        state.total_latency += result.latency;

        if result.is_error {
            state.total_errors += 1;
        } else {
            *state.status_codes.entry(result.status_code).or_insert(0) += 1;
            state.total_bytes += result.size;
        }

        if state.latencies.len() == self.capacity {
            state.latencies.pop_front();
        }
        state.latencies.push_back(result.latency);

        if state.recent_results.len() == self.capacity {
            state.recent_results.pop_front();
        }
        state.recent_results.push_back(result);
    }

    /// Zero every counter, clear both sequences and restart the throughput clock.
    pub fn reset(&self) {
        let mut state = self.state.write();
        *state = WindowState::new(self.capacity);
    }

    pub fn snapshot(&self) -> Stats {
        let state = self.state.read();

        let mut stats = Stats {
            total_requests: state.total_requests,
            total_errors: state.total_errors,
            ..Stats::default()
        };

        if state.total_requests > 0 {
            let total = state.total_requests;
            stats.error_rate = state.total_errors as f64 / total as f64 * 100.0;
            stats.avg_latency =
                Duration::from_nanos((state.total_latency.as_nanos() / total as u128) as u64);
            stats.avg_size = state.total_bytes / total;
        }

        let elapsed = state.window_start.elapsed().as_secs_f64();
        if elapsed > 0.0 {
            stats.throughput = state.total_requests as f64 / elapsed;
        }

        for (&code, &count) in &state.status_codes {
            match code {
                200..=299 => stats.status_2xx += count,
                400..=499 => stats.status_4xx += count,
                500.. => stats.status_5xx += count,
                _ => {}
            }
        }

        if !state.latencies.is_empty() {
            let mut sorted: Vec<Duration> = state.latencies.iter().copied().collect();
            sorted.sort_unstable();

            stats.min_latency = sorted[0];
            stats.max_latency = sorted[sorted.len() - 1];
            stats.p50 = percentile(&sorted, 50.0);
            stats.p95 = percentile(&sorted, 95.0);
            stats.p99 = percentile(&sorted, 99.0);
        }

        stats
    }

    pub fn total_requests(&self) -> u64 {
        self.state.read().total_requests
    }

    pub fn total_errors(&self) -> u64 {
        self.state.read().total_errors
    }

    /// Number of latencies currently retained (never more than `capacity`).
    pub fn len(&self) -> usize {
        self.state.read().latencies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The newest `count` latencies, oldest first.
    pub fn recent_latencies(&self, count: usize) -> Vec<Duration> {
        let state = self.state.read();
        let skip = state.latencies.len().saturating_sub(count);
        state.latencies.iter().skip(skip).copied().collect()
    }

    /// The newest `count` results, oldest first.
    pub fn recent_results(&self, count: usize) -> Vec<RequestResult> {
        let state = self.state.read();
        let skip = state.recent_results.len().saturating_sub(count);
        state.recent_results.iter().skip(skip).cloned().collect()
    }
}

/// Element of the ascending `sorted` slice at index `ceil((n - 1) * p / 100)`,
/// clamped to the slice. Returns zero for an empty slice.
pub fn percentile(sorted: &[Duration], p: f64) -> Duration {
    if sorted.is_empty() {
        return Duration::ZERO;
    }
    let last = sorted.len() - 1;
    let idx = ((last as f64) * p / 100.0).ceil().max(0.0) as usize;
    sorted[idx.min(last)]
}
