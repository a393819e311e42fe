use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use localpulse_common::{PulseError, Result};
use tokio::sync::{watch, Mutex};
use tokio::task::JoinSet;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::endpoint::Endpoint;
use crate::metrics::MetricsWindow;
use crate::tester::{LoadTester, TesterOptions};

pub const DEFAULT_RPS: u32 = 10;
/// Step used by [`LoadGenerator::increase_rps`] and [`LoadGenerator::decrease_rps`].
pub const RPS_STEP: u32 = 5;

/// Tick period for `rps` requests per second.
pub fn tick_interval(rps: u32) -> Duration {
    Duration::from_secs(1) / rps.max(1)
}

struct GeneratorRun {
    cancel: CancellationToken,
    tickers: JoinSet<()>,
    /// Per-URL ticker tokens, children of `cancel`.
    ticker_tokens: HashMap<String, CancellationToken>,
}

struct GeneratorState {
    testers: HashMap<String, Arc<LoadTester>>,
    run: Option<GeneratorRun>,
}

/// Drives one [`LoadTester`] per registered endpoint at a shared request rate.
///
/// The rate is not divided between testers: every tester ticks at the full
/// configured rps.
pub struct LoadGenerator {
    options: TesterOptions,
    rps: watch::Sender<u32>,
    running: AtomicBool,
    state: Mutex<GeneratorState>,
}

impl Default for LoadGenerator {
    fn default() -> Self {
        Self::new(TesterOptions::default())
    }
}

impl LoadGenerator {
    /// `options` is applied to every tester this generator creates.
    pub fn new(options: TesterOptions) -> Self {
        let (rps, _) = watch::channel(DEFAULT_RPS);
        Self {
            options,
            rps,
            running: AtomicBool::new(false),
            state: Mutex::new(GeneratorState {
                testers: HashMap::new(),
                run: None,
            }),
        }
    }

    /// Register a tester for `endpoint`; no-op if its URL is already registered.
    ///
    /// A tester added while generation is running stays idle until the next `start`.
    pub async fn add_tester(
        &self,
        endpoint: Arc<Endpoint>,
        metrics: Arc<MetricsWindow>,
    ) -> Result<()> {
        let mut state = self.state.lock().await;
        if state.testers.contains_key(endpoint.url()) {
            return Ok(());
        }
        let url = endpoint.url().to_string();
        let tester = LoadTester::new(endpoint, metrics, self.options.clone())?;
        state.testers.insert(url, Arc::new(tester));
        Ok(())
    }

    /// Stop and unregister the tester for `url`, if any.
    pub async fn remove_tester(&self, url: &str) {
        let mut state = self.state.lock().await;
        if let Some(token) = state.run.as_mut().and_then(|run| run.ticker_tokens.remove(url)) {
            token.cancel();
        }
        if let Some(tester) = state.testers.remove(url) {
            tester.stop().await;
            tracing::debug!(url, "removed load tester");
        }
    }

    /// Start every registered tester and one ticker per started tester.
    pub async fn start(&self, rps: u32) -> Result<()> {
        let mut state = self.state.lock().await;
        if state.run.is_some() {
            return Err(PulseError::AlreadyRunning("load generator".to_string()));
        }

        let rps = rps.max(1);
        self.rps.send_replace(rps);

        let cancel = CancellationToken::new();
        let mut tickers = JoinSet::new();
        let mut ticker_tokens = HashMap::new();

        for (url, tester) in &state.testers {
            if let Err(e) = tester.start().await {
                tracing::warn!(url = %url, error = %e, "load tester did not start");
                continue;
            }
            let token = cancel.child_token();
            tickers.spawn(run_ticker(tester.clone(), self.rps.subscribe(), token.clone()));
            ticker_tokens.insert(url.clone(), token);
        }

        tracing::info!(
            rps,
            testers = ticker_tokens.len(),
            "load generation started"
        );
        state.run = Some(GeneratorRun {
            cancel,
            tickers,
            ticker_tokens,
        });
        self.running.store(true, Ordering::Release);
        Ok(())
    }

    /// Cancel all tickers, wait for them, then stop every tester. No-op when stopped.
    pub async fn stop(&self) {
        let mut state = self.state.lock().await;
        let Some(mut run) = state.run.take() else {
            return;
        };

        self.running.store(false, Ordering::Release);
        run.cancel.cancel();
        while let Some(joined) = run.tickers.join_next().await {
            if let Err(e) = joined {
                tracing::warn!(error = %e, "ticker task failed");
            }
        }

        for tester in state.testers.values() {
            tester.stop().await;
        }
        tracing::info!("load generation stopped");
    }

    /// Clamp to at least 1 and apply; running tickers switch to the new period.
    pub fn set_rps(&self, rps: u32) {
        let rps = rps.max(1);
        self.rps.send_replace(rps);
        tracing::debug!(rps, "target rate updated");
    }

    pub fn increase_rps(&self) {
        self.set_rps(self.rps().saturating_add(RPS_STEP));
    }

    pub fn decrease_rps(&self) {
        self.set_rps(self.rps().saturating_sub(RPS_STEP));
    }

    pub fn rps(&self) -> u32 {
        *self.rps.borrow()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub async fn tester_count(&self) -> usize {
        self.state.lock().await.testers.len()
    }

    pub async fn tester(&self, url: &str) -> Option<Arc<LoadTester>> {
        self.state.lock().await.testers.get(url).cloned()
    }

    /// Registered URLs, sorted.
    pub async fn urls(&self) -> Vec<String> {
        let mut urls: Vec<String> = self.state.lock().await.testers.keys().cloned().collect();
        urls.sort();
        urls
    }
}

impl Drop for LoadGenerator {
    fn drop(&mut self) {
        if let Some(run) = self.state.get_mut().run.as_ref() {
            run.cancel.cancel();
        }
    }
}

async fn run_ticker(
    tester: Arc<LoadTester>,
    mut rps_rx: watch::Receiver<u32>,
    cancel: CancellationToken,
) {
    let mut ticker = new_ticker(*rps_rx.borrow_and_update());

    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = ticker.tick() => tester.send_request(),
            changed = rps_rx.changed() => {
                if changed.is_err() {
                    return;
                }
                ticker = new_ticker(*rps_rx.borrow_and_update());
            }
        }
    }
}

fn new_ticker(rps: u32) -> tokio::time::Interval {
    let period = tick_interval(rps);
    // First tick after one period, not immediately.
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    ticker
}
