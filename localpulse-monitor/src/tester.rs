use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use localpulse_common::{PulseError, Result, USER_AGENT};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::endpoint::Endpoint;
use crate::metrics::{MetricsWindow, RequestResult};

/// Capacity of the pending-request queue; `send_request` drops when it is full.
pub const REQUEST_QUEUE_CAPACITY: usize = 1000;
/// Capacity of the queue between workers and the result collector.
pub const RESULT_QUEUE_CAPACITY: usize = 1000;

pub const DEFAULT_CONCURRENCY: usize = 10;
pub const DEFAULT_MAX_CONCURRENCY: usize = 100;
pub const DEFAULT_CLIENT_TIMEOUT: Duration = Duration::from_secs(10);

/// Construction options for a [`LoadTester`].
#[derive(Debug, Clone, PartialEq)]
pub struct TesterOptions {
    /// Initial worker count. Ignored unless within `1..=max_concurrency`.
    pub concurrency: usize,
    pub max_concurrency: usize,
    /// Per-request timeout; the only upper bound on `stop` latency.
    pub client_timeout: Duration,
}

impl Default for TesterOptions {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            client_timeout: DEFAULT_CLIENT_TIMEOUT,
        }
    }
}

/// Everything a worker needs; cloned into each spawned task.
#[derive(Clone)]
struct WorkerContext {
    client: reqwest::Client,
    url: String,
    cancel: CancellationToken,
    work_rx: Arc<Mutex<mpsc::Receiver<()>>>,
    result_tx: mpsc::Sender<RequestResult>,
    target: Arc<AtomicUsize>,
    live: Arc<AtomicUsize>,
}

/// State that exists only while the tester is running.
struct Run {
    cancel: CancellationToken,
    tasks: JoinSet<()>,
    worker_ctx: WorkerContext,
}

/// Per-endpoint worker pool issuing GET requests on demand.
///
/// Requests are queued by [`LoadTester::send_request`] and executed by
/// `concurrency` worker tasks; a single collector task feeds every outcome into
/// the shared [`MetricsWindow`] and the endpoint's health.
pub struct LoadTester {
    client: reqwest::Client,
    endpoint: Arc<Endpoint>,
    metrics: Arc<MetricsWindow>,
    max_concurrency: usize,
    /// Desired worker count; shared with workers so excess ones can retire.
    target: Arc<AtomicUsize>,
    /// Workers currently alive in this run.
    live: Arc<AtomicUsize>,
    running: AtomicBool,
    requests_sent: AtomicU64,
    work_tx: parking_lot::Mutex<Option<mpsc::Sender<()>>>,
    run: Mutex<Option<Run>>,
}

impl LoadTester {
    pub fn new(
        endpoint: Arc<Endpoint>,
        metrics: Arc<MetricsWindow>,
        options: TesterOptions,
    ) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("*/*"));

        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .default_headers(headers)
            .timeout(options.client_timeout)
            .pool_max_idle_per_host(100)
            .pool_idle_timeout(Duration::from_secs(90))
            .build()
            .map_err(|e| PulseError::HttpClient(e.to_string()))?;

        let max_concurrency = options.max_concurrency.max(1);
        let concurrency = if (1..=max_concurrency).contains(&options.concurrency) {
            options.concurrency
        } else {
            DEFAULT_CONCURRENCY.min(max_concurrency)
        };

        Ok(Self {
            client,
            endpoint,
            metrics,
            max_concurrency,
            target: Arc::new(AtomicUsize::new(concurrency)),
            live: Arc::new(AtomicUsize::new(0)),
            running: AtomicBool::new(false),
            requests_sent: AtomicU64::new(0),
            work_tx: parking_lot::Mutex::new(None),
            run: Mutex::new(None),
        })
    }

    pub fn endpoint(&self) -> &Arc<Endpoint> {
        &self.endpoint
    }

    pub fn metrics(&self) -> &Arc<MetricsWindow> {
        &self.metrics
    }

    /// Spawn the worker pool and the result collector.
    pub async fn start(&self) -> Result<()> {
        let mut run = self.run.lock().await;
        if run.is_some() {
            return Err(PulseError::AlreadyRunning("load tester".to_string()));
        }

        let (work_tx, work_rx) = mpsc::channel(REQUEST_QUEUE_CAPACITY);
        let (result_tx, result_rx) = mpsc::channel(RESULT_QUEUE_CAPACITY);
        let cancel = CancellationToken::new();

        let worker_ctx = WorkerContext {
            client: self.client.clone(),
            url: self.endpoint.url().to_string(),
            cancel: cancel.clone(),
            work_rx: Arc::new(Mutex::new(work_rx)),
            result_tx,
            target: self.target.clone(),
            live: self.live.clone(),
        };

        // The previous run, if any, joined every worker.
        self.live.store(0, Ordering::Release);

        let mut tasks = JoinSet::new();
        let workers = self.target.load(Ordering::Acquire);
        for _ in 0..workers {
            spawn_worker(&mut tasks, &worker_ctx);
        }
        tasks.spawn(collect_results(
            result_rx,
            self.metrics.clone(),
            self.endpoint.clone(),
            cancel.clone(),
        ));

        self.requests_sent.store(0, Ordering::Relaxed);
        *self.work_tx.lock() = Some(work_tx);
        *run = Some(Run {
            cancel,
            tasks,
            worker_ctx,
        });
        self.running.store(true, Ordering::Release);

        tracing::debug!(url = %self.endpoint.url(), workers, "load tester started");
        Ok(())
    }

    /// Cancel every task and wait until all of them have exited. No-op when stopped.
    pub async fn stop(&self) {
        let mut run = self.run.lock().await;
        let Some(mut current) = run.take() else {
            return;
        };

        self.running.store(false, Ordering::Release);
        self.work_tx.lock().take();
        current.cancel.cancel();

        while let Some(joined) = current.tasks.join_next().await {
            if let Err(e) = joined {
                tracing::warn!(url = %self.endpoint.url(), error = %e, "load tester task failed");
            }
        }

        tracing::debug!(
            url = %self.endpoint.url(),
            sent = self.requests_sent(),
            "load tester stopped"
        );
    }

    /// Queue one request without waiting. Dropped silently when the queue is full.
    pub fn send_request(&self) {
        if !self.running.load(Ordering::Acquire) {
            return;
        }
        self.requests_sent.fetch_add(1, Ordering::Relaxed);
        if let Some(tx) = self.work_tx.lock().as_ref() {
            // Full or closed queue: the request is dropped.
            let _ = tx.try_send(());
        }
    }

    pub fn send_burst(&self, count: usize) {
        for _ in 0..count {
            self.send_request();
        }
    }

    /// Clamp `n` to `[1, max_concurrency]` and apply it.
    ///
    /// When running, missing workers are spawned immediately; surplus workers
    /// finish their current request and exit before taking another.
    pub async fn set_concurrency(&self, n: usize) {
        let n = n.clamp(1, self.max_concurrency);
        let mut run = self.run.lock().await;
        self.target.store(n, Ordering::SeqCst);

        if let Some(current) = run.as_mut() {
            let live = self.live.load(Ordering::SeqCst);
            for _ in live..n {
                spawn_worker(&mut current.tasks, &current.worker_ctx);
            }
        }
    }

    pub async fn increase_concurrency(&self) {
        self.set_concurrency(self.concurrency() + 1).await;
    }

    pub async fn decrease_concurrency(&self) {
        self.set_concurrency(self.concurrency().saturating_sub(1)).await;
    }

    /// Configured worker count.
    pub fn concurrency(&self) -> usize {
        self.target.load(Ordering::Acquire)
    }

    /// Workers currently alive; converges to `concurrency()` after a decrease.
    pub fn live_workers(&self) -> usize {
        self.live.load(Ordering::Acquire)
    }

    pub fn max_concurrency(&self) -> usize {
        self.max_concurrency
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Requests submitted since the last `start`, including dropped ones.
    pub fn requests_sent(&self) -> u64 {
        self.requests_sent.load(Ordering::Relaxed)
    }
}

impl Drop for LoadTester {
    fn drop(&mut self) {
        if let Some(run) = self.run.get_mut() {
            run.cancel.cancel();
        }
    }
}

fn spawn_worker(tasks: &mut JoinSet<()>, ctx: &WorkerContext) {
    ctx.live.fetch_add(1, Ordering::SeqCst);
    tasks.spawn(run_worker(ctx.clone()));
}

enum WorkerExit {
    Retired,
    Cancelled,
}

async fn run_worker(ctx: WorkerContext) {
    if let WorkerExit::Cancelled = worker_loop(&ctx).await {
        ctx.live.fetch_sub(1, Ordering::SeqCst);
    }
}

async fn worker_loop(ctx: &WorkerContext) -> WorkerExit {
    loop {
        if try_retire(ctx) {
            return WorkerExit::Retired;
        }

        let next = tokio::select! {
            _ = ctx.cancel.cancelled() => return WorkerExit::Cancelled,
            next = next_unit(ctx) => next,
        };
        match next {
            NextUnit::Work => {}
            NextUnit::Retire => return WorkerExit::Retired,
            NextUnit::Closed => return WorkerExit::Cancelled,
        }

        let result = tokio::select! {
            _ = ctx.cancel.cancelled() => return WorkerExit::Cancelled,
            result = issue_request(&ctx.client, &ctx.url) => result,
        };

        tokio::select! {
            _ = ctx.cancel.cancelled() => return WorkerExit::Cancelled,
            sent = ctx.result_tx.send(result) => {
                if sent.is_err() {
                    return WorkerExit::Cancelled;
                }
            }
        }
    }
}

enum NextUnit {
    Work,
    Retire,
    Closed,
}

/// Wait for the next queued request. Surplus workers queued behind the
/// receiver lock retire as soon as they acquire it.
async fn next_unit(ctx: &WorkerContext) -> NextUnit {
    let mut work_rx = ctx.work_rx.lock().await;
    if try_retire(ctx) {
        return NextUnit::Retire;
    }
    match work_rx.recv().await {
        Some(()) => NextUnit::Work,
        None => NextUnit::Closed,
    }
}

/// Atomically claim one surplus slot; returns `true` if this worker should exit.
///
/// `set_concurrency` stores the target before reading `live`, and this side
/// decrements `live` before re-reading the target, so a raise racing with a
/// retirement is seen by at least one of them. Both sides use `SeqCst`.
fn try_retire(ctx: &WorkerContext) -> bool {
    let mut live = ctx.live.load(Ordering::SeqCst);
    while live > ctx.target.load(Ordering::SeqCst) {
        match ctx.live.compare_exchange(live, live - 1, Ordering::SeqCst, Ordering::SeqCst) {
            Ok(_) => {
                if live - 1 < ctx.target.load(Ordering::SeqCst) {
                    // The target was raised after the check; keep the slot.
                    // Any resulting surplus retires on a later pass.
                    ctx.live.fetch_add(1, Ordering::SeqCst);
                    return false;
                }
                return true;
            }
            Err(actual) => live = actual,
        }
    }
    false
}

/// Issue one GET and classify it. Any HTTP response counts as a transport-level success.
pub async fn issue_request(client: &reqwest::Client, url: &str) -> RequestResult {
    let start = Instant::now();

    let mut response = match client.get(url).send().await {
        Ok(response) => response,
        Err(e) => return RequestResult::failure(start.elapsed(), e.to_string()),
    };
    let latency = start.elapsed();
    let status = response.status().as_u16();

    let mut size: u64 = 0;
    loop {
        match response.chunk().await {
            Ok(Some(chunk)) => size += chunk.len() as u64,
            Ok(None) => break,
            // A truncated body still counts as a response; keep what was read.
            Err(_) => break,
        }
    }

    RequestResult::success(latency, status, size)
}

async fn collect_results(
    mut result_rx: mpsc::Receiver<RequestResult>,
    metrics: Arc<MetricsWindow>,
    endpoint: Arc<Endpoint>,
    cancel: CancellationToken,
) {
    loop {
        let result = tokio::select! {
            _ = cancel.cancelled() => break,
            result = result_rx.recv() => match result {
                Some(result) => result,
                None => return,
            },
        };
        apply_result(result, &metrics, &endpoint);
    }

    // Results already queued when the run was cancelled are still recorded.
    while let Ok(result) = result_rx.try_recv() {
        apply_result(result, &metrics, &endpoint);
    }
}

fn apply_result(result: RequestResult, metrics: &MetricsWindow, endpoint: &Endpoint) {
    if let Some(message) = result.error_message.as_deref() {
        tracing::trace!(url = %endpoint.url(), error = message, "request failed");
    }
    let latency = result.latency;
    let error = result
        .is_error
        .then(|| result.error_message.clone().unwrap_or_default());
    metrics.record(result);
    endpoint.record_observation(latency, error.as_deref());
}
