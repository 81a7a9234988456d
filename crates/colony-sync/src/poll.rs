//! Adaptive polling scheduler.
//!
//! [`PollHandle::spawn`] starts a background task that repeatedly invokes an
//! asynchronous [`Producer`] and publishes the outcome as a [`PollState`]
//! through a [`watch`] channel. The task:
//!
//! - fetches immediately on spawn instead of waiting for the first tick,
//! - reschedules after the base interval on success,
//! - backs off exponentially on failure (`delay = min(delay * 2, max)`)
//!   while keeping the last good data,
//! - drops timer ticks and refresh requests that arrive while a fetch is
//!   still in flight, so there is never more than one outstanding request,
//! - stops mutating state the moment it is shut down or its handle dropped,
//!   discarding any fetch that was still pending.
//!
//! [`PollHandle::refresh`] is the bridge from push to pull: a consumer that
//! receives a push notification calls it to fetch early.

use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt as _, OptionFuture};
use serde::Deserialize;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Default base polling interval in milliseconds.
pub const DEFAULT_INTERVAL_MS: u64 = 5_000;

/// Upper bound for the failure backoff delay in milliseconds.
pub const MAX_BACKOFF_MS: u64 = 30_000;

/// Human-readable failure reported by a [`Producer`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct FetchError {
    message: String,
}

impl FetchError {
    /// Wrap a failure description.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// The failure description.
    pub fn message(&self) -> &str {
        &self.message
    }
}

/// An asynchronous fetch operation invoked by the scheduler.
pub type Producer<T> = Arc<dyn Fn() -> BoxFuture<'static, Result<T, FetchError>> + Send + Sync>;

/// Adapt an async closure returning any displayable error into a [`Producer`].
pub fn producer<T, E, F, Fut>(fetch: F) -> Producer<T>
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, E>> + Send + 'static,
    E: Display,
{
    Arc::new(move || {
        let pending = fetch();
        async move { pending.await.map_err(|e| FetchError::new(e.to_string())) }.boxed()
    })
}

/// Polling configuration for one resource.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PollConfig {
    /// Base interval between successful fetches.
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,

    /// Cap on the backoff delay after consecutive failures.
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
}

impl PollConfig {
    /// Configuration with the given base interval and the default cap.
    pub const fn with_interval_ms(interval_ms: u64) -> Self {
        Self {
            interval_ms,
            max_backoff_ms: MAX_BACKOFF_MS,
        }
    }

    /// Base interval as a [`Duration`].
    pub const fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    /// Backoff cap as a [`Duration`].
    pub const fn max_backoff(&self) -> Duration {
        Duration::from_millis(self.max_backoff_ms)
    }
}

impl Default for PollConfig {
    fn default() -> Self {
        Self::with_interval_ms(DEFAULT_INTERVAL_MS)
    }
}

const fn default_interval_ms() -> u64 {
    DEFAULT_INTERVAL_MS
}

const fn default_max_backoff_ms() -> u64 {
    MAX_BACKOFF_MS
}

/// Exponential backoff delay tracker.
///
/// After `n` consecutive failures the delay is `min(base * 2^n, max)`. A
/// success or a manual refresh resets it to `base`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    base: Duration,
    max: Duration,
    current: Duration,
    failures: u32,
}

impl Backoff {
    /// Start at `base`, never exceeding `max` after failures.
    pub const fn new(base: Duration, max: Duration) -> Self {
        Self {
            base,
            max,
            current: base,
            failures: 0,
        }
    }

    /// The delay that will be used for the next scheduled fetch.
    pub const fn current(&self) -> Duration {
        self.current
    }

    /// The base interval.
    pub const fn base(&self) -> Duration {
        self.base
    }

    /// Change the base interval.
    ///
    /// The current delay is rescaled at once, keeping the failure count, so
    /// the next scheduled fetch uses the new base.
    pub fn set_base(&mut self, base: Duration) {
        self.base = base;
        self.current = self.scaled();
    }

    /// Reset to the base interval and return it.
    pub const fn reset(&mut self) -> Duration {
        self.failures = 0;
        self.current = self.base;
        self.current
    }

    /// Record a failure: double the delay up to the cap and return it.
    pub fn on_failure(&mut self) -> Duration {
        self.failures = self.failures.saturating_add(1);
        self.current = self.scaled();
        self.current
    }

    /// `base * 2^failures`, capped at `max`. A zero failure count is the base.
    fn scaled(&self) -> Duration {
        if self.failures == 0 {
            return self.base;
        }
        self.base
            .saturating_mul(2_u32.saturating_pow(self.failures))
            .min(self.max)
    }
}

/// Observable state of one scheduler instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollState<T> {
    /// Last successfully fetched value. Kept across failures.
    pub data: Option<T>,
    /// Description of the most recent failure, cleared on success.
    pub error: Option<String>,
    /// Whether a fetch is currently in flight.
    pub is_loading: bool,
    /// Delay before the next scheduled fetch.
    pub next_delay: Duration,
    /// Number of successful fetches so far.
    pub generation: u64,
    /// Failures since the last success.
    pub consecutive_failures: u32,
}

impl<T> PollState<T> {
    fn initial(next_delay: Duration) -> Self {
        Self {
            data: None,
            error: None,
            is_loading: true,
            next_delay,
            generation: 0,
            consecutive_failures: 0,
        }
    }
}

enum Command<T> {
    Refresh,
    SetInterval(Duration),
    SetProducer(Producer<T>),
    Shutdown,
}

/// Handle to a running scheduler.
///
/// Dropping the handle cancels the scheduler exactly like
/// [`shutdown`](Self::shutdown), without waiting for the task to finish.
pub struct PollHandle<T> {
    name: String,
    commands: mpsc::UnboundedSender<Command<T>>,
    state: watch::Receiver<PollState<T>>,
    task: Option<JoinHandle<()>>,
}

impl<T> PollHandle<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Spawn a scheduler on the current Tokio runtime.
    ///
    /// The first fetch starts immediately.
    pub fn spawn(name: impl Into<String>, producer: Producer<T>, config: &PollConfig) -> Self {
        let name = name.into();
        let backoff = Backoff::new(config.interval(), config.max_backoff());
        let (state_tx, state_rx) = watch::channel(PollState::initial(backoff.current()));
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();

        let task = PollTask {
            name: name.clone(),
            producer,
            backoff,
            state: state_tx,
            commands: cmd_rx,
        };
        debug!(poller = %name, interval_ms = config.interval_ms, "spawning poller");
        let handle = tokio::spawn(task.run());

        Self {
            name,
            commands: cmd_tx,
            state: state_rx,
            task: Some(handle),
        }
    }

    /// Name used in log output.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Clone of the current state.
    pub fn state(&self) -> PollState<T> {
        self.state.borrow().clone()
    }

    /// Receiver notified on every state change.
    pub fn subscribe(&self) -> watch::Receiver<PollState<T>> {
        self.state.clone()
    }

    /// Cancel the pending timer, reset the backoff and fetch now.
    ///
    /// Ignored if a fetch is already in flight.
    pub fn refresh(&self) {
        self.send(Command::Refresh);
    }

    /// Change the base interval. Observed at the next scheduling decision.
    pub fn set_interval(&self, interval: Duration) {
        self.send(Command::SetInterval(interval));
    }

    /// Replace the producer. Observed by the next fetch.
    pub fn set_producer(&self, producer: Producer<T>) {
        self.send(Command::SetProducer(producer));
    }

    /// Stop the scheduler and wait for its task to exit.
    ///
    /// A fetch still in flight is dropped and its result never applied.
    pub async fn shutdown(mut self) {
        self.send(Command::Shutdown);
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                warn!(poller = %self.name, error = %e, "poller task ended abnormally");
            }
        }
    }

    fn send(&self, command: Command<T>) {
        if self.commands.send(command).is_err() {
            debug!(poller = %self.name, "poller already stopped, command ignored");
        }
    }
}

impl<T> Drop for PollHandle<T> {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl<T> std::fmt::Debug for PollHandle<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PollHandle")
            .field("name", &self.name)
            .field("running", &self.task.is_some())
            .finish_non_exhaustive()
    }
}

/// The scheduler task. Owns all mutable scheduling state.
struct PollTask<T> {
    name: String,
    producer: Producer<T>,
    backoff: Backoff,
    state: watch::Sender<PollState<T>>,
    commands: mpsc::UnboundedReceiver<Command<T>>,
}

impl<T> PollTask<T>
where
    T: Clone + Send + Sync + 'static,
{
    async fn run(mut self) {
        let mut in_flight: Option<BoxFuture<'static, Result<T, FetchError>>> =
            Some(self.begin_fetch());
        let mut next_at: Option<Instant> = None;

        loop {
            tokio::select! {
                biased;

                command = self.commands.recv() => match command {
                    None | Some(Command::Shutdown) => {
                        debug!(poller = %self.name, pending = in_flight.is_some(), "poller stopped");
                        return;
                    }
                    Some(Command::Refresh) => {
                        if in_flight.is_some() {
                            debug!(poller = %self.name, "refresh dropped, fetch already in flight");
                            continue;
                        }
                        next_at = None;
                        let delay = self.backoff.reset();
                        self.state.send_modify(|s| s.next_delay = delay);
                        in_flight = Some(self.begin_fetch());
                    }
                    Some(Command::SetInterval(interval)) => {
                        debug!(poller = %self.name, interval_ms = interval.as_millis(), "base interval changed");
                        self.backoff.set_base(interval);
                    }
                    Some(Command::SetProducer(producer)) => {
                        self.producer = producer;
                    }
                },

                Some(result) = OptionFuture::from(in_flight.as_mut()) => {
                    in_flight = None;
                    let delay = self.complete(result);
                    next_at = Some(
                        Instant::now()
                            .checked_add(delay)
                            .unwrap_or_else(Instant::now),
                    );
                }

                Some(()) = OptionFuture::from(next_at.map(tokio::time::sleep_until)) => {
                    next_at = None;
                    if in_flight.is_some() {
                        debug!(poller = %self.name, "timer tick dropped, fetch already in flight");
                        continue;
                    }
                    in_flight = Some(self.begin_fetch());
                }
            }
        }
    }

    fn begin_fetch(&self) -> BoxFuture<'static, Result<T, FetchError>> {
        self.state.send_modify(|s| s.is_loading = true);
        (self.producer)()
    }

    /// Apply a fetch outcome and return the delay until the next fetch.
    fn complete(&mut self, result: Result<T, FetchError>) -> Duration {
        match result {
            Ok(data) => {
                let delay = self.backoff.reset();
                self.state.send_modify(|s| {
                    s.data = Some(data);
                    s.error = None;
                    s.is_loading = false;
                    s.next_delay = delay;
                    s.generation = s.generation.saturating_add(1);
                    s.consecutive_failures = 0;
                });
                delay
            }
            Err(e) => {
                let delay = self.backoff.on_failure();
                self.state.send_modify(|s| {
                    s.error = Some(e.to_string());
                    s.is_loading = false;
                    s.next_delay = delay;
                    s.consecutive_failures = s.consecutive_failures.saturating_add(1);
                });
                warn!(
                    poller = %self.name,
                    error = %e,
                    retry_in_ms = delay.as_millis(),
                    "fetch failed, backing off"
                );
                delay
            }
        }
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::arithmetic_side_effects,
    clippy::indexing_slicing
)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use tokio::sync::Notify;

    use super::*;

    fn config(interval_ms: u64) -> PollConfig {
        PollConfig::with_interval_ms(interval_ms)
    }

    /// Producer that records the instant of every call and then fails.
    fn failing_recorder(tx: mpsc::UnboundedSender<Instant>) -> Producer<u32> {
        producer(move || {
            let tx = tx.clone();
            async move {
                let _ = tx.send(Instant::now());
                Err::<u32, _>("upstream unavailable")
            }
        })
    }

    #[test]
    fn backoff_doubles_up_to_cap_and_resets() {
        let mut backoff = Backoff::new(Duration::from_millis(1_000), Duration::from_millis(30_000));
        let delays: Vec<u128> = (0..7).map(|_| backoff.on_failure().as_millis()).collect();
        assert_eq!(delays, vec![2_000, 4_000, 8_000, 16_000, 30_000, 30_000, 30_000]);
        assert_eq!(backoff.reset(), Duration::from_millis(1_000));
    }

    #[test]
    fn backoff_base_change_rescales_while_failing() {
        let mut backoff = Backoff::new(Duration::from_millis(1_000), Duration::from_millis(30_000));
        backoff.on_failure();
        backoff.set_base(Duration::from_millis(500));
        assert_eq!(backoff.current(), Duration::from_millis(1_000));
        assert_eq!(backoff.on_failure(), Duration::from_millis(2_000));
        assert_eq!(backoff.reset(), Duration::from_millis(500));
        backoff.set_base(Duration::from_millis(700));
        assert_eq!(backoff.current(), Duration::from_millis(700));
    }

    #[test]
    fn backoff_cap_survives_base_change() {
        let mut backoff = Backoff::new(Duration::from_millis(1_000), Duration::from_millis(30_000));
        for _ in 0..40 {
            backoff.on_failure();
        }
        assert_eq!(backoff.current(), Duration::from_millis(30_000));
        backoff.set_base(Duration::from_millis(10));
        assert_eq!(backoff.current(), Duration::from_millis(30_000));
    }

    #[test]
    fn poll_config_defaults_from_empty_yaml() {
        let config: PollConfig = serde_yml::from_str("{}").unwrap();
        assert_eq!(config, PollConfig::default());
        assert_eq!(config.max_backoff(), Duration::from_millis(MAX_BACKOFF_MS));
    }

    #[tokio::test(start_paused = true)]
    async fn fetches_immediately_on_spawn() {
        let handle = PollHandle::spawn("test", producer(|| async { Ok::<_, String>(5_u32) }), &config(60_000));
        let mut rx = handle.subscribe();
        let state = rx.wait_for(|s| s.generation == 1).await.unwrap().clone();
        assert_eq!(state.data, Some(5));
        assert!(!state.is_loading);
        assert_eq!(state.error, None);
        assert_eq!(state.next_delay, Duration::from_millis(60_000));
    }

    #[tokio::test(start_paused = true)]
    async fn failures_back_off_exponentially() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let _handle = PollHandle::spawn("backoff", failing_recorder(tx), &config(1_000));

        let mut calls = Vec::new();
        for _ in 0..7 {
            calls.push(rx.recv().await.unwrap());
        }
        let gaps: Vec<u128> = calls
            .windows(2)
            .map(|w| (w[1] - w[0]).as_millis())
            .collect();
        assert_eq!(gaps, vec![2_000, 4_000, 8_000, 16_000, 30_000, 30_000]);
    }

    #[tokio::test(start_paused = true)]
    async fn interval_change_applies_while_failing() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let handle = PollHandle::spawn("shrink", failing_recorder(tx), &config(1_000));

        let mut calls = vec![rx.recv().await.unwrap()];
        // The 2 s retry is already scheduled; later delays use the new base.
        handle.set_interval(Duration::from_millis(100));
        for _ in 0..3 {
            calls.push(rx.recv().await.unwrap());
        }
        let gaps: Vec<u128> = calls
            .windows(2)
            .map(|w| (w[1] - w[0]).as_millis())
            .collect();
        assert_eq!(gaps, vec![2_000, 400, 800]);
        assert_eq!(handle.state().consecutive_failures, 4);
    }

    #[tokio::test(start_paused = true)]
    async fn success_resets_backoff_and_failure_keeps_data() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        // Succeed, fail twice, then succeed again.
        let source = producer(move || {
            let n = counter.fetch_add(1, Ordering::SeqCst);
            async move {
                if n == 1 || n == 2 {
                    Err(String::from("boom"))
                } else {
                    Ok(n)
                }
            }
        });
        let handle = PollHandle::spawn("reset", source, &config(1_000));
        let mut rx = handle.subscribe();

        let failed = rx
            .wait_for(|s| s.consecutive_failures == 2)
            .await
            .unwrap()
            .clone();
        assert_eq!(failed.data, Some(0));
        assert_eq!(failed.error.as_deref(), Some("boom"));
        assert_eq!(failed.next_delay, Duration::from_millis(4_000));

        let recovered = rx.wait_for(|s| s.generation == 2).await.unwrap().clone();
        assert_eq!(recovered.data, Some(3));
        assert_eq!(recovered.error, None);
        assert_eq!(recovered.consecutive_failures, 0);
        assert_eq!(recovered.next_delay, Duration::from_millis(1_000));
    }

    #[tokio::test(start_paused = true)]
    async fn at_most_one_fetch_in_flight() {
        let calls = Arc::new(AtomicUsize::new(0));
        let gate = Arc::new(Notify::new());
        let (counter, release) = (Arc::clone(&calls), Arc::clone(&gate));
        let source = producer(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            let release = Arc::clone(&release);
            async move {
                release.notified().await;
                Ok::<_, String>(1_u8)
            }
        });
        let handle = PollHandle::spawn("guard", source, &config(1_000));

        tokio::task::yield_now().await;
        for _ in 0..3 {
            handle.refresh();
        }
        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        gate.notify_one();
        let mut rx = handle.subscribe();
        rx.wait_for(|s| s.generation == 1).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        // The next fetch comes from the timer, after the base interval.
        tokio::time::sleep(Duration::from_millis(1_001)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn refresh_cancels_timer_and_resets_backoff() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let handle = PollHandle::spawn("refresh", failing_recorder(tx), &config(1_000));
        let first = rx.recv().await.unwrap();
        let second = rx.recv().await.unwrap();
        assert_eq!((second - first).as_millis(), 2_000);

        // Backoff is now 4s. A refresh fetches right away.
        let mut state = handle.subscribe();
        state.wait_for(|s| !s.is_loading).await.unwrap();
        handle.refresh();
        let third = rx.recv().await.unwrap();
        assert_eq!((third - second).as_millis(), 0);

        // The refresh reset the delay, so the failure after it waits 2s again.
        let fourth = rx.recv().await.unwrap();
        assert_eq!((fourth - third).as_millis(), 2_000);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_discards_in_flight_result() {
        let gate = Arc::new(Notify::new());
        let release = Arc::clone(&gate);
        let source = producer(move || {
            let release = Arc::clone(&release);
            async move {
                release.notified().await;
                Ok::<_, String>(99_u32)
            }
        });
        let handle = PollHandle::spawn("teardown", source, &config(1_000));
        let mut rx = handle.subscribe();
        tokio::task::yield_now().await;

        handle.shutdown().await;
        gate.notify_one();
        tokio::time::sleep(Duration::from_secs(5)).await;

        let state = rx.borrow_and_update().clone();
        assert_eq!(state.data, None);
        assert_eq!(state.generation, 0);
        assert!(rx.changed().await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_handle_stops_polling() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let handle = PollHandle::spawn("drop", failing_recorder(tx), &config(1_000));
        rx.recv().await.unwrap();
        drop(handle);
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn producer_and_interval_changes_apply_to_next_fetch() {
        let handle = PollHandle::spawn("swap", producer(|| async { Ok::<_, String>("old") }), &config(10_000));
        let mut rx = handle.subscribe();
        rx.wait_for(|s| s.generation == 1).await.unwrap();

        handle.set_producer(producer(|| async { Ok::<_, String>("new") }));
        handle.set_interval(Duration::from_millis(250));
        handle.refresh();

        let state = rx.wait_for(|s| s.generation == 2).await.unwrap().clone();
        assert_eq!(state.data, Some("new"));
        assert_eq!(state.next_delay, Duration::from_millis(250));
    }
}
