//! Core circuit breaker implementation.

use std::future::Future;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex, RwLock};
use tracing::{debug, error, info, trace, warn};

use crate::config::{BreakerBuilder, BreakerConfig};
use crate::error::{BreakerError, BreakerResult, Rejection};
use crate::hook::HookRegistry;
use crate::metrics::MetricSink;
use crate::policy::{BreakerPolicy, ThresholdPolicy};
use crate::sample::Sample;
use crate::state::{SnapshotCell, State, StateManager, StateSnapshot};
use crate::window::Window;

/// Inner state of the breaker, shared between handles and the refresh loop.
struct BreakerInner<P>
where
    P: BreakerPolicy,
{
    config: BreakerConfig,
    policy: P,
    window: RwLock<Window>,
    snapshot: SnapshotCell,
    state_manager: StateManager,
    metric_sink: Arc<dyn MetricSink>,
    hooks: Arc<HookRegistry>,
}

/// An adaptive circuit breaker driven by sampled concurrency, error rate and
/// latency.
///
/// Every action runs against the snapshot computed by the last refresh. A
/// background thread recomputes that snapshot every `sample_ttl` and, when it
/// finds a breached limit, pauses for `break_ttl` with the breached values
/// still published. Actions issued in that interval are rejected, which is
/// the breaker's open period.
///
/// Handles are cheap to clone. The refresh thread stops when the last handle
/// is dropped or [`shutdown`](Breaker::shutdown) is called.
pub struct Breaker<P = ThresholdPolicy>
where
    P: BreakerPolicy,
{
    inner: Arc<BreakerInner<P>>,
    supervisor: Arc<Supervisor>,
}

impl Breaker<ThresholdPolicy> {
    /// Creates a new builder for customizing a breaker.
    pub fn builder() -> BreakerBuilder {
        BreakerBuilder::new()
    }
}

impl Default for Breaker<ThresholdPolicy> {
    fn default() -> Self {
        BreakerBuilder::new().build()
    }
}

impl<P> Breaker<P>
where
    P: BreakerPolicy,
{
    /// Creates a breaker and starts its refresh loop.
    ///
    /// `config` is normalized first, so zero values get their defaults.
    pub fn new(
        config: BreakerConfig,
        policy: P,
        metric_sink: Arc<dyn MetricSink>,
        hooks: Arc<HookRegistry>,
    ) -> Self {
        let config = config.normalized();

        let mut window = Window::new(config.min_sample_volume);
        window.cycle();

        let inner = Arc::new(BreakerInner {
            config,
            policy,
            window: RwLock::new(window),
            snapshot: SnapshotCell::default(),
            state_manager: StateManager::new(),
            metric_sink,
            hooks,
        });

        debug!(?config, "created breaker");

        Self {
            supervisor: Arc::new(Supervisor::start(Arc::clone(&inner))),
            inner,
        }
    }

    /// The normalized configuration in use.
    pub fn config(&self) -> &BreakerConfig {
        &self.inner.config
    }

    /// Gets the phase last published by the refresh loop.
    pub fn current_state(&self) -> State {
        self.inner.state_manager.current()
    }

    /// Time spent in the current phase.
    pub fn time_in_state(&self) -> Duration {
        self.inner.state_manager.time_in_state()
    }

    /// Gets the metrics the gate currently evaluates.
    pub fn snapshot(&self) -> StateSnapshot {
        self.inner.snapshot.load()
    }

    /// Checks the cached snapshot against the policy without running anything.
    pub fn accept(&self) -> Result<(), Rejection> {
        self.inner.accept()
    }

    /// Executes `action` if the breaker still accepts new actions.
    ///
    /// Returns [`BreakerError::NilAction`] when no action is given.
    pub fn run<F, E>(&self, action: Option<F>) -> BreakerResult<(), E>
    where
        F: FnOnce() -> Result<(), E>,
    {
        let action = action.ok_or(BreakerError::NilAction)?;
        self.call(action)
    }

    /// Executes a function wrapped by the breaker.
    pub fn call<F, T, E>(&self, f: F) -> BreakerResult<T, E>
    where
        F: FnOnce() -> Result<T, E>,
    {
        let guard = self.pre_call()?;

        let result = f();
        guard.complete(result.is_ok());

        result.map_err(BreakerError::Operation)
    }

    /// Executes an async function wrapped by the breaker.
    ///
    /// Dropping the returned future before it completes records the action
    /// as failed.
    pub async fn call_async<F, Fut, T, E>(&self, f: F) -> BreakerResult<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let guard = self.pre_call()?;

        let result = f().await;
        guard.complete(result.is_ok());

        result.map_err(BreakerError::Operation)
    }

    /// Stops the refresh loop. The breaker keeps gating on the last snapshot.
    pub fn shutdown(&self) {
        self.supervisor.stop();
    }

    /// Checks the gate and marks the action start on the current sample.
    fn pre_call(&self) -> Result<ActionGuard<'_, P>, Rejection> {
        if let Err(rejection) = self.inner.accept() {
            trace!(reason = %rejection, "breaker rejected action");
            self.inner.metric_sink.record_rejection(rejection);
            self.inner.hooks.execute_reject_hook(rejection);
            return Err(rejection);
        }

        let sample = self.inner.current_sample();
        let start = sample.start();

        Ok(ActionGuard {
            inner: &self.inner,
            sample,
            start,
            completed: false,
        })
    }

    #[cfg(test)]
    fn window(&self) -> &RwLock<Window> {
        &self.inner.window
    }

    #[cfg(test)]
    fn refresh_now(&self) -> Result<(), Rejection> {
        self.inner.refresh()
    }
}

// Allow cloning of breakers - cheap because inner state is Arc'd
impl<P> Clone for Breaker<P>
where
    P: BreakerPolicy,
{
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            supervisor: Arc::clone(&self.supervisor),
        }
    }
}

impl<P> BreakerInner<P>
where
    P: BreakerPolicy,
{
    fn accept(&self) -> Result<(), Rejection> {
        self.policy.evaluate(&self.snapshot.load())
    }

    fn current_sample(&self) -> Arc<Sample> {
        self.window
            .read()
            .current()
            .unwrap_or_else(|| Arc::new(Sample::new()))
    }

    /// Recomputes and publishes the snapshot, then evaluates it.
    fn refresh(&self) -> Result<(), Rejection> {
        let (snapshot, samples) = {
            let window = self.window.read();
            let snapshot = StateSnapshot {
                concurrency: window.concurrency(),
                error_rate: window.error_rate(),
                performance_loss: window.performance_loss(),
            };
            (snapshot, window.len())
        };

        self.snapshot.store(snapshot);
        self.metric_sink.record_snapshot(&snapshot);

        debug!(
            concurrency = snapshot.concurrency,
            error_rate = snapshot.error_rate,
            performance_loss = snapshot.performance_loss,
            samples,
            "breaker state refreshed"
        );

        self.policy.evaluate(&snapshot)
    }

    fn transition(&self, to: State) {
        let Some(from) = self.state_manager.transition_to(to) else {
            return;
        };

        self.metric_sink.record_state_transition(from, to);

        if from == State::Breaking && to == State::Accepting {
            info!("breaker accepting actions again");
            self.hooks.execute_recover_hook();
        }
    }

    fn refresh_loop(&self, shutdown: &ShutdownSignal) {
        loop {
            if shutdown.wait(self.config.sample_ttl) {
                break;
            }

            // Warm-up: grow the window without touching the snapshot.
            if !self.window.read().is_warm() {
                self.window.write().cycle();
                continue;
            }

            match self.refresh() {
                Ok(()) => self.transition(State::Accepting),
                Err(rejection) => {
                    warn!(
                        reason = %rejection,
                        break_ttl = ?self.config.break_ttl,
                        "breaker limit breached, rejecting actions"
                    );
                    self.transition(State::Breaking);
                    self.hooks.execute_break_hook(rejection);

                    if shutdown.wait(self.config.break_ttl) {
                        break;
                    }
                }
            }

            self.window.write().cycle();
        }

        debug!("breaker refresh loop stopped");
    }
}

/// Accounting for one admitted action.
///
/// Dropped without [`complete`](ActionGuard::complete), the action counts as
/// failed so the in-flight counter never leaks.
struct ActionGuard<'a, P>
where
    P: BreakerPolicy,
{
    inner: &'a BreakerInner<P>,
    sample: Arc<Sample>,
    start: Instant,
    completed: bool,
}

impl<P> ActionGuard<'_, P>
where
    P: BreakerPolicy,
{
    fn complete(mut self, success: bool) {
        self.completed = true;
        self.record(success);
    }

    fn record(&self, success: bool) {
        if success {
            let end = self.sample.success(self.start);
            self.sample.record_latency(self.start, end);

            let duration = end.saturating_duration_since(self.start);
            trace!(?duration, "action succeeded");
            self.inner.metric_sink.record_action(true, duration);
            self.inner.hooks.execute_success_hook();
        } else {
            let end = self.sample.failure(self.start);

            let duration = end.saturating_duration_since(self.start);
            trace!(?duration, "action failed");
            self.inner.metric_sink.record_action(false, duration);
            self.inner.hooks.execute_failure_hook();
        }
    }
}

impl<P> Drop for ActionGuard<'_, P>
where
    P: BreakerPolicy,
{
    fn drop(&mut self) {
        if !self.completed {
            self.record(false);
        }
    }
}

/// Interruptible sleep shared between a breaker and its refresh thread.
struct ShutdownSignal {
    stopped: Mutex<bool>,
    condvar: Condvar,
}

impl ShutdownSignal {
    fn new() -> Self {
        Self {
            stopped: Mutex::new(false),
            condvar: Condvar::new(),
        }
    }

    /// Sleeps for `timeout` unless stopped first. Returns whether stopped.
    ///
    /// A timeout too large to express as a deadline sleeps until stopped.
    fn wait(&self, timeout: Duration) -> bool {
        let deadline = Instant::now().checked_add(timeout);
        let mut stopped = self.stopped.lock();

        while !*stopped {
            match deadline {
                Some(deadline) => {
                    if self.condvar.wait_until(&mut stopped, deadline).timed_out() {
                        break;
                    }
                }
                None => self.condvar.wait(&mut stopped),
            }
        }

        *stopped
    }

    fn stop(&self) {
        *self.stopped.lock() = true;
        self.condvar.notify_all();
    }
}

/// Owns the refresh thread; stops and joins it when dropped.
struct Supervisor {
    signal: Arc<ShutdownSignal>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl Supervisor {
    fn start<P: BreakerPolicy>(inner: Arc<BreakerInner<P>>) -> Self {
        let signal = Arc::new(ShutdownSignal::new());
        let loop_signal = Arc::clone(&signal);

        let handle = thread::Builder::new()
            .name("breaker-refresh".into())
            .spawn(move || inner.refresh_loop(&loop_signal));

        let handle = match handle {
            Ok(handle) => Some(handle),
            Err(err) => {
                error!(%err, "failed to spawn breaker refresh thread, metrics will not refresh");
                None
            }
        };

        Self {
            signal,
            handle: Mutex::new(handle),
        }
    }

    fn stop(&self) {
        self.signal.stop();

        if let Some(handle) = self.handle.lock().take() {
            if handle.thread().id() != thread::current().id() {
                let _ = handle.join();
            }
        }
    }
}

impl Drop for Supervisor {
    fn drop(&mut self) {
        self.stop();
    }
}
