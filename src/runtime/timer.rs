//! Timers: one-shot [`Timer`] and self-rescheduling [`Repeater`].
//!
//! # Clock
//!
//! Pending timers are tokio sleeps on a single current-thread runtime owned
//! by [`Clock`] and driven on one launched thread (`botd-clock`).  A waiting
//! timer therefore costs no thread of its own.  When a timer fires, its job is
//! handed to the task launcher, so a slow job never delays other timers.
//!
//! # Repeater cadence
//!
//! On each firing a repeater schedules its next firing *before* launching the
//! current job.  The cadence is not skewed by job duration, and a job that
//! outlasts the interval overlaps with the next one: there is no mutual
//! exclusion between successive runs of the same job.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::runtime::{Builder, Handle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::core::error::TimerError;
use crate::runtime::launcher::launch_named;

/// Timer job.  Shared because a repeater runs it many times.
pub type Job = Arc<dyn Fn() + Send + Sync>;

// ── Clock ────────────────────────────────────────────────────────────────────

/// Runtime that drives every pending timer.  Clone freely.
#[derive(Clone)]
pub struct Clock {
    handle: Handle,
    shutdown: CancellationToken,
}

impl Clock {
    /// Build the timer runtime and launch the thread that drives it.
    pub fn new() -> Result<Self, TimerError> {
        let runtime = Builder::new_current_thread()
            .enable_time()
            .build()
            .map_err(TimerError::Runtime)?;
        let handle = runtime.handle().clone();
        let shutdown = CancellationToken::new();

        let token = shutdown.clone();
        launch_named("botd-clock", move || {
            runtime.block_on(token.cancelled());
            debug!("clock stopped");
        })?;

        Ok(Self { handle, shutdown })
    }

    /// Drop every pending timer and stop the clock thread.
    pub fn shutdown(&self) {
        info!("clock shutting down");
        self.shutdown.cancel();
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.is_cancelled()
    }
}

// ── TimerState ───────────────────────────────────────────────────────────────

#[derive(Default)]
struct TimerState {
    started_at: Option<DateTime<Utc>>,
    last_fire: Option<DateTime<Utc>>,
    fires: u64,
    /// Bumped on every schedule; identifies the pending firing.
    generation: u64,
    pending: Option<CancellationToken>,
}

/// Point-in-time view of a timer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimerSnapshot {
    pub name: String,
    pub started_at: Option<DateTime<Utc>>,
    pub last_fire: Option<DateTime<Utc>>,
    pub fires: u64,
    pub pending: bool,
}

/// Cancels the firing it was returned for, without touching later ones.
#[derive(Debug, Clone)]
pub struct TimerGuard {
    token: CancellationToken,
}

impl TimerGuard {
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

// ── Timer ────────────────────────────────────────────────────────────────────

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mode {
    Once,
    Repeat,
}

struct TimerInner {
    name: String,
    delay: Duration,
    job: Job,
    clock: Clock,
    mode: Mode,
    state: Mutex<TimerState>,
}

/// Runs a job once, `delay` after [`Timer::start`].
#[derive(Clone)]
pub struct Timer {
    inner: Arc<TimerInner>,
}

impl Timer {
    pub fn new<F>(clock: &Clock, delay: Duration, job: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        Self::build(clock, delay, Arc::new(job), Mode::Once, "timer".to_string())
    }

    fn build(clock: &Clock, delay: Duration, job: Job, mode: Mode, name: String) -> Self {
        Self {
            inner: Arc::new(TimerInner {
                name,
                delay,
                job,
                clock: clock.clone(),
                mode,
                state: Mutex::new(TimerState::default()),
            }),
        }
    }

    /// Rename the timer; the name is also used for the job's thread.
    pub fn named(self, name: impl Into<String>) -> Self {
        let inner = &self.inner;
        Self::build(&inner.clock, inner.delay, inner.job.clone(), inner.mode, name.into())
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn delay(&self) -> Duration {
        self.inner.delay
    }

    /// Schedule a firing `delay` from now.
    ///
    /// A firing still pending from an earlier `start` is cancelled.  The
    /// returned guard cancels this particular firing.
    pub fn start(&self) -> TimerGuard {
        let mut state = self.state();
        let now = Utc::now();
        state.started_at = Some(now);
        state.last_fire = Some(now);
        TimerGuard { token: self.schedule(&mut state) }
    }

    fn schedule(&self, state: &mut TimerState) -> CancellationToken {
        let token = self.inner.clock.shutdown.child_token();
        state.generation += 1;
        if let Some(previous) = state.pending.replace(token.clone()) {
            previous.cancel();
        }
        let generation = state.generation;

        let timer = self.clone();
        let fired = token.clone();
        let delay = self.inner.delay;
        self.inner.clock.handle.spawn(async move {
            tokio::select! {
                biased;
                _ = fired.cancelled() => {
                    trace!(timer = %timer.inner.name, "pending firing cancelled");
                }
                _ = tokio::time::sleep(delay) => timer.run(&fired, generation),
            }
        });

        trace!(timer = %self.inner.name, ?delay, "timer scheduled");
        token
    }

    /// Fire now: record the firing, reschedule if repeating, launch the job.
    fn run(&self, fired: &CancellationToken, generation: u64) {
        {
            let mut state = self.state();
            // `exit` cancels under this lock, so a racing exit is always seen
            // and no further firing gets scheduled after it.
            if fired.is_cancelled() {
                return;
            }
            state.last_fire = Some(Utc::now());
            state.fires += 1;
            match self.inner.mode {
                Mode::Repeat => {
                    self.schedule(&mut state);
                }
                Mode::Once => {
                    if state.generation == generation {
                        state.pending = None;
                    }
                }
            }
        }

        let job = self.inner.job.clone();
        if let Err(e) = launch_named(self.inner.name.clone(), move || job()) {
            warn!(timer = %self.inner.name, error = %e, "failed to launch timer job");
        }
    }

    /// Cancel the pending firing, if any.  Safe to call repeatedly.
    pub fn exit(&self) {
        let mut state = self.state();
        if let Some(token) = state.pending.take() {
            token.cancel();
            debug!(timer = %self.inner.name, "timer cancelled");
        }
    }

    pub fn snapshot(&self) -> TimerSnapshot {
        let state = self.state();
        TimerSnapshot {
            name: self.inner.name.clone(),
            started_at: state.started_at,
            last_fire: state.last_fire,
            fires: state.fires,
            pending: state.pending.as_ref().is_some_and(|t| !t.is_cancelled()),
        }
    }

    fn state(&self) -> std::sync::MutexGuard<'_, TimerState> {
        self.inner.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

// ── Repeater ─────────────────────────────────────────────────────────────────

/// Runs a job every `interval` until [`Repeater::exit`].
///
/// Jobs may overlap when one outlasts the interval; callers that need
/// exclusivity must provide it inside the job.
#[derive(Clone)]
pub struct Repeater {
    timer: Timer,
}

impl Repeater {
    pub fn new<F>(
        clock: &Clock,
        interval: Duration,
        name: impl Into<String>,
        job: F,
    ) -> Result<Self, TimerError>
    where
        F: Fn() + Send + Sync + 'static,
    {
        let name = name.into();
        if interval.is_zero() {
            return Err(TimerError::ZeroInterval(name));
        }
        Ok(Self {
            timer: Timer::build(clock, interval, Arc::new(job), Mode::Repeat, name),
        })
    }

    pub fn start(&self) -> TimerGuard {
        self.timer.start()
    }

    pub fn exit(&self) {
        self.timer.exit();
    }

    pub fn interval(&self) -> Duration {
        self.timer.delay()
    }

    pub fn snapshot(&self) -> TimerSnapshot {
        self.timer.snapshot()
    }
}
