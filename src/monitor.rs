//! Monitoring session: the capture -> score -> upload loop.
//!
//! One `Monitor` groups one frame source, one evaluator, one sink, and a
//! cadence. The loop is single-threaded and cooperative: a cycle always
//! runs to completion, and stop requests are observed at cycle boundaries
//! and during the inter-cycle sleep (which a `StopHandle` can cut short).
//!
//! Resilience contract: a bad frame, a degraded scoring pass, or a failed
//! upload marks the cycle failed and the loop keeps going. Only source
//! open failure (before the loop starts) and genuinely unexpected errors
//! are fatal.

use log::{debug, error, info, warn};
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

use crate::score::BusynessEvaluator;
use crate::source::FrameSource;
use crate::upload::{Observation, ObservationSink};

/// How often the continuous loop logs source health.
const HEALTH_LOG_INTERVAL: Duration = Duration::from_secs(30);

/// Session lifecycle states.
///
/// `Uninitialized -> Ready` happens when the caller opens the source and
/// constructs the monitor; open failure never produces a monitor, so a
/// constructed monitor starts at `Ready`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MonitorState {
    Uninitialized,
    Ready,
    Cycling,
    Idle,
    Stopped,
}

/// Result of one cycle. Degraded scoring still uploads, so it is not a
/// failure; failures are capture and upload errors.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CycleOutcome {
    Uploaded,
    Failed,
}

/// Cooperative stop signal shared between the monitor and signal handlers.
///
/// Backed by a mutex + condvar so a stop request interrupts the
/// inter-cycle sleep instead of waiting it out.
#[derive(Clone, Default)]
pub struct StopHandle {
    inner: Arc<(Mutex<bool>, Condvar)>,
}

impl StopHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request a stop and wake any sleeping monitor.
    pub fn stop(&self) {
        let (lock, cvar) = &*self.inner;
        let mut stopped = lock.lock().unwrap_or_else(|e| e.into_inner());
        *stopped = true;
        cvar.notify_all();
    }

    pub fn is_stopped(&self) -> bool {
        let (lock, _) = &*self.inner;
        *lock.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Sleep for up to `duration`. Returns true if a stop request arrived
    /// before the full duration elapsed (or was already pending).
    pub fn wait(&self, duration: Duration) -> bool {
        let (lock, cvar) = &*self.inner;
        let deadline = Instant::now() + duration;
        let mut stopped = lock.lock().unwrap_or_else(|e| e.into_inner());
        while !*stopped {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            let (guard, _timeout) = cvar
                .wait_timeout(stopped, deadline - now)
                .unwrap_or_else(|e| e.into_inner());
            stopped = guard;
        }
        true
    }
}

/// Session settings that are not capture or upload concerns.
#[derive(Clone, Debug)]
pub struct MonitorSettings {
    /// Inter-cycle sleep in continuous mode.
    pub interval: Duration,
    pub camera_name: String,
    /// Free-text session context persisted with every observation.
    pub notes: String,
}

/// One monitoring session.
///
/// Owns the evaluator state, so two cameras cannot share a background
/// model by construction: each needs its own `Monitor`.
pub struct Monitor<S: FrameSource, U: ObservationSink> {
    source: S,
    evaluator: BusynessEvaluator,
    sink: U,
    settings: MonitorSettings,
    stop: StopHandle,
    state: MonitorState,
    cycles_total: u64,
    cycles_failed: u64,
}

impl<S: FrameSource, U: ObservationSink> Monitor<S, U> {
    /// Build a session around an already-opened source.
    pub fn new(source: S, sink: U, settings: MonitorSettings, stop: StopHandle) -> Self {
        Self {
            source,
            evaluator: BusynessEvaluator::new(),
            sink,
            settings,
            stop,
            state: MonitorState::Ready,
            cycles_total: 0,
            cycles_failed: 0,
        }
    }

    pub fn state(&self) -> MonitorState {
        self.state
    }

    pub fn cycles_total(&self) -> u64 {
        self.cycles_total
    }

    pub fn cycles_failed(&self) -> u64 {
        self.cycles_failed
    }

    /// Execute exactly one cycle and stop, without sleeping.
    pub fn run_once(&mut self) -> CycleOutcome {
        let outcome = self.cycle();
        self.state = MonitorState::Stopped;
        self.log_totals();
        outcome
    }

    /// Run until a stop is requested.
    pub fn run(&mut self) {
        info!(
            "monitoring every {}s (camera '{}')",
            self.settings.interval.as_secs(),
            self.settings.camera_name
        );
        let mut last_health_log = Instant::now();

        while !self.stop.is_stopped() {
            self.cycle();

            if last_health_log.elapsed() >= HEALTH_LOG_INTERVAL {
                let stats = self.source.stats();
                info!(
                    "source health: {} frames from {}; cycles {} ({} failed)",
                    stats.frames_captured, stats.device, self.cycles_total, self.cycles_failed
                );
                last_health_log = Instant::now();
            }

            self.state = MonitorState::Idle;
            if self.stop.wait(self.settings.interval) {
                break;
            }
        }

        self.state = MonitorState::Stopped;
        self.log_totals();
    }

    /// One capture -> score -> upload unit of work. Sub-step failures are
    /// logged and absorbed here; they never escape the loop.
    fn cycle(&mut self) -> CycleOutcome {
        self.state = MonitorState::Cycling;
        self.cycles_total += 1;

        let frame = match self.source.read_frame() {
            Ok(frame) => frame,
            Err(err) => {
                warn!("cycle {}: {}", self.cycles_total, err);
                self.cycles_failed += 1;
                return CycleOutcome::Failed;
            }
        };

        let outcome = self.evaluator.score(&frame);
        if outcome.is_degraded() {
            warn!(
                "cycle {}: scoring degraded, using fallback score {}",
                self.cycles_total,
                outcome.score()
            );
        }

        let observation = Observation::capture(
            &outcome,
            &self.settings.notes,
            &self.settings.camera_name,
        );

        match self.sink.publish(&observation) {
            Ok(()) => {
                debug!(
                    "cycle {}: score={} combined_raw={:.4} uploaded at {}",
                    self.cycles_total,
                    observation.score,
                    observation.report.combined_raw,
                    observation.timestamp
                );
                CycleOutcome::Uploaded
            }
            Err(err) => {
                error!("cycle {}: upload failed: {}", self.cycles_total, err);
                self.cycles_failed += 1;
                CycleOutcome::Failed
            }
        }
    }

    fn log_totals(&self) {
        info!(
            "monitor stopped after {} cycles ({} failed)",
            self.cycles_total, self.cycles_failed
        );
    }
}
