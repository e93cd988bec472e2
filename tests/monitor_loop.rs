//! Monitor loop resilience and cancellation behavior, driven by scripted
//! source/sink fakes instead of hardware and network.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use busyness_sensor::{
    CycleOutcome, Frame, FrameSource, Monitor, MonitorSettings, MonitorState, Observation,
    ObservationSink, SourceError, SourceStats, StopHandle, UploadError, FALLBACK_SCORE,
};

/// Yields a scripted sequence of read results, then repeats the last-frame
/// behavior (a fresh solid frame) forever.
struct ScriptedSource {
    script: VecDeque<Result<Frame, SourceError>>,
    frames_read: u64,
}

impl ScriptedSource {
    fn new(script: Vec<Result<Frame, SourceError>>) -> Self {
        Self {
            script: script.into(),
            frames_read: 0,
        }
    }

    fn healthy() -> Self {
        Self::new(vec![])
    }
}

impl FrameSource for ScriptedSource {
    fn read_frame(&mut self) -> Result<Frame, SourceError> {
        self.frames_read += 1;
        match self.script.pop_front() {
            Some(result) => result,
            None => Ok(Frame::solid(32, 24, [90, 90, 90])),
        }
    }

    fn stats(&self) -> SourceStats {
        SourceStats {
            frames_captured: self.frames_read,
            device: "scripted".to_string(),
        }
    }
}

/// Records published observations; fails the first `fail_first` publishes
/// and requests a stop once `stop_after` publishes were attempted.
struct ScriptedSink {
    fail_first: u32,
    stop_after: u32,
    stop: StopHandle,
    attempts: Mutex<u32>,
    published: Mutex<Vec<Observation>>,
}

impl ScriptedSink {
    fn new(fail_first: u32, stop_after: u32, stop: StopHandle) -> Self {
        Self {
            fail_first,
            stop_after,
            stop,
            attempts: Mutex::new(0),
            published: Mutex::new(Vec::new()),
        }
    }
}

impl ObservationSink for &ScriptedSink {
    fn publish(&self, observation: &Observation) -> Result<(), UploadError> {
        let mut attempts = self.attempts.lock().unwrap();
        *attempts += 1;
        let attempt = *attempts;
        if attempt >= self.stop_after {
            self.stop.stop();
        }
        if attempt <= self.fail_first {
            return Err(UploadError::Transport("connection reset".to_string()));
        }
        self.published.lock().unwrap().push(observation.clone());
        Ok(())
    }
}

fn settings() -> MonitorSettings {
    MonitorSettings {
        interval: Duration::from_millis(1),
        camera_name: "camera-0".to_string(),
        notes: "loop test".to_string(),
    }
}

#[test]
fn failed_upload_does_not_stop_the_loop() {
    let stop = StopHandle::new();
    let sink = ScriptedSink::new(1, 3, stop.clone());
    let mut monitor = Monitor::new(ScriptedSource::healthy(), &sink, settings(), stop);

    monitor.run();

    // First upload failed, the loop ran two more cycles anyway.
    assert_eq!(monitor.cycles_total(), 3);
    assert_eq!(monitor.cycles_failed(), 1);
    assert_eq!(sink.published.lock().unwrap().len(), 2);
    assert_eq!(monitor.state(), MonitorState::Stopped);
}

#[test]
fn capture_failure_skips_the_cycle_and_continues() {
    let stop = StopHandle::new();
    let sink = ScriptedSink::new(0, 1, stop.clone());
    let source = ScriptedSource::new(vec![Err(SourceError::Capture(
        "device returned no frame".to_string(),
    ))]);
    let mut monitor = Monitor::new(source, &sink, settings(), stop);

    monitor.run();

    // Cycle 1 failed at capture (no publish attempt), cycle 2 uploaded.
    assert_eq!(monitor.cycles_total(), 2);
    assert_eq!(monitor.cycles_failed(), 1);
    assert_eq!(sink.published.lock().unwrap().len(), 1);
}

#[test]
fn run_once_executes_exactly_one_cycle() {
    let stop = StopHandle::new();
    let sink = ScriptedSink::new(0, u32::MAX, stop.clone());
    let mut monitor = Monitor::new(ScriptedSource::healthy(), &sink, settings(), stop);

    assert_eq!(monitor.state(), MonitorState::Ready);
    let outcome = monitor.run_once();

    assert_eq!(outcome, CycleOutcome::Uploaded);
    assert_eq!(monitor.cycles_total(), 1);
    assert_eq!(monitor.state(), MonitorState::Stopped);

    let published = sink.published.lock().unwrap();
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].camera_name, "camera-0");
    assert_eq!(published[0].notes, "loop test");
    assert!((1..=10).contains(&published[0].score));
}

#[test]
fn run_once_reports_upload_failure() {
    let stop = StopHandle::new();
    let sink = ScriptedSink::new(u32::MAX, u32::MAX, stop.clone());
    let mut monitor = Monitor::new(ScriptedSource::healthy(), &sink, settings(), stop);

    assert_eq!(monitor.run_once(), CycleOutcome::Failed);
    assert_eq!(monitor.cycles_failed(), 1);
}

#[test]
fn pending_stop_prevents_any_cycle() {
    let stop = StopHandle::new();
    stop.stop();
    let sink = ScriptedSink::new(0, u32::MAX, stop.clone());
    let mut monitor = Monitor::new(ScriptedSource::healthy(), &sink, settings(), stop);

    monitor.run();

    assert_eq!(monitor.cycles_total(), 0);
    assert_eq!(monitor.state(), MonitorState::Stopped);
}

#[test]
fn malformed_frame_uploads_a_degraded_observation() {
    let stop = StopHandle::new();
    let sink = ScriptedSink::new(0, u32::MAX, stop.clone());
    let source = ScriptedSource::new(vec![Ok(Frame::new(8, 8, vec![1, 2, 3]))]);
    let mut monitor = Monitor::new(source, &sink, settings(), stop);

    // Degraded scoring is not a cycle failure: the fallback record uploads.
    assert_eq!(monitor.run_once(), CycleOutcome::Uploaded);
    assert_eq!(monitor.cycles_failed(), 0);

    let published = sink.published.lock().unwrap();
    assert_eq!(published[0].score, FALLBACK_SCORE);
    assert!(published[0].report.error.is_some());
}
