//! Camera busyness sensor.
//!
//! Periodically samples a video source, computes a bounded 1..10
//! "busyness" score from low-level image statistics, and persists each
//! observation to a remote store over HTTP.
//!
//! # Module structure
//!
//! - `frame`: RGB8 frame container and synthetic scene builders
//! - `source`: frame sources (`stub://` synthetic, V4L2 devices)
//! - `score`: the busyness evaluator and its background-model state
//! - `upload`: observation records and the HTTP upload client
//! - `monitor`: the capture -> score -> upload session loop
//! - `config`: layered file/env configuration
//!
//! The scoring heuristic is fixed and explainable, not a trained model:
//! five normalized signals (motion, edges, color variance, texture,
//! contours) under a convex combination, quantized into 1..10. Every
//! observation carries the raw signal values so scores can be re-derived.

pub mod config;
pub mod frame;
pub mod monitor;
pub mod score;
pub mod source;
pub mod upload;

pub use config::{CaptureSettings, SensorConfig, UploadSettings};
pub use frame::Frame;
pub use monitor::{CycleOutcome, Monitor, MonitorSettings, MonitorState, StopHandle};
pub use score::{BusynessEvaluator, ScoreOutcome, SignalReport, FALLBACK_SCORE};
pub use source::{CameraSource, FrameSource, SourceError, SourceStats};
pub use upload::{
    Observation, ObservationSink, UploadClient, UploadError, INSERT_OBSERVATION_SQL,
};
