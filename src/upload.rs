//! Observation records and the upload client.
//!
//! Each monitoring cycle produces one immutable `Observation`. The upload
//! client serializes it into a parameterized insert - `{sql, params}` JSON
//! posted to the per-database endpoint with a bearer token - and treats
//! anything other than HTTP 200 with `success: true` in the body as a
//! failed upload. No retry happens inside a cycle; the next cycle is the
//! retry boundary.

use chrono::Local;
use serde::Serialize;
use serde_json::{json, Value};
use std::time::Duration;
use thiserror::Error;

use crate::config::UploadSettings;
use crate::score::{ScoreOutcome, SignalReport};

/// Per-call network timeout. A hung request must not stall the sampling
/// cadence indefinitely.
pub const UPLOAD_TIMEOUT: Duration = Duration::from_secs(30);

/// Insert statement with eleven positional parameters, in column order.
pub const INSERT_OBSERVATION_SQL: &str = "INSERT INTO busyness_data (timestamp, score, motion_ratio, edge_ratio, \
     color_variance, texture_variance, contour_count, combined_raw, \
     metadata, notes, camera_name) \
     VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)";

/// One scored, timestamped record. Never mutated after creation; it is
/// either persisted remotely or logged as a failed attempt.
#[derive(Clone, Debug, Serialize)]
pub struct Observation {
    /// ISO-8601 local-clock timestamp, microsecond precision.
    pub timestamp: String,
    pub score: u8,
    pub report: SignalReport,
    pub notes: String,
    pub camera_name: String,
}

impl Observation {
    /// Stamp a scoring outcome with the local clock.
    pub fn capture(outcome: &ScoreOutcome, notes: &str, camera_name: &str) -> Self {
        Self {
            timestamp: Local::now().format("%Y-%m-%dT%H:%M:%S%.6f").to_string(),
            score: outcome.score(),
            report: outcome.report().clone(),
            notes: notes.to_string(),
            camera_name: camera_name.to_string(),
        }
    }

    /// The eleven ordered bind parameters for `INSERT_OBSERVATION_SQL`.
    ///
    /// The ninth parameter is the JSON-serialized signal report, which is
    /// where a degraded outcome's error annotation travels.
    pub fn bind_params(&self) -> Result<Vec<Value>, serde_json::Error> {
        let metadata = serde_json::to_string(&self.report)?;
        Ok(vec![
            json!(self.timestamp),
            json!(self.score),
            json!(self.report.motion_ratio),
            json!(self.report.edge_ratio),
            json!(self.report.color_variance),
            json!(self.report.texture_variance),
            json!(self.report.contour_count),
            json!(self.report.combined_raw),
            json!(metadata),
            json!(self.notes),
            json!(self.camera_name),
        ])
    }
}

/// Upload failures. All variants are recoverable at the cycle boundary.
#[derive(Debug, Error)]
pub enum UploadError {
    #[error("http request failed: {0}")]
    Transport(String),

    #[error("endpoint returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("endpoint rejected insert: {0}")]
    Rejected(String),

    #[error("failed to encode payload: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Where observations go. The monitor is generic over this seam so tests
/// can script failures without a network.
pub trait ObservationSink {
    fn publish(&self, observation: &Observation) -> Result<(), UploadError>;
}

/// HTTP client for the remote persistence endpoint.
pub struct UploadClient {
    agent: ureq::Agent,
    endpoint: String,
    api_token: String,
}

impl UploadClient {
    pub fn new(settings: &UploadSettings) -> Self {
        Self {
            agent: ureq::AgentBuilder::new().timeout(UPLOAD_TIMEOUT).build(),
            endpoint: settings.endpoint(),
            api_token: settings.api_token.clone(),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl ObservationSink for UploadClient {
    fn publish(&self, observation: &Observation) -> Result<(), UploadError> {
        let payload = json!({
            "sql": INSERT_OBSERVATION_SQL,
            "params": observation.bind_params()?,
        });

        let response = self
            .agent
            .post(&self.endpoint)
            .set("Authorization", &format!("Bearer {}", self.api_token))
            .send_json(payload);

        match response {
            Ok(resp) => {
                let body: Value = resp
                    .into_json()
                    .map_err(|e| UploadError::Transport(format!("read response body: {}", e)))?;
                if body.get("success").and_then(Value::as_bool) == Some(true) {
                    Ok(())
                } else {
                    let errors = body
                        .get("errors")
                        .map(Value::to_string)
                        .unwrap_or_else(|| "unknown error".to_string());
                    Err(UploadError::Rejected(errors))
                }
            }
            Err(ureq::Error::Status(status, resp)) => Err(UploadError::Status {
                status,
                body: resp.into_string().unwrap_or_default(),
            }),
            Err(err) => Err(UploadError::Transport(err.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::Frame;
    use crate::score::BusynessEvaluator;

    fn sample_observation() -> Observation {
        let mut evaluator = BusynessEvaluator::new();
        let outcome = evaluator.score(&Frame::solid(64, 48, [200, 200, 200]));
        Observation::capture(&outcome, "desk test", "camera-0")
    }

    #[test]
    fn bind_params_are_eleven_in_column_order() {
        let obs = sample_observation();
        let params = obs.bind_params().unwrap();
        assert_eq!(params.len(), 11);

        assert_eq!(params[0], json!(obs.timestamp));
        assert_eq!(params[1], json!(obs.score));
        assert_eq!(params[2], json!(obs.report.motion_ratio));
        assert_eq!(params[3], json!(obs.report.edge_ratio));
        assert_eq!(params[4], json!(obs.report.color_variance));
        assert_eq!(params[5], json!(obs.report.texture_variance));
        assert_eq!(params[6], json!(obs.report.contour_count));
        assert_eq!(params[7], json!(obs.report.combined_raw));
        assert_eq!(params[9], json!("desk test"));
        assert_eq!(params[10], json!("camera-0"));

        // The metadata parameter is a JSON string re-encoding the report.
        let metadata = params[8].as_str().unwrap();
        let decoded: Value = serde_json::from_str(metadata).unwrap();
        assert_eq!(decoded["combined_raw"], json!(obs.report.combined_raw));
    }

    #[test]
    fn degraded_observation_still_binds_eleven_params() {
        let mut evaluator = BusynessEvaluator::new();
        let outcome = evaluator.score(&Frame::new(4, 4, vec![1, 2, 3]));
        let obs = Observation::capture(&outcome, "", "camera-0");

        let params = obs.bind_params().unwrap();
        assert_eq!(params.len(), 11);
        assert_eq!(params[1], json!(crate::score::FALLBACK_SCORE));

        let metadata = params[8].as_str().unwrap();
        let decoded: Value = serde_json::from_str(metadata).unwrap();
        assert!(decoded.get("error").is_some());
    }

    #[test]
    fn timestamp_is_iso8601_shaped() {
        let obs = sample_observation();
        // 2024-05-01T12:34:56.789012
        assert_eq!(obs.timestamp.len(), 26);
        assert_eq!(&obs.timestamp[4..5], "-");
        assert_eq!(&obs.timestamp[10..11], "T");
        assert_eq!(&obs.timestamp[19..20], ".");
    }
}
