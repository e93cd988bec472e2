//! Layered sensor configuration.
//!
//! Precedence, lowest to highest: built-in defaults, JSON config file
//! named by `BUSY_CONFIG`, `BUSY_*` environment variables, CLI flags
//! (applied by the binary). Credentials never live in the config file;
//! they arrive via CLI flags or their env fallbacks.

use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

const DEFAULT_DEVICE: &str = "stub://camera";
const DEFAULT_WIDTH: u32 = 1280;
const DEFAULT_HEIGHT: u32 = 720;
const DEFAULT_TARGET_FPS: u32 = 30;
const DEFAULT_INTERVAL_SECS: u64 = 5;
const DEFAULT_API_BASE: &str = "https://api.cloudflare.com/client/v4";

#[derive(Debug, Deserialize, Default)]
struct SensorConfigFile {
    capture: Option<CaptureConfigFile>,
    interval_secs: Option<u64>,
    api_base: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct CaptureConfigFile {
    device: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    target_fps: Option<u32>,
}

/// Capture device settings applied at open time.
#[derive(Clone, Debug)]
pub struct CaptureSettings {
    /// Device path (`/dev/videoN`) or `stub://` scene name.
    pub device: String,
    pub width: u32,
    pub height: u32,
    pub target_fps: u32,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            device: DEFAULT_DEVICE.to_string(),
            width: DEFAULT_WIDTH,
            height: DEFAULT_HEIGHT,
            target_fps: DEFAULT_TARGET_FPS,
        }
    }
}

/// Remote persistence endpoint settings.
#[derive(Clone, Debug)]
pub struct UploadSettings {
    /// API base, overridable for tests (`BUSY_API_BASE`).
    pub api_base: String,
    pub account_id: String,
    pub database_id: String,
    pub api_token: String,
}

impl UploadSettings {
    /// Per-database query endpoint.
    pub fn endpoint(&self) -> String {
        format!(
            "{}/accounts/{}/d1/database/{}/query",
            self.api_base.trim_end_matches('/'),
            self.account_id,
            self.database_id
        )
    }
}

#[derive(Clone, Debug)]
pub struct SensorConfig {
    pub capture: CaptureSettings,
    pub interval: Duration,
    pub api_base: String,
}

impl SensorConfig {
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("BUSY_CONFIG").ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) => read_config_file(Path::new(path))?,
            None => SensorConfigFile::default(),
        };
        let mut cfg = Self::from_file(file_cfg);
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: SensorConfigFile) -> Self {
        let capture = file.capture.unwrap_or_default();
        Self {
            capture: CaptureSettings {
                device: capture.device.unwrap_or_else(|| DEFAULT_DEVICE.to_string()),
                width: capture.width.unwrap_or(DEFAULT_WIDTH),
                height: capture.height.unwrap_or(DEFAULT_HEIGHT),
                target_fps: capture.target_fps.unwrap_or(DEFAULT_TARGET_FPS),
            },
            interval: Duration::from_secs(file.interval_secs.unwrap_or(DEFAULT_INTERVAL_SECS)),
            api_base: file.api_base.unwrap_or_else(|| DEFAULT_API_BASE.to_string()),
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(device) = std::env::var("BUSY_DEVICE") {
            if !device.trim().is_empty() {
                self.capture.device = device;
            }
        }
        if let Ok(base) = std::env::var("BUSY_API_BASE") {
            if !base.trim().is_empty() {
                self.api_base = base;
            }
        }
        if let Ok(interval) = std::env::var("BUSY_INTERVAL_SECS") {
            let seconds: u64 = interval
                .parse()
                .map_err(|_| anyhow!("BUSY_INTERVAL_SECS must be an integer number of seconds"))?;
            self.interval = Duration::from_secs(seconds);
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.capture.width == 0 || self.capture.height == 0 {
            return Err(anyhow!("capture resolution must be non-zero"));
        }
        if self.interval.as_secs() == 0 {
            return Err(anyhow!("capture interval must be greater than zero"));
        }
        if self.api_base.trim().is_empty() {
            return Err(anyhow!("api base url must not be empty"));
        }
        Ok(())
    }
}

fn read_config_file(path: &Path) -> Result<SensorConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let cfg = serde_json::from_str(&raw)
        .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?;
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_joins_base_and_database() {
        let settings = UploadSettings {
            api_base: "https://api.example.com/v4/".to_string(),
            account_id: "acct".to_string(),
            database_id: "db".to_string(),
            api_token: "tok".to_string(),
        };
        assert_eq!(
            settings.endpoint(),
            "https://api.example.com/v4/accounts/acct/d1/database/db/query"
        );
    }

    #[test]
    fn defaults_are_valid() {
        let cfg = SensorConfig::from_file(SensorConfigFile::default());
        cfg.validate().unwrap();
        assert_eq!(cfg.capture.device, DEFAULT_DEVICE);
        assert_eq!(cfg.interval, Duration::from_secs(DEFAULT_INTERVAL_SECS));
    }

    #[test]
    fn zero_interval_is_rejected() {
        let mut cfg = SensorConfig::from_file(SensorConfigFile::default());
        cfg.interval = Duration::ZERO;
        assert!(cfg.validate().is_err());
    }
}
