use kiosk_core::Normalization;
use kiosk_hw::Credentials;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::scheduler::{Intervals, SizeGate};

#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("{0} is not set")]
    Missing(&'static str),
    #[error("{key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

/// Daemon configuration, loaded from `KIOSK_*` environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Proximity sensor endpoint; unset means the sensor never reports motion.
    pub sensor_url: Option<String>,
    /// Falls back to the camera credentials when unset.
    pub sensor_credentials: Option<Credentials>,
    pub sensor_timeout: Duration,
    /// Snapshot endpoint of the IP camera.
    pub camera_url: Option<String>,
    pub camera_credentials: Option<Credentials>,
    pub camera_timeout: Duration,
    /// Remote ingestion endpoint.
    pub api_url: Option<String>,
    pub api_timeout: Duration,
    pub kiosk_id: String,
    /// Poll interval while idle or after a large-enough face.
    pub cold_interval: Duration,
    /// Poll interval while a person may be approaching or leaving.
    pub hot_interval: Duration,
    /// Minimum face width as a fraction of frame width.
    pub min_width_fraction: f32,
    /// Minimum face height as a fraction of frame height.
    pub min_height_fraction: f32,
    /// Directory containing ONNX model files.
    pub model_dir: PathBuf,
    /// Directory receiving the local copy of every dispatch.
    pub store_dir: PathBuf,
    pub jpeg_quality: u8,
    pub normalization: Normalization,
}

impl Config {
    /// Load configuration from the process environment with defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let camera_credentials =
            Credentials::from_parts(get("KIOSK_CAMERA_USERNAME"), get("KIOSK_CAMERA_PASSWORD"));
        let sensor_credentials =
            Credentials::from_parts(get("KIOSK_SENSOR_USERNAME"), get("KIOSK_SENSOR_PASSWORD"))
                .or_else(|| camera_credentials.clone());

        Self {
            sensor_url: get("KIOSK_SENSOR_URL"),
            sensor_credentials,
            sensor_timeout: secs(get("KIOSK_SENSOR_TIMEOUT_SECS"), 3.0),
            camera_url: get("KIOSK_CAMERA_URL"),
            camera_credentials,
            camera_timeout: secs(get("KIOSK_CAMERA_TIMEOUT_SECS"), 5.0),
            api_url: get("KIOSK_API_URL"),
            api_timeout: secs(get("KIOSK_API_TIMEOUT_SECS"), 10.0),
            kiosk_id: get("KIOSK_ID").unwrap_or_else(|| "1".to_string()),
            cold_interval: secs(get("KIOSK_COLD_INTERVAL_SECS"), 1.0),
            hot_interval: secs(get("KIOSK_HOT_INTERVAL_SECS"), 0.8),
            min_width_fraction: parse_or(get("KIOSK_MIN_WIDTH_FRACTION"), 0.25),
            min_height_fraction: parse_or(get("KIOSK_MIN_HEIGHT_FRACTION"), 0.25),
            model_dir: get("KIOSK_MODEL_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("models")),
            store_dir: get("KIOSK_STORE_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("stored_data")),
            jpeg_quality: parse_or(get("KIOSK_JPEG_QUALITY"), 90),
            normalization: parse_or(get("KIOSK_EMBED_NORMALIZATION"), Normalization::Base),
        }
    }

    /// Check numeric ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (key, value) in [
            ("KIOSK_MIN_WIDTH_FRACTION", self.min_width_fraction),
            ("KIOSK_MIN_HEIGHT_FRACTION", self.min_height_fraction),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::Invalid {
                    key,
                    reason: format!("{value} is outside [0, 1]"),
                });
            }
        }
        if !(1..=100).contains(&self.jpeg_quality) {
            return Err(ConfigError::Invalid {
                key: "KIOSK_JPEG_QUALITY",
                reason: format!("{} is outside 1..=100", self.jpeg_quality),
            });
        }
        Ok(())
    }

    pub fn camera_url(&self) -> Result<&str, ConfigError> {
        self.camera_url
            .as_deref()
            .ok_or(ConfigError::Missing("KIOSK_CAMERA_URL"))
    }

    pub fn api_url(&self) -> Result<&str, ConfigError> {
        self.api_url.as_deref().ok_or(ConfigError::Missing("KIOSK_API_URL"))
    }

    pub fn intervals(&self) -> Intervals {
        Intervals {
            cold: self.cold_interval,
            hot: self.hot_interval,
        }
    }

    pub fn size_gate(&self) -> SizeGate {
        SizeGate {
            min_width_fraction: self.min_width_fraction,
            min_height_fraction: self.min_height_fraction,
        }
    }

    /// Path to the SCRFD detection model.
    pub fn scrfd_model_path(&self) -> String {
        self.model_dir
            .join("det_10g.onnx")
            .to_string_lossy()
            .into_owned()
    }

    /// Path to the FaceNet-128 embedding model.
    pub fn facenet_model_path(&self) -> String {
        self.model_dir
            .join("facenet128.onnx")
            .to_string_lossy()
            .into_owned()
    }
}

fn parse_or<T: std::str::FromStr>(value: Option<String>, default: T) -> T {
    value.and_then(|v| v.trim().parse().ok()).unwrap_or(default)
}

/// Positive, finite seconds; anything else keeps the default.
fn secs(value: Option<String>, default: f64) -> Duration {
    let secs: f64 = parse_or(value, default);
    Duration::try_from_secs_f64(secs)
        .ok()
        .filter(|d| !d.is_zero())
        .unwrap_or_else(|| Duration::from_secs_f64(default))
}
