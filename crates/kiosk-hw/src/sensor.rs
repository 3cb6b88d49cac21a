//! Proximity sensor polled over HTTP.
//!
//! The sensor answers a basic-auth GET with JSON of the form
//! `{"LL": {"value": "1"}}`; the string `"1"` means motion, anything else
//! (including a missing field) means no motion.

use crate::http::{self, Credentials};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SensorError {
    #[error("sensor URL not configured")]
    NotConfigured,
    #[error("sensor unreachable at {url}: {reason}")]
    Unreachable { url: String, reason: String },
    #[error("invalid sensor response: {0}")]
    BadResponse(String),
}

/// What the sensor currently reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Motion {
    Detected,
    Idle,
}

/// Gate deciding whether the camera is worth looking at.
pub trait MotionSensor: Send {
    fn poll(&mut self) -> Result<Motion, SensorError>;
}

/// Interpret a sensor JSON body.
pub fn parse_motion(body: &serde_json::Value) -> Motion {
    match body.pointer("/LL/value").and_then(|v| v.as_str()) {
        Some("1") => Motion::Detected,
        _ => Motion::Idle,
    }
}

/// HTTP proximity sensor with a bounded request timeout.
pub struct ProximitySensor {
    agent: ureq::Agent,
    url: Option<String>,
    credentials: Option<Credentials>,
}

impl ProximitySensor {
    pub fn new(url: Option<String>, credentials: Option<Credentials>, timeout: Duration) -> Self {
        Self {
            agent: http::agent(timeout),
            url,
            credentials,
        }
    }
}

impl MotionSensor for ProximitySensor {
    fn poll(&mut self) -> Result<Motion, SensorError> {
        let url = self.url.as_deref().ok_or(SensorError::NotConfigured)?;

        let response = http::with_auth(self.agent.get(url), self.credentials.as_ref())
            .call()
            .map_err(|e| {
                let reason = match e {
                    ureq::Error::Status(code, _) => format!("HTTP {code}"),
                    ureq::Error::Transport(t) => t.to_string(),
                };
                SensorError::Unreachable {
                    url: url.to_string(),
                    reason,
                }
            })?;

        let body: serde_json::Value = response
            .into_json()
            .map_err(|e| SensorError::BadResponse(e.to_string()))?;

        let motion = parse_motion(&body);
        tracing::debug!(?motion, "sensor polled");
        Ok(motion)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_motion_detected() {
        assert_eq!(parse_motion(&json!({"LL": {"value": "1"}})), Motion::Detected);
    }

    #[test]
    fn test_parse_motion_idle() {
        assert_eq!(parse_motion(&json!({"LL": {"value": "0"}})), Motion::Idle);
    }

    #[test]
    fn test_parse_motion_requires_string_one() {
        assert_eq!(parse_motion(&json!({"LL": {"value": 1}})), Motion::Idle);
        assert_eq!(parse_motion(&json!({"LL": {}})), Motion::Idle);
        assert_eq!(parse_motion(&json!({})), Motion::Idle);
        assert_eq!(parse_motion(&json!([1, 2])), Motion::Idle);
    }

    #[test]
    fn test_poll_without_url() {
        let mut sensor = ProximitySensor::new(None, None, Duration::from_secs(1));
        assert!(matches!(sensor.poll(), Err(SensorError::NotConfigured)));
    }

    #[test]
    fn test_poll_unreachable() {
        // Nothing listens on the discard port.
        let mut sensor = ProximitySensor::new(
            Some("http://127.0.0.1:9/state".into()),
            None,
            Duration::from_secs(1),
        );
        assert!(matches!(sensor.poll(), Err(SensorError::Unreachable { .. })));
    }
}
