//! Snapshot camera: fetches one still image per read over HTTP.

use crate::frame::Frame;
use crate::http::{self, Credentials};
use chrono::Utc;
use image::RgbImage;
use std::io::Read;
use std::time::Duration;
use thiserror::Error;

/// Upper bound on a single snapshot body.
const MAX_SNAPSHOT_BYTES: u64 = 16 * 1024 * 1024;

#[derive(Error, Debug)]
pub enum CameraError {
    #[error("camera stream cannot be opened at {url}: {reason}")]
    StartupFailure { url: String, reason: String },
    #[error("frame unavailable: {0}")]
    FrameUnavailable(String),
}

/// Source of timestamped RGB frames.
pub trait VideoSource: Send {
    fn read_frame(&mut self) -> Result<Frame, CameraError>;
}

/// IP camera exposing a JPEG/PNG snapshot endpoint.
pub struct SnapshotCamera {
    agent: ureq::Agent,
    url: String,
    credentials: Option<Credentials>,
    sequence: u64,
    pub width: u32,
    pub height: u32,
}

impl SnapshotCamera {
    /// Connect and fetch a probe frame. Fails fast if the camera is unusable.
    pub fn open(
        url: &str,
        credentials: Option<Credentials>,
        timeout: Duration,
    ) -> Result<Self, CameraError> {
        let mut camera = Self {
            agent: http::agent(timeout),
            url: url.to_string(),
            credentials,
            sequence: 0,
            width: 0,
            height: 0,
        };

        let probe = camera.fetch().map_err(|e| CameraError::StartupFailure {
            url: url.to_string(),
            reason: e.to_string(),
        })?;
        camera.width = probe.width();
        camera.height = probe.height();

        Ok(camera)
    }

    fn fetch(&self) -> Result<RgbImage, CameraError> {
        let response = http::with_auth(self.agent.get(&self.url), self.credentials.as_ref())
            .call()
            .map_err(|e| CameraError::FrameUnavailable(e.to_string()))?;

        let mut bytes = Vec::new();
        response
            .into_reader()
            .take(MAX_SNAPSHOT_BYTES)
            .read_to_end(&mut bytes)
            .map_err(|e| CameraError::FrameUnavailable(format!("reading snapshot: {e}")))?;

        decode_snapshot(&bytes)
    }
}

impl VideoSource for SnapshotCamera {
    fn read_frame(&mut self) -> Result<Frame, CameraError> {
        let image = self.fetch()?;
        let captured_at = Utc::now();
        self.sequence += 1;
        Ok(Frame::new(image, captured_at, self.sequence))
    }
}

/// Decode a compressed snapshot into RGB.
pub fn decode_snapshot(bytes: &[u8]) -> Result<RgbImage, CameraError> {
    if bytes.is_empty() {
        return Err(CameraError::FrameUnavailable("empty snapshot body".into()));
    }
    let image = image::load_from_memory(bytes)
        .map_err(|e| CameraError::FrameUnavailable(format!("decoding snapshot: {e}")))?
        .to_rgb8();
    if image.width() == 0 || image.height() == 0 {
        return Err(CameraError::FrameUnavailable("zero-sized snapshot".into()));
    }
    Ok(image)
}
