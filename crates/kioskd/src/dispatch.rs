//! Dispatch of an embedding and its frame to the ingestion API, with the
//! local copy written after every attempt.

use crate::store::{LocalStore, StoredRecord};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use kiosk_core::Embedding;
use kiosk_hw::{Frame, FrameError};
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("frame encoding failed: {0}")]
    Encode(#[from] FrameError),
    #[error("ingestion API unreachable: {0}")]
    Transport(String),
}

/// JSON body posted to the ingestion API.
#[derive(Debug, Serialize)]
pub struct IngestPayload<'a> {
    pub kiosk_id: &'a str,
    pub camera_url: &'a str,
    pub embedding: &'a Embedding,
    /// Frame capture time, fractional Unix seconds.
    pub time_stamp: f64,
    /// Base64 of the full-frame JPEG.
    pub photo: String,
}

/// Status and raw body returned by the API, including error statuses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiResponse {
    pub status: u16,
    pub body: String,
}

pub trait IngestClient: Send {
    fn send(&mut self, payload: &IngestPayload<'_>) -> Result<ApiResponse, DispatchError>;
}

/// Blocking HTTP client for the ingestion endpoint.
pub struct HttpIngestClient {
    agent: ureq::Agent,
    url: String,
}

impl HttpIngestClient {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            agent: kiosk_hw::http::agent(timeout),
            url: url.into(),
        }
    }
}

impl IngestClient for HttpIngestClient {
    fn send(&mut self, payload: &IngestPayload<'_>) -> Result<ApiResponse, DispatchError> {
        match self.agent.post(&self.url).send_json(payload) {
            Ok(resp) => {
                let status = resp.status();
                let body = resp
                    .into_string()
                    .map_err(|e| DispatchError::Transport(format!("reading response: {e}")))?;
                Ok(ApiResponse { status, body })
            }
            // Error statuses are still answers from the server.
            Err(ureq::Error::Status(status, resp)) => Ok(ApiResponse {
                status,
                body: resp.into_string().unwrap_or_default(),
            }),
            Err(ureq::Error::Transport(t)) => Err(DispatchError::Transport(t.to_string())),
        }
    }
}

/// What happened to one dispatch attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchReport {
    /// `None` when the request never reached the server.
    pub status: Option<u16>,
    /// `None` when the local copy could not be written.
    pub stored: Option<StoredRecord>,
}

/// Sends embeddings upstream and keeps the local fallback trail.
pub struct Dispatcher {
    client: Box<dyn IngestClient>,
    store: LocalStore,
    kiosk_id: String,
    camera_url: String,
    jpeg_quality: u8,
}

impl Dispatcher {
    pub fn new(
        client: Box<dyn IngestClient>,
        store: LocalStore,
        kiosk_id: impl Into<String>,
        camera_url: impl Into<String>,
        jpeg_quality: u8,
    ) -> Self {
        Self {
            client,
            store,
            kiosk_id: kiosk_id.into(),
            camera_url: camera_url.into(),
            jpeg_quality,
        }
    }

    /// Encode the full frame, send it with the embedding, then persist the
    /// image and the outcome locally whatever the send result was.
    ///
    /// Only an encoding failure is returned as an error; nothing is sent or
    /// stored in that case.
    pub fn dispatch(
        &mut self,
        embedding: &Embedding,
        frame: &Frame,
    ) -> Result<DispatchReport, DispatchError> {
        let jpeg = frame.encode_jpeg(self.jpeg_quality)?;

        let payload = IngestPayload {
            kiosk_id: &self.kiosk_id,
            camera_url: &self.camera_url,
            embedding,
            time_stamp: frame.timestamp_secs(),
            photo: STANDARD.encode(&jpeg),
        };
        tracing::debug!(photo_len = payload.photo.len(), "dispatching embedding");

        let (status, body) = match self.client.send(&payload) {
            Ok(resp) => {
                tracing::info!(status = resp.status, response = %resp.body, "embedding sent");
                (Some(resp.status), resp.body)
            }
            Err(e) => {
                tracing::error!(error = %e, "dispatch failed");
                (None, serde_json::json!({ "error": e.to_string() }).to_string())
            }
        };

        let stored = match self.store.persist(&jpeg, status, &body) {
            Ok(stored) => Some(stored),
            Err(e) => {
                tracing::error!(error = %e, dir = %self.store.dir().display(), "local persistence failed");
                None
            }
        };

        Ok(DispatchReport { status, stored })
    }
}
