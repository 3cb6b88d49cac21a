//! Durable local copy of every dispatch attempt.
//!
//! Each attempt leaves two files named by the local timestamp: the JPEG that
//! was (or would have been) sent and a JSON record `{status, response}`.

use chrono::{DateTime, Local};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("serialize record: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Paths written for one dispatch attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredRecord {
    pub image_path: PathBuf,
    pub record_path: PathBuf,
}

#[derive(Serialize)]
struct Record {
    /// HTTP status, or null when the request never completed.
    status: Option<u16>,
    response: serde_json::Value,
}

pub struct LocalStore {
    dir: PathBuf,
}

impl LocalStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Write the image and the server's answer, stamped with the current time.
    pub fn persist(
        &self,
        image: &[u8],
        status: Option<u16>,
        response: &str,
    ) -> Result<StoredRecord, StoreError> {
        self.persist_at(Local::now(), image, status, response)
    }

    /// Both files are always attempted; the first failure is returned.
    pub fn persist_at(
        &self,
        at: DateTime<Local>,
        image: &[u8],
        status: Option<u16>,
        response: &str,
    ) -> Result<StoredRecord, StoreError> {
        fs::create_dir_all(&self.dir).map_err(|source| StoreError::Io {
            path: self.dir.clone(),
            source,
        })?;

        // Millisecond suffix keeps sub-second cycles from overwriting each other.
        let stem = at.format("%Y%m%d_%H%M%S_%3f").to_string();
        let image_path = self.dir.join(format!("{stem}.jpg"));
        let record_path = self.dir.join(format!("{stem}.json"));

        let image_result = fs::write(&image_path, image).map_err(|source| StoreError::Io {
            path: image_path.clone(),
            source,
        });
        let record_result = write_record(&record_path, status, response);

        image_result?;
        record_result?;

        tracing::debug!(
            image = %image_path.display(),
            record = %record_path.display(),
            "dispatch stored locally"
        );
        Ok(StoredRecord {
            image_path,
            record_path,
        })
    }
}

fn write_record(path: &Path, status: Option<u16>, response: &str) -> Result<(), StoreError> {
    let record = Record {
        status,
        response: parse_response(response),
    };
    let json = serde_json::to_vec_pretty(&record)?;
    fs::write(path, json).map_err(|source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// The response body as JSON when it parses, otherwise as a JSON string.
fn parse_response(body: &str) -> serde_json::Value {
    serde_json::from_str(body).unwrap_or_else(|_| serde_json::Value::String(body.to_string()))
}
