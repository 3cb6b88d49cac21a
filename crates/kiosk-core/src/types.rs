use crate::geometry::BBox;
use image::RgbImage;
use serde::{Deserialize, Serialize};

/// Output dimension of the FaceNet-128 embedding model.
pub const EMBEDDING_DIM: usize = 128;

/// A face found by the detector, in frame pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DetectedFace {
    pub bbox: BBox,
    pub confidence: f32,
}

/// A detected face paired with its pixels, cropped from one frame.
///
/// Lives only until its embedding has been computed or discarded.
#[derive(Debug, Clone)]
pub struct Detection {
    pub region: RgbImage,
    pub bbox: BBox,
    pub confidence: f32,
}

/// Immutable face embedding vector of exactly [`EMBEDDING_DIM`] values.
///
/// Serializes as a plain numeric list.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Embedding {
    values: Vec<f32>,
}

impl Embedding {
    /// Wrap raw model output, rejecting wrong lengths and non-finite values.
    pub fn new(values: Vec<f32>) -> Option<Self> {
        if values.len() != EMBEDDING_DIM || !values.iter().all(|v| v.is_finite()) {
            return None;
        }
        Some(Self { values })
    }

    pub fn values(&self) -> &[f32] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
