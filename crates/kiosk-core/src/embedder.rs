//! FaceNet-128 face embedder via ONNX Runtime.
//!
//! Faces are resized to 160x160, normalized, batched once and run through
//! the model as an NHWC `1x160x160x3` tensor.

use image::imageops::{self, FilterType};
use image::RgbImage;
use ndarray::{Array2, Array3, Array4, ArrayView4, Axis};
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;

pub const FACENET_INPUT_SIZE: u32 = 160;
const FACENET_CHANNELS: usize = 3;

#[derive(Error, Debug)]
pub enum EmbeddingError {
    #[error("model file not found: {0} — export FaceNet-128 to ONNX and place it in the model dir")]
    ModelNotFound(String),
    #[error("face region is empty")]
    EmptyInput,
    #[error("embedding inference failed: {0}")]
    Compute(String),
    #[error("unexpected embedding output: {0}")]
    BadOutput(String),
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// Pixel normalization applied before inference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Normalization {
    /// Raw 0–255 values.
    #[default]
    Base,
    /// Per-image standardization: zero mean, unit variance.
    Facenet,
    /// Symmetric scaling to [-1, 1].
    Facenet2018,
}

impl FromStr for Normalization {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "base" => Ok(Self::Base),
            "facenet" => Ok(Self::Facenet),
            "facenet2018" => Ok(Self::Facenet2018),
            other => Err(format!("unknown normalization scheme: {other}")),
        }
    }
}

/// One preprocessed face in HWC layout, not yet batched.
#[derive(Debug, Clone)]
pub struct FaceTensor(Array3<f32>);

/// A batch holding exactly one face, NHWC.
///
/// Only obtainable by consuming a [`FaceTensor`], so the batch axis is
/// added exactly once.
#[derive(Debug, Clone)]
pub struct FaceBatch(Array4<f32>);

impl FaceTensor {
    /// Resize a face crop to the model input size and normalize it.
    pub fn from_region(region: &RgbImage, normalization: Normalization) -> Self {
        let size = FACENET_INPUT_SIZE;
        let resized = imageops::resize(region, size, size, FilterType::Triangle);
        let side = size as usize;

        let mut tensor = Array3::from_shape_fn((side, side, FACENET_CHANNELS), |(y, x, c)| {
            resized.get_pixel(x as u32, y as u32)[c] as f32
        });

        match normalization {
            Normalization::Base => {}
            Normalization::Facenet => {
                let n = tensor.len() as f32;
                let mean = tensor.sum() / n;
                let var = tensor.iter().map(|v| (v - mean).powi(2)).sum::<f32>() / n;
                // Floor matches TF's per_image_standardization on flat images.
                let std = var.sqrt().max(1.0 / n.sqrt());
                tensor.mapv_inplace(|v| (v - mean) / std);
            }
            Normalization::Facenet2018 => tensor.mapv_inplace(|v| v / 127.5 - 1.0),
        }

        Self(tensor)
    }

    pub fn shape(&self) -> &[usize] {
        self.0.shape()
    }

    pub fn into_batch(self) -> FaceBatch {
        FaceBatch(self.0.insert_axis(Axis(0)))
    }
}

impl FaceBatch {
    pub fn shape(&self) -> &[usize] {
        self.0.shape()
    }

    pub fn view(&self) -> ArrayView4<'_, f32> {
        self.0.view()
    }

    /// Number of faces in the batch.
    pub fn len(&self) -> usize {
        self.0.len_of(Axis(0))
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// The opaque embedding function: batched faces in, one row per face out.
pub trait EmbeddingModel: Send {
    fn infer(&mut self, batch: &FaceBatch) -> Result<Array2<f32>, EmbeddingError>;
}

/// FaceNet-128 embedder backed by an ONNX session.
pub struct FaceNetEmbedder {
    session: Session,
}

impl FaceNetEmbedder {
    /// Load the FaceNet ONNX model from the given path.
    pub fn load(model_path: &str) -> Result<Self, EmbeddingError> {
        if !Path::new(model_path).exists() {
            return Err(EmbeddingError::ModelNotFound(model_path.to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(model_path)?;

        tracing::info!(
            path = model_path,
            inputs = ?session.inputs().iter().map(|i| (i.name(), i.dtype())).collect::<Vec<_>>(),
            outputs = ?session.outputs().iter().map(|o| o.name()).collect::<Vec<_>>(),
            "loaded FaceNet model"
        );

        Ok(Self { session })
    }
}

impl EmbeddingModel for FaceNetEmbedder {
    fn infer(&mut self, batch: &FaceBatch) -> Result<Array2<f32>, EmbeddingError> {
        let outputs = self
            .session
            .run(ort::inputs![TensorRef::from_array_view(batch.view())?])?;

        let (_, raw) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| EmbeddingError::Compute(format!("embedding extraction: {e}")))?;

        let rows = batch.len();
        if rows == 0 || raw.len() % rows != 0 {
            return Err(EmbeddingError::BadOutput(format!(
                "{} values cannot be split into {rows} rows",
                raw.len()
            )));
        }

        Array2::from_shape_vec((rows, raw.len() / rows), raw.to_vec())
            .map_err(|e| EmbeddingError::BadOutput(e.to_string()))
    }
}
