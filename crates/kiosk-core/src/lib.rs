//! kiosk-core — Box geometry and the face extraction/embedding stage.
//!
//! Uses SCRFD for face detection and FaceNet-128 for embeddings,
//! both running via ONNX Runtime for CPU inference.

pub mod detector;
pub mod embedder;
pub mod extraction;
pub mod geometry;
pub mod types;

pub use detector::{DetectorError, FaceDetector, ScrfdDetector};
pub use embedder::{EmbeddingError, EmbeddingModel, FaceNetEmbedder, Normalization};
pub use extraction::FaceStage;
pub use geometry::{BBox, BoxRecord, GeometryError, NormalizedBox};
pub use types::{DetectedFace, Detection, Embedding, EMBEDDING_DIM};
