//! Face extraction and embedding stage.
//!
//! Runs the detector once per frame, crops each face (clipped to the frame),
//! and turns a crop into a validated 128-d embedding. Empty crops and failed
//! inference are expected outcomes here and come back as `None`, never as a
//! fault for the caller to handle.

use crate::detector::{DetectorError, FaceDetector};
use crate::embedder::{EmbeddingError, EmbeddingModel, FaceTensor, Normalization};
use crate::geometry::BBox;
use crate::types::{Detection, Embedding, EMBEDDING_DIM};
use image::imageops;
use image::RgbImage;

/// Crop `bbox` out of `frame`, clipped to the frame bounds.
///
/// Returns `None` when the clipped region has no pixels, which happens
/// routinely for faces partly outside the frame.
pub fn extract(frame: &RgbImage, bbox: &BBox) -> Option<RgbImage> {
    let (width, height) = frame.dimensions();
    let clipped = bbox.clipped_to(width, height)?;
    let region = imageops::crop_imm(
        frame,
        clipped.x1() as u32,
        clipped.y1() as u32,
        clipped.width() as u32,
        clipped.height() as u32,
    )
    .to_image();

    if region.is_empty() {
        return None;
    }
    Some(region)
}

/// Detector + embedder pair driven by the scheduler.
pub struct FaceStage {
    detector: Box<dyn FaceDetector>,
    embedder: Box<dyn EmbeddingModel>,
    normalization: Normalization,
}

impl FaceStage {
    pub fn new(
        detector: Box<dyn FaceDetector>,
        embedder: Box<dyn EmbeddingModel>,
        normalization: Normalization,
    ) -> Self {
        Self {
            detector,
            embedder,
            normalization,
        }
    }

    /// Detect faces and crop each one. Detections whose crop is empty are
    /// dropped with a warning; the rest of the frame's faces are kept.
    pub fn process_frame(&mut self, frame: &RgbImage) -> Result<Vec<Detection>, DetectorError> {
        let faces = self.detector.detect(frame)?;
        let mut detections = Vec::with_capacity(faces.len());

        for face in faces {
            match extract(frame, &face.bbox) {
                Some(region) => detections.push(Detection {
                    region,
                    bbox: face.bbox,
                    confidence: face.confidence,
                }),
                None => {
                    tracing::warn!(bbox = %face.bbox, "empty face crop; skipping detection");
                }
            }
        }

        Ok(detections)
    }

    /// Compute the embedding for a face crop.
    ///
    /// `None` for a missing or empty region, and for any inference failure
    /// (logged as an embedding compute error).
    pub fn compute_embedding(&mut self, region: Option<&RgbImage>) -> Option<Embedding> {
        match self.try_compute_embedding(region) {
            Ok(embedding) => Some(embedding),
            Err(EmbeddingError::EmptyInput) => {
                tracing::debug!("no face region to embed");
                None
            }
            Err(e) => {
                tracing::error!(error = %e, "embedding compute error");
                None
            }
        }
    }

    fn try_compute_embedding(
        &mut self,
        region: Option<&RgbImage>,
    ) -> Result<Embedding, EmbeddingError> {
        let region = region
            .filter(|r| !r.is_empty())
            .ok_or(EmbeddingError::EmptyInput)?;

        let batch = FaceTensor::from_region(region, self.normalization).into_batch();
        let output = self.embedder.infer(&batch)?;

        let first = output
            .rows()
            .into_iter()
            .next()
            .ok_or_else(|| EmbeddingError::BadOutput("model returned no rows".into()))?;

        let values = first.to_vec();
        let len = values.len();
        Embedding::new(values).ok_or_else(|| {
            EmbeddingError::BadOutput(format!(
                "expected {EMBEDDING_DIM} finite values, got {len}"
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DetectedFace;
    use image::Rgb;
    use ndarray::Array2;
    use std::sync::{Arc, Mutex};

    struct FixedDetector(Vec<DetectedFace>);

    impl FaceDetector for FixedDetector {
        fn detect(&mut self, _frame: &RgbImage) -> Result<Vec<DetectedFace>, DetectorError> {
            Ok(self.0.clone())
        }
    }

    struct FailingDetector;

    impl FaceDetector for FailingDetector {
        fn detect(&mut self, _frame: &RgbImage) -> Result<Vec<DetectedFace>, DetectorError> {
            Err(DetectorError::InferenceFailed("boom".into()))
        }
    }

    /// Records every input shape it sees and returns `dim` values per row.
    struct ShapeRecorder {
        dim: usize,
        seen: Arc<Mutex<Vec<Vec<usize>>>>,
    }

    impl EmbeddingModel for ShapeRecorder {
        fn infer(&mut self, batch: &crate::embedder::FaceBatch) -> Result<Array2<f32>, EmbeddingError> {
            self.seen.lock().unwrap().push(batch.shape().to_vec());
            Ok(Array2::from_elem((batch.len(), self.dim), 0.25))
        }
    }

    struct FailingEmbedder;

    impl EmbeddingModel for FailingEmbedder {
        fn infer(&mut self, _batch: &crate::embedder::FaceBatch) -> Result<Array2<f32>, EmbeddingError> {
            Err(EmbeddingError::Compute("session poisoned".into()))
        }
    }

    fn face(x1: i32, y1: i32, x2: i32, y2: i32) -> DetectedFace {
        DetectedFace {
            bbox: BBox::new(x1, y1, x2, y2).unwrap(),
            confidence: 0.9,
        }
    }

    fn stage(detector: Box<dyn FaceDetector>, embedder: Box<dyn EmbeddingModel>) -> FaceStage {
        FaceStage::new(detector, embedder, Normalization::Base)
    }

    fn recorder(dim: usize) -> (Box<dyn EmbeddingModel>, Arc<Mutex<Vec<Vec<usize>>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        (Box::new(ShapeRecorder { dim, seen: seen.clone() }), seen)
    }

    #[test]
    fn test_extract_inside_frame() {
        let frame = RgbImage::from_pixel(100, 80, Rgb([7, 8, 9]));
        let region = extract(&frame, &BBox::new(10, 20, 40, 60).unwrap()).unwrap();
        assert_eq!(region.dimensions(), (30, 40));
        assert_eq!(region.get_pixel(0, 0), &Rgb([7, 8, 9]));
    }

    #[test]
    fn test_extract_clips_partial_box() {
        let frame = RgbImage::new(100, 80);
        let region = extract(&frame, &BBox::new(-20, 60, 30, 120).unwrap()).unwrap();
        assert_eq!(region.dimensions(), (30, 20));
    }

    #[test]
    fn test_extract_outside_frame_is_absent() {
        let frame = RgbImage::new(100, 80);
        assert!(extract(&frame, &BBox::new(150, 10, 200, 50).unwrap()).is_none());
        assert!(extract(&frame, &BBox::new(10, 10, 10, 50).unwrap()).is_none());
    }

    #[test]
    fn test_process_frame_drops_empty_crops() {
        let frame = RgbImage::new(100, 100);
        let detector = FixedDetector(vec![
            face(500, 500, 600, 600),
            face(10, 10, 50, 50),
            face(-40, 0, -1, 30),
        ]);
        let (embedder, _) = recorder(EMBEDDING_DIM);
        let detections = stage(Box::new(detector), embedder).process_frame(&frame).unwrap();
        assert_eq!(detections.len(), 1);
        assert_eq!(detections[0].bbox.to_xyxy(), [10, 10, 50, 50]);
        assert_eq!(detections[0].region.dimensions(), (40, 40));
    }

    #[test]
    fn test_process_frame_propagates_detector_error() {
        let (embedder, _) = recorder(EMBEDDING_DIM);
        let mut stage = stage(Box::new(FailingDetector), embedder);
        assert!(stage.process_frame(&RgbImage::new(10, 10)).is_err());
    }

    #[test]
    fn test_compute_embedding_absent_for_empty_region() {
        let (embedder, seen) = recorder(EMBEDDING_DIM);
        let mut stage = stage(Box::new(FixedDetector(vec![])), embedder);
        assert!(stage.compute_embedding(None).is_none());
        assert!(stage.compute_embedding(Some(&RgbImage::new(0, 0))).is_none());
        assert!(seen.lock().unwrap().is_empty());
    }

    #[test]
    fn test_compute_embedding_batches_once_per_call() {
        let (embedder, seen) = recorder(EMBEDDING_DIM);
        let mut stage = stage(Box::new(FixedDetector(vec![])), embedder);
        let region = RgbImage::from_pixel(48, 64, Rgb([100, 110, 120]));

        let first = stage.compute_embedding(Some(&region)).unwrap();
        let second = stage.compute_embedding(Some(&region)).unwrap();

        assert_eq!(first.len(), EMBEDDING_DIM);
        assert_eq!(second.len(), EMBEDDING_DIM);
        assert_eq!(first, second);
        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert!(seen.iter().all(|s| s == &vec![1, 160, 160, 3]));
    }

    #[test]
    fn test_compute_embedding_wrong_dim_is_absent() {
        let (embedder, _) = recorder(512);
        let mut stage = stage(Box::new(FixedDetector(vec![])), embedder);
        let region = RgbImage::from_pixel(20, 20, Rgb([1, 1, 1]));
        assert!(stage.compute_embedding(Some(&region)).is_none());
    }

    #[test]
    fn test_compute_embedding_inference_failure_is_absent() {
        let mut stage = stage(Box::new(FixedDetector(vec![])), Box::new(FailingEmbedder));
        let region = RgbImage::from_pixel(20, 20, Rgb([1, 1, 1]));
        assert!(stage.compute_embedding(Some(&region)).is_none());
    }
}
