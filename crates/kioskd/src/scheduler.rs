//! Adaptive dual-rate capture loop.
//!
//! Cold mode polls slowly while nobody is around or once a large face has
//! been handled; hot mode polls faster while a person may be approaching or
//! leaving. Each cycle runs sensor → frame → detection → size gate →
//! embedding → dispatch strictly in sequence, so the dispatch of one frame
//! finishes before the next frame is looked at.

use crate::dispatch::Dispatcher;
use kiosk_core::{BBox, FaceStage};
use kiosk_hw::{Motion, MotionSensor, SensorError, VideoSource};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// Pause between ticks while waiting for the next poll.
pub const TICK_SLEEP: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Cold,
    Hot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Intervals {
    pub cold: Duration,
    pub hot: Duration,
}

impl Intervals {
    pub fn for_mode(&self, mode: Mode) -> Duration {
        match mode {
            Mode::Cold => self.cold,
            Mode::Hot => self.hot,
        }
    }
}

/// Minimum face size relative to the frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SizeGate {
    pub min_width_fraction: f32,
    pub min_height_fraction: f32,
}

impl SizeGate {
    pub fn admits(&self, bbox: &BBox, frame_width: u32, frame_height: u32) -> bool {
        bbox.width() as f64 >= self.min_width_fraction as f64 * frame_width as f64
            && bbox.height() as f64 >= self.min_height_fraction as f64 * frame_height as f64
    }
}

/// Mutable loop state, owned by the scheduler alone.
#[derive(Debug)]
pub struct SchedulerState {
    pub mode: Mode,
    pub last_check: Instant,
    /// Whether the previous cycle ended with an accepted face.
    face_present: bool,
    last_motion: Option<Motion>,
}

/// How a poll cycle ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    NoMotion,
    FrameUnavailable,
    DetectorFailed,
    NoFace,
    FaceTooSmall,
    EmbeddingUnavailable,
    EncodeFailed,
    Dispatched { status: Option<u16> },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Tick {
    /// Interval not yet elapsed; nothing was polled.
    Waiting,
    Ran(CycleOutcome),
}

/// The external collaborators one cycle walks through.
pub struct Pipeline {
    pub sensor: Box<dyn MotionSensor>,
    pub camera: Box<dyn VideoSource>,
    pub faces: FaceStage,
    pub dispatcher: Dispatcher,
}

pub struct Scheduler {
    state: SchedulerState,
    intervals: Intervals,
    gate: SizeGate,
    pipeline: Pipeline,
}

impl Scheduler {
    /// Start in cold mode; the first poll happens one cold interval after `now`.
    pub fn new(pipeline: Pipeline, intervals: Intervals, gate: SizeGate, now: Instant) -> Self {
        Self {
            state: SchedulerState {
                mode: Mode::Cold,
                last_check: now,
                face_present: false,
                last_motion: None,
            },
            intervals,
            gate,
            pipeline,
        }
    }

    pub fn mode(&self) -> Mode {
        self.state.mode
    }

    pub fn state(&self) -> &SchedulerState {
        &self.state
    }

    /// Run until `stop` is raised. The flag is checked between ticks.
    pub fn run(&mut self, stop: &AtomicBool) {
        tracing::info!(
            cold_ms = self.intervals.cold.as_millis() as u64,
            hot_ms = self.intervals.hot.as_millis() as u64,
            "capture loop started"
        );
        while !stop.load(Ordering::Relaxed) {
            self.tick(Instant::now());
            std::thread::sleep(TICK_SLEEP);
        }
        tracing::info!("capture loop stopped");
    }

    /// Poll if the current mode's interval has elapsed since the last check.
    pub fn tick(&mut self, now: Instant) -> Tick {
        let interval = self.intervals.for_mode(self.state.mode);
        if now.saturating_duration_since(self.state.last_check) < interval {
            return Tick::Waiting;
        }
        self.state.last_check = now;
        Tick::Ran(self.run_cycle())
    }

    /// One full sensor-to-dispatch pass. Every failure is absorbed here.
    pub fn run_cycle(&mut self) -> CycleOutcome {
        let motion = match self.pipeline.sensor.poll() {
            Ok(motion) => motion,
            // Already reported once at startup.
            Err(SensorError::NotConfigured) => {
                tracing::debug!("no sensor configured; treating as no motion");
                Motion::Idle
            }
            Err(e) => {
                tracing::warn!(error = %e, "sensor unreachable; treating as no motion");
                Motion::Idle
            }
        };
        self.note_motion(motion);

        if motion == Motion::Idle {
            self.state.face_present = false;
            self.set_mode(Mode::Cold);
            return CycleOutcome::NoMotion;
        }

        let frame = match self.pipeline.camera.read_frame() {
            Ok(frame) => frame,
            Err(e) => {
                tracing::warn!(error = %e, "no frame from camera");
                return CycleOutcome::FrameUnavailable;
            }
        };

        let detections = match self.pipeline.faces.process_frame(&frame.image) {
            Ok(detections) => detections,
            Err(e) => {
                tracing::error!(error = %e, "face detection failed");
                return CycleOutcome::DetectorFailed;
            }
        };

        // Single-target: only the first face is considered.
        let Some(face) = detections.into_iter().next() else {
            if self.state.face_present {
                tracing::info!("face lost");
            }
            self.state.face_present = false;
            self.set_mode(Mode::Hot);
            return CycleOutcome::NoFace;
        };

        if !self.gate.admits(&face.bbox, frame.width(), frame.height()) {
            tracing::info!(
                bbox = %face.bbox,
                frame_width = frame.width(),
                frame_height = frame.height(),
                "face too small"
            );
            self.state.face_present = false;
            self.set_mode(Mode::Hot);
            return CycleOutcome::FaceTooSmall;
        }

        tracing::info!(bbox = %face.bbox, confidence = face.confidence, "face accepted");
        self.state.face_present = true;
        self.set_mode(Mode::Cold);

        let Some(embedding) = self.pipeline.faces.compute_embedding(Some(&face.region)) else {
            tracing::warn!("embedding unavailable; skipping dispatch");
            return CycleOutcome::EmbeddingUnavailable;
        };

        match self.pipeline.dispatcher.dispatch(&embedding, &frame) {
            Ok(report) => {
                if let Some(stored) = &report.stored {
                    tracing::debug!(record = %stored.record_path.display(), "cycle complete");
                }
                CycleOutcome::Dispatched {
                    status: report.status,
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "dispatch skipped");
                CycleOutcome::EncodeFailed
            }
        }
    }

    fn note_motion(&mut self, motion: Motion) {
        if self.state.last_motion != Some(motion) {
            tracing::info!(?motion, "sensor state changed");
            self.state.last_motion = Some(motion);
        }
    }

    fn set_mode(&mut self, mode: Mode) {
        if self.state.mode != mode {
            tracing::info!(from = ?self.state.mode, to = ?mode, "scheduler mode changed");
            self.state.mode = mode;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::tests::{stored_files, RecordingClient};
    use crate::store::LocalStore;
    use chrono::Utc;
    use image::{Rgb, RgbImage};
    use kiosk_core::embedder::FaceBatch;
    use kiosk_core::{
        DetectedFace, DetectorError, EmbeddingError, EmbeddingModel, FaceDetector, Normalization,
        EMBEDDING_DIM,
    };
    use kiosk_hw::sensor::parse_motion;
    use kiosk_hw::{CameraError, Frame, SensorError};
    use ndarray::Array2;
    use serde_json::json;
    use std::collections::VecDeque;
    use std::sync::atomic::AtomicUsize;
    use std::sync::{Arc, Mutex};

    const FRAME_W: u32 = 640;
    const FRAME_H: u32 = 480;

    /// Replays sensor JSON bodies or errors; idle once the script runs out.
    struct ScriptedSensor {
        script: VecDeque<Result<serde_json::Value, SensorError>>,
        polls: Arc<AtomicUsize>,
    }

    impl MotionSensor for ScriptedSensor {
        fn poll(&mut self) -> Result<Motion, SensorError> {
            self.polls.fetch_add(1, Ordering::SeqCst);
            match self.script.pop_front() {
                Some(Ok(body)) => Ok(parse_motion(&body)),
                Some(Err(e)) => Err(e),
                None => Ok(Motion::Idle),
            }
        }
    }

    struct FakeCamera {
        available: bool,
        size: (u32, u32),
        reads: Arc<AtomicUsize>,
    }

    impl VideoSource for FakeCamera {
        fn read_frame(&mut self) -> Result<Frame, CameraError> {
            let n = self.reads.fetch_add(1, Ordering::SeqCst);
            if !self.available {
                return Err(CameraError::FrameUnavailable("stream stalled".into()));
            }
            let (w, h) = self.size;
            Ok(Frame::new(
                RgbImage::from_pixel(w, h, Rgb([120, 100, 90])),
                Utc::now(),
                n as u64,
            ))
        }
    }

    /// Returns the next scripted set of faces per frame; none once exhausted.
    /// Calls whose index is listed in `fail_on` error out without consuming
    /// the script.
    struct ScriptedDetector {
        faces: VecDeque<Vec<DetectedFace>>,
        fail_on: Vec<usize>,
        calls: usize,
    }

    impl FaceDetector for ScriptedDetector {
        fn detect(&mut self, _frame: &RgbImage) -> Result<Vec<DetectedFace>, DetectorError> {
            let call = self.calls;
            self.calls += 1;
            if self.fail_on.contains(&call) {
                return Err(DetectorError::InferenceFailed("session run failed".into()));
            }
            Ok(self.faces.pop_front().unwrap_or_default())
        }
    }

    struct FixedEmbedder {
        fail: bool,
    }

    impl EmbeddingModel for FixedEmbedder {
        fn infer(&mut self, batch: &FaceBatch) -> Result<Array2<f32>, EmbeddingError> {
            if self.fail {
                return Err(EmbeddingError::Compute("graph error".into()));
            }
            Ok(Array2::from_elem((batch.len(), EMBEDDING_DIM), 0.1))
        }
    }

    struct Harness {
        scheduler: Scheduler,
        start: Instant,
        polls: Arc<AtomicUsize>,
        reads: Arc<AtomicUsize>,
        sent: Arc<Mutex<Vec<serde_json::Value>>>,
        store_dir: tempfile::TempDir,
    }

    struct Setup {
        sensor: Vec<Result<serde_json::Value, SensorError>>,
        camera_available: bool,
        frame_size: (u32, u32),
        faces: Vec<Vec<DetectedFace>>,
        detector_fails_on: Vec<usize>,
        embed_fails: bool,
        api_reachable: bool,
    }

    impl Default for Setup {
        fn default() -> Self {
            Self {
                sensor: vec![],
                camera_available: true,
                frame_size: (FRAME_W, FRAME_H),
                faces: vec![],
                detector_fails_on: vec![],
                embed_fails: false,
                api_reachable: true,
            }
        }
    }

    fn motion() -> Result<serde_json::Value, SensorError> {
        Ok(json!({"LL": {"value": "1"}}))
    }

    fn idle() -> Result<serde_json::Value, SensorError> {
        Ok(json!({"LL": {"value": "0"}}))
    }

    fn sensor_down() -> Result<serde_json::Value, SensorError> {
        Err(SensorError::Unreachable {
            url: "http://sensor".into(),
            reason: "timed out".into(),
        })
    }

    /// A face of the given fraction of the frame, anchored at (10, 10).
    fn face_frac(w_frac: f32, h_frac: f32) -> Vec<DetectedFace> {
        let w = (FRAME_W as f32 * w_frac) as i32;
        let h = (FRAME_H as f32 * h_frac) as i32;
        vec![DetectedFace {
            bbox: BBox::new(10, 10, 10 + w, 10 + h).unwrap(),
            confidence: 0.98,
        }]
    }

    fn harness(setup: Setup) -> Harness {
        let polls = Arc::new(AtomicUsize::new(0));
        let reads = Arc::new(AtomicUsize::new(0));
        let store_dir = tempfile::tempdir().unwrap();

        let (client, sent) = if setup.api_reachable {
            RecordingClient::ok(200, r#"{"status": "ok", "person_id": 4}"#)
        } else {
            RecordingClient::unreachable()
        };

        let pipeline = Pipeline {
            sensor: Box::new(ScriptedSensor {
                script: setup.sensor.into(),
                polls: polls.clone(),
            }),
            camera: Box::new(FakeCamera {
                available: setup.camera_available,
                size: setup.frame_size,
                reads: reads.clone(),
            }),
            faces: FaceStage::new(
                Box::new(ScriptedDetector {
                    faces: setup.faces.into(),
                    fail_on: setup.detector_fails_on,
                    calls: 0,
                }),
                Box::new(FixedEmbedder {
                    fail: setup.embed_fails,
                }),
                Normalization::Base,
            ),
            dispatcher: Dispatcher::new(
                Box::new(client),
                LocalStore::new(store_dir.path()),
                "kiosk-1",
                "http://camera/snapshot.jpg",
                85,
            ),
        };

        let start = Instant::now();
        let scheduler = Scheduler::new(
            pipeline,
            Intervals {
                cold: Duration::from_millis(1000),
                hot: Duration::from_millis(800),
            },
            SizeGate {
                min_width_fraction: 0.25,
                min_height_fraction: 0.25,
            },
            start,
        );

        Harness {
            scheduler,
            start,
            polls,
            reads,
            sent,
            store_dir,
        }
    }

    #[test]
    fn test_size_gate() {
        let gate = SizeGate {
            min_width_fraction: 0.25,
            min_height_fraction: 0.25,
        };
        let bbox = |w, h| BBox::new(0, 0, w, h).unwrap();
        assert!(gate.admits(&bbox(160, 120), 640, 480));
        assert!(!gate.admits(&bbox(159, 120), 640, 480));
        assert!(!gate.admits(&bbox(160, 119), 640, 480));
        assert!(gate.admits(&bbox(400, 400), 640, 480));
    }

    #[test]
    fn test_starts_cold() {
        let h = harness(Setup::default());
        assert_eq!(h.scheduler.mode(), Mode::Cold);
    }

    #[test]
    fn test_no_motion_stays_cold_without_capture() {
        let mut h = harness(Setup {
            sensor: vec![idle()],
            ..Setup::default()
        });
        assert_eq!(h.scheduler.run_cycle(), CycleOutcome::NoMotion);
        assert_eq!(h.scheduler.mode(), Mode::Cold);
        assert_eq!(h.reads.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_sensor_unreachable_is_no_motion() {
        let mut h = harness(Setup {
            sensor: vec![motion(), sensor_down()],
            faces: vec![vec![]],
            ..Setup::default()
        });
        assert_eq!(h.scheduler.run_cycle(), CycleOutcome::NoFace);
        assert_eq!(h.scheduler.mode(), Mode::Hot);

        assert_eq!(h.scheduler.run_cycle(), CycleOutcome::NoMotion);
        assert_eq!(h.scheduler.mode(), Mode::Cold);
        assert_eq!(h.reads.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_small_face_goes_hot_without_dispatch() {
        let mut h = harness(Setup {
            sensor: vec![motion()],
            faces: vec![face_frac(0.1, 0.5)],
            ..Setup::default()
        });
        assert_eq!(h.scheduler.run_cycle(), CycleOutcome::FaceTooSmall);
        assert_eq!(h.scheduler.mode(), Mode::Hot);
        assert!(h.sent.lock().unwrap().is_empty());
        assert!(stored_files(h.store_dir.path()).is_empty());
    }

    #[test]
    fn test_no_face_goes_hot() {
        let mut h = harness(Setup {
            sensor: vec![motion()],
            faces: vec![vec![]],
            ..Setup::default()
        });
        assert_eq!(h.scheduler.run_cycle(), CycleOutcome::NoFace);
        assert_eq!(h.scheduler.mode(), Mode::Hot);
    }

    #[test]
    fn test_large_face_dispatches_and_returns_cold() {
        let mut h = harness(Setup {
            sensor: vec![motion(), motion()],
            faces: vec![face_frac(0.1, 0.1), face_frac(0.5, 0.5)],
            ..Setup::default()
        });

        assert_eq!(h.scheduler.run_cycle(), CycleOutcome::FaceTooSmall);
        assert_eq!(h.scheduler.mode(), Mode::Hot);

        assert_eq!(
            h.scheduler.run_cycle(),
            CycleOutcome::Dispatched { status: Some(200) }
        );
        assert_eq!(h.scheduler.mode(), Mode::Cold);

        let sent = h.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0]["kiosk_id"], "kiosk-1");
        assert_eq!(sent[0]["embedding"].as_array().unwrap().len(), EMBEDDING_DIM);

        let files = stored_files(h.store_dir.path());
        assert_eq!(files.len(), 2);
        assert!(files[0].ends_with(".jpg"));
        assert!(files[1].ends_with(".json"));

        let record: serde_json::Value =
            serde_json::from_slice(&std::fs::read(h.store_dir.path().join(&files[1])).unwrap())
                .unwrap();
        assert_eq!(record["status"], 200);
        assert_eq!(record["response"]["person_id"], 4);
    }

    #[test]
    fn test_transport_error_still_persists_and_loop_continues() {
        let mut h = harness(Setup {
            sensor: vec![motion(), idle()],
            faces: vec![face_frac(0.5, 0.5)],
            api_reachable: false,
            ..Setup::default()
        });

        assert_eq!(
            h.scheduler.run_cycle(),
            CycleOutcome::Dispatched { status: None }
        );
        let files = stored_files(h.store_dir.path());
        assert_eq!(files.len(), 2);
        let record: serde_json::Value =
            serde_json::from_slice(&std::fs::read(h.store_dir.path().join(&files[1])).unwrap())
                .unwrap();
        assert!(record["status"].is_null());
        assert!(record["response"]["error"].is_string());

        assert_eq!(h.scheduler.run_cycle(), CycleOutcome::NoMotion);
        assert_eq!(h.scheduler.mode(), Mode::Cold);
    }

    #[test]
    fn test_frame_unavailable_keeps_mode() {
        let mut h = harness(Setup {
            sensor: vec![motion(), motion()],
            faces: vec![vec![]],
            ..Setup::default()
        });
        assert_eq!(h.scheduler.run_cycle(), CycleOutcome::NoFace);
        assert_eq!(h.scheduler.mode(), Mode::Hot);

        let mut h2 = harness(Setup {
            sensor: vec![motion()],
            camera_available: false,
            ..Setup::default()
        });
        assert_eq!(h2.scheduler.run_cycle(), CycleOutcome::FrameUnavailable);
        assert_eq!(h2.scheduler.mode(), Mode::Cold);

        // Hot stays hot when the next frame is missing.
        h.scheduler.pipeline.camera = Box::new(FakeCamera {
            available: false,
            size: (FRAME_W, FRAME_H),
            reads: h.reads.clone(),
        });
        assert_eq!(h.scheduler.run_cycle(), CycleOutcome::FrameUnavailable);
        assert_eq!(h.scheduler.mode(), Mode::Hot);
    }

    #[test]
    fn test_missing_sensor_is_no_motion() {
        let mut h = harness(Setup {
            sensor: vec![Err(SensorError::NotConfigured), Err(SensorError::NotConfigured)],
            ..Setup::default()
        });
        assert_eq!(h.scheduler.run_cycle(), CycleOutcome::NoMotion);
        assert_eq!(h.scheduler.run_cycle(), CycleOutcome::NoMotion);
        assert_eq!(h.scheduler.mode(), Mode::Cold);
        assert_eq!(h.reads.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_detector_failure_keeps_mode_and_loop_recovers() {
        let mut h = harness(Setup {
            sensor: vec![motion(), motion(), motion(), motion()],
            faces: vec![vec![], face_frac(0.5, 0.5)],
            detector_fails_on: vec![0, 2],
            ..Setup::default()
        });

        assert_eq!(h.scheduler.run_cycle(), CycleOutcome::DetectorFailed);
        assert_eq!(h.scheduler.mode(), Mode::Cold);

        assert_eq!(h.scheduler.run_cycle(), CycleOutcome::NoFace);
        assert_eq!(h.scheduler.mode(), Mode::Hot);

        assert_eq!(h.scheduler.run_cycle(), CycleOutcome::DetectorFailed);
        assert_eq!(h.scheduler.mode(), Mode::Hot);
        assert!(h.sent.lock().unwrap().is_empty());

        assert_eq!(
            h.scheduler.run_cycle(),
            CycleOutcome::Dispatched { status: Some(200) }
        );
        assert_eq!(h.scheduler.mode(), Mode::Cold);
    }

    #[test]
    fn test_encode_failure_skips_dispatch_and_loop_recovers() {
        // JPEG cannot hold a side longer than 65535 pixels.
        let wide = vec![DetectedFace {
            bbox: BBox::new(0, 0, 20_000, 1).unwrap(),
            confidence: 0.9,
        }];
        let mut h = harness(Setup {
            sensor: vec![motion(), motion()],
            frame_size: (70_000, 1),
            faces: vec![wide, face_frac(0.5, 0.5)],
            ..Setup::default()
        });

        assert_eq!(h.scheduler.run_cycle(), CycleOutcome::EncodeFailed);
        assert_eq!(h.scheduler.mode(), Mode::Cold);
        assert!(h.sent.lock().unwrap().is_empty());
        assert!(stored_files(h.store_dir.path()).is_empty());

        h.scheduler.pipeline.camera = Box::new(FakeCamera {
            available: true,
            size: (FRAME_W, FRAME_H),
            reads: h.reads.clone(),
        });
        assert_eq!(
            h.scheduler.run_cycle(),
            CycleOutcome::Dispatched { status: Some(200) }
        );
        assert_eq!(h.sent.lock().unwrap().len(), 1);
        assert_eq!(stored_files(h.store_dir.path()).len(), 2);
    }

    #[test]
    fn test_embedding_failure_skips_dispatch() {
        let mut h = harness(Setup {
            sensor: vec![motion()],
            faces: vec![face_frac(0.5, 0.5)],
            embed_fails: true,
            ..Setup::default()
        });
        assert_eq!(h.scheduler.run_cycle(), CycleOutcome::EmbeddingUnavailable);
        assert_eq!(h.scheduler.mode(), Mode::Cold);
        assert!(h.sent.lock().unwrap().is_empty());
        assert!(stored_files(h.store_dir.path()).is_empty());
    }

    #[test]
    fn test_only_first_face_is_gated() {
        let mut faces = face_frac(0.1, 0.1);
        faces.extend(face_frac(0.6, 0.6));
        let mut h = harness(Setup {
            sensor: vec![motion()],
            faces: vec![faces],
            ..Setup::default()
        });
        assert_eq!(h.scheduler.run_cycle(), CycleOutcome::FaceTooSmall);
    }

    #[test]
    fn test_tick_waits_for_cold_interval() {
        let mut h = harness(Setup {
            sensor: vec![idle()],
            ..Setup::default()
        });
        let start = h.start;

        assert_eq!(h.scheduler.tick(start + Duration::from_millis(999)), Tick::Waiting);
        assert_eq!(h.polls.load(Ordering::SeqCst), 0);

        assert_eq!(
            h.scheduler.tick(start + Duration::from_millis(1000)),
            Tick::Ran(CycleOutcome::NoMotion)
        );
        assert_eq!(h.polls.load(Ordering::SeqCst), 1);
        assert_eq!(h.scheduler.state().last_check, start + Duration::from_millis(1000));

        // Interval restarts from the last check.
        assert_eq!(h.scheduler.tick(start + Duration::from_millis(1500)), Tick::Waiting);
        assert_eq!(h.polls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_tick_uses_hot_interval_after_small_face() {
        let mut h = harness(Setup {
            sensor: vec![motion(), idle()],
            faces: vec![face_frac(0.1, 0.1)],
            ..Setup::default()
        });
        let start = h.start;

        assert_eq!(
            h.scheduler.tick(start + Duration::from_millis(1000)),
            Tick::Ran(CycleOutcome::FaceTooSmall)
        );
        assert_eq!(h.scheduler.mode(), Mode::Hot);

        assert_eq!(h.scheduler.tick(start + Duration::from_millis(1799)), Tick::Waiting);
        assert_eq!(
            h.scheduler.tick(start + Duration::from_millis(1800)),
            Tick::Ran(CycleOutcome::NoMotion)
        );
        assert_eq!(h.scheduler.mode(), Mode::Cold);
    }

    #[test]
    fn test_run_exits_when_stopped() {
        let mut h = harness(Setup::default());
        let stop = AtomicBool::new(true);
        h.scheduler.run(&stop);
        assert_eq!(h.polls.load(Ordering::SeqCst), 0);
    }
}
