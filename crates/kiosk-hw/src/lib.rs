//! kiosk-hw — Peripherals reachable over the network.
//!
//! Provides the proximity sensor client, the snapshot camera video source
//! and the captured frame type handed to the pipeline.

pub mod camera;
pub mod frame;
pub mod http;
pub mod sensor;

pub use camera::{CameraError, SnapshotCamera, VideoSource};
pub use frame::{Frame, FrameError};
pub use http::Credentials;
pub use sensor::{Motion, MotionSensor, ProximitySensor, SensorError};
