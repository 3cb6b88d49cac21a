use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use kiosk_core::{FaceDetector, FaceNetEmbedder, FaceStage, ScrfdDetector};
use kiosk_hw::{MotionSensor, ProximitySensor, SnapshotCamera, VideoSource};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing_subscriber::EnvFilter;

mod config;
mod dispatch;
mod scheduler;
mod store;

use config::Config;
use dispatch::{Dispatcher, HttpIngestClient};
use scheduler::{Pipeline, Scheduler};
use store::LocalStore;

#[derive(Parser)]
#[command(name = "kioskd", about = "Kiosk face capture and dispatch daemon")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the capture loop until interrupted (default)
    Run,
    /// Poll the proximity sensor once
    Sensor,
    /// Capture one frame from the camera and save it as JPEG
    Snapshot {
        /// Output file
        #[arg(short, long)]
        out: PathBuf,
    },
    /// Detect faces in an image file and print the boxes as JSON
    Detect {
        /// Input image
        #[arg(short, long)]
        image: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = Config::from_env();
    config.validate().context("invalid configuration")?;

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => run(config).await,
        Commands::Sensor => {
            let mut sensor = sensor(&config);
            let motion = sensor.poll()?;
            println!("{motion:?}");
            Ok(())
        }
        Commands::Snapshot { out } => {
            let mut camera = open_camera(&config)?;
            let frame = camera.read_frame()?;
            let jpeg = frame.encode_jpeg(config.jpeg_quality)?;
            std::fs::write(&out, jpeg).with_context(|| format!("writing {}", out.display()))?;
            println!("{}x{} frame written to {}", frame.width(), frame.height(), out.display());
            Ok(())
        }
        Commands::Detect { image } => detect(&config, &image),
    }
}

async fn run(config: Config) -> Result<()> {
    tracing::info!(kiosk_id = %config.kiosk_id, "kioskd starting");

    let mut scheduler = match build_scheduler(&config) {
        Ok(scheduler) => scheduler,
        Err(e) => {
            tracing::error!(error = %format!("{e:#}"), "startup failed");
            return Err(e);
        }
    };

    let stop = Arc::new(AtomicBool::new(false));
    let loop_stop = stop.clone();
    let handle = std::thread::Builder::new()
        .name("kiosk-pipeline".into())
        .spawn(move || scheduler.run(&loop_stop))
        .context("spawning pipeline thread")?;

    tracing::info!("kioskd ready");

    tokio::signal::ctrl_c().await?;
    tracing::info!("kioskd shutting down");
    stop.store(true, Ordering::Relaxed);

    tokio::task::spawn_blocking(move || handle.join())
        .await?
        .map_err(|_| anyhow::anyhow!("pipeline thread panicked"))?;

    Ok(())
}

/// Load models, open the camera and wire the capture loop together.
fn build_scheduler(config: &Config) -> Result<Scheduler> {
    let camera_url = config.camera_url()?.to_string();
    let api_url = config.api_url()?;

    let detector = ScrfdDetector::load(&config.scrfd_model_path())?;
    let embedder = FaceNetEmbedder::load(&config.facenet_model_path())?;
    let camera = open_camera(config)?;
    tracing::info!(
        width = camera.width,
        height = camera.height,
        normalization = ?config.normalization,
        "pipeline initialised"
    );

    let dispatcher = Dispatcher::new(
        Box::new(HttpIngestClient::new(api_url, config.api_timeout)),
        LocalStore::new(&config.store_dir),
        config.kiosk_id.clone(),
        camera_url,
        config.jpeg_quality,
    );

    let pipeline = Pipeline {
        sensor: Box::new(sensor(config)),
        camera: Box::new(camera),
        faces: FaceStage::new(Box::new(detector), Box::new(embedder), config.normalization),
        dispatcher,
    };

    Ok(Scheduler::new(
        pipeline,
        config.intervals(),
        config.size_gate(),
        Instant::now(),
    ))
}

fn sensor(config: &Config) -> ProximitySensor {
    if config.sensor_url.is_none() {
        tracing::warn!("KIOSK_SENSOR_URL not set; sensor will never report motion");
    }
    ProximitySensor::new(
        config.sensor_url.clone(),
        config.sensor_credentials.clone(),
        config.sensor_timeout,
    )
}

fn open_camera(config: &Config) -> Result<SnapshotCamera> {
    let camera = SnapshotCamera::open(
        config.camera_url()?,
        config.camera_credentials.clone(),
        config.camera_timeout,
    )?;
    Ok(camera)
}

fn detect(config: &Config, path: &std::path::Path) -> Result<()> {
    let image = image::open(path)
        .with_context(|| format!("opening {}", path.display()))?
        .to_rgb8();
    let (width, height) = image.dimensions();

    let mut detector = ScrfdDetector::load(&config.scrfd_model_path())?;
    let faces = detector.detect(&image)?;
    let gate = config.size_gate();

    let report: Vec<serde_json::Value> = faces
        .iter()
        .map(|face| {
            serde_json::json!({
                "box": face.bbox,
                "xyxy": face.bbox.to_xyxy(),
                "corners": face.bbox.corners(),
                "fiftyone": face.bbox.to_fiftyone(width, height),
                "yolo": face.bbox.to_yolo(width, height),
                "confidence": face.confidence,
                "admitted": gate.admits(&face.bbox, width, height),
            })
        })
        .collect();

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
