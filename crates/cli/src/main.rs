use std::path::{Path, PathBuf};
use std::process;

use clap::Parser;

use facetrack_core::detection::infrastructure::onnx_face_detector::OnnxFaceDetector;
use facetrack_core::runtime::config::TrackerConfig;
use facetrack_core::runtime::registry::TrackerRegistry;
use facetrack_core::shared::frame::{FrameView, PixelFormat};
use facetrack_core::tracking::domain::track_set::TrackSet;

/// Face tracking over an ordered image sequence.
#[derive(Parser)]
#[command(name = "facetrack")]
struct Cli {
    /// ONNX face detection model.
    model: PathBuf,

    /// Image files forming the frame sequence, in order.
    frames: Vec<PathBuf>,

    /// Reject faces smaller than this many pixels per side.
    #[arg(long, default_value = "0")]
    min_face_size: i32,

    /// Run detection every Nth frame (1 = every frame).
    #[arg(long, default_value = "3")]
    interval: usize,

    /// Consecutive unmatched frames before a track is dropped.
    #[arg(long, default_value = "5")]
    miss_limit: usize,

    /// Detection confidence floor (0.0-1.0).
    #[arg(long, default_value = "0.25")]
    confidence: f64,
}

fn main() {
    env_logger::init();

    if let Err(e) = run() {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    validate(&cli)?;

    let detector = OnnxFaceDetector::with_confidence_floor(&cli.model, cli.confidence)?;
    let config = TrackerConfig {
        detection_interval: cli.interval,
        miss_limit: cli.miss_limit,
        ..Default::default()
    };

    let mut registry = TrackerRegistry::new();
    let handle = registry.create_with_detector(Box::new(detector), config)?;
    registry.set_face_size(handle, cli.min_face_size)?;
    registry.start(handle)?;

    for (index, path) in cli.frames.iter().enumerate() {
        let (data, width, height) = load_frame(path)?;
        let view = FrameView::wrap(&data, width, height, width as usize * 3, PixelFormat::Rgb8)?;
        let set = registry.process_frame(handle, &view)?;
        report(index, path, &set);
    }

    registry.stop(handle)?;
    registry.destroy(handle)?;
    Ok(())
}

fn validate(cli: &Cli) -> Result<(), Box<dyn std::error::Error>> {
    if cli.frames.is_empty() {
        return Err("at least one frame image is required".into());
    }
    if !(0.0..=1.0).contains(&cli.confidence) {
        return Err("confidence must be between 0.0 and 1.0".into());
    }
    Ok(())
}

/// Decodes an image into packed RGB bytes. The decoder stands in for the
/// camera pipeline that feeds the tracker in production.
fn load_frame(path: &Path) -> Result<(Vec<u8>, u32, u32), Box<dyn std::error::Error>> {
    let image = image::open(path)?.to_rgb8();
    let (width, height) = image.dimensions();
    Ok((image.into_raw(), width, height))
}

fn report(index: usize, path: &Path, set: &TrackSet) {
    println!(
        "frame {index:04} {}: {} face(s)",
        path.display(),
        set.len()
    );
    for track in set.tracks() {
        let b = &track.bounding_box;
        println!(
            "  track {:>3}  {:>4},{:<4} {}x{}  conf {:.2}",
            track.id, b.x, b.y, b.width, b.height, track.confidence
        );
    }
}
