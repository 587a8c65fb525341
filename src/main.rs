//! shapesketch - freehand sketch canvas with on-demand shape classification
//!
//! A headless driver around the drawing/classification core: replays a stroke
//! script (or a built-in demo stroke) onto the canvas, asks the classifier
//! what the drawing looks like, and prints the top guess with its confidence.

mod canvas;
mod classify;
mod config;
mod session;
mod storage;

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{debug, info, Level};
use tracing_subscriber::FmtSubscriber;

use crate::canvas::{Point, SketchCanvas};
use crate::classify::{AssetKind, AssetStore, ClassificationOutcome, OnnxShapeModel};
use crate::config::AppConfig;
use crate::session::SketchSession;

/// shapesketch - draw a shape, get a guess
#[derive(Parser, Debug)]
#[command(name = "shapesketch")]
#[command(about = "Freehand sketch canvas with on-demand shape classification")]
struct Args {
    /// Path to an ONNX shape classifier (defaults to the cached download)
    #[arg(long)]
    model: Option<PathBuf>,

    /// Path to the label list, one label per line (defaults to the cached download)
    #[arg(long)]
    labels: Option<PathBuf>,

    /// Stroke script to replay: JSON array of strokes, each an array of [x, y] points
    #[arg(long)]
    strokes: Option<PathBuf>,

    /// Square canvas size in pixels, overriding the configured dimensions
    #[arg(long)]
    canvas_size: Option<u32>,

    /// Write the finished canvas to a PNG before classifying
    #[arg(long)]
    save_canvas: Option<PathBuf>,
}

fn main() -> Result<()> {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let args = Args::parse();

    info!("shapesketch starting...");

    let config = load_or_create_config();
    let (width, height) = match args.canvas_size {
        Some(size) => (size, size),
        None => (config.canvas.width, config.canvas.height),
    };

    let canvas = SketchCanvas::new(width, height, config.brush.clone())?;

    // Model load failure is fatal: no classification can ever succeed
    let (model_path, labels_path) = resolve_assets(&args, &config)?;
    let model = OnnxShapeModel::new(&model_path, &labels_path)
        .context("failed to load the shape classification model")?;

    let mut session = SketchSession::new(canvas, Box::new(model));

    let strokes = match &args.strokes {
        Some(path) => load_stroke_script(path)?,
        None => {
            info!("no stroke script given, drawing the demo circle");
            demo_circle(width, height)
        }
    };
    replay_strokes(&mut session, &strokes);

    if let Some(path) = &args.save_canvas {
        session
            .canvas()
            .bitmap()
            .save(path)
            .with_context(|| format!("failed to save canvas to {:?}", path))?;
        info!("canvas written to {:?}", path);
    }

    let request = session.classify();
    debug!(request, "classification submitted");

    match session.wait_outcome(Duration::from_secs(60)) {
        Some(envelope) => match envelope.outcome {
            ClassificationOutcome::Classified { label, confidence } => {
                println!("looks like {} ({:.0} %)", label, (confidence * 100.0).round());
            }
            ClassificationOutcome::NoResult { reason } => {
                println!("no classification available ({reason})");
            }
        },
        None => anyhow::bail!("classification timed out"),
    }

    info!("shapesketch done");
    Ok(())
}

/// Load configuration from file or fall back to defaults
fn load_or_create_config() -> AppConfig {
    if let Ok(config_dir) = storage::get_config_dir() {
        let config_path = config_dir.join("config.toml");
        if config_path.exists() {
            if let Ok(config) = config::load_config(&config_path) {
                info!("Loaded configuration from {:?}", config_path);
                return config;
            }
        }
    }
    info!("Using default configuration");
    AppConfig::default()
}

/// Figure out where the model and label list live, downloading the cached
/// defaults when no explicit path is given.
fn resolve_assets(args: &Args, config: &AppConfig) -> Result<(PathBuf, PathBuf)> {
    let explicit_model = args
        .model
        .clone()
        .or_else(|| config.classifier.model_path.clone());
    let explicit_labels = args
        .labels
        .clone()
        .or_else(|| config.classifier.labels_path.clone());

    if let (Some(model), Some(labels)) = (&explicit_model, &explicit_labels) {
        return Ok((model.clone(), labels.clone()));
    }

    let store = AssetStore::new()?;
    let model = match explicit_model {
        Some(path) => path,
        None => store.ensure(AssetKind::Network)?,
    };
    let labels = match explicit_labels {
        Some(path) => path,
        None => store.ensure(AssetKind::Labels)?,
    };
    Ok((model, labels))
}

/// Parse a stroke script: a JSON array of strokes, each an array of [x, y]
fn load_stroke_script(path: &PathBuf) -> Result<Vec<Vec<[f32; 2]>>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read stroke script {:?}", path))?;
    let strokes: Vec<Vec<[f32; 2]>> =
        serde_json::from_str(&content).context("stroke script is not valid JSON")?;
    if strokes.iter().any(|stroke| stroke.is_empty()) {
        anyhow::bail!("stroke script contains an empty stroke");
    }
    Ok(strokes)
}

/// One closed circular stroke centered on the canvas
fn demo_circle(width: u32, height: u32) -> Vec<Vec<[f32; 2]>> {
    let cx = width as f32 / 2.0;
    let cy = height as f32 / 2.0;
    let radius = (width.min(height) as f32) * 80.0 / 300.0;

    let stroke = (0..=32)
        .map(|i| {
            let angle = (i as f32) * std::f32::consts::TAU / 32.0;
            [cx + radius * angle.cos(), cy + radius * angle.sin()]
        })
        .collect();
    vec![stroke]
}

/// Feed strokes through the pointer-event surface
fn replay_strokes(session: &mut SketchSession, strokes: &[Vec<[f32; 2]>]) {
    for stroke in strokes {
        let mut points = stroke.iter().map(|&[x, y]| Point::new(x, y));
        let Some(first) = points.next() else {
            continue;
        };

        session.pointer_down(first);
        let mut last = first;
        for point in points {
            session.pointer_moved(point);
            last = point;
        }
        session.pointer_up(last);
    }
    debug!(count = strokes.len(), "strokes replayed");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_demo_circle_stays_on_canvas() {
        let strokes = demo_circle(300, 300);
        assert_eq!(strokes.len(), 1);
        assert_eq!(strokes[0].len(), 33);

        for &[x, y] in &strokes[0] {
            assert!((0.0..300.0).contains(&x));
            assert!((0.0..300.0).contains(&y));
        }
        // Closed: first and last point coincide
        let first = strokes[0][0];
        let last = strokes[0][32];
        assert!((first[0] - last[0]).abs() < 0.001);
    }

    #[test]
    fn test_stroke_script_parsing() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "[[[10.0, 10.0], [20.0, 15.0]], [[5.0, 5.0]]]").unwrap();

        let strokes = load_stroke_script(&file.path().to_path_buf()).unwrap();
        assert_eq!(strokes.len(), 2);
        assert_eq!(strokes[0][1], [20.0, 15.0]);
    }

    #[test]
    fn test_stroke_script_rejects_empty_strokes() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "[[]]").unwrap();

        assert!(load_stroke_script(&file.path().to_path_buf()).is_err());
    }
}
