//! Shape classifier model boundary
//!
//! The model is an external black box: it accepts a normalized image tensor
//! and returns scored labels. [`ShapeModel`] is the seam; the production
//! implementation wraps an ONNX Runtime session plus a label list.

use std::path::Path;

use anyhow::{Context, Result};
use ndarray::Array4;
use ort::session::{builder::GraphOptimizationLevel, Session};
use ort::value::Tensor;
use tracing::info;

/// Fallback resolution when the model declares dynamic spatial dimensions
const DEFAULT_INPUT_SIZE: u32 = 224;

/// One (label, confidence) pair from the classifier
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredLabel {
    pub label: String,
    /// Confidence in [0, 1]
    pub confidence: f32,
}

/// The pixel resolution the model expects its input tensor in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModelInputSpec {
    pub width: u32,
    pub height: u32,
}

/// Boundary contract for the classification model.
///
/// `infer` takes a normalized NCHW tensor shaped to [`ModelInputSpec`] and
/// returns labels ranked by descending confidence, or an engine error.
pub trait ShapeModel: Send {
    fn input_spec(&self) -> ModelInputSpec;
    fn infer(&mut self, input: Array4<f32>) -> Result<Vec<ScoredLabel>>;
}

/// ONNX Runtime backed shape classifier
pub struct OnnxShapeModel {
    session: Session,
    input_name: String,
    output_name: String,
    labels: Vec<String>,
    input_spec: ModelInputSpec,
}

impl OnnxShapeModel {
    /// Load the classifier network and its label list.
    ///
    /// Failure here is fatal for the pipeline: no classification can ever
    /// succeed without a loadable model, so callers surface this at startup.
    pub fn new(model_path: &Path, labels_path: &Path) -> Result<Self> {
        info!("Loading shape classifier from {:?}", model_path);

        let session = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(4)?
            .commit_from_file(model_path)
            .context("Failed to load ONNX shape classifier")?;

        let input_name = session
            .inputs
            .first()
            .context("Model declares no inputs")?
            .name
            .clone();
        let output_name = session
            .outputs
            .first()
            .context("Model declares no outputs")?
            .name
            .clone();

        let input_spec = input_spec_from_session(&session);
        let labels = load_labels(labels_path)?;

        info!(
            "Classifier loaded. Input {:?} at {}x{}, {} labels",
            input_name, input_spec.width, input_spec.height, labels.len()
        );

        Ok(Self {
            session,
            input_name,
            output_name,
            labels,
            input_spec,
        })
    }

    /// Labels the model can report
    pub fn labels(&self) -> &[String] {
        &self.labels
    }
}

impl ShapeModel for OnnxShapeModel {
    fn input_spec(&self) -> ModelInputSpec {
        self.input_spec
    }

    fn infer(&mut self, input: Array4<f32>) -> Result<Vec<ScoredLabel>> {
        let (_, channels, height, width) = input.dim();
        let (data, _) = input.into_raw_vec_and_offset();
        let tensor = Tensor::from_array(([1usize, channels, height, width], data))
            .context("Failed to build input tensor")?;

        let outputs = self
            .session
            .run(ort::inputs![self.input_name.as_str() => tensor])
            .context("Inference failed")?;

        let (_, scores) = outputs[self.output_name.as_str()]
            .try_extract_tensor::<f32>()
            .context("Model output is not an f32 tensor")?;

        Ok(rank_scores(&self.labels, scores))
    }
}

/// Derive the input resolution from the model's declared input shape,
/// assuming NCHW with possibly-dynamic spatial dimensions.
fn input_spec_from_session(session: &Session) -> ModelInputSpec {
    let dims: Vec<i64> = session
        .inputs
        .first()
        .and_then(|input| input.input_type.tensor_shape())
        .map(|shape| shape.iter().copied().collect())
        .unwrap_or_default();

    if dims.len() == 4 && dims[2] > 0 && dims[3] > 0 {
        ModelInputSpec {
            width: dims[3] as u32,
            height: dims[2] as u32,
        }
    } else {
        ModelInputSpec {
            width: DEFAULT_INPUT_SIZE,
            height: DEFAULT_INPUT_SIZE,
        }
    }
}

/// Load the label list: one label per line, blanks skipped.
pub fn load_labels(path: &Path) -> Result<Vec<String>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read label list: {:?}", path))?;

    let labels: Vec<String> = content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect();

    if labels.is_empty() {
        anyhow::bail!("Label list {:?} is empty", path);
    }
    Ok(labels)
}

/// Pair raw output scores with labels and rank by descending confidence.
///
/// Scores are used as-is when they already form a probability distribution;
/// otherwise a softmax brings them into [0, 1], so the ranking contract holds
/// whether or not the exported network ends in a softmax layer.
pub fn rank_scores(labels: &[String], scores: &[f32]) -> Vec<ScoredLabel> {
    let probabilities = ensure_probabilities(scores);

    let mut ranked: Vec<ScoredLabel> = labels
        .iter()
        .zip(probabilities.iter())
        .map(|(label, &confidence)| ScoredLabel {
            label: label.clone(),
            confidence,
        })
        .collect();

    ranked.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    ranked
}

/// Normalize raw scores into a probability distribution.
fn ensure_probabilities(scores: &[f32]) -> Vec<f32> {
    let in_unit_range = scores.iter().all(|&s| (0.0..=1.0).contains(&s));
    let sum: f32 = scores.iter().sum();
    if in_unit_range && (sum - 1.0).abs() < 1e-3 {
        return scores.to_vec();
    }

    // Softmax over logits, shifted by the max for numerical stability
    let max = scores.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = scores.iter().map(|&s| (s - max).exp()).collect();
    let total: f32 = exps.iter().sum();
    if total <= 0.0 {
        return vec![0.0; scores.len()];
    }
    exps.into_iter().map(|e| e / total).collect()
}
