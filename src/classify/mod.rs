//! Classification Pipeline
//!
//! Converts a canvas snapshot into a ranked category guess without blocking
//! the caller. Each `classify` call is tagged with a monotonically increasing
//! sequence number; a long-lived background worker runs preprocessing and
//! inference, and any result whose sequence is no longer the latest issued is
//! discarded so stale classifications can never overwrite newer state.
//!
//! Outcomes are delivered on a channel handed out at construction; whichever
//! thread drains that receiver is the UI-safe delivery context. The worker
//! never touches caller state directly.

pub mod assets;
pub mod model;
pub mod preprocess;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Instant;

use crossbeam_channel::{unbounded, Receiver, Sender};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::canvas::Snapshot;

pub use assets::{AssetKind, AssetStore};
pub use model::{ModelInputSpec, OnnxShapeModel, ScoredLabel, ShapeModel};
pub use preprocess::{NormalizationConfig, Orientation};

/// Why a classification produced no usable result.
///
/// All of these surface through the normal outcome channel; none is a crash.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum NoResultReason {
    /// Missing snapshot or a pixel buffer that cannot become an input tensor
    #[error("snapshot was missing or not a valid pixel buffer")]
    InvalidInput,
    /// The inference engine reported an error
    #[error("inference failed")]
    InferenceFailed,
    /// Inference succeeded but ranked nothing
    #[error("model returned an empty ranking")]
    EmptyRanking,
}

/// Terminal result of one `classify` invocation
#[derive(Debug, Clone, PartialEq)]
pub enum ClassificationOutcome {
    /// The single highest-confidence guess
    Classified { label: String, confidence: f32 },
    /// "No classification available" — a normal outcome, not a fault
    NoResult { reason: NoResultReason },
}

/// An outcome together with the sequence number of the request it answers
#[derive(Debug, Clone, PartialEq)]
pub struct OutcomeEnvelope {
    pub seq: u64,
    pub outcome: ClassificationOutcome,
}

struct ClassifyJob {
    seq: u64,
    snapshot: Snapshot,
    orientation: Orientation,
}

enum WorkerMessage {
    Classify(ClassifyJob),
    Shutdown,
}

/// Asynchronous snapshot-to-guess pipeline.
///
/// Owns one background worker thread holding the model. Dropping the
/// pipeline shuts the worker down and joins it.
pub struct ClassificationPipeline {
    jobs: Sender<WorkerMessage>,
    outcomes: Sender<OutcomeEnvelope>,
    /// Sequence number of the most recently issued request
    latest_seq: Arc<AtomicU64>,
    worker: Option<JoinHandle<()>>,
}

impl ClassificationPipeline {
    /// Spawn the pipeline around a loaded model.
    ///
    /// The returned receiver is the delivery end of the outcome contract:
    /// drain it from the thread that owns user-visible state.
    pub fn new(model: Box<dyn ShapeModel>) -> (Self, Receiver<OutcomeEnvelope>) {
        let (jobs_tx, jobs_rx) = unbounded();
        let (outcomes_tx, outcomes_rx) = unbounded();
        let latest_seq = Arc::new(AtomicU64::new(0));

        let worker_outcomes = outcomes_tx.clone();
        let worker_latest = latest_seq.clone();
        let worker = std::thread::spawn(move || {
            run_worker(model, jobs_rx, worker_outcomes, worker_latest);
        });

        (
            Self {
                jobs: jobs_tx,
                outcomes: outcomes_tx,
                latest_seq,
                worker: Some(worker),
            },
            outcomes_rx,
        )
    }

    /// Submit a snapshot for classification and return its sequence number.
    ///
    /// Never blocks on inference. Validation failures (no snapshot, empty or
    /// malformed pixel buffer) deliver an `InvalidInput` outcome synchronously
    /// on the outcome channel instead of reaching the worker.
    pub fn classify(&self, snapshot: Option<Snapshot>, orientation: Orientation) -> u64 {
        let seq = self.latest_seq.fetch_add(1, Ordering::SeqCst) + 1;
        debug!(seq, "classification request submitted");

        let snapshot = match snapshot {
            Some(s) if is_plausible(&s) => s,
            _ => {
                debug!(seq, "request failed validation");
                let _ = self.outcomes.send(OutcomeEnvelope {
                    seq,
                    outcome: ClassificationOutcome::NoResult {
                        reason: NoResultReason::InvalidInput,
                    },
                });
                return seq;
            }
        };

        let _ = self.jobs.send(WorkerMessage::Classify(ClassifyJob {
            seq,
            snapshot,
            orientation,
        }));
        seq
    }

    /// Invalidate every request issued so far without submitting new work.
    ///
    /// In-flight results become stale and are dropped by the worker. Called
    /// when the drawing they were computed from no longer exists (erase).
    pub fn invalidate(&self) -> u64 {
        let seq = self.latest_seq.fetch_add(1, Ordering::SeqCst) + 1;
        debug!(seq, "outstanding classifications invalidated");
        seq
    }

    /// Sequence number of the most recently issued request
    pub fn latest_seq(&self) -> u64 {
        self.latest_seq.load(Ordering::SeqCst)
    }
}

impl Drop for ClassificationPipeline {
    fn drop(&mut self) {
        let _ = self.jobs.send(WorkerMessage::Shutdown);
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

/// Cheap structural validation: can this snapshot become an input tensor?
fn is_plausible(snapshot: &Snapshot) -> bool {
    let (width, height) = snapshot.dimensions();
    width > 0
        && height > 0
        && !snapshot.data.is_empty()
        && snapshot.data.len() == (width as usize) * (height as usize) * 4
}

fn run_worker(
    mut model: Box<dyn ShapeModel>,
    jobs: Receiver<WorkerMessage>,
    outcomes: Sender<OutcomeEnvelope>,
    latest_seq: Arc<AtomicU64>,
) {
    info!("classification worker started");
    let normalization = NormalizationConfig::default();

    for message in jobs.iter() {
        let job = match message {
            WorkerMessage::Classify(job) => job,
            WorkerMessage::Shutdown => break,
        };

        if latest_seq.load(Ordering::SeqCst) != job.seq {
            debug!(seq = job.seq, "request superseded before running, skipped");
            continue;
        }

        let start = Instant::now();
        debug!(seq = job.seq, "request running");

        let outcome = classify_snapshot(model.as_mut(), &job, &normalization);

        debug!(
            seq = job.seq,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "request finished"
        );

        if latest_seq.load(Ordering::SeqCst) != job.seq {
            debug!(seq = job.seq, "dropping stale result");
            continue;
        }
        let _ = outcomes.send(OutcomeEnvelope {
            seq: job.seq,
            outcome,
        });
    }
    info!("classification worker stopped");
}

fn classify_snapshot(
    model: &mut dyn ShapeModel,
    job: &ClassifyJob,
    normalization: &NormalizationConfig,
) -> ClassificationOutcome {
    let input = match preprocess::prepare_input(
        &job.snapshot,
        job.orientation,
        &model.input_spec(),
        normalization,
    ) {
        Ok(input) => input,
        Err(error) => {
            warn!(seq = job.seq, %error, "preprocessing failed");
            return ClassificationOutcome::NoResult {
                reason: NoResultReason::InvalidInput,
            };
        }
    };

    let ranked = match model.infer(input) {
        Ok(ranked) => ranked,
        Err(error) => {
            warn!(seq = job.seq, %error, "inference failed");
            return ClassificationOutcome::NoResult {
                reason: NoResultReason::InferenceFailed,
            };
        }
    };

    // Ranking is descending by confidence; the reporting contract is top-1
    match ranked.into_iter().next() {
        Some(top) => ClassificationOutcome::Classified {
            label: top.label,
            confidence: top.confidence.clamp(0.0, 1.0),
        },
        None => ClassificationOutcome::NoResult {
            reason: NoResultReason::EmptyRanking,
        },
    }
}
