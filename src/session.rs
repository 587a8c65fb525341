//! Sketch session — the command surface the UI layer drives
//!
//! Joins the stroke rasterizer and the classification pipeline behind the
//! small boundary contract: pointer events in, canvas commands, outcome
//! polling out. The session runs on the single thread that owns pointer
//! delivery; only the pipeline's worker runs elsewhere.

use std::time::Duration;

use crossbeam_channel::Receiver;
use tracing::{debug, warn};

use crate::canvas::{CanvasEvent, Point, SketchCanvas, Snapshot};
use crate::classify::{ClassificationPipeline, Orientation, OutcomeEnvelope, ShapeModel};

pub struct SketchSession {
    canvas: SketchCanvas,
    pipeline: ClassificationPipeline,
    outcomes: Receiver<OutcomeEnvelope>,
}

impl SketchSession {
    /// Wire a canvas to a loaded classification model
    pub fn new(canvas: SketchCanvas, model: Box<dyn ShapeModel>) -> Self {
        let (pipeline, outcomes) = ClassificationPipeline::new(model);
        Self {
            canvas,
            pipeline,
            outcomes,
        }
    }

    /// Pointer touched the surface: start a stroke
    pub fn pointer_down(&mut self, point: Point) {
        self.canvas.begin_stroke(point);
    }

    /// Pointer moved while down: extend the stroke.
    ///
    /// A move without a preceding down is a contract violation by the input
    /// layer; it is absorbed with a warning so touch delivery glitches never
    /// surface to the user.
    pub fn pointer_moved(&mut self, point: Point) {
        if let Err(error) = self.canvas.extend_stroke(point) {
            warn!(%error, "pointer move without an active stroke ignored");
        }
    }

    /// Pointer lifted: finish the stroke. The lift coordinate is not part of
    /// the drawn path (the last move already reached it).
    pub fn pointer_up(&mut self, _point: Point) {
        if let Err(error) = self.canvas.end_stroke() {
            warn!(%error, "pointer up without an active stroke ignored");
        }
    }

    /// Blank the canvas and invalidate any classification still in flight,
    /// so a result computed from the erased drawing is dropped rather than
    /// delivered against an empty surface.
    pub fn erase(&mut self) {
        self.canvas.erase();
        let seq = self.pipeline.invalidate();
        debug!(through_seq = seq, "erase invalidated outstanding requests");
    }

    /// Submit the current drawing for classification.
    ///
    /// A never-drawn or just-erased canvas has nothing to export; the request
    /// is still issued so the caller observes the `InvalidInput` outcome
    /// through the normal delivery channel.
    pub fn classify(&mut self) -> u64 {
        let snapshot = self.canvas.export_snapshot();
        self.pipeline.classify(snapshot, Orientation::Up)
    }

    /// Immutable copy of the current drawing, `None` while blank
    pub fn export_snapshot(&self) -> Option<Snapshot> {
        self.canvas.export_snapshot()
    }

    /// Non-blocking check for a delivered outcome
    pub fn poll_outcome(&self) -> Option<OutcomeEnvelope> {
        self.outcomes.try_recv().ok()
    }

    /// Block the caller (the UI-safe thread) until an outcome arrives
    pub fn wait_outcome(&self, timeout: Duration) -> Option<OutcomeEnvelope> {
        self.outcomes.recv_timeout(timeout).ok()
    }

    /// Subscribe to canvas events (stroke began, cleared)
    pub fn subscribe_events(&self) -> Receiver<CanvasEvent> {
        self.canvas.subscribe_events()
    }

    pub fn canvas(&self) -> &SketchCanvas {
        &self.canvas
    }

    pub fn canvas_mut(&mut self) -> &mut SketchCanvas {
        &mut self.canvas
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canvas::BrushState;
    use crate::classify::{ClassificationOutcome, ModelInputSpec, NoResultReason, ScoredLabel};
    use anyhow::Result;
    use ndarray::Array4;

    /// Model stub that only ranks anything when ink actually reached the
    /// input tensor, so the end-to-end tests verify the whole path from
    /// stroke compositing through preprocessing.
    struct InkAwareStub;

    impl ShapeModel for InkAwareStub {
        fn input_spec(&self) -> ModelInputSpec {
            ModelInputSpec {
                width: 28,
                height: 28,
            }
        }

        fn infer(&mut self, input: Array4<f32>) -> Result<Vec<ScoredLabel>> {
            // Ink normalizes below the white background's 1.0
            let saw_ink = input.iter().any(|&v| v < 0.0);
            if !saw_ink {
                return Ok(vec![]);
            }
            Ok(vec![
                ScoredLabel {
                    label: "circle".to_string(),
                    confidence: 0.91,
                },
                ScoredLabel {
                    label: "square".to_string(),
                    confidence: 0.09,
                },
            ])
        }
    }

    fn session() -> SketchSession {
        let canvas = SketchCanvas::new(300, 300, BrushState::default()).unwrap();
        SketchSession::new(canvas, Box::new(InkAwareStub))
    }

    fn draw_circle(session: &mut SketchSession, cx: f32, cy: f32, radius: f32) {
        let points: Vec<Point> = (0..=32)
            .map(|i| {
                let angle = (i as f32) * std::f32::consts::TAU / 32.0;
                Point::new(cx + radius * angle.cos(), cy + radius * angle.sin())
            })
            .collect();

        session.pointer_down(points[0]);
        for p in &points[1..] {
            session.pointer_moved(*p);
        }
        session.pointer_up(points[32]);
    }

    #[test]
    fn test_drawn_circle_classifies_to_completed() {
        let mut session = session();
        draw_circle(&mut session, 150.0, 150.0, 80.0);

        session.classify();

        let envelope = session
            .wait_outcome(Duration::from_secs(5))
            .expect("an outcome must arrive");
        match envelope.outcome {
            ClassificationOutcome::Classified { label, confidence } => {
                assert_eq!(label, "circle");
                assert!((0.0..=1.0).contains(&confidence));
            }
            other => panic!("unexpected outcome {other:?}"),
        }
    }

    #[test]
    fn test_fresh_canvas_classifies_to_invalid_input() {
        let mut session = session();

        session.classify();

        let envelope = session.wait_outcome(Duration::from_secs(1)).unwrap();
        assert_eq!(
            envelope.outcome,
            ClassificationOutcome::NoResult {
                reason: NoResultReason::InvalidInput
            }
        );
    }

    #[test]
    fn test_draw_erase_export_is_none() {
        let mut session = session();
        draw_circle(&mut session, 150.0, 150.0, 80.0);
        assert!(session.export_snapshot().is_some());

        session.erase();

        assert!(session.export_snapshot().is_none());
    }

    #[test]
    fn test_classify_after_erase_reports_invalid_input() {
        let mut session = session();
        draw_circle(&mut session, 150.0, 150.0, 80.0);
        session.erase();

        session.classify();

        let envelope = session.wait_outcome(Duration::from_secs(1)).unwrap();
        assert_eq!(
            envelope.outcome,
            ClassificationOutcome::NoResult {
                reason: NoResultReason::InvalidInput
            }
        );
    }

    #[test]
    fn test_stray_pointer_events_are_absorbed() {
        let mut session = session();

        // No pointer_down first; must not panic and must not draw
        session.pointer_moved(Point::new(50.0, 50.0));
        session.pointer_up(Point::new(60.0, 60.0));

        assert!(session.export_snapshot().is_none());
    }

    #[test]
    fn test_stroke_began_reaches_subscribers() {
        let mut session = session();
        let events = session.subscribe_events();

        session.pointer_down(Point::new(10.0, 10.0));

        assert_eq!(events.try_recv().unwrap(), CanvasEvent::StrokeBegan);
    }
}
