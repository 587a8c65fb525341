//! Stroke Rasterizer
//!
//! Maintains the persisted canvas bitmap and the stroke lifecycle. All
//! operations here are synchronous and run on whichever single thread owns the
//! canvas; segments are always applied in arrival order. The asynchronous
//! classification side only ever sees immutable [`Snapshot`]s.

pub mod bitmap;
pub mod brush;
pub mod events;
pub mod raster;

use image::RgbaImage;
use thiserror::Error;
use tracing::debug;

pub use bitmap::Snapshot;
pub use brush::{BlendMode, BrushState};
pub use events::{CanvasEvent, EventBus};

/// Errors surfaced by canvas operations
#[derive(Debug, Error)]
pub enum CanvasError {
    /// `extend_stroke`/`end_stroke` called without a preceding `begin_stroke`.
    /// A caller contract violation; the pointer-event adapter absorbs it.
    #[error("no active stroke")]
    StrokeNotActive,
    /// Brush parameters violate the brush invariants
    #[error("invalid brush: {0}")]
    InvalidBrush(String),
    /// Zero-sized drawing surface
    #[error("canvas dimensions must be non-zero, got {0}x{1}")]
    InvalidDimensions(u32, u32),
    /// Brush mutation attempted mid-stroke
    #[error("brush cannot change while a stroke is active")]
    StrokeInProgress,
}

/// A 2D coordinate in the canvas's local coordinate space
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    /// Clamp into the surface. Non-finite coordinates (touch jitter,
    /// synthesized events) collapse to the origin axis rather than erroring;
    /// pointer input should never produce a user-visible failure.
    fn clamped(self, width: u32, height: u32) -> Self {
        let sanitize = |v: f32, max: f32| {
            if v.is_finite() {
                v.clamp(0.0, max)
            } else {
                0.0
            }
        };
        Self {
            x: sanitize(self.x, width as f32 - 1.0),
            y: sanitize(self.y, height as f32 - 1.0),
        }
    }
}

/// Stroke lifecycle state machine
#[derive(Debug, Clone, Copy, PartialEq)]
enum StrokePhase {
    /// No stroke in progress
    Idle,
    /// Between pointer-down and pointer-up
    Active {
        /// Most recent point of the stroke
        last_point: Point,
        /// Whether any `extend_stroke` happened since `begin_stroke`
        has_moved: bool,
    },
}

/// The drawing surface: a fixed-resolution bitmap plus brush and stroke state.
pub struct SketchCanvas {
    bitmap: RgbaImage,
    brush: BrushState,
    phase: StrokePhase,
    /// False until the first segment lands, reset by `erase`
    has_content: bool,
    events: EventBus,
}

impl SketchCanvas {
    /// Create a blank canvas of the given dimensions
    pub fn new(width: u32, height: u32, brush: BrushState) -> Result<Self, CanvasError> {
        if width == 0 || height == 0 {
            return Err(CanvasError::InvalidDimensions(width, height));
        }
        brush.validate()?;

        Ok(Self {
            bitmap: RgbaImage::new(width, height),
            brush,
            phase: StrokePhase::Idle,
            has_content: false,
            events: EventBus::new(),
        })
    }

    /// Canvas dimensions as (width, height)
    pub fn dimensions(&self) -> (u32, u32) {
        self.bitmap.dimensions()
    }

    /// Current brush state
    pub fn brush(&self) -> &BrushState {
        &self.brush
    }

    /// Replace the brush. Allowed between strokes only.
    pub fn set_brush(&mut self, brush: BrushState) -> Result<(), CanvasError> {
        if !matches!(self.phase, StrokePhase::Idle) {
            return Err(CanvasError::StrokeInProgress);
        }
        brush.validate()?;
        self.brush = brush;
        Ok(())
    }

    /// Register a listener for canvas events
    pub fn subscribe_events(&self) -> crossbeam_channel::Receiver<CanvasEvent> {
        self.events.subscribe()
    }

    /// Start a stroke at `point`. No pixels are touched yet.
    ///
    /// Safe to call while a stroke is already active: the prior session state
    /// is overwritten without error (pointer delivery can drop an up event).
    pub fn begin_stroke(&mut self, point: Point) {
        let (width, height) = self.dimensions();
        let point = point.clamped(width, height);

        self.events.emit(CanvasEvent::StrokeBegan);
        self.phase = StrokePhase::Active {
            last_point: point,
            has_moved: false,
        };
    }

    /// Extend the active stroke to `point`, compositing one segment.
    ///
    /// Segments composite at the ink's full alpha; the brush opacity is baked
    /// in once by [`end_stroke`](Self::end_stroke).
    pub fn extend_stroke(&mut self, point: Point) -> Result<(), CanvasError> {
        let StrokePhase::Active { last_point, .. } = self.phase else {
            return Err(CanvasError::StrokeNotActive);
        };

        let (width, height) = self.dimensions();
        let point = point.clamped(width, height);

        raster::composite_segment(&mut self.bitmap, last_point, point, &self.brush);
        self.has_content = true;
        self.phase = StrokePhase::Active {
            last_point: point,
            has_moved: true,
        };
        Ok(())
    }

    /// Finish the active stroke.
    ///
    /// A tap with no movement still renders a dot at the start point. The
    /// finishing pass then bakes the configured overall opacity into the
    /// accumulated bitmap, keeping multi-segment strokes uniform. The
    /// pointer-up coordinate is not part of the path: the last move already
    /// drew to it.
    pub fn end_stroke(&mut self) -> Result<(), CanvasError> {
        let StrokePhase::Active {
            last_point,
            has_moved,
        } = self.phase
        else {
            return Err(CanvasError::StrokeNotActive);
        };

        if !has_moved {
            raster::composite_segment(&mut self.bitmap, last_point, last_point, &self.brush);
            self.has_content = true;
        }
        raster::apply_overall_opacity(&mut self.bitmap, self.brush.opacity);
        self.phase = StrokePhase::Idle;
        debug!(moved = has_moved, "stroke finished");
        Ok(())
    }

    /// Reset the bitmap to blank. Brush state is untouched; an active stroke
    /// simply continues onto the blank surface.
    pub fn erase(&mut self) {
        let (width, height) = self.dimensions();
        self.bitmap = RgbaImage::new(width, height);
        self.has_content = false;
        self.events.emit(CanvasEvent::Cleared);
        debug!("canvas erased");
    }

    /// Take an immutable copy of the current bitmap.
    ///
    /// Returns `None` while the bitmap is in its blank state — "nothing to
    /// export" is a distinct outcome from an export failure.
    pub fn export_snapshot(&self) -> Option<Snapshot> {
        if !self.has_content {
            return None;
        }
        Some(Snapshot::from_image(&self.bitmap))
    }

    /// Direct pixel access for rendering or saving the canvas
    pub fn bitmap(&self) -> &RgbaImage {
        &self.bitmap
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn canvas() -> SketchCanvas {
        SketchCanvas::new(300, 300, BrushState::default()).unwrap()
    }

    fn ink_at(canvas: &SketchCanvas, x: u32, y: u32) -> bool {
        canvas.bitmap().get_pixel(x, y)[3] > 0
    }

    #[test]
    fn test_rejects_zero_sized_surface() {
        assert!(matches!(
            SketchCanvas::new(0, 300, BrushState::default()),
            Err(CanvasError::InvalidDimensions(0, 300))
        ));
    }

    #[test]
    fn test_begin_stroke_touches_no_pixels() {
        let mut canvas = canvas();
        canvas.begin_stroke(Point::new(150.0, 150.0));

        assert!(canvas.export_snapshot().is_none());
    }

    #[test]
    fn test_extend_without_begin_is_a_protocol_error() {
        let mut canvas = canvas();
        assert!(matches!(
            canvas.extend_stroke(Point::new(10.0, 10.0)),
            Err(CanvasError::StrokeNotActive)
        ));
        assert!(matches!(
            canvas.end_stroke(),
            Err(CanvasError::StrokeNotActive)
        ));
    }

    #[test]
    fn test_polyline_coverage() {
        let mut canvas = canvas();
        let path = [
            Point::new(50.0, 50.0),
            Point::new(150.0, 60.0),
            Point::new(250.0, 150.0),
            Point::new(150.0, 250.0),
        ];

        canvas.begin_stroke(path[0]);
        for p in &path[1..] {
            canvas.extend_stroke(*p).unwrap();
        }
        canvas.end_stroke().unwrap();

        // Every supplied point lies on the stroke, at the brush color
        for p in &path {
            assert!(ink_at(&canvas, p.x as u32, p.y as u32), "no ink at {p:?}");
            let pixel = canvas.bitmap().get_pixel(p.x as u32, p.y as u32);
            assert_eq!((pixel[0], pixel[1], pixel[2]), (0, 0, 0));
        }
        // Untouched corner stays blank
        assert!(!ink_at(&canvas, 5, 290));
    }

    #[test]
    fn test_tap_renders_a_dot() {
        let mut canvas = canvas();
        let p = Point::new(120.0, 80.0);

        canvas.begin_stroke(p);
        canvas.end_stroke().unwrap();

        assert!(ink_at(&canvas, 120, 80));
        assert!(canvas.export_snapshot().is_some());
    }

    #[test]
    fn test_begin_twice_overwrites_session_state() {
        let mut canvas = canvas();
        canvas.begin_stroke(Point::new(10.0, 10.0));
        canvas.begin_stroke(Point::new(200.0, 200.0));
        canvas.extend_stroke(Point::new(210.0, 210.0)).unwrap();
        canvas.end_stroke().unwrap();

        // The abandoned first session never drew
        assert!(!ink_at(&canvas, 10, 10));
        assert!(ink_at(&canvas, 205, 205));
    }

    #[test]
    fn test_erase_restores_blank_state() {
        let mut canvas = canvas();
        canvas.begin_stroke(Point::new(50.0, 50.0));
        canvas.extend_stroke(Point::new(100.0, 100.0)).unwrap();
        canvas.end_stroke().unwrap();
        assert!(canvas.export_snapshot().is_some());

        canvas.erase();

        assert!(canvas.export_snapshot().is_none());
        assert!(!ink_at(&canvas, 75, 75));
        // Brush survives an erase
        assert_eq!(*canvas.brush(), BrushState::default());
    }

    #[test]
    fn test_export_is_idempotent() {
        let mut canvas = canvas();
        canvas.begin_stroke(Point::new(30.0, 30.0));
        canvas.extend_stroke(Point::new(90.0, 90.0)).unwrap();
        canvas.end_stroke().unwrap();

        let first = canvas.export_snapshot().unwrap();
        let second = canvas.export_snapshot().unwrap();

        assert_eq!(first.data, second.data);
        assert_eq!(first.dimensions(), second.dimensions());
    }

    #[test]
    fn test_malformed_coordinates_are_clamped() {
        let mut canvas = canvas();
        canvas.begin_stroke(Point::new(f32::NAN, -50.0));
        canvas
            .extend_stroke(Point::new(5000.0, f32::INFINITY))
            .unwrap();
        canvas.end_stroke().unwrap();

        // The segment ran from (0, 0) to (299, 0) along the top edge
        assert!(ink_at(&canvas, 150, 0));
    }

    #[test]
    fn test_stroke_began_event_is_broadcast() {
        let mut canvas = canvas();
        let events = canvas.subscribe_events();

        canvas.begin_stroke(Point::new(10.0, 10.0));
        canvas.end_stroke().unwrap();
        canvas.erase();

        assert_eq!(events.try_recv().unwrap(), CanvasEvent::StrokeBegan);
        assert_eq!(events.try_recv().unwrap(), CanvasEvent::Cleared);
    }

    #[test]
    fn test_brush_change_rejected_mid_stroke() {
        let mut canvas = canvas();
        canvas.begin_stroke(Point::new(10.0, 10.0));

        let red = BrushState {
            ink_color: [255, 0, 0, 255],
            ..Default::default()
        };
        assert!(matches!(
            canvas.set_brush(red.clone()),
            Err(CanvasError::StrokeInProgress)
        ));

        canvas.end_stroke().unwrap();
        canvas.set_brush(red).unwrap();
        assert_eq!(canvas.brush().ink_color, [255, 0, 0, 255]);
    }

    #[test]
    fn test_opacity_bakes_once_per_stroke() {
        let brush = BrushState {
            opacity: 0.5,
            ..Default::default()
        };
        let mut canvas = SketchCanvas::new(100, 100, brush).unwrap();

        canvas.begin_stroke(Point::new(10.0, 50.0));
        // Several overlapping segments within one stroke
        canvas.extend_stroke(Point::new(60.0, 50.0)).unwrap();
        canvas.extend_stroke(Point::new(20.0, 50.0)).unwrap();
        canvas.end_stroke().unwrap();

        // One uniform alpha pass, not compounded per segment
        let alpha = canvas.bitmap().get_pixel(40, 50)[3];
        assert!((126..=129).contains(&alpha), "alpha was {alpha}");
    }
}
