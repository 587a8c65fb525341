//! Incremental stroke compositing
//!
//! Pure pixel-level operations over the canvas bitmap. A segment is rendered
//! as a capsule (thick line with rounded caps) by measuring each candidate
//! pixel's distance to the segment, with a one-pixel antialiased edge, and
//! blending source-over onto whatever is already on the bitmap.
//!
//! Segments composite at the ink color's full alpha; the configured brush
//! opacity is applied exactly once per stroke by [`apply_overall_opacity`],
//! so overlapping segments of one stroke never double-blend.

use image::{Rgba, RgbaImage};

use super::brush::BrushState;
use super::Point;

/// Composite one line segment (round caps, brush width) onto the bitmap.
///
/// `from == to` renders a single dot of the brush's diameter. Previously
/// drawn content is preserved underneath via source-over blending.
pub fn composite_segment(bitmap: &mut RgbaImage, from: Point, to: Point, brush: &BrushState) {
    let radius = brush.width / 2.0;
    let color = brush.color();

    let (width, height) = bitmap.dimensions();

    // Candidate pixels: the segment's bounding box dilated by the brush
    // radius plus one pixel for the antialiased edge.
    let min_x = (from.x.min(to.x) - radius - 1.0).floor().max(0.0) as u32;
    let min_y = (from.y.min(to.y) - radius - 1.0).floor().max(0.0) as u32;
    let max_x = (from.x.max(to.x) + radius + 1.0).ceil().min(width as f32 - 1.0) as u32;
    let max_y = (from.y.max(to.y) + radius + 1.0).ceil().min(height as f32 - 1.0) as u32;

    for y in min_y..=max_y {
        for x in min_x..=max_x {
            let center = Point {
                x: x as f32 + 0.5,
                y: y as f32 + 0.5,
            };
            let distance = distance_to_segment(center, from, to);
            let coverage = (radius - distance + 0.5).clamp(0.0, 1.0);
            if coverage > 0.0 {
                blend_src_over(bitmap.get_pixel_mut(x, y), color, coverage);
            }
        }
    }
}

/// Bake the configured stroke transparency into the whole bitmap.
///
/// Called once at stroke end: every pixel's alpha is scaled by `opacity`,
/// which matches re-compositing the accumulated image onto a blank surface
/// at that alpha. With full opacity this is the identity.
pub fn apply_overall_opacity(bitmap: &mut RgbaImage, opacity: f32) {
    if opacity >= 1.0 {
        return;
    }
    let opacity = opacity.clamp(0.0, 1.0);

    for pixel in bitmap.pixels_mut() {
        pixel[3] = (pixel[3] as f32 * opacity).round() as u8;
    }
}

/// Distance from `p` to the closest point of segment `a`-`b`.
///
/// Degenerates to point distance for a zero-length segment.
fn distance_to_segment(p: Point, a: Point, b: Point) -> f32 {
    let (abx, aby) = (b.x - a.x, b.y - a.y);
    let (apx, apy) = (p.x - a.x, p.y - a.y);

    let length_sq = abx * abx + aby * aby;
    if length_sq <= f32::EPSILON {
        return (apx * apx + apy * apy).sqrt();
    }

    let t = ((apx * abx + apy * aby) / length_sq).clamp(0.0, 1.0);
    let (dx, dy) = (apx - t * abx, apy - t * aby);
    (dx * dx + dy * dy).sqrt()
}

/// Source-over blend of non-premultiplied ink onto a destination pixel.
fn blend_src_over(dst: &mut Rgba<u8>, src: Rgba<u8>, coverage: f32) {
    let src_alpha = (src[3] as f32 / 255.0) * coverage;
    if src_alpha <= 0.0 {
        return;
    }
    let dst_alpha = dst[3] as f32 / 255.0;
    let out_alpha = src_alpha + dst_alpha * (1.0 - src_alpha);
    if out_alpha <= 0.0 {
        *dst = Rgba([0, 0, 0, 0]);
        return;
    }

    for c in 0..3 {
        let blended = (src[c] as f32 * src_alpha + dst[c] as f32 * dst_alpha * (1.0 - src_alpha))
            / out_alpha;
        dst[c] = blended.round().clamp(0.0, 255.0) as u8;
    }
    dst[3] = (out_alpha * 255.0).round().clamp(0.0, 255.0) as u8;
}
