//! Snapshot preprocessing for the shape classifier
//!
//! The normalization policy is fixed: bake the declared orientation, flatten
//! RGBA over a white background, center-crop to the model's input aspect
//! ratio, bilinear-scale to its input resolution, mean/std normalize, and lay
//! the result out as an NCHW tensor.

use anyhow::{Context, Result};
use image::{imageops, RgbaImage};
use ndarray::{Array3, Array4};

use crate::canvas::Snapshot;
use crate::classify::model::ModelInputSpec;

/// Declared pixel orientation of a snapshot, i.e. the transform needed to
/// bring it upright before inference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Orientation {
    #[default]
    Up,
    Down,
    Left,
    Right,
    UpMirrored,
    DownMirrored,
    LeftMirrored,
    RightMirrored,
}

impl Orientation {
    /// Apply the orientation transform to an image
    pub fn apply(self, image: RgbaImage) -> RgbaImage {
        match self {
            Orientation::Up => image,
            Orientation::Down => imageops::rotate180(&image),
            Orientation::Left => imageops::rotate90(&image),
            Orientation::Right => imageops::rotate270(&image),
            Orientation::UpMirrored => imageops::flip_horizontal(&image),
            Orientation::DownMirrored => imageops::rotate180(&imageops::flip_horizontal(&image)),
            Orientation::LeftMirrored => imageops::rotate90(&imageops::flip_horizontal(&image)),
            Orientation::RightMirrored => imageops::rotate270(&imageops::flip_horizontal(&image)),
        }
    }
}

/// Mean/std normalization parameters
#[derive(Debug, Clone)]
pub struct NormalizationConfig {
    /// Mean values per channel [R, G, B]
    pub mean: [f32; 3],
    /// Std values per channel [R, G, B]
    pub std: [f32; 3],
}

impl Default for NormalizationConfig {
    fn default() -> Self {
        // Maps [0, 1] -> [-1, 1], the range the exported classifier trained on
        Self {
            mean: [0.5, 0.5, 0.5],
            std: [0.5, 0.5, 0.5],
        }
    }
}

/// Flatten RGBA pixels over a white background into an RGB f32 array in [0, 1].
///
/// The canvas bitmap is transparent where nothing was drawn; the classifier
/// expects dark strokes on a light field.
pub fn rgba_over_white_f32(data: &[u8], width: u32, height: u32) -> Array3<f32> {
    let mut rgb = Array3::<f32>::zeros((height as usize, width as usize, 3));

    for y in 0..height as usize {
        for x in 0..width as usize {
            let idx = (y * width as usize + x) * 4;
            if idx + 3 < data.len() {
                let alpha = data[idx + 3] as f32 / 255.0;
                for c in 0..3 {
                    let ink = data[idx + c] as f32 / 255.0;
                    rgb[[y, x, c]] = ink * alpha + (1.0 - alpha);
                }
            }
        }
    }

    rgb
}

/// Center-crop to the target aspect ratio (width / height).
pub fn center_crop(image: &Array3<f32>, target_aspect: f32) -> Array3<f32> {
    let (h, w, c) = image.dim();
    let aspect = w as f32 / h as f32;

    let (crop_w, crop_h) = if aspect > target_aspect {
        // Too wide: trim columns
        (((h as f32) * target_aspect).round() as usize, h)
    } else {
        // Too tall: trim rows
        (w, ((w as f32) / target_aspect).round() as usize)
    };
    let crop_w = crop_w.clamp(1, w);
    let crop_h = crop_h.clamp(1, h);

    let x0 = (w - crop_w) / 2;
    let y0 = (h - crop_h) / 2;

    let mut cropped = Array3::<f32>::zeros((crop_h, crop_w, c));
    for y in 0..crop_h {
        for x in 0..crop_w {
            for ch in 0..c {
                cropped[[y, x, ch]] = image[[y0 + y, x0 + x, ch]];
            }
        }
    }

    cropped
}

/// Bilinear resize to an exact output resolution.
pub fn resize_bilinear(image: &Array3<f32>, out_h: usize, out_w: usize) -> Array3<f32> {
    let (h, w, c) = image.dim();
    let scale_y = h as f32 / out_h as f32;
    let scale_x = w as f32 / out_w as f32;

    let mut resized = Array3::<f32>::zeros((out_h, out_w, c));

    for y in 0..out_h {
        for x in 0..out_w {
            let src_y = ((y as f32 + 0.5) * scale_y - 0.5).clamp(0.0, h as f32 - 1.0);
            let src_x = ((x as f32 + 0.5) * scale_x - 0.5).clamp(0.0, w as f32 - 1.0);

            let y0 = src_y.floor() as usize;
            let y1 = (y0 + 1).min(h - 1);
            let x0 = src_x.floor() as usize;
            let x1 = (x0 + 1).min(w - 1);

            let fy = src_y - y0 as f32;
            let fx = src_x - x0 as f32;

            for ch in 0..c {
                let v00 = image[[y0, x0, ch]];
                let v01 = image[[y0, x1, ch]];
                let v10 = image[[y1, x0, ch]];
                let v11 = image[[y1, x1, ch]];

                let v0 = v00 * (1.0 - fx) + v01 * fx;
                let v1 = v10 * (1.0 - fx) + v11 * fx;
                resized[[y, x, ch]] = v0 * (1.0 - fy) + v1 * fy;
            }
        }
    }

    resized
}

/// Normalize image with per-channel mean and std.
pub fn normalize(image: &Array3<f32>, mean: &[f32; 3], std: &[f32; 3]) -> Array3<f32> {
    let (h, w, _) = image.dim();
    let mut normalized = Array3::<f32>::zeros((h, w, 3));

    for y in 0..h {
        for x in 0..w {
            for c in 0..3 {
                normalized[[y, x, c]] = (image[[y, x, c]] - mean[c]) / std[c];
            }
        }
    }

    normalized
}

/// Convert HWC image to NCHW tensor (batch size 1).
pub fn hwc_to_nchw(image: &Array3<f32>) -> Array4<f32> {
    let (h, w, c) = image.dim();
    let mut tensor = Array4::<f32>::zeros((1, c, h, w));

    for y in 0..h {
        for x in 0..w {
            for ch in 0..c {
                tensor[[0, ch, y, x]] = image[[y, x, ch]];
            }
        }
    }

    tensor
}

/// Full preprocessing pipeline: snapshot -> model input tensor.
pub fn prepare_input(
    snapshot: &Snapshot,
    orientation: Orientation,
    input_spec: &ModelInputSpec,
    config: &NormalizationConfig,
) -> Result<Array4<f32>> {
    let image = snapshot
        .to_image()
        .context("snapshot pixel buffer does not match its declared dimensions")?;
    let upright = orientation.apply(image);

    let rgb = rgba_over_white_f32(upright.as_raw(), upright.width(), upright.height());
    let target_aspect = input_spec.width as f32 / input_spec.height as f32;
    let cropped = center_crop(&rgb, target_aspect);
    let resized = resize_bilinear(&cropped, input_spec.height as usize, input_spec.width as usize);
    let normalized = normalize(&resized, &config.mean, &config.std);

    Ok(hwc_to_nchw(&normalized))
}
