//! Snapshot data structure for exported canvas content

use std::time::Instant;

use image::RgbaImage;

/// An immutable copy of the canvas pixel content, taken at export time.
///
/// The pixel buffer is a deep copy, so the canvas can keep compositing
/// while a snapshot is mid-inference on another thread.
#[derive(Debug, Clone)]
pub struct Snapshot {
    /// Raw RGBA pixel data (non-premultiplied)
    pub data: Vec<u8>,
    /// Snapshot width in pixels
    pub width: u32,
    /// Snapshot height in pixels
    pub height: u32,
    /// Timestamp when the snapshot was taken
    pub taken_at: Instant,
}

impl Snapshot {
    /// Create a new snapshot from raw RGBA data
    pub fn new(data: Vec<u8>, width: u32, height: u32) -> Self {
        Self {
            data,
            width,
            height,
            taken_at: Instant::now(),
        }
    }

    /// Copy the current pixel content out of a canvas bitmap
    pub fn from_image(image: &RgbaImage) -> Self {
        Self::new(image.as_raw().clone(), image.width(), image.height())
    }

    /// Get snapshot dimensions as (width, height)
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Rebuild an image from the snapshot pixels.
    ///
    /// Returns `None` when the buffer length does not match the declared
    /// dimensions (a malformed snapshot, never one produced by the canvas).
    pub fn to_image(&self) -> Option<RgbaImage> {
        RgbaImage::from_raw(self.width, self.height, self.data.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_is_deep_copy() {
        let mut image = RgbaImage::new(4, 4);
        let snapshot = Snapshot::from_image(&image);

        image.put_pixel(0, 0, image::Rgba([255, 0, 0, 255]));

        // Mutating the source bitmap must not affect the snapshot
        assert_eq!(snapshot.data[0], 0);
        assert_eq!(snapshot.dimensions(), (4, 4));
    }

    #[test]
    fn test_snapshot_roundtrip_to_image() {
        let mut image = RgbaImage::new(2, 3);
        image.put_pixel(1, 2, image::Rgba([10, 20, 30, 40]));

        let snapshot = Snapshot::from_image(&image);
        let rebuilt = snapshot.to_image().unwrap();

        assert_eq!(rebuilt, image);
    }

    #[test]
    fn test_malformed_snapshot_has_no_image() {
        let snapshot = Snapshot::new(vec![0u8; 7], 2, 2);
        assert!(snapshot.to_image().is_none());
    }
}
