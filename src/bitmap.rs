//! Immutable decoded image shared between the fetch workers and the renderer.

use std::fmt;
use std::sync::Arc;

use image::{Rgba, RgbaImage};

/// A decoded RGBA8 image. Cloning shares the pixel buffer; nothing mutates it
/// after construction, so a new image always means a new `Bitmap`.
#[derive(Clone)]
pub struct Bitmap {
    pixels: Arc<RgbaImage>,
    has_alpha: bool,
}

impl Bitmap {
    pub fn from_rgba(img: RgbaImage) -> Self {
        let has_alpha = img.pixels().any(|p| p.0[3] < u8::MAX);
        Self {
            pixels: Arc::new(img),
            has_alpha,
        }
    }

    /// Single-colour bitmap, mostly useful for placeholders and tests.
    pub fn solid(width: u32, height: u32, rgba: [u8; 4]) -> Self {
        Self::from_rgba(RgbaImage::from_pixel(width, height, Rgba(rgba)))
    }

    #[must_use]
    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    #[must_use]
    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    #[must_use]
    pub fn dimensions(&self) -> (u32, u32) {
        self.pixels.dimensions()
    }

    /// Whether any pixel is not fully opaque.
    #[must_use]
    pub fn has_alpha(&self) -> bool {
        self.has_alpha
    }

    #[must_use]
    pub fn pixels(&self) -> &RgbaImage {
        &self.pixels
    }

    /// True when both handles share the same pixel buffer.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.pixels, &other.pixels)
    }
}

impl fmt::Debug for Bitmap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bitmap")
            .field("width", &self.width())
            .field("height", &self.height())
            .field("has_alpha", &self.has_alpha)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alpha_is_detected_once() {
        let opaque = Bitmap::solid(2, 2, [10, 20, 30, 255]);
        assert!(!opaque.has_alpha());

        let mut img = RgbaImage::from_pixel(2, 2, Rgba([0, 0, 0, 255]));
        img.put_pixel(1, 1, Rgba([0, 0, 0, 128]));
        assert!(Bitmap::from_rgba(img).has_alpha());
    }

    #[test]
    fn clones_share_pixels() {
        let a = Bitmap::solid(4, 3, [1, 2, 3, 255]);
        let b = a.clone();
        assert!(a.ptr_eq(&b));
        assert_eq!(b.dimensions(), (4, 3));
        assert!(!a.ptr_eq(&Bitmap::solid(4, 3, [1, 2, 3, 255])));
    }
}
