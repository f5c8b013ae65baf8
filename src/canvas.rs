//! Output-sink abstraction the display items paint into.

use crate::bitmap::Bitmap;
use crate::processing::layout::DrawTransform;

/// Axis-aligned integer rectangle, edges exclusive on the right/bottom.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Rect {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

impl Rect {
    pub const fn new(left: i32, top: i32, right: i32, bottom: i32) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    pub const fn from_size(width: u32, height: u32) -> Self {
        Self::new(0, 0, width as i32, height as i32)
    }

    #[must_use]
    pub const fn width(&self) -> i32 {
        self.right - self.left
    }

    #[must_use]
    pub const fn height(&self) -> i32 {
        self.bottom - self.top
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.left >= self.right || self.top >= self.bottom
    }

    #[must_use]
    pub fn center(&self) -> (f32, f32) {
        (
            (self.left + self.right) as f32 * 0.5,
            (self.top + self.bottom) as f32 * 0.5,
        )
    }
}

/// Colour transform applied when painting a bitmap.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ColorFilter {
    /// Multiply every channel by the given ARGB colour.
    Tint(u32),
    /// 4x5 row-major colour matrix.
    Matrix([f32; 20]),
}

/// How a primitive is painted.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Paint {
    /// ARGB colour for fills and text.
    pub color: u32,
    /// Global opacity multiplier.
    pub alpha: u8,
    pub color_filter: Option<ColorFilter>,
}

impl Paint {
    pub const fn fill(color: u32) -> Self {
        Self {
            color,
            alpha: u8::MAX,
            color_filter: None,
        }
    }
}

impl Default for Paint {
    fn default() -> Self {
        Self::fill(0xFF00_0000)
    }
}

/// A painting surface. Implementations are pure sinks: the caller never
/// reads anything back.
pub trait Canvas {
    fn save(&mut self);
    fn restore(&mut self);
    fn clip_rect(&mut self, rect: Rect);
    fn concat(&mut self, transform: &DrawTransform);
    /// Rotate by `degrees` about `(px, py)`.
    fn rotate(&mut self, degrees: f32, px: f32, py: f32);
    fn draw_bitmap(&mut self, bitmap: &Bitmap, x: f32, y: f32, paint: &Paint);
    fn draw_rect(&mut self, rect: Rect, paint: &Paint);
    fn draw_text(&mut self, text: &str, x: f32, y: f32, paint: &Paint);
}

#[derive(Debug, Clone)]
pub enum DrawOp {
    Save,
    Restore,
    ClipRect(Rect),
    Concat(DrawTransform),
    Rotate { degrees: f32, px: f32, py: f32 },
    Bitmap { bitmap: Bitmap, x: f32, y: f32, paint: Paint },
    Rect { rect: Rect, paint: Paint },
    Text { text: String, x: f32, y: f32, paint: Paint },
}

/// Canvas that records every call, for headless runs and tests.
#[derive(Debug, Default)]
pub struct RecordingCanvas {
    ops: Vec<DrawOp>,
}

impl RecordingCanvas {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn ops(&self) -> &[DrawOp] {
        &self.ops
    }

    pub fn clear(&mut self) {
        self.ops.clear();
    }

    /// Bitmaps painted so far, in order.
    pub fn bitmaps(&self) -> impl Iterator<Item = &Bitmap> {
        self.ops.iter().filter_map(|op| match op {
            DrawOp::Bitmap { bitmap, .. } => Some(bitmap),
            _ => None,
        })
    }

    /// Rectangle fills painted so far, in order.
    pub fn fills(&self) -> impl Iterator<Item = (Rect, &Paint)> {
        self.ops.iter().filter_map(|op| match op {
            DrawOp::Rect { rect, paint } => Some((*rect, paint)),
            _ => None,
        })
    }
}

impl Canvas for RecordingCanvas {
    fn save(&mut self) {
        self.ops.push(DrawOp::Save);
    }

    fn restore(&mut self) {
        self.ops.push(DrawOp::Restore);
    }

    fn clip_rect(&mut self, rect: Rect) {
        self.ops.push(DrawOp::ClipRect(rect));
    }

    fn concat(&mut self, transform: &DrawTransform) {
        self.ops.push(DrawOp::Concat(*transform));
    }

    fn rotate(&mut self, degrees: f32, px: f32, py: f32) {
        self.ops.push(DrawOp::Rotate { degrees, px, py });
    }

    fn draw_bitmap(&mut self, bitmap: &Bitmap, x: f32, y: f32, paint: &Paint) {
        self.ops.push(DrawOp::Bitmap {
            bitmap: bitmap.clone(),
            x,
            y,
            paint: *paint,
        });
    }

    fn draw_rect(&mut self, rect: Rect, paint: &Paint) {
        self.ops.push(DrawOp::Rect { rect, paint: *paint });
    }

    fn draw_text(&mut self, text: &str, x: f32, y: f32, paint: &Paint) {
        self.ops.push(DrawOp::Text {
            text: text.to_owned(),
            x,
            y,
            paint: *paint,
        });
    }
}
