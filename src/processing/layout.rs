use crate::canvas::Rect;

/// Uniform scale followed by an integer translation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DrawTransform {
    pub scale: f32,
    pub dx: i32,
    pub dy: i32,
}

impl DrawTransform {
    pub const IDENTITY: Self = Self {
        scale: 1.0,
        dx: 0,
        dy: 0,
    };

    #[must_use]
    pub fn is_identity(&self) -> bool {
        *self == Self::IDENTITY
    }
}

impl Default for DrawTransform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// Scale an image so it fills `viewport` without distortion, cropping the
/// overflow, and centre it. Degenerate inputs yield the identity transform.
#[must_use]
pub fn cover_transform(src_w: u32, src_h: u32, viewport: Rect) -> DrawTransform {
    if viewport.is_empty() || src_w == 0 || src_h == 0 {
        return DrawTransform::IDENTITY;
    }
    let dw = src_w as f32;
    let dh = src_h as f32;
    let vw = viewport.width() as f32;
    let vh = viewport.height() as f32;

    let scale = if dw * vh > vw * dh { vh / dh } else { vw / dw };
    DrawTransform {
        scale,
        dx: center_offset(vw, dw * scale),
        dy: center_offset(vh, dh * scale),
    }
}

/// Size that keeps the aspect ratio and fits both sides within `max_dim`.
/// Images already small enough are returned unchanged.
#[must_use]
pub fn fit_within(src_w: u32, src_h: u32, max_dim: u32) -> (u32, u32) {
    let iw = src_w.max(1) as f32;
    let ih = src_h.max(1) as f32;
    let limit = max_dim.max(1) as f32;
    let scale = (limit / iw).min(limit / ih).min(1.0);
    let w = (iw * scale).round().clamp(1.0, limit);
    let h = (ih * scale).round().clamp(1.0, limit);
    (w as u32, h as u32)
}

// Half of the slack, rounded half-up.
fn center_offset(outer: f32, inner: f32) -> i32 {
    ((outer - inner) * 0.5 + 0.5).floor() as i32
}

#[cfg(test)]
mod tests {
    use super::*;

    fn viewport(w: i32, h: i32) -> Rect {
        Rect::new(0, 0, w, h)
    }

    #[test]
    fn wide_image_crops_sides() {
        let t = cover_transform(200, 100, viewport(100, 100));
        assert!((t.scale - 1.0).abs() < f32::EPSILON);
        assert_eq!((t.dx, t.dy), (-50, 0));
    }

    #[test]
    fn tall_image_crops_top_and_bottom() {
        // dw*vh > vw*dh fails (100*100 vs 100*200), so scale = vw/dw = 1 and 100px of height is cropped.
        let t = cover_transform(100, 200, viewport(100, 100));
        assert!((t.scale - 1.0).abs() < f32::EPSILON);
        assert_eq!((t.dx, t.dy), (0, -50));
    }

    #[test]
    fn large_image_scales_down_to_cover() {
        let t = cover_transform(400, 800, viewport(100, 100));
        assert!((t.scale - 0.25).abs() < f32::EPSILON);
        assert_eq!((t.dx, t.dy), (0, -50));
    }

    #[test]
    fn small_square_upscales_to_fill() {
        let t = cover_transform(50, 50, viewport(100, 100));
        assert!((t.scale - 2.0).abs() < f32::EPSILON);
        assert_eq!((t.dx, t.dy), (0, 0));
    }

    #[test]
    fn odd_slack_rounds_half_up() {
        // 30x10 into 15x10: scale 1, slack -15 -> -7.5 -> -7
        let t = cover_transform(30, 10, viewport(15, 10));
        assert_eq!((t.dx, t.dy), (-7, 0));
        // 10x30 into 10x15: slack -15 on the vertical axis
        let t = cover_transform(10, 30, viewport(10, 15));
        assert_eq!((t.dx, t.dy), (0, -7));
    }

    #[test]
    fn offset_bounds_use_their_size_only() {
        let t = cover_transform(200, 100, Rect::new(40, 40, 140, 140));
        assert_eq!((t.dx, t.dy), (-50, 0));
    }

    #[test]
    fn degenerate_inputs_are_identity() {
        assert!(cover_transform(200, 100, viewport(0, 100)).is_identity());
        assert!(cover_transform(200, 100, Rect::default()).is_identity());
        assert!(cover_transform(0, 100, viewport(100, 100)).is_identity());
    }

    #[test]
    fn fit_within_keeps_aspect() {
        assert_eq!(fit_within(4000, 2000, 256), (256, 128));
        assert_eq!(fit_within(1000, 3000, 300), (100, 300));
        assert_eq!(fit_within(120, 80, 256), (120, 80));
    }

    #[test]
    fn covered_image_spans_viewport() {
        let vp = viewport(160, 90);
        let t = cover_transform(400, 400, vp);
        let (x0, y0) = (t.dx as f32, t.dy as f32);
        let (x1, y1) = (x0 + 400.0 * t.scale, y0 + 400.0 * t.scale);
        assert!(x0 <= 0.0 && y0 <= 0.0);
        assert!(x1 >= 160.0 && y1 >= 90.0);
    }
}
