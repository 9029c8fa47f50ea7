//! Preview display transform.
//!
//! A preview view stretches the capture buffer over its own bounds. When
//! the device is held sideways the buffer's native orientation no longer
//! matches the view, so the view content is re-mapped: the buffer
//! rectangle is centered on the view, scaled uniformly to cover it, and
//! rotated back by a multiple of 90°.

use serde::{Deserialize, Serialize};
use vidcap_common::error::{VidcapError, VidcapResult};

use crate::orientation::DisplayRotation;

/// A size in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Size {
    pub width: u32,
    pub height: u32,
}

impl Size {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// An axis-aligned rectangle in float coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub left: f64,
    pub top: f64,
    pub right: f64,
    pub bottom: f64,
}

impl Rect {
    pub fn new(left: f64, top: f64, right: f64, bottom: f64) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    /// Rectangle anchored at the origin.
    pub fn from_size(width: f64, height: f64) -> Self {
        Self::new(0.0, 0.0, width, height)
    }

    pub fn width(&self) -> f64 {
        self.right - self.left
    }

    pub fn height(&self) -> f64 {
        self.bottom - self.top
    }

    pub fn center(&self) -> (f64, f64) {
        (
            (self.left + self.right) / 2.0,
            (self.top + self.bottom) / 2.0,
        )
    }

    /// Translate by `(dx, dy)`.
    pub fn offset(&self, dx: f64, dy: f64) -> Self {
        Self::new(self.left + dx, self.top + dy, self.right + dx, self.bottom + dy)
    }

    pub fn contains_rect(&self, other: &Rect, epsilon: f64) -> bool {
        self.left <= other.left + epsilon
            && self.top <= other.top + epsilon
            && self.right >= other.right - epsilon
            && self.bottom >= other.bottom - epsilon
    }
}

/// 2D affine transform.
///
/// Maps `(x, y)` to `(a*x + b*y + tx, c*x + d*y + ty)`. The `post_*`
/// operations apply after the current mapping.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Matrix {
    pub a: f64,
    pub b: f64,
    pub c: f64,
    pub d: f64,
    pub tx: f64,
    pub ty: f64,
}

impl Matrix {
    pub const IDENTITY: Matrix = Matrix {
        a: 1.0,
        b: 0.0,
        c: 0.0,
        d: 1.0,
        tx: 0.0,
        ty: 0.0,
    };

    /// Stretch `src` exactly onto `dst` (no aspect preservation).
    pub fn rect_to_rect(src: &Rect, dst: &Rect) -> VidcapResult<Self> {
        if src.width() <= 0.0 || src.height() <= 0.0 {
            return Err(VidcapError::invalid_geometry("source rectangle is empty"));
        }
        let sx = dst.width() / src.width();
        let sy = dst.height() / src.height();
        Ok(Self {
            a: sx,
            b: 0.0,
            c: 0.0,
            d: sy,
            tx: dst.left - src.left * sx,
            ty: dst.top - src.top * sy,
        })
    }

    /// `other ∘ self`: apply `self`, then `other`.
    pub fn then(&self, other: &Matrix) -> Matrix {
        Matrix {
            a: other.a * self.a + other.b * self.c,
            b: other.a * self.b + other.b * self.d,
            c: other.c * self.a + other.d * self.c,
            d: other.c * self.b + other.d * self.d,
            tx: other.a * self.tx + other.b * self.ty + other.tx,
            ty: other.c * self.tx + other.d * self.ty + other.ty,
        }
    }

    /// Scale about the pivot `(px, py)`.
    pub fn post_scale(&self, sx: f64, sy: f64, px: f64, py: f64) -> Matrix {
        let scale = Matrix {
            a: sx,
            b: 0.0,
            c: 0.0,
            d: sy,
            tx: px - sx * px,
            ty: py - sy * py,
        };
        self.then(&scale)
    }

    /// Rotate clockwise (in y-down screen space) about `(px, py)`.
    pub fn post_rotate(&self, degrees: f64, px: f64, py: f64) -> Matrix {
        let (sin, cos) = snap_trig(degrees);
        let rotate = Matrix {
            a: cos,
            b: -sin,
            c: sin,
            d: cos,
            tx: px - cos * px + sin * py,
            ty: py - sin * px - cos * py,
        };
        self.then(&rotate)
    }

    pub fn map_point(&self, x: f64, y: f64) -> (f64, f64) {
        (
            self.a * x + self.b * y + self.tx,
            self.c * x + self.d * y + self.ty,
        )
    }

    /// Bounding box of the mapped rectangle.
    pub fn map_rect(&self, rect: &Rect) -> Rect {
        let corners = [
            self.map_point(rect.left, rect.top),
            self.map_point(rect.right, rect.top),
            self.map_point(rect.left, rect.bottom),
            self.map_point(rect.right, rect.bottom),
        ];
        let mut out = Rect::new(f64::MAX, f64::MAX, f64::MIN, f64::MIN);
        for (x, y) in corners {
            out.left = out.left.min(x);
            out.top = out.top.min(y);
            out.right = out.right.max(x);
            out.bottom = out.bottom.max(y);
        }
        out
    }

    pub fn is_identity(&self) -> bool {
        *self == Self::IDENTITY
    }
}

impl Default for Matrix {
    fn default() -> Self {
        Self::IDENTITY
    }
}

// Exact values for quarter turns so identities survive composition.
fn snap_trig(degrees: f64) -> (f64, f64) {
    let normalized = degrees.rem_euclid(360.0);
    if normalized == 0.0 {
        (0.0, 1.0)
    } else if normalized == 90.0 {
        (1.0, 0.0)
    } else if normalized == 180.0 {
        (0.0, -1.0)
    } else if normalized == 270.0 {
        (-1.0, 0.0)
    } else {
        let radians = normalized.to_radians();
        (radians.sin(), radians.cos())
    }
}

/// Transform to apply to a preview view of size `view` showing a capture
/// buffer of size `buffer` while the display is at `rotation`.
pub fn preview_transform(view: Size, buffer: Size, rotation: DisplayRotation) -> VidcapResult<Matrix> {
    if view.is_empty() {
        return Err(VidcapError::invalid_geometry(format!(
            "preview view {}x{} is empty",
            view.width, view.height
        )));
    }
    if buffer.is_empty() {
        return Err(VidcapError::invalid_geometry(format!(
            "capture buffer {}x{} is empty",
            buffer.width, buffer.height
        )));
    }

    let view_rect = Rect::from_size(view.width as f64, view.height as f64);
    let (cx, cy) = view_rect.center();

    match rotation {
        DisplayRotation::Rotation0 => Ok(Matrix::IDENTITY),
        DisplayRotation::Rotation180 => Ok(Matrix::IDENTITY.post_rotate(180.0, cx, cy)),
        DisplayRotation::Rotation90 | DisplayRotation::Rotation270 => {
            // The sensor delivers the buffer sideways: width and height swap.
            let buffer_rect = Rect::from_size(buffer.height as f64, buffer.width as f64);
            let (bx, by) = buffer_rect.center();
            let buffer_rect = buffer_rect.offset(cx - bx, cy - by);

            let scale = f64::max(
                view.height as f64 / buffer.height as f64,
                view.width as f64 / buffer.width as f64,
            );
            let turns = rotation.quarter_turns() as f64;

            Ok(Matrix::rect_to_rect(&view_rect, &buffer_rect)?
                .post_scale(scale, scale, cx, cy)
                .post_rotate(90.0 * (turns - 2.0), cx, cy))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BUFFER: Size = Size::new(960, 720);

    fn assert_close(actual: (f64, f64), expected: (f64, f64)) {
        assert!(
            (actual.0 - expected.0).abs() < 1e-6 && (actual.1 - expected.1).abs() < 1e-6,
            "expected {expected:?}, got {actual:?}"
        );
    }

    #[test]
    fn natural_orientation_needs_no_transform() {
        let m = preview_transform(Size::new(1080, 1440), BUFFER, DisplayRotation::Rotation0)
            .unwrap();
        assert!(m.is_identity());
    }

    #[test]
    fn sideways_transform_keeps_view_center_fixed() {
        for rotation in [DisplayRotation::Rotation90, DisplayRotation::Rotation270] {
            let m = preview_transform(Size::new(1920, 1080), BUFFER, rotation).unwrap();
            assert_close(m.map_point(960.0, 540.0), (960.0, 540.0));
        }
    }

    #[test]
    fn sideways_transform_rotates_and_covers_view() {
        let view = Size::new(1920, 1080);
        let m = preview_transform(view, BUFFER, DisplayRotation::Rotation90).unwrap();

        assert_close(m.map_point(0.0, 0.0), (0.0, 1260.0));
        assert_close(m.map_point(1920.0, 1080.0), (1920.0, -180.0));

        let view_rect = Rect::from_size(1920.0, 1080.0);
        assert!(m.map_rect(&view_rect).contains_rect(&view_rect, 1e-6));
    }

    #[test]
    fn upside_down_is_a_half_turn_about_center() {
        let m = preview_transform(Size::new(1000, 500), BUFFER, DisplayRotation::Rotation180)
            .unwrap();
        assert_close(m.map_point(0.0, 0.0), (1000.0, 500.0));
    }

    #[test]
    fn empty_view_is_rejected() {
        assert!(matches!(
            preview_transform(Size::new(0, 100), BUFFER, DisplayRotation::Rotation90),
            Err(VidcapError::InvalidGeometry { .. })
        ));
    }

    #[test]
    fn post_operations_compose_in_order() {
        let m = Matrix::IDENTITY
            .post_scale(2.0, 2.0, 0.0, 0.0)
            .post_rotate(90.0, 0.0, 0.0);
        // (1, 0) -> scale -> (2, 0) -> rotate clockwise -> (0, 2)
        assert_close(m.map_point(1.0, 0.0), (0.0, 2.0));
    }

    #[test]
    fn matrix_serializes_with_named_coefficients() {
        let json = serde_json::to_value(Matrix::IDENTITY).unwrap();
        assert_eq!(json["a"], 1.0);
        assert_eq!(json["tx"], 0.0);

        let size: Size = serde_json::from_str(r#"{"width":960,"height":720}"#).unwrap();
        assert_eq!(size, Size::new(960, 720));
    }
}
