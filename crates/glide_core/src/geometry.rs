//! Layout geometry
//!
//! Boxes are stored per axis as `[min, max]` intervals. A delta maps one box
//! onto another with a scale followed by a translation, both anchored at the
//! axis origin:
//!
//! ```text
//!   p' = p * scale + translate
//! ```
//!
//! Render code that uses a centred transform origin converts a delta with
//! [`BoxDelta::origin_translate`].

use serde::{Deserialize, Serialize};

/// Tolerance used for identity checks
pub const DELTA_EPSILON: f32 = 1e-4;

/// Lengths below this are treated as zero-length when computing scales
const ZERO_LENGTH: f32 = 1e-6;

#[inline]
fn mix(from: f32, to: f32, t: f32) -> f32 {
    from + (to - from) * t
}

// ============================================================================
// Axis / Box
// ============================================================================

/// A closed interval along one axis
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Axis {
    pub min: f32,
    pub max: f32,
}

impl Axis {
    pub const fn new(min: f32, max: f32) -> Self {
        Self { min, max }
    }

    pub fn length(&self) -> f32 {
        self.max - self.min
    }

    pub fn center(&self) -> f32 {
        (self.min + self.max) * 0.5
    }

    pub fn translate(&self, distance: f32) -> Self {
        Self::new(self.min + distance, self.max + distance)
    }

    /// Interpolate both edges towards `to`
    pub fn mix(&self, to: &Axis, t: f32) -> Self {
        Self::new(mix(self.min, to.min, t), mix(self.max, to.max, t))
    }

    pub fn approx_eq(&self, other: &Axis, epsilon: f32) -> bool {
        (self.min - other.min).abs() <= epsilon && (self.max - other.max).abs() <= epsilon
    }
}

/// A 2D point
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub const ZERO: Point = Point { x: 0.0, y: 0.0 };

    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// An axis-aligned box
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct LayoutBox {
    pub x: Axis,
    pub y: Axis,
}

impl LayoutBox {
    pub const fn new(x: Axis, y: Axis) -> Self {
        Self { x, y }
    }

    /// Build a box from an origin and a size
    pub fn from_rect(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x: Axis::new(x, x + width),
            y: Axis::new(y, y + height),
        }
    }

    pub fn width(&self) -> f32 {
        self.x.length()
    }

    pub fn height(&self) -> f32 {
        self.y.length()
    }

    pub fn origin(&self) -> Point {
        Point::new(self.x.min, self.y.min)
    }

    pub fn translate(&self, dx: f32, dy: f32) -> Self {
        Self::new(self.x.translate(dx), self.y.translate(dy))
    }

    /// Express a box relative to `parent` as a document box
    pub fn to_document(&self, parent: &LayoutBox) -> Self {
        self.translate(parent.x.min, parent.y.min)
    }

    /// Express a document box relative to `parent`
    pub fn to_local(&self, parent: &LayoutBox) -> Self {
        self.translate(-parent.x.min, -parent.y.min)
    }

    pub fn mix(&self, to: &LayoutBox, t: f32) -> Self {
        Self::new(self.x.mix(&to.x, t), self.y.mix(&to.y, t))
    }

    pub fn approx_eq(&self, other: &LayoutBox, epsilon: f32) -> bool {
        self.x.approx_eq(&other.x, epsilon) && self.y.approx_eq(&other.y, epsilon)
    }
}

// ============================================================================
// Deltas
// ============================================================================

/// Scale-then-translate mapping along one axis
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct AxisDelta {
    pub translate: f32,
    pub scale: f32,
}

impl Default for AxisDelta {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl AxisDelta {
    pub const IDENTITY: AxisDelta = AxisDelta {
        translate: 0.0,
        scale: 1.0,
    };

    pub const fn new(translate: f32, scale: f32) -> Self {
        Self { translate, scale }
    }

    /// Delta that maps `source` onto `target`
    ///
    /// A zero-length source has no meaningful scale; it is treated as 1 so
    /// the box is only translated.
    pub fn between(source: &Axis, target: &Axis) -> Self {
        let source_len = source.length();
        let scale = if source_len.abs() < ZERO_LENGTH {
            tracing::debug!(
                source_min = source.min,
                target_len = target.length(),
                "zero-length source axis; using scale 1"
            );
            1.0
        } else {
            target.length() / source_len
        };
        Self {
            translate: target.min - source.min * scale,
            scale,
        }
    }

    pub fn apply_point(&self, point: f32) -> f32 {
        point * self.scale + self.translate
    }

    pub fn apply(&self, axis: &Axis) -> Axis {
        Axis::new(self.apply_point(axis.min), self.apply_point(axis.max))
    }

    /// The mapping that undoes this one
    ///
    /// A zero scale is not invertible and yields the identity.
    pub fn invert(&self) -> Self {
        if self.scale.abs() < ZERO_LENGTH {
            return Self::IDENTITY;
        }
        let scale = 1.0 / self.scale;
        Self {
            translate: -self.translate * scale,
            scale,
        }
    }

    /// `self` applied after `inner`
    pub fn compose(&self, inner: &AxisDelta) -> Self {
        Self {
            translate: inner.translate * self.scale + self.translate,
            scale: inner.scale * self.scale,
        }
    }

    pub fn mix(&self, to: &AxisDelta, t: f32) -> Self {
        Self {
            translate: mix(self.translate, to.translate, t),
            scale: mix(self.scale, to.scale, t),
        }
    }

    pub fn is_identity(&self) -> bool {
        self.translate.abs() <= DELTA_EPSILON && (self.scale - 1.0).abs() <= DELTA_EPSILON
    }
}

/// Per-axis deltas for a box
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct BoxDelta {
    pub x: AxisDelta,
    pub y: AxisDelta,
}

impl BoxDelta {
    pub const IDENTITY: BoxDelta = BoxDelta {
        x: AxisDelta::IDENTITY,
        y: AxisDelta::IDENTITY,
    };

    pub const fn new(x: AxisDelta, y: AxisDelta) -> Self {
        Self { x, y }
    }

    /// Delta that maps `source` onto `target`
    pub fn between(source: &LayoutBox, target: &LayoutBox) -> Self {
        Self {
            x: AxisDelta::between(&source.x, &target.x),
            y: AxisDelta::between(&source.y, &target.y),
        }
    }

    pub fn apply(&self, layout: &LayoutBox) -> LayoutBox {
        LayoutBox::new(self.x.apply(&layout.x), self.y.apply(&layout.y))
    }

    pub fn apply_point(&self, point: Point) -> Point {
        Point::new(self.x.apply_point(point.x), self.y.apply_point(point.y))
    }

    pub fn invert(&self) -> Self {
        Self::new(self.x.invert(), self.y.invert())
    }

    /// `self` applied after `inner`
    pub fn compose(&self, inner: &BoxDelta) -> Self {
        Self::new(self.x.compose(&inner.x), self.y.compose(&inner.y))
    }

    pub fn mix(&self, to: &BoxDelta, t: f32) -> Self {
        Self::new(self.x.mix(&to.x, t), self.y.mix(&to.y, t))
    }

    pub fn is_identity(&self) -> bool {
        self.x.is_identity() && self.y.is_identity()
    }

    /// Translation to use when this delta is rendered with a transform origin
    /// at the centre of `layout`
    ///
    /// Scaling about the centre moves the box's origin, so the translation is
    /// adjusted to keep `apply(layout)` unchanged.
    pub fn origin_translate(&self, layout: &LayoutBox) -> Point {
        let target = self.apply(layout);
        Point::new(
            target.x.center() - layout.x.center(),
            target.y.center() - layout.y.center(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f32, b: f32) -> bool {
        (a - b).abs() < 1e-4
    }

    #[test]
    fn test_between_scale_then_translate() {
        let snapshot = LayoutBox::from_rect(0.0, 0.0, 100.0, 100.0);
        let target = LayoutBox::from_rect(50.0, 50.0, 200.0, 200.0);
        let delta = BoxDelta::between(&snapshot, &target);

        assert_eq!(delta.x, AxisDelta::new(50.0, 2.0));
        assert_eq!(delta.y, AxisDelta::new(50.0, 2.0));
        assert_eq!(delta.apply(&snapshot), target);
    }

    #[test]
    fn test_identical_boxes_give_identity() {
        let b = LayoutBox::from_rect(13.0, 7.0, 42.0, 9.0);
        let delta = BoxDelta::between(&b, &b);
        assert!(delta.is_identity());
    }

    #[test]
    fn test_zero_length_axis_scale_is_one() {
        let source = Axis::new(10.0, 10.0);
        let target = Axis::new(20.0, 80.0);
        let delta = AxisDelta::between(&source, &target);
        assert_eq!(delta.scale, 1.0);
        assert_eq!(delta.translate, 10.0);
    }

    #[test]
    fn test_invert_round_trip() {
        let delta = BoxDelta::new(AxisDelta::new(50.0, 2.0), AxisDelta::new(-10.0, 0.5));
        let b = LayoutBox::from_rect(3.0, 4.0, 30.0, 40.0);
        let back = delta.invert().apply(&delta.apply(&b));
        assert!(back.approx_eq(&b, 1e-4));
        assert!(delta.compose(&delta.invert()).is_identity());
    }

    #[test]
    fn test_compose_order() {
        let inner = AxisDelta::new(10.0, 2.0);
        let outer = AxisDelta::new(5.0, 3.0);
        let composed = outer.compose(&inner);
        let p = 7.0;
        assert!(approx(
            composed.apply_point(p),
            outer.apply_point(inner.apply_point(p))
        ));
    }

    #[test]
    fn test_document_local_conversion() {
        let parent = LayoutBox::from_rect(100.0, 50.0, 400.0, 400.0);
        let local = LayoutBox::from_rect(10.0, 20.0, 30.0, 30.0);
        let document = local.to_document(&parent);
        assert_eq!(document, LayoutBox::from_rect(110.0, 70.0, 30.0, 30.0));
        assert_eq!(document.to_local(&parent), local);
    }

    #[test]
    fn test_origin_translate_for_centered_scale() {
        let layout = LayoutBox::from_rect(0.0, 0.0, 100.0, 100.0);
        let delta = BoxDelta::between(&layout, &LayoutBox::from_rect(50.0, 50.0, 200.0, 200.0));
        let t = delta.origin_translate(&layout);
        assert!(approx(t.x, 100.0));
        assert!(approx(t.y, 100.0));
    }

    #[test]
    fn test_mix_endpoints() {
        let from = BoxDelta::new(AxisDelta::new(-25.0, 0.5), AxisDelta::new(-25.0, 0.5));
        assert_eq!(from.mix(&BoxDelta::IDENTITY, 0.0), from);
        assert!(from.mix(&BoxDelta::IDENTITY, 1.0).is_identity());
    }
}
