//! Transform string building
//!
//! Individual transform values (`x`, `scale`, `rotate`, ...) are combined into
//! one `transform` in a fixed order, after the projection correction.

use glide_core::geometry::{BoxDelta, LayoutBox, Point};
use glide_core::value::{ResolvedValues, Value};

/// Transform values in the order they are applied
pub const TRANSFORM_KEYS: [&str; 17] = [
    "transformPerspective",
    "x",
    "y",
    "z",
    "translateX",
    "translateY",
    "translateZ",
    "scale",
    "scaleX",
    "scaleY",
    "rotate",
    "rotateX",
    "rotateY",
    "rotateZ",
    "skew",
    "skewX",
    "skewY",
];

pub fn is_transform_key(name: &str) -> bool {
    TRANSFORM_KEYS.contains(&name)
}

/// Layout correction rendered with a transform origin at the box centre
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ProjectionTransform {
    pub translate: Point,
    pub scale: Point,
}

impl ProjectionTransform {
    /// `None` when `delta` is the identity
    pub fn from_delta(delta: &BoxDelta, layout: &LayoutBox) -> Option<Self> {
        if delta.is_identity() {
            return None;
        }
        Some(Self {
            translate: delta.origin_translate(layout),
            scale: Point::new(delta.x.scale, delta.y.scale),
        })
    }

    pub fn to_css(&self) -> String {
        format!(
            "translate3d({}px, {}px, 0) scale({}, {})",
            self.translate.x, self.translate.y, self.scale.x, self.scale.y
        )
    }
}

enum Unit {
    Px,
    Deg,
    None,
}

fn unit_for(key: &str) -> Unit {
    match key {
        "scale" | "scaleX" | "scaleY" => Unit::None,
        k if k.starts_with("rotate") || k.starts_with("skew") => Unit::Deg,
        _ => Unit::Px,
    }
}

fn is_default(key: &str, value: &Value) -> bool {
    let default = match unit_for(key) {
        Unit::None => 1.0,
        _ => 0.0,
    };
    value.as_number() == Some(default)
}

fn format_value(value: &Value, unit: Unit) -> String {
    match (value, unit) {
        (Value::Number(n), Unit::Px) => format!("{}px", n),
        (Value::Number(n), Unit::Deg) => format!("{}deg", n),
        (Value::Number(n), Unit::None) => n.to_string(),
        (Value::Text(s), _) => s.clone(),
    }
}

/// Build the `transform` for `values`, prefixed by `projection`
///
/// Returns `"none"` when nothing transforms.
pub fn build_transform(values: &ResolvedValues, projection: Option<&ProjectionTransform>) -> String {
    let mut parts: Vec<String> = Vec::new();
    if let Some(projection) = projection {
        parts.push(projection.to_css());
    }

    for key in TRANSFORM_KEYS {
        let Some(value) = values.get(key) else {
            continue;
        };
        if is_default(key, value) {
            continue;
        }
        let function = match key {
            "transformPerspective" => "perspective",
            "x" => "translateX",
            "y" => "translateY",
            "z" => "translateZ",
            other => other,
        };
        parts.push(format!("{}({})", function, format_value(value, unit_for(key))));
    }

    if parts.is_empty() {
        "none".to_string()
    } else {
        parts.join(" ")
    }
}
