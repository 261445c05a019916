//! Easing curves
//!
//! CSS-compatible timing functions plus the circular and back curves used by
//! motion presets. Every curve has a native (CSS timing-function) spelling so
//! tweens can be handed to the host's animation engine unchanged.

use serde::{Deserialize, Serialize};

/// Where the jumps of a stepped easing happen
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepPosition {
    Start,
    #[default]
    End,
}

/// A timing function mapping linear progress to eased progress
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Easing {
    Linear,
    /// `cubic-bezier(0.25, 0.1, 0.25, 1)`
    Ease,
    EaseIn,
    #[default]
    EaseOut,
    EaseInOut,
    CircIn,
    CircOut,
    CircInOut,
    BackIn,
    BackOut,
    BackInOut,
    CubicBezier {
        x1: f32,
        y1: f32,
        x2: f32,
        y2: f32,
    },
    Steps {
        count: u32,
        #[serde(default)]
        position: StepPosition,
    },
}

const BACK_OUT: [f32; 4] = [0.33, 1.53, 0.69, 0.99];

impl Easing {
    pub fn cubic_bezier(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self::CubicBezier { x1, y1, x2, y2 }
    }

    pub fn steps(count: u32, position: StepPosition) -> Self {
        Self::Steps { count, position }
    }

    /// Evaluate at progress `t`, clamped to `[0, 1]`
    ///
    /// Back curves may return values outside `[0, 1]`.
    pub fn evaluate(&self, t: f32) -> f32 {
        let t = t.clamp(0.0, 1.0);

        match *self {
            Self::Linear => t,
            Self::Ease => cubic_bezier(0.25, 0.1, 0.25, 1.0, t),
            Self::EaseIn => cubic_bezier(0.42, 0.0, 1.0, 1.0, t),
            Self::EaseOut => cubic_bezier(0.0, 0.0, 0.58, 1.0, t),
            Self::EaseInOut => cubic_bezier(0.42, 0.0, 0.58, 1.0, t),
            Self::CircIn => 1.0 - (1.0 - t * t).max(0.0).sqrt(),
            Self::CircOut => 1.0 - Self::CircIn.evaluate(1.0 - t),
            Self::CircInOut => mirrored(|p| Self::CircIn.evaluate(p), t),
            Self::BackOut => {
                let [x1, y1, x2, y2] = BACK_OUT;
                cubic_bezier(x1, y1, x2, y2, t)
            }
            Self::BackIn => 1.0 - Self::BackOut.evaluate(1.0 - t),
            Self::BackInOut => mirrored(|p| Self::BackIn.evaluate(p), t),
            Self::CubicBezier { x1, y1, x2, y2 } => cubic_bezier(x1, y1, x2, y2, t),
            Self::Steps { count, position } => stepped(count, position, t),
        }
    }

    /// Check the curve's parameters
    ///
    /// Bezier control point x values must lie in `[0, 1]` and step counts must
    /// be at least 1.
    pub fn is_valid(&self) -> bool {
        match *self {
            Self::CubicBezier { x1, x2, .. } => {
                (0.0..=1.0).contains(&x1) && (0.0..=1.0).contains(&x2)
            }
            Self::Steps { count, .. } => count >= 1,
            _ => true,
        }
    }

    /// CSS timing-function spelling for native animations
    pub fn to_native(&self) -> String {
        match *self {
            Self::Linear => "linear".to_string(),
            Self::Ease => "ease".to_string(),
            Self::EaseIn => "ease-in".to_string(),
            Self::EaseOut => "ease-out".to_string(),
            Self::EaseInOut => "ease-in-out".to_string(),
            Self::CircIn => bezier_string(0.0, 0.65, 0.55, 1.0),
            Self::CircOut => bezier_string(0.55, 0.0, 1.0, 0.45),
            Self::CircInOut => bezier_string(0.85, 0.0, 0.15, 1.0),
            Self::BackIn => bezier_string(0.31, 0.01, 0.66, -0.59),
            Self::BackOut => {
                let [x1, y1, x2, y2] = BACK_OUT;
                bezier_string(x1, y1, x2, y2)
            }
            Self::BackInOut => bezier_string(0.68, -0.55, 0.27, 1.55),
            Self::CubicBezier { x1, y1, x2, y2 } => bezier_string(x1, y1, x2, y2),
            Self::Steps { count, position } => {
                let position = match position {
                    StepPosition::Start => "jump-start",
                    StepPosition::End => "jump-end",
                };
                format!("steps({}, {})", count, position)
            }
        }
    }
}

/// One curve or one curve per keyframe segment
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EasingSpec {
    Single(Easing),
    Segments(Vec<Easing>),
}

impl Default for EasingSpec {
    fn default() -> Self {
        Self::Single(Easing::default())
    }
}

impl From<Easing> for EasingSpec {
    fn from(easing: Easing) -> Self {
        Self::Single(easing)
    }
}

impl EasingSpec {
    /// Easing for segment `index`
    pub fn for_segment(&self, index: usize) -> Easing {
        match self {
            Self::Single(easing) => *easing,
            Self::Segments(list) => list
                .get(index)
                .or_else(|| list.last())
                .copied()
                .unwrap_or(Easing::Linear),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Easing> {
        let slice: &[Easing] = match self {
            Self::Single(easing) => std::slice::from_ref(easing),
            Self::Segments(list) => list,
        };
        slice.iter()
    }
}

fn bezier_string(x1: f32, y1: f32, x2: f32, y2: f32) -> String {
    format!("cubic-bezier({}, {}, {}, {})", x1, y1, x2, y2)
}

fn mirrored(ease_in: impl Fn(f32) -> f32, t: f32) -> f32 {
    if t <= 0.5 {
        ease_in(2.0 * t) / 2.0
    } else {
        (2.0 - ease_in(2.0 * (1.0 - t))) / 2.0
    }
}

/// Evaluate a unit cubic bezier at progress `progress`
///
/// Newton-Raphson finds the curve parameter whose x matches the progress,
/// then y is evaluated at that parameter.
fn cubic_bezier(x1: f32, y1: f32, x2: f32, y2: f32, progress: f32) -> f32 {
    if progress <= 0.0 {
        return 0.0;
    }
    if progress >= 1.0 {
        return 1.0;
    }
    let t = solve_bezier_x(x1, x2, progress);
    bezier_component(y1, y2, t)
}

fn solve_bezier_x(x1: f32, x2: f32, target_x: f32) -> f32 {
    let mut t = target_x;
    for _ in 0..8 {
        let x = bezier_component(x1, x2, t) - target_x;
        if x.abs() < 1e-6 {
            return t;
        }
        let dx = bezier_derivative(x1, x2, t);
        if dx.abs() < 1e-6 {
            break;
        }
        t = (t - x / dx).clamp(0.0, 1.0);
    }

    // Newton stalled on a flat section; fall back to bisection
    let (mut lo, mut hi) = (0.0f32, 1.0f32);
    for _ in 0..24 {
        let mid = (lo + hi) * 0.5;
        if bezier_component(x1, x2, mid) < target_x {
            lo = mid;
        } else {
            hi = mid;
        }
    }
    (lo + hi) * 0.5
}

/// `3(1-t)²t·p1 + 3(1-t)t²·p2 + t³`
#[inline]
fn bezier_component(p1: f32, p2: f32, t: f32) -> f32 {
    let mt = 1.0 - t;
    3.0 * mt * mt * t * p1 + 3.0 * mt * t * t * p2 + t * t * t
}

#[inline]
fn bezier_derivative(p1: f32, p2: f32, t: f32) -> f32 {
    let mt = 1.0 - t;
    3.0 * mt * mt * p1 + 6.0 * mt * t * (p2 - p1) + 3.0 * t * t * (1.0 - p2)
}

fn stepped(count: u32, position: StepPosition, t: f32) -> f32 {
    if count == 0 {
        return t;
    }
    let steps = count as f32;
    match position {
        StepPosition::Start => (t * steps).ceil() / steps,
        StepPosition::End => (t * steps).floor() / steps,
    }
}
