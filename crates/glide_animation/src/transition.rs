//! Transition options
//!
//! A [`Transition`] describes how a value moves between keyframes: either a
//! timed tween with easing or a spring. The same model drives value
//! animations, layout (projection) animations and native animations.

use serde::{Deserialize, Serialize};

use glide_core::error::{GlideError, Result};

use crate::easing::EasingSpec;
use crate::spring::SpringConfig;

/// How repeated iterations play
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RepeatType {
    /// Restart from the first keyframe
    #[default]
    Loop,
    /// Play odd iterations backwards through the same curve
    Reverse,
    /// Play odd iterations with the keyframes swapped
    Mirror,
}

/// The interpolation model
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TransitionKind {
    Tween {
        #[serde(default = "default_duration_ms")]
        duration_ms: f32,
        #[serde(default)]
        ease: EasingSpec,
    },
    Spring {
        #[serde(flatten)]
        config: SpringConfig,
    },
}

fn default_duration_ms() -> f32 {
    Transition::DEFAULT_DURATION_MS
}

impl Default for TransitionKind {
    fn default() -> Self {
        TransitionKind::Tween {
            duration_ms: Transition::DEFAULT_DURATION_MS,
            ease: EasingSpec::default(),
        }
    }
}

/// Timing options for an animation
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Transition {
    pub kind: TransitionKind,
    pub delay_ms: f32,
    /// Extra iterations after the first
    pub repeat: u32,
    pub repeat_type: RepeatType,
    pub repeat_delay_ms: f32,
    /// Keyframe offsets in `[0, 1]`; evenly spaced when absent
    pub times: Option<Vec<f32>>,
    /// Prefer the host's native animation engine when the value allows it
    pub prefer_native: bool,
}

impl Transition {
    pub const DEFAULT_DURATION_MS: f32 = 300.0;

    pub fn tween(duration_ms: f32, ease: impl Into<EasingSpec>) -> Self {
        Self {
            kind: TransitionKind::Tween {
                duration_ms,
                ease: ease.into(),
            },
            ..Default::default()
        }
    }

    pub fn spring(config: SpringConfig) -> Self {
        Self {
            kind: TransitionKind::Spring { config },
            ..Default::default()
        }
    }

    /// A zero-duration tween: values jump to their final keyframe
    pub fn instant() -> Self {
        Self::tween(0.0, crate::easing::Easing::Linear)
    }

    pub fn with_delay(mut self, delay_ms: f32) -> Self {
        self.delay_ms = delay_ms;
        self
    }

    pub fn with_repeat(mut self, repeat: u32, repeat_type: RepeatType) -> Self {
        self.repeat = repeat;
        self.repeat_type = repeat_type;
        self
    }

    pub fn with_repeat_delay(mut self, repeat_delay_ms: f32) -> Self {
        self.repeat_delay_ms = repeat_delay_ms;
        self
    }

    pub fn with_times(mut self, times: Vec<f32>) -> Self {
        self.times = Some(times);
        self
    }

    pub fn prefer_native(mut self) -> Self {
        self.prefer_native = true;
        self
    }

    pub fn is_spring(&self) -> bool {
        matches!(self.kind, TransitionKind::Spring { .. })
    }

    /// Tween duration, `None` for springs
    pub fn duration_ms(&self) -> Option<f32> {
        match self.kind {
            TransitionKind::Tween { duration_ms, .. } => Some(duration_ms),
            TransitionKind::Spring { .. } => None,
        }
    }

    /// Check the options against each other and against `keyframe_count`
    pub fn validate(&self, keyframe_count: usize) -> Result<()> {
        let invalid = |msg: String| Err(GlideError::InvalidTransition(msg));

        if !(self.delay_ms.is_finite() && self.repeat_delay_ms.is_finite()) {
            return invalid("delays must be finite".into());
        }

        match &self.kind {
            TransitionKind::Spring { config } => {
                if keyframe_count > 2 {
                    return invalid(format!(
                        "spring transitions animate between two keyframes, got {}",
                        keyframe_count
                    ));
                }
                if !config.is_valid() {
                    return invalid(format!(
                        "spring needs positive stiffness and mass, got {:?}",
                        config
                    ));
                }
            }
            TransitionKind::Tween { duration_ms, ease } => {
                if !duration_ms.is_finite() || *duration_ms < 0.0 {
                    return invalid(format!("duration must be >= 0, got {}", duration_ms));
                }
                if let EasingSpec::Segments(list) = ease {
                    let segments = keyframe_count.saturating_sub(1);
                    if list.len() != segments {
                        return invalid(format!(
                            "{} easing segments given for {} keyframes",
                            list.len(),
                            keyframe_count
                        ));
                    }
                }
                if let Some(bad) = ease.iter().find(|e| !e.is_valid()) {
                    return invalid(format!("invalid easing {:?}", bad));
                }
            }
        }

        if let Some(times) = &self.times {
            if times.len() != keyframe_count {
                return invalid(format!(
                    "{} times given for {} keyframes",
                    times.len(),
                    keyframe_count
                ));
            }
            if times.iter().any(|t| !(0.0..=1.0).contains(t)) {
                return invalid("times must lie within [0, 1]".into());
            }
            if times.windows(2).any(|pair| pair[1] < pair[0]) {
                return invalid("times must be non-decreasing".into());
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::easing::Easing;

    #[test]
    fn test_default_is_300ms_tween() {
        let t = Transition::default();
        assert_eq!(t.duration_ms(), Some(300.0));
        assert!(!t.is_spring());
        assert!(t.validate(2).is_ok());
    }

    #[test]
    fn test_spring_rejects_multiple_keyframes() {
        let t = Transition::spring(SpringConfig::stiff());
        assert!(t.validate(2).is_ok());
        assert!(matches!(
            t.validate(3),
            Err(GlideError::InvalidTransition(_))
        ));
    }

    #[test]
    fn test_times_must_match_keyframes() {
        let t = Transition::default().with_times(vec![0.0, 1.0]);
        assert!(t.validate(3).is_err());
        let t = Transition::default().with_times(vec![0.0, 0.7, 0.3]);
        assert!(t.validate(3).is_err());
        let t = Transition::default().with_times(vec![0.0, 0.3, 1.0]);
        assert!(t.validate(3).is_ok());
    }

    #[test]
    fn test_segment_easing_count() {
        let t = Transition::tween(
            200.0,
            EasingSpec::Segments(vec![Easing::Linear, Easing::EaseIn]),
        );
        assert!(t.validate(3).is_ok());
        assert!(t.validate(2).is_err());
    }

    #[test]
    fn test_rejects_bad_bezier() {
        let t = Transition::tween(200.0, Easing::cubic_bezier(-0.2, 0.0, 0.5, 1.0));
        assert!(t.validate(2).is_err());
    }

    #[test]
    fn test_serde_shapes() {
        let t: Transition = serde_json::from_str(
            r#"{"kind":{"type":"spring","stiffness":200.0,"damping":20.0,"mass":1.0},"delay_ms":50.0}"#,
        )
        .unwrap();
        assert!(t.is_spring());
        assert_eq!(t.delay_ms, 50.0);

        let t: Transition =
            serde_json::from_str(r#"{"kind":{"type":"tween","duration_ms":120.0}}"#).unwrap();
        assert_eq!(t.duration_ms(), Some(120.0));
        assert_eq!(t.repeat_type, RepeatType::Loop);
    }
}
