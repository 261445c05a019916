//! Per-value animation drivers
//!
//! A [`ValueAnimation`] advances one numeric value frame by frame, either
//! along a keyframe tween or with spring physics. The engine steps every
//! active driver in the batcher's update phase.

use glide_core::error::Result;

use crate::keyframes::KeyframeTween;
use crate::spring::{Spring, GRANULAR_REST_DELTA, GRANULAR_REST_SPEED};
use crate::transition::{Transition, TransitionKind};

/// Ranges narrower than this use granular spring rest thresholds
const GRANULAR_RANGE: f32 = 5.0;

/// Largest integration step for springs, in seconds
const MAX_SPRING_STEP: f32 = 1.0 / 120.0;

#[derive(Clone, Debug)]
enum Driver {
    Tween(KeyframeTween),
    Spring { spring: Spring, delay_ms: f32 },
}

/// Result of advancing an animation by one frame
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AnimationSample {
    pub value: f32,
    pub done: bool,
}

/// A running animation of one numeric value
#[derive(Clone, Debug)]
pub struct ValueAnimation {
    driver: Driver,
    elapsed_ms: f32,
    origin: f32,
    target: f32,
    value: f32,
    done: bool,
}

impl ValueAnimation {
    /// Build a driver for `keyframes` under `transition`
    ///
    /// `velocity` (units per second) seeds springs so interrupted animations
    /// keep their momentum. Invalid option combinations are rejected.
    pub fn new(keyframes: &[f32], transition: &Transition, velocity: f32) -> Result<Self> {
        transition.validate(keyframes.len())?;

        let origin = keyframes.first().copied().unwrap_or(0.0);
        let target = keyframes.last().copied().unwrap_or(origin);

        let driver = match &transition.kind {
            TransitionKind::Tween { duration_ms, ease } => {
                let mut tween = KeyframeTween::new(keyframes, *duration_ms, ease)
                    .with_delay(transition.delay_ms)
                    .with_repeat(
                        transition.repeat,
                        transition.repeat_type,
                        transition.repeat_delay_ms,
                    );
                if let Some(times) = &transition.times {
                    tween = tween.with_times(times);
                }
                Driver::Tween(tween)
            }
            TransitionKind::Spring { config } => {
                let mut spring = Spring::new(*config, origin).with_velocity(velocity);
                if (target - origin).abs() < GRANULAR_RANGE {
                    spring = spring.with_rest_thresholds(GRANULAR_REST_DELTA, GRANULAR_REST_SPEED);
                }
                spring.set_target(target);
                Driver::Spring {
                    spring,
                    delay_ms: transition.delay_ms,
                }
            }
        };

        Ok(Self {
            driver,
            elapsed_ms: 0.0,
            origin,
            target,
            value: origin,
            done: false,
        })
    }

    /// Advance by `dt_ms` and return the new value
    pub fn tick(&mut self, dt_ms: f32) -> AnimationSample {
        if self.done {
            return AnimationSample {
                value: self.value,
                done: true,
            };
        }
        self.elapsed_ms += dt_ms.max(0.0);

        match &mut self.driver {
            Driver::Tween(tween) => {
                let (value, done) = tween.sample(self.elapsed_ms);
                self.value = value;
                self.done = done;
            }
            Driver::Spring { spring, delay_ms } => {
                let active_ms = (self.elapsed_ms - *delay_ms).min(dt_ms.max(0.0));
                if active_ms > 0.0 {
                    let mut remaining = active_ms / 1000.0;
                    while remaining > 0.0 {
                        let step = remaining.min(MAX_SPRING_STEP);
                        spring.step(step);
                        remaining -= step;
                    }
                }
                self.value = spring.value();
                self.done = spring.is_settled() && self.elapsed_ms >= *delay_ms;
                if self.done {
                    self.value = self.target;
                }
            }
        }

        AnimationSample {
            value: self.value,
            done: self.done,
        }
    }

    /// Jump forward without producing intermediate frames
    ///
    /// Used when taking over from an animation that already ran elsewhere.
    pub fn skip(&mut self, elapsed_ms: f32) {
        if elapsed_ms > 0.0 {
            self.tick(elapsed_ms);
        }
    }

    /// Stop at the current value
    pub fn stop(&mut self) {
        self.done = true;
    }

    pub fn value(&self) -> f32 {
        self.value
    }

    pub fn origin(&self) -> f32 {
        self.origin
    }

    pub fn target(&self) -> f32 {
        self.target
    }

    /// Current velocity in units per second (tweens report 0)
    pub fn velocity(&self) -> f32 {
        match &self.driver {
            Driver::Spring { spring, .. } if !self.done => spring.velocity(),
            _ => 0.0,
        }
    }

    pub fn elapsed_ms(&self) -> f32 {
        self.elapsed_ms
    }

    pub fn is_finished(&self) -> bool {
        self.done
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::easing::Easing;
    use crate::spring::SpringConfig;

    fn run(animation: &mut ValueAnimation, frames: usize) -> AnimationSample {
        let mut sample = AnimationSample {
            value: animation.value(),
            done: animation.is_finished(),
        };
        for _ in 0..frames {
            sample = animation.tick(16.0);
        }
        sample
    }

    #[test]
    fn test_tween_reaches_target() {
        let transition = Transition::tween(160.0, Easing::Linear);
        let mut animation = ValueAnimation::new(&[0.0, 100.0], &transition, 0.0).unwrap();

        let mid = run(&mut animation, 5);
        assert!((mid.value - 50.0).abs() < 1e-3);
        assert!(!mid.done);

        let end = run(&mut animation, 5);
        assert_eq!(end, AnimationSample { value: 100.0, done: true });
    }

    #[test]
    fn test_spring_settles_on_target() {
        let transition = Transition::spring(SpringConfig::stiff());
        let mut animation = ValueAnimation::new(&[0.0, 1000.0], &transition, 0.0).unwrap();

        let end = run(&mut animation, 200);
        assert!(end.done);
        assert_eq!(end.value, 1000.0);
    }

    #[test]
    fn test_spring_delay_holds_origin() {
        let transition = Transition::spring(SpringConfig::stiff()).with_delay(100.0);
        let mut animation = ValueAnimation::new(&[10.0, 20.0], &transition, 0.0).unwrap();

        let held = run(&mut animation, 5);
        assert_eq!(held.value, 10.0);
        assert!(!held.done);

        let moving = run(&mut animation, 2);
        assert!(moving.value > 10.0);
    }

    #[test]
    fn test_small_range_spring_uses_granular_rest() {
        let transition = Transition::spring(SpringConfig::stiff());
        let mut animation = ValueAnimation::new(&[0.0, 1.0], &transition, 0.0).unwrap();
        let first = animation.tick(16.0);
        assert!(!first.done);
        assert!(first.value < 1.0);
    }

    #[test]
    fn test_invalid_transition_is_rejected() {
        let transition = Transition::spring(SpringConfig::stiff());
        assert!(ValueAnimation::new(&[0.0, 1.0, 2.0], &transition, 0.0).is_err());
    }

    #[test]
    fn test_skip_advances_time() {
        let transition = Transition::tween(100.0, Easing::Linear);
        let mut animation = ValueAnimation::new(&[0.0, 100.0], &transition, 0.0).unwrap();
        animation.skip(40.0);
        assert!((animation.value() - 40.0).abs() < 1e-3);
        assert_eq!(animation.elapsed_ms(), 40.0);
    }
}
