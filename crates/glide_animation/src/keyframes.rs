//! Keyframe tween sampling
//!
//! Maps elapsed time onto a value along a keyframe track, honouring delay,
//! per-segment easing, keyframe offsets and repeat modes.

use smallvec::SmallVec;

use crate::easing::{Easing, EasingSpec};
use crate::transition::RepeatType;

/// Evenly spaced offsets for `count` keyframes
pub fn default_times(count: usize) -> SmallVec<[f32; 4]> {
    match count {
        0 => SmallVec::new(),
        1 => SmallVec::from_slice(&[1.0]),
        _ => {
            let last = (count - 1) as f32;
            (0..count).map(|i| i as f32 / last).collect()
        }
    }
}

/// A sampled tween
#[derive(Clone, Debug)]
pub struct KeyframeTween {
    keyframes: SmallVec<[f32; 4]>,
    times: SmallVec<[f32; 4]>,
    easings: SmallVec<[Easing; 4]>,
    duration_ms: f32,
    delay_ms: f32,
    repeat: u32,
    repeat_type: RepeatType,
    repeat_delay_ms: f32,
}

impl KeyframeTween {
    pub fn new(keyframes: &[f32], duration_ms: f32, ease: &EasingSpec) -> Self {
        let segments = keyframes.len().saturating_sub(1).max(1);
        Self {
            keyframes: SmallVec::from_slice(keyframes),
            times: default_times(keyframes.len()),
            easings: (0..segments).map(|i| ease.for_segment(i)).collect(),
            duration_ms: duration_ms.max(0.0),
            delay_ms: 0.0,
            repeat: 0,
            repeat_type: RepeatType::Loop,
            repeat_delay_ms: 0.0,
        }
    }

    pub fn with_times(mut self, times: &[f32]) -> Self {
        if times.len() == self.keyframes.len() {
            self.times = SmallVec::from_slice(times);
        }
        self
    }

    pub fn with_delay(mut self, delay_ms: f32) -> Self {
        self.delay_ms = delay_ms;
        self
    }

    pub fn with_repeat(mut self, repeat: u32, repeat_type: RepeatType, repeat_delay_ms: f32) -> Self {
        self.repeat = repeat;
        self.repeat_type = repeat_type;
        self.repeat_delay_ms = repeat_delay_ms.max(0.0);
        self
    }

    /// Time from the end of the delay until the last iteration completes
    pub fn active_duration_ms(&self) -> f32 {
        let iterations = self.repeat as f32 + 1.0;
        self.duration_ms * iterations + self.repeat_delay_ms * self.repeat as f32
    }

    /// Total time including the initial delay
    pub fn total_duration_ms(&self) -> f32 {
        self.delay_ms.max(0.0) + self.active_duration_ms()
    }

    /// Value at `elapsed_ms` and whether the tween has finished
    pub fn sample(&self, elapsed_ms: f32) -> (f32, bool) {
        let Some(&first) = self.keyframes.first() else {
            return (0.0, true);
        };

        let t = elapsed_ms - self.delay_ms;
        if t < 0.0 {
            return (first, false);
        }

        let (iteration, progress, done) = if self.duration_ms <= 0.0 || t >= self.active_duration_ms() {
            (self.repeat, 1.0, true)
        } else {
            let cycle = self.duration_ms + self.repeat_delay_ms;
            let iteration = ((t / cycle).floor() as u32).min(self.repeat);
            let local = t - iteration as f32 * cycle;
            (iteration, (local / self.duration_ms).min(1.0), false)
        };

        let odd = iteration % 2 == 1;
        let value = match (self.repeat_type, odd) {
            (RepeatType::Reverse, true) => self.interpolate(1.0 - progress, false),
            (RepeatType::Mirror, true) => self.interpolate(progress, true),
            _ => self.interpolate(progress, false),
        };
        (value, done)
    }

    fn interpolate(&self, progress: f32, mirrored: bool) -> f32 {
        let n = self.keyframes.len();
        let keyframe = |i: usize| {
            if mirrored {
                self.keyframes[n - 1 - i]
            } else {
                self.keyframes[i]
            }
        };

        if n == 1 {
            return keyframe(0);
        }
        if progress <= self.times[0] {
            return keyframe(0);
        }
        if progress >= self.times[n - 1] {
            return keyframe(n - 1);
        }

        let segment = self
            .times
            .windows(2)
            .position(|w| progress >= w[0] && progress <= w[1])
            .unwrap_or(n - 2);
        let start = self.times[segment];
        let span = self.times[segment + 1] - start;
        let local = if span <= 0.0 { 1.0 } else { (progress - start) / span };
        let eased = self.easings[segment.min(self.easings.len() - 1)].evaluate(local);

        let from = keyframe(segment);
        let to = keyframe(segment + 1);
        from + (to - from) * eased
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn linear(keyframes: &[f32], duration_ms: f32) -> KeyframeTween {
        KeyframeTween::new(keyframes, duration_ms, &EasingSpec::Single(Easing::Linear))
    }

    #[test]
    fn test_linear_two_keyframes() {
        let tween = linear(&[0.0, 100.0], 100.0);
        assert_eq!(tween.sample(0.0), (0.0, false));
        assert_eq!(tween.sample(50.0), (50.0, false));
        assert_eq!(tween.sample(100.0), (100.0, true));
        assert_eq!(tween.sample(500.0), (100.0, true));
    }

    #[test]
    fn test_delay_holds_first_keyframe() {
        let tween = linear(&[10.0, 20.0], 100.0).with_delay(50.0);
        assert_eq!(tween.sample(25.0), (10.0, false));
        assert_eq!(tween.sample(100.0), (15.0, false));
        assert_eq!(tween.total_duration_ms(), 150.0);
    }

    #[test]
    fn test_custom_times() {
        let tween = linear(&[0.0, 10.0, 20.0], 100.0).with_times(&[0.0, 0.8, 1.0]);
        assert!((tween.sample(40.0).0 - 5.0).abs() < 1e-4);
        assert!((tween.sample(90.0).0 - 15.0).abs() < 1e-4);
    }

    #[test]
    fn test_zero_duration_finishes_immediately() {
        let tween = linear(&[0.0, 1.0], 0.0);
        assert_eq!(tween.sample(0.0), (1.0, true));
    }

    #[test]
    fn test_loop_restarts() {
        let tween = linear(&[0.0, 100.0], 100.0).with_repeat(1, RepeatType::Loop, 0.0);
        assert_eq!(tween.sample(125.0).0, 25.0);
        assert_eq!(tween.sample(200.0), (100.0, true));
    }

    #[test]
    fn test_reverse_plays_backwards() {
        let tween = linear(&[0.0, 100.0], 100.0).with_repeat(1, RepeatType::Reverse, 0.0);
        assert_eq!(tween.sample(125.0).0, 75.0);
        assert_eq!(tween.sample(200.0), (0.0, true));
    }

    #[test]
    fn test_mirror_swaps_keyframes() {
        let tween = linear(&[0.0, 100.0], 100.0).with_repeat(1, RepeatType::Mirror, 0.0);
        assert_eq!(tween.sample(125.0).0, 75.0);
        assert_eq!(tween.sample(200.0), (0.0, true));
    }

    #[test]
    fn test_repeat_delay_holds_end() {
        let tween = linear(&[0.0, 100.0], 100.0).with_repeat(1, RepeatType::Loop, 50.0);
        assert_eq!(tween.sample(120.0).0, 100.0);
        assert_eq!(tween.sample(175.0).0, 25.0);
        assert_eq!(tween.active_duration_ms(), 250.0);
    }
}
