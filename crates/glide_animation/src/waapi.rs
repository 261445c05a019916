//! Native (WAAPI-style) animator
//!
//! Hands a single property's keyframes to the host's own animation engine.
//! The host implements [`NativeAnimationHost`]; [`start_waapi_animation`]
//! translates glide timing options into the host's keyframe/timing shape:
//!
//! - easing arrays are attached to the keyframes and the animation itself runs `linear`
//! - `RepeatType::Reverse` plays `alternate`, everything else `normal`
//! - iterations are `repeat + 1` and the fill mode is always `both`

use std::fmt;
use std::rc::Rc;

use serde::{Deserialize, Serialize};
use slotmap::new_key_type;

use glide_core::completion::Completion;
use glide_core::error::Result;
use glide_core::surface::InstanceId;
use glide_core::value::Value;

use crate::easing::{Easing, EasingSpec};
use crate::transition::{RepeatType, Transition, TransitionKind};

new_key_type! {
    /// Handle to an animation running in the host
    pub struct NativeAnimationId;
}

/// Property-indexed keyframes for one value
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NativeKeyframes {
    pub property: String,
    pub values: Vec<Value>,
    /// Keyframe offsets in `[0, 1]`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub offset: Option<Vec<f32>>,
    /// Per-segment timing functions
    #[serde(skip_serializing_if = "Option::is_none")]
    pub easing: Option<Vec<String>>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackDirection {
    #[default]
    Normal,
    Alternate,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FillMode {
    None,
    Forwards,
    Backwards,
    #[default]
    Both,
}

/// Timing of a native animation
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NativeTiming {
    pub delay_ms: f32,
    pub duration_ms: f32,
    pub easing: String,
    pub fill: FillMode,
    pub iterations: u32,
    pub direction: PlaybackDirection,
}

/// Options accepted by [`start_waapi_animation`]
#[derive(Clone, Debug, Default, PartialEq)]
pub struct NativeOptions {
    pub delay_ms: Option<f32>,
    pub duration_ms: Option<f32>,
    pub repeat: Option<u32>,
    pub repeat_type: Option<RepeatType>,
    pub ease: Option<EasingSpec>,
    pub times: Option<Vec<f32>>,
}

impl NativeOptions {
    pub const DEFAULT_DURATION_MS: f32 = 300.0;

    /// Options for a tween transition; springs have no native form
    pub fn from_transition(transition: &Transition) -> Option<Self> {
        match &transition.kind {
            TransitionKind::Tween { duration_ms, ease } => Some(Self {
                delay_ms: Some(transition.delay_ms),
                duration_ms: Some(*duration_ms),
                repeat: Some(transition.repeat),
                repeat_type: Some(transition.repeat_type),
                ease: Some(ease.clone()),
                times: transition.times.clone(),
            }),
            TransitionKind::Spring { .. } => None,
        }
    }
}

/// What the host hands back for a started animation
#[derive(Clone, Debug)]
pub struct NativeHandle {
    pub id: NativeAnimationId,
    /// Resolves when the animation finishes or is cancelled
    pub finished: Completion,
}

/// Host-side native animation engine
pub trait NativeAnimationHost {
    /// Start an animation; rejection is reported as
    /// [`GlideError::NativeAnimation`](glide_core::GlideError::NativeAnimation)
    fn animate(
        &self,
        instance: InstanceId,
        keyframes: &NativeKeyframes,
        timing: &NativeTiming,
    ) -> Result<NativeHandle>;

    /// Cancel a running animation
    ///
    /// With `commit` the host keeps the value currently displayed and returns
    /// it, so a follow-up animation can resume from there.
    fn cancel(&self, id: NativeAnimationId, commit: bool) -> Option<Value>;
}

enum NativeEasing {
    Whole(String),
    PerKeyframe(Vec<String>),
}

fn map_easing(ease: Option<&EasingSpec>) -> NativeEasing {
    match ease {
        None => NativeEasing::Whole(Easing::Linear.to_native()),
        Some(EasingSpec::Single(easing)) => NativeEasing::Whole(easing.to_native()),
        Some(EasingSpec::Segments(list)) => {
            NativeEasing::PerKeyframe(list.iter().map(Easing::to_native).collect())
        }
    }
}

/// Build the keyframes and timing for a native animation
pub fn build_native_animation(
    value_name: &str,
    keyframes: &[Value],
    options: &NativeOptions,
) -> (NativeKeyframes, NativeTiming) {
    let mut native_keyframes = NativeKeyframes {
        property: value_name.to_string(),
        values: keyframes.to_vec(),
        offset: options.times.clone(),
        easing: None,
    };

    let easing = match map_easing(options.ease.as_ref()) {
        NativeEasing::Whole(easing) => easing,
        NativeEasing::PerKeyframe(per_keyframe) => {
            native_keyframes.easing = Some(per_keyframe);
            Easing::Linear.to_native()
        }
    };

    let direction = match options.repeat_type.unwrap_or_default() {
        RepeatType::Reverse => PlaybackDirection::Alternate,
        RepeatType::Loop | RepeatType::Mirror => PlaybackDirection::Normal,
    };

    let timing = NativeTiming {
        delay_ms: options.delay_ms.unwrap_or(0.0),
        duration_ms: options
            .duration_ms
            .unwrap_or(NativeOptions::DEFAULT_DURATION_MS),
        easing,
        fill: FillMode::Both,
        iterations: options.repeat.unwrap_or(0) + 1,
        direction,
    };

    (native_keyframes, timing)
}

/// Start a native animation of `value_name` on `instance`
pub fn start_waapi_animation(
    host: Rc<dyn NativeAnimationHost>,
    instance: InstanceId,
    value_name: &str,
    keyframes: &[Value],
    options: &NativeOptions,
) -> Result<WaapiAnimation> {
    let (native_keyframes, timing) = build_native_animation(value_name, keyframes, options);
    let handle = host.animate(instance, &native_keyframes, &timing)?;

    tracing::debug!(
        property = value_name,
        duration_ms = timing.duration_ms,
        iterations = timing.iterations,
        "started native animation"
    );

    Ok(WaapiAnimation {
        id: handle.id,
        instance,
        property: value_name.to_string(),
        finished: handle.finished,
        host,
    })
}

/// A running native animation
pub struct WaapiAnimation {
    id: NativeAnimationId,
    instance: InstanceId,
    property: String,
    finished: Completion,
    host: Rc<dyn NativeAnimationHost>,
}

impl WaapiAnimation {
    pub fn id(&self) -> NativeAnimationId {
        self.id
    }

    pub fn instance(&self) -> InstanceId {
        self.instance
    }

    pub fn property(&self) -> &str {
        &self.property
    }

    pub fn finished(&self) -> Completion {
        self.finished.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.finished.is_resolved()
    }

    /// Cancel the animation
    ///
    /// With `can_resume` the currently displayed value is committed and
    /// returned. The completion resolves either way.
    pub fn cancel(&self, can_resume: bool) -> Option<Value> {
        if self.is_finished() {
            return None;
        }
        self.host.cancel(self.id, can_resume)
    }
}

impl fmt::Debug for WaapiAnimation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WaapiAnimation")
            .field("id", &self.id)
            .field("property", &self.property)
            .field("finished", &self.is_finished())
            .finish()
    }
}
