//! Glide Animation System
//!
//! Per-value animation drivers and the imperative animation surface.
//!
//! # Features
//!
//! - **Spring Physics**: RK4-integrated springs with stiffness, damping, mass
//! - **Easing**: CSS timing functions with native spellings
//! - **Keyframe Tweens**: Offsets, per-segment easing, delay and repeat modes
//! - **Native Animator**: Hands tweens to the host's own animation engine
//! - **Animation Controls**: Broadcast start/stop/set to subscribed elements
//! - **Handoff**: Take over appear animations the host started natively

pub mod animation;
pub mod controls;
pub mod definition;
pub mod easing;
pub mod handoff;
pub mod keyframes;
pub mod spring;
pub mod transition;
pub mod waapi;

pub use animation::{AnimationSample, ValueAnimation};
pub use controls::{AnimationControls, ControlsHandler, ControlsMount};
pub use definition::{AnimationDefinition, ValueTarget};
pub use easing::{Easing, EasingSpec, StepPosition};
pub use handoff::{HandoffHost, HandoffState};
pub use keyframes::KeyframeTween;
pub use spring::{Spring, SpringConfig};
pub use transition::{RepeatType, Transition, TransitionKind};
pub use waapi::{
    start_waapi_animation, NativeAnimationHost, NativeAnimationId, NativeHandle, NativeKeyframes,
    NativeOptions, NativeTiming, WaapiAnimation,
};
