//! Surface implementations
//!
//! The engine talks to hosts through [`glide_core::surface::Surface`],
//! [`NativeAnimationHost`](glide_animation::waapi::NativeAnimationHost) and
//! [`HandoffHost`](glide_animation::handoff::HandoffHost). [`memory`] provides
//! all three over an in-memory element tree for headless hosts and tests.

pub mod memory;

pub use memory::MemorySurface;
