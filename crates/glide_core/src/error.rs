//! Error types for glide

use thiserror::Error;

/// Errors surfaced to developers using the engine
///
/// Runtime misconfiguration that the engine can recover from is reported
/// through [`warn_once`](crate::warn::warn_once) instead.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GlideError {
    /// Transition options contradict each other or the keyframes
    #[error("Invalid transition: {0}")]
    InvalidTransition(String),

    /// `start`/`set` was called on animation controls before `mount`
    #[error("Animation controls used before mount; call `mount()` first")]
    ControlsNotMounted,

    /// The native animation host rejected an animation
    #[error("Native animation failed: {0}")]
    NativeAnimation(String),

    /// Configuration could not be parsed or loaded
    #[error("Configuration error: {0}")]
    Config(String),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

/// Result type for glide operations
pub type Result<T> = std::result::Result<T, GlideError>;
