//! Engine configuration
//!
//! Loaded from TOML; every section and key is optional:
//!
//! ```toml
//! [batcher]
//! max_elapsed_ms = 40.0
//!
//! [layout]
//! threshold_px = 0.5
//!
//! [animation]
//! prefer_native = true
//!
//! [animation.transition]
//! kind = { type = "spring", stiffness = 300.0, damping = 30.0, mass = 1.0 }
//! ```

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use glide_animation::transition::Transition;
use glide_core::error::{GlideError, Result};
use glide_core::frameloop::BatcherConfig;

/// Top-level engine configuration
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub batcher: BatcherConfig,
    pub layout: LayoutConfig,
    pub animation: AnimationConfig,
}

/// Layout animation settings
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutConfig {
    /// Layout changes whose translation stays below this (and whose scale is
    /// unchanged) are applied without animating
    pub threshold_px: f32,
    /// Transition for layout animations when the element doesn't set one
    pub transition: Transition,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            threshold_px: 0.5,
            transition: Transition::default(),
        }
    }
}

/// Value animation settings
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnimationConfig {
    /// Transition for values when neither the definition nor the element
    /// sets one
    pub transition: Transition,
    /// Run eligible tweens on the host's native animation engine
    pub prefer_native: bool,
}

impl EngineConfig {
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| GlideError::Config(e.to_string()))
    }

    /// Load from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .map_err(|e| GlideError::Config(format!("Failed to read {}: {}", path.display(), e)))?;
        Self::from_toml_str(&content)
    }

    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| GlideError::Config(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glide_animation::spring::SpringConfig;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = EngineConfig::from_toml_str("").unwrap();
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.batcher.max_elapsed_ms, 40.0);
        assert_eq!(config.layout.threshold_px, 0.5);
    }

    #[test]
    fn test_partial_config() {
        let config = EngineConfig::from_toml_str(
            r#"
            [batcher]
            max_elapsed_ms = 100.0

            [animation]
            prefer_native = true

            [layout.transition]
            kind = { type = "spring", stiffness = 300.0, damping = 30.0, mass = 1.0 }
            "#,
        )
        .unwrap();

        assert_eq!(config.batcher.max_elapsed_ms, 100.0);
        assert!((config.batcher.default_elapsed_ms - 1000.0 / 60.0).abs() < 1e-4);
        assert!(config.animation.prefer_native);
        assert_eq!(
            config.layout.transition,
            Transition::spring(SpringConfig::new(300.0, 30.0, 1.0))
        );
    }

    #[test]
    fn test_invalid_config_is_an_error() {
        let err = EngineConfig::from_toml_str("[batcher]\nmax_elapsed_ms = \"soon\"").unwrap_err();
        assert!(matches!(err, GlideError::Config(_)));
    }

    #[test]
    fn test_round_trip_through_toml() {
        let config = EngineConfig::default();
        let text = config.to_toml_string().unwrap();
        assert_eq!(EngineConfig::from_toml_str(&text).unwrap(), config);
    }
}
