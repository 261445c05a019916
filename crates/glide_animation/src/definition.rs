//! Animation definitions
//!
//! An [`AnimationDefinition`] is the target an element animates towards: a
//! set of named values, each a single target or a keyframe list, plus the
//! transition to use (optionally overridden per value).

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use glide_core::value::Value;

use crate::transition::Transition;

/// Target of one animated value
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ValueTarget {
    Single(Value),
    Keyframes(Vec<Value>),
}

impl ValueTarget {
    /// Final value the property settles on
    pub fn final_value(&self) -> Option<&Value> {
        match self {
            ValueTarget::Single(value) => Some(value),
            ValueTarget::Keyframes(list) => list.last(),
        }
    }

    pub fn keyframes(&self) -> &[Value] {
        match self {
            ValueTarget::Single(value) => std::slice::from_ref(value),
            ValueTarget::Keyframes(list) => list,
        }
    }
}

impl From<Value> for ValueTarget {
    fn from(value: Value) -> Self {
        ValueTarget::Single(value)
    }
}

impl From<f32> for ValueTarget {
    fn from(value: f32) -> Self {
        ValueTarget::Single(Value::Number(value))
    }
}

impl From<&str> for ValueTarget {
    fn from(value: &str) -> Self {
        ValueTarget::Single(Value::from(value))
    }
}

impl From<Vec<f32>> for ValueTarget {
    fn from(values: Vec<f32>) -> Self {
        ValueTarget::Keyframes(values.into_iter().map(Value::Number).collect())
    }
}

/// Values to animate and how
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnimationDefinition {
    pub values: IndexMap<String, ValueTarget>,
    pub transition: Option<Transition>,
    /// Per-value transition overrides
    pub value_transitions: IndexMap<String, Transition>,
}

impl AnimationDefinition {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn value(mut self, name: impl Into<String>, target: impl Into<ValueTarget>) -> Self {
        self.values.insert(name.into(), target.into());
        self
    }

    pub fn with_transition(mut self, transition: Transition) -> Self {
        self.transition = Some(transition);
        self
    }

    pub fn with_value_transition(mut self, name: impl Into<String>, transition: Transition) -> Self {
        self.value_transitions.insert(name.into(), transition);
        self
    }

    /// Transition for `name`: its override, else the shared one, else `fallback`
    pub fn transition_for<'a>(&'a self, name: &str, fallback: &'a Transition) -> &'a Transition {
        self.value_transitions
            .get(name)
            .or(self.transition.as_ref())
            .unwrap_or(fallback)
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
