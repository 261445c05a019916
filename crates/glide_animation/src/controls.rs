//! Animation controls
//!
//! Imperative start/stop/set broadcast to every subscribed element. Elements
//! subscribe when their `animate` prop is a controls object; the owner mounts
//! the controls once the subscribed tree is live.
//!
//! ```rust
//! use glide_animation::controls::AnimationControls;
//! use glide_animation::definition::AnimationDefinition;
//!
//! let controls = AnimationControls::new();
//! assert!(controls.start(&AnimationDefinition::new()).is_err());
//!
//! let mount = controls.mount();
//! let done = controls.start(&AnimationDefinition::new()).unwrap();
//! assert!(done.is_resolved()); // no subscribers
//! mount.unmount();
//! ```

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use slotmap::{new_key_type, SlotMap};
use smallvec::SmallVec;

use glide_core::completion::Completion;
use glide_core::error::{GlideError, Result};
use glide_core::events::Subscription;

use crate::definition::AnimationDefinition;

/// Something that reacts to controls broadcasts
pub trait ControlsHandler {
    /// Start animating towards `definition`
    fn start(&self, definition: &AnimationDefinition) -> Completion;
    /// Stop every running animation
    fn stop(&self);
    /// Jump to `definition` without animating
    fn set(&self, definition: &AnimationDefinition);
}

new_key_type! {
    struct HandlerId;
}

struct ControlsInner {
    handlers: RefCell<SlotMap<HandlerId, Rc<dyn ControlsHandler>>>,
    mounted: Cell<bool>,
}

/// Broadcasts animation commands to subscribed handlers
#[derive(Clone)]
pub struct AnimationControls {
    inner: Rc<ControlsInner>,
}

impl AnimationControls {
    pub fn new() -> Self {
        Self {
            inner: Rc::new(ControlsInner {
                handlers: RefCell::new(SlotMap::with_key()),
                mounted: Cell::new(false),
            }),
        }
    }

    /// Add a handler; subscriptions survive unmount/remount
    pub fn subscribe(&self, handler: Rc<dyn ControlsHandler>) -> Subscription {
        let id = self.inner.handlers.borrow_mut().insert(handler);
        let inner = Rc::downgrade(&self.inner);
        Subscription::new(move || {
            if let Some(inner) = inner.upgrade() {
                inner.handlers.borrow_mut().remove(id);
            }
        })
    }

    /// Allow `start` and `set`
    pub fn mount(&self) -> ControlsMount {
        self.inner.mounted.set(true);
        ControlsMount {
            inner: Rc::downgrade(&self.inner),
        }
    }

    pub fn is_mounted(&self) -> bool {
        self.inner.mounted.get()
    }

    /// Whether both handles broadcast to the same subscribers
    pub fn ptr_eq(&self, other: &AnimationControls) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.handlers.borrow().len()
    }

    fn handlers(&self) -> SmallVec<[Rc<dyn ControlsHandler>; 4]> {
        self.inner.handlers.borrow().values().cloned().collect()
    }

    /// Start `definition` on every handler
    ///
    /// The returned completion resolves once every handler's animation has
    /// completed; with no handlers it is already resolved.
    pub fn start(&self, definition: &AnimationDefinition) -> Result<Completion> {
        if !self.is_mounted() {
            return Err(GlideError::ControlsNotMounted);
        }
        let handlers = self.handlers();
        tracing::debug!(handlers = handlers.len(), "controls start");
        Ok(Completion::all(
            handlers.iter().map(|handler| handler.start(definition)),
        ))
    }

    /// Jump every handler to `definition`
    pub fn set(&self, definition: &AnimationDefinition) -> Result<()> {
        if !self.is_mounted() {
            return Err(GlideError::ControlsNotMounted);
        }
        for handler in self.handlers() {
            handler.set(definition);
        }
        Ok(())
    }

    /// Stop every handler's animations
    pub fn stop(&self) {
        for handler in self.handlers() {
            handler.stop();
        }
    }
}

impl Default for AnimationControls {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for AnimationControls {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnimationControls")
            .field("mounted", &self.is_mounted())
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

/// Returned by [`AnimationControls::mount`]
#[must_use = "call `unmount()` when the owner goes away"]
pub struct ControlsMount {
    inner: Weak<ControlsInner>,
}

impl ControlsMount {
    pub fn unmount(self) {
        if let Some(inner) = self.inner.upgrade() {
            inner.mounted.set(false);
        }
    }
}
