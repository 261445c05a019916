//! Optimized-appear handoff
//!
//! A host may start "appear" animations natively before the engine mounts
//! (for example from server-rendered markup). Elements carrying an
//! optimized-appear id take those animations over instead of restarting them:
//! their first animation runs synchronously on mount, and each value asks the
//! host how far the native animation already got.
//!
//! Once the first batch of mounts is through, the handoff window closes for
//! good. The flag is flipped from a microtask so every element mounted in the
//! same pass still sees it open.

use std::cell::Cell;
use std::rc::Rc;

use glide_core::frameloop::Batcher;

/// Host side of the handoff
pub trait HandoffHost {
    /// Whether an optimized animation runs for `appear_id` (any value when
    /// `value_name` is `None`)
    fn has_optimized_animation(&self, appear_id: &str, value_name: Option<&str>) -> bool;

    /// Take over `value_name`; returns the milliseconds the native animation
    /// has already run, or `None` if there is nothing to take over
    fn handoff_animation(&self, appear_id: &str, value_name: &str) -> Option<f32>;

    /// Stop the native animation; with `can_resume` the displayed value stays
    fn cancel_optimized_animation(&self, appear_id: &str, value_name: &str, can_resume: bool);
}

/// Engine-owned handoff flag
#[derive(Debug, Default)]
pub struct HandoffState {
    complete: Cell<bool>,
    scheduled: Cell<bool>,
}

impl HandoffState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_complete(&self) -> bool {
        self.complete.get()
    }

    /// Reopen the handoff window
    pub fn reset(&self) {
        self.complete.set(false);
        self.scheduled.set(false);
    }

    /// Whether an element with `appear_id` should take the synchronous path
    pub fn wants_handoff(&self, host: &dyn HandoffHost, appear_id: Option<&str>) -> bool {
        match appear_id {
            Some(id) => !self.is_complete() && host.has_optimized_animation(id, None),
            None => false,
        }
    }

    /// Close the handoff window on the next microtask flush
    ///
    /// Only the first call queues the microtask.
    pub fn schedule_complete(self: &Rc<Self>, batcher: &Batcher) {
        if self.scheduled.replace(true) {
            return;
        }
        let state = Rc::downgrade(self);
        batcher.queue_microtask(move || {
            if let Some(state) = state.upgrade() {
                tracing::debug!("optimized appear handoff complete");
                state.complete.set(true);
            }
        });
    }
}
