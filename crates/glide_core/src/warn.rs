//! Deduplicated diagnostics
//!
//! Configuration problems (a scroll container without positioning, a
//! transition that can't be honoured natively) are reported once per message
//! per thread rather than on every frame.

use std::cell::RefCell;

use rustc_hash::FxHashSet;

thread_local! {
    static WARNED: RefCell<FxHashSet<String>> = RefCell::new(FxHashSet::default());
}

/// Emit `message` as a `tracing` warning the first time it is seen
///
/// Returns `true` if the warning was emitted.
pub fn warn_once(message: impl Into<String>) -> bool {
    let message = message.into();
    let first = WARNED.with(|warned| warned.borrow_mut().insert(message.clone()));
    if first {
        tracing::warn!("{}", message);
    }
    first
}

/// Check whether `message` has already been emitted
pub fn has_warned(message: &str) -> bool {
    WARNED.with(|warned| warned.borrow().contains(message))
}

/// Forget every emitted warning
pub fn reset_warnings() {
    WARNED.with(|warned| warned.borrow_mut().clear());
}
