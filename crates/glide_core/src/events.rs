//! Typed subscriber lists
//!
//! Each lifecycle event of an element or node is a [`SubscriberList`] over the
//! event's payload type. Subscribing returns a [`Subscription`]; calling
//! [`Subscription::unsubscribe`] removes the callback. Dropping the handle
//! leaves the callback registered.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use slotmap::{new_key_type, SlotMap};
use smallvec::SmallVec;

new_key_type! {
    /// Key of a registered subscriber
    pub struct SubscriberId;
}

type Callback<T> = Rc<dyn Fn(&T)>;

/// Ordered list of callbacks for one event type
pub struct SubscriberList<T: 'static> {
    subscribers: Rc<RefCell<SlotMap<SubscriberId, Callback<T>>>>,
}

impl<T: 'static> SubscriberList<T> {
    pub fn new() -> Self {
        Self {
            subscribers: Rc::new(RefCell::new(SlotMap::with_key())),
        }
    }

    /// Register a callback
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&T) + 'static,
    {
        let id = self.subscribers.borrow_mut().insert(Rc::new(callback));
        let subscribers = Rc::downgrade(&self.subscribers);
        Subscription::new(move || {
            if let Some(subscribers) = subscribers.upgrade() {
                subscribers.borrow_mut().remove(id);
            }
        })
    }

    /// Invoke every callback with `payload`
    ///
    /// Callbacks may subscribe or unsubscribe while being notified; changes
    /// take effect from the next notification.
    pub fn notify(&self, payload: &T) {
        let snapshot: SmallVec<[Callback<T>; 4]> =
            self.subscribers.borrow().values().cloned().collect();
        for callback in snapshot {
            callback(payload);
        }
    }

    pub fn len(&self) -> usize {
        self.subscribers.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscribers.borrow().is_empty()
    }

    pub fn clear(&self) {
        self.subscribers.borrow_mut().clear();
    }
}

impl<T: 'static> Default for SubscriberList<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: 'static> Clone for SubscriberList<T> {
    fn clone(&self) -> Self {
        Self {
            subscribers: self.subscribers.clone(),
        }
    }
}

impl<T: 'static> fmt::Debug for SubscriberList<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriberList")
            .field("len", &self.len())
            .finish()
    }
}

/// Handle that removes a registered callback
#[must_use = "keep the subscription to unsubscribe later"]
pub struct Subscription {
    remove: Option<Box<dyn FnOnce()>>,
}

impl Subscription {
    pub fn new<F>(remove: F) -> Self
    where
        F: FnOnce() + 'static,
    {
        Self {
            remove: Some(Box::new(remove)),
        }
    }

    /// A subscription with nothing to remove
    pub fn empty() -> Self {
        Self { remove: None }
    }

    pub fn unsubscribe(mut self) {
        if let Some(remove) = self.remove.take() {
            remove();
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.remove.is_some())
            .finish()
    }
}
