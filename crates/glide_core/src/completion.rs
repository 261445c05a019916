//! Completion futures
//!
//! A [`Completion`] is a single-threaded, cloneable future that resolves once
//! its [`Resolver`] fires. Animations, controls broadcasts and native
//! animation handles all report completion through it, so callers can either
//! `await` it or attach a callback with [`Completion::on_resolve`].

use std::cell::{Cell, RefCell};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll, Waker};

use smallvec::SmallVec;

type ResolveCallback = Box<dyn FnOnce()>;

#[derive(Default)]
struct CompletionState {
    resolved: bool,
    wakers: SmallVec<[Waker; 1]>,
    callbacks: SmallVec<[ResolveCallback; 2]>,
}

/// A future that resolves when its resolver fires
#[derive(Clone)]
pub struct Completion {
    state: Rc<RefCell<CompletionState>>,
}

/// The resolving half of a [`Completion`]
#[derive(Clone)]
pub struct Resolver {
    state: Rc<RefCell<CompletionState>>,
}

impl Completion {
    /// Create an unresolved completion and its resolver
    pub fn pending() -> (Completion, Resolver) {
        let state = Rc::new(RefCell::new(CompletionState::default()));
        (
            Completion {
                state: state.clone(),
            },
            Resolver { state },
        )
    }

    /// A completion that is already resolved
    pub fn resolved() -> Completion {
        let (completion, resolver) = Self::pending();
        resolver.resolve();
        completion
    }

    pub fn is_resolved(&self) -> bool {
        self.state.borrow().resolved
    }

    /// Run `callback` once resolved (immediately if already resolved)
    pub fn on_resolve<F>(&self, callback: F)
    where
        F: FnOnce() + 'static,
    {
        {
            let mut state = self.state.borrow_mut();
            if !state.resolved {
                state.callbacks.push(Box::new(callback));
                return;
            }
        }
        callback();
    }

    /// Resolve once every completion in `completions` has resolved
    ///
    /// An empty set resolves immediately.
    pub fn all<I>(completions: I) -> Completion
    where
        I: IntoIterator<Item = Completion>,
    {
        let completions: Vec<Completion> = completions.into_iter().collect();
        let (all, resolver) = Self::pending();
        let remaining = Rc::new(Cell::new(completions.len()));

        if completions.is_empty() {
            resolver.resolve();
            return all;
        }

        for completion in completions {
            let remaining = remaining.clone();
            let resolver = resolver.clone();
            completion.on_resolve(move || {
                remaining.set(remaining.get() - 1);
                if remaining.get() == 0 {
                    resolver.resolve();
                }
            });
        }
        all
    }
}

impl Resolver {
    /// Resolve the completion; later calls are no-ops
    pub fn resolve(&self) {
        let (wakers, callbacks) = {
            let mut state = self.state.borrow_mut();
            if state.resolved {
                return;
            }
            state.resolved = true;
            (
                std::mem::take(&mut state.wakers),
                std::mem::take(&mut state.callbacks),
            )
        };
        for waker in wakers {
            waker.wake();
        }
        for callback in callbacks {
            callback();
        }
    }

    pub fn is_resolved(&self) -> bool {
        self.state.borrow().resolved
    }

    /// The completion this resolver fires
    pub fn completion(&self) -> Completion {
        Completion {
            state: self.state.clone(),
        }
    }
}

impl Future for Completion {
    type Output = ();

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        let mut state = self.state.borrow_mut();
        if state.resolved {
            Poll::Ready(())
        } else {
            if !state.wakers.iter().any(|w| w.will_wake(cx.waker())) {
                state.wakers.push(cx.waker().clone());
            }
            Poll::Pending
        }
    }
}

impl fmt::Debug for Completion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Completion")
            .field("resolved", &self.is_resolved())
            .finish()
    }
}

impl fmt::Debug for Resolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resolver")
            .field("resolved", &self.is_resolved())
            .finish()
    }
}
