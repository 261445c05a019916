//! Frame batcher
//!
//! Partitions the work submitted during a frame into ordered phases so that
//! every read (layout measurement) happens before any write (style mutation):
//!
//! ```text
//!   microtasks ──► Read ──► Update ──► PreRender ──► Render ──► PostRender
//! ```
//!
//! The host drives the batcher by calling [`Batcher::tick`] once per animation
//! frame. Between ticks the batcher is idle; it asks the host for a frame
//! through the wake callback only while some phase has pending work.
//!
//! # Example
//!
//! ```rust
//! use glide_core::frameloop::{Batcher, Phase};
//! use std::cell::RefCell;
//! use std::rc::Rc;
//!
//! let batcher = Batcher::new();
//! let log = Rc::new(RefCell::new(Vec::new()));
//!
//! let l = log.clone();
//! batcher.render(move |_| l.borrow_mut().push("render"));
//! let l = log.clone();
//! batcher.read(move |_| l.borrow_mut().push("read"));
//!
//! batcher.tick(16.0);
//! assert_eq!(*log.borrow(), vec!["read", "render"]);
//! assert!(batcher.is_idle());
//! ```

use std::cell::RefCell;
use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::rc::{Rc, Weak};

use serde::{Deserialize, Serialize};
use slotmap::{new_key_type, SlotMap};

// ============================================================================
// Phases
// ============================================================================

/// A step of the per-frame pipeline
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Phase {
    /// Layout measurement. No surface writes.
    Read,
    /// State updates (animation stepping, delta resolution)
    Update,
    /// Work that must see updated state but precede rendering
    PreRender,
    /// Surface writes
    Render,
    /// Cleanup and notifications after the frame was written
    PostRender,
}

impl Phase {
    /// All phases in execution order
    pub const ORDER: [Phase; 5] = [
        Phase::Read,
        Phase::Update,
        Phase::PreRender,
        Phase::Render,
        Phase::PostRender,
    ];

    fn index(self) -> usize {
        self as usize
    }
}

/// Timing information passed to every frame callback
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FrameData {
    /// Milliseconds since the previous tick, clamped to the batcher's limits
    pub delta_ms: f32,
    /// Host timestamp of this tick in milliseconds
    pub timestamp_ms: f64,
    /// True while the batcher is running phases
    pub is_processing: bool,
}

impl Default for FrameData {
    fn default() -> Self {
        Self {
            delta_ms: 0.0,
            timestamp_ms: 0.0,
            is_processing: false,
        }
    }
}

/// Timing limits for the batcher
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatcherConfig {
    /// Upper bound on the delta reported to callbacks (long stalls are not replayed)
    pub max_elapsed_ms: f32,
    /// Delta reported on the very first tick
    pub default_elapsed_ms: f32,
}

impl Default for BatcherConfig {
    fn default() -> Self {
        Self {
            max_elapsed_ms: 40.0,
            default_elapsed_ms: 1000.0 / 60.0,
        }
    }
}

// ============================================================================
// Jobs
// ============================================================================

new_key_type! {
    /// Handle to a scheduled frame callback
    pub struct JobId;
}

type FrameCallback = Box<dyn FnMut(&FrameData)>;
type Microtask = Box<dyn FnOnce()>;

/// Callback type for asking the host for an animation frame
pub type WakeCallback = Rc<dyn Fn()>;

struct Job {
    phase: Phase,
    keep_alive: bool,
    /// `None` while the callback is executing
    callback: Option<FrameCallback>,
}

struct BatcherInner {
    jobs: SlotMap<JobId, Job>,
    queues: [Vec<JobId>; 5],
    microtasks: VecDeque<Microtask>,
    frame: FrameData,
    has_ticked: bool,
    frame_requested: bool,
    config: BatcherConfig,
    wake: Option<WakeCallback>,
}

impl BatcherInner {
    fn has_pending(&self) -> bool {
        !self.microtasks.is_empty() || self.queues.iter().any(|q| !q.is_empty())
    }
}

/// Cancel handle returned by [`Batcher::schedule`]
///
/// Dropping the handle does not cancel the job.
#[derive(Clone, Debug)]
pub struct FrameJob {
    id: JobId,
    phase: Phase,
    batcher: Weak<RefCell<BatcherInner>>,
}

impl FrameJob {
    /// The job's identifier
    pub fn id(&self) -> JobId {
        self.id
    }

    /// The phase the job runs in
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Remove the job from its queue
    ///
    /// Cancelling a job that is currently executing lets the running
    /// invocation finish but prevents keep-alive re-enqueueing. Cancelling a
    /// job that already ran (or was cancelled) is a no-op.
    pub fn cancel(&self) {
        if let Some(inner) = self.batcher.upgrade() {
            cancel_job(&inner, self.id);
        }
    }

    /// Check whether the job is still scheduled (or running)
    pub fn is_scheduled(&self) -> bool {
        self.batcher
            .upgrade()
            .map(|inner| inner.borrow().jobs.contains_key(self.id))
            .unwrap_or(false)
    }
}

fn cancel_job(inner: &Rc<RefCell<BatcherInner>>, id: JobId) {
    let mut inner = inner.borrow_mut();
    if let Some(job) = inner.jobs.remove(id) {
        let queue = &mut inner.queues[job.phase.index()];
        queue.retain(|queued| *queued != id);
    }
}

// ============================================================================
// Batcher
// ============================================================================

/// Per-frame phase scheduler
///
/// Cheap to clone; clones share the same queues. The batcher is
/// single-threaded: callbacks are not `Send` and run on the thread that
/// calls [`tick`](Self::tick).
#[derive(Clone)]
pub struct Batcher {
    inner: Rc<RefCell<BatcherInner>>,
}

impl Batcher {
    pub fn new() -> Self {
        Self::with_config(BatcherConfig::default())
    }

    pub fn with_config(config: BatcherConfig) -> Self {
        Self {
            inner: Rc::new(RefCell::new(BatcherInner {
                jobs: SlotMap::with_key(),
                queues: Default::default(),
                microtasks: VecDeque::new(),
                frame: FrameData::default(),
                has_ticked: false,
                frame_requested: false,
                config,
                wake: None,
            })),
        }
    }

    /// Set the callback used to request an animation frame from the host
    ///
    /// The callback is invoked at most once between two ticks, and only when
    /// work has been scheduled.
    pub fn set_wake_callback<F>(&self, callback: F)
    where
        F: Fn() + 'static,
    {
        self.inner.borrow_mut().wake = Some(Rc::new(callback));
    }

    /// Schedule `callback` to run in `phase`
    ///
    /// Jobs scheduled into a phase later than the one currently executing run
    /// in the same tick; jobs scheduled into the executing phase or an earlier
    /// one run on the next tick. Keep-alive jobs are re-enqueued after every
    /// run until cancelled.
    pub fn schedule<F>(&self, phase: Phase, callback: F, keep_alive: bool) -> FrameJob
    where
        F: FnMut(&FrameData) + 'static,
    {
        let id = {
            let mut inner = self.inner.borrow_mut();
            let id = inner.jobs.insert(Job {
                phase,
                keep_alive,
                callback: Some(Box::new(callback)),
            });
            inner.queues[phase.index()].push(id);
            id
        };
        self.request_frame();

        FrameJob {
            id,
            phase,
            batcher: Rc::downgrade(&self.inner),
        }
    }

    /// Schedule a one-shot read (measurement) callback
    pub fn read<F>(&self, callback: F) -> FrameJob
    where
        F: FnMut(&FrameData) + 'static,
    {
        self.schedule(Phase::Read, callback, false)
    }

    /// Schedule a one-shot update callback
    pub fn update<F>(&self, callback: F) -> FrameJob
    where
        F: FnMut(&FrameData) + 'static,
    {
        self.schedule(Phase::Update, callback, false)
    }

    /// Schedule a one-shot pre-render callback
    pub fn pre_render<F>(&self, callback: F) -> FrameJob
    where
        F: FnMut(&FrameData) + 'static,
    {
        self.schedule(Phase::PreRender, callback, false)
    }

    /// Schedule a one-shot render (surface write) callback
    pub fn render<F>(&self, callback: F) -> FrameJob
    where
        F: FnMut(&FrameData) + 'static,
    {
        self.schedule(Phase::Render, callback, false)
    }

    /// Schedule a one-shot post-render callback
    pub fn post_render<F>(&self, callback: F) -> FrameJob
    where
        F: FnMut(&FrameData) + 'static,
    {
        self.schedule(Phase::PostRender, callback, false)
    }

    /// Cancel a scheduled job
    pub fn cancel(&self, job: &FrameJob) {
        cancel_job(&self.inner, job.id);
    }

    /// Queue bookkeeping that must run before the next tick begins
    pub fn queue_microtask<F>(&self, task: F)
    where
        F: FnOnce() + 'static,
    {
        self.inner.borrow_mut().microtasks.push_back(Box::new(task));
        self.request_frame();
    }

    /// Run all queued microtasks, including ones queued while flushing
    pub fn flush_microtasks(&self) {
        loop {
            let task = self.inner.borrow_mut().microtasks.pop_front();
            let Some(task) = task else {
                break;
            };
            if panic::catch_unwind(AssertUnwindSafe(task)).is_err() {
                tracing::error!("microtask panicked; continuing with remaining tasks");
            }
        }
    }

    /// Run one animation frame
    ///
    /// Flushes microtasks, then drains each phase in order. Calling `tick`
    /// from inside a frame callback is ignored.
    pub fn tick(&self, timestamp_ms: f64) {
        if self.inner.borrow().frame.is_processing {
            tracing::warn!("Batcher::tick called re-entrantly; ignoring");
            return;
        }

        self.flush_microtasks();

        {
            let mut inner = self.inner.borrow_mut();
            let delta = if inner.has_ticked {
                let elapsed = (timestamp_ms - inner.frame.timestamp_ms) as f32;
                elapsed.min(inner.config.max_elapsed_ms).max(1.0)
            } else {
                inner.config.default_elapsed_ms
            };
            inner.has_ticked = true;
            inner.frame_requested = false;
            inner.frame = FrameData {
                delta_ms: delta,
                timestamp_ms,
                is_processing: true,
            };
        }

        for phase in Phase::ORDER {
            self.process_phase(phase);
        }

        let has_pending = {
            let mut inner = self.inner.borrow_mut();
            inner.frame.is_processing = false;
            inner.has_pending()
        };
        if has_pending {
            self.request_frame();
        }
    }

    fn process_phase(&self, phase: Phase) {
        let (queue, frame) = {
            let mut inner = self.inner.borrow_mut();
            let queue = std::mem::take(&mut inner.queues[phase.index()]);
            (queue, inner.frame)
        };

        for id in queue {
            // Cancelled jobs have already left the arena
            let callback = {
                let mut inner = self.inner.borrow_mut();
                inner.jobs.get_mut(id).and_then(|job| job.callback.take())
            };
            let Some(mut callback) = callback else {
                continue;
            };

            let outcome = panic::catch_unwind(AssertUnwindSafe(|| callback(&frame)));

            let mut inner = self.inner.borrow_mut();
            if outcome.is_err() {
                tracing::error!(?phase, "frame callback panicked; dropping it");
                inner.jobs.remove(id);
                continue;
            }

            let keep = inner
                .jobs
                .get(id)
                .map(|job| job.keep_alive)
                .unwrap_or(false);
            if keep {
                if let Some(job) = inner.jobs.get_mut(id) {
                    job.callback = Some(callback);
                }
                inner.queues[phase.index()].push(id);
            } else {
                inner.jobs.remove(id);
            }
        }
    }

    fn request_frame(&self) {
        let wake = {
            let mut inner = self.inner.borrow_mut();
            if inner.frame_requested || inner.frame.is_processing {
                return;
            }
            inner.frame_requested = true;
            inner.wake.clone()
        };
        if let Some(wake) = wake {
            wake();
        }
    }

    /// Timing data of the most recent tick
    pub fn frame_data(&self) -> FrameData {
        self.inner.borrow().frame
    }

    /// Check whether any phase or the microtask queue has pending work
    pub fn has_pending_work(&self) -> bool {
        self.inner.borrow().has_pending()
    }

    /// Check whether the batcher has nothing to do
    pub fn is_idle(&self) -> bool {
        !self.has_pending_work()
    }

    /// Check whether a frame has been requested since the last tick
    pub fn is_frame_requested(&self) -> bool {
        self.inner.borrow().frame_requested
    }

    /// Number of jobs waiting in `phase`
    pub fn pending_in(&self, phase: Phase) -> usize {
        self.inner.borrow().queues[phase.index()].len()
    }
}

impl Default for Batcher {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn recorder() -> Rc<RefCell<Vec<&'static str>>> {
        Rc::new(RefCell::new(Vec::new()))
    }

    #[test]
    fn test_phases_run_in_order() {
        let batcher = Batcher::new();
        let log = recorder();

        for (phase, name) in [
            (Phase::PostRender, "post_render"),
            (Phase::Render, "render"),
            (Phase::PreRender, "pre_render"),
            (Phase::Update, "update"),
            (Phase::Read, "read"),
        ] {
            let log = log.clone();
            batcher.schedule(phase, move |_| log.borrow_mut().push(name), false);
        }

        batcher.tick(0.0);
        assert_eq!(
            *log.borrow(),
            vec!["read", "update", "pre_render", "render", "post_render"]
        );
    }

    #[test]
    fn test_submission_order_within_phase() {
        let batcher = Batcher::new();
        let log = recorder();

        for name in ["a", "b", "c"] {
            let log = log.clone();
            batcher.update(move |_| log.borrow_mut().push(name));
        }

        batcher.tick(0.0);
        assert_eq!(*log.borrow(), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_later_phase_runs_same_tick() {
        let batcher = Batcher::new();
        let log = recorder();

        let b = batcher.clone();
        let l = log.clone();
        batcher.read(move |_| {
            l.borrow_mut().push("read");
            let l = l.clone();
            b.render(move |_| l.borrow_mut().push("render"));
        });

        batcher.tick(0.0);
        assert_eq!(*log.borrow(), vec!["read", "render"]);
    }

    #[test]
    fn test_same_or_earlier_phase_defers_to_next_tick() {
        let batcher = Batcher::new();
        let log = recorder();

        let b = batcher.clone();
        let l = log.clone();
        batcher.update(move |_| {
            l.borrow_mut().push("update");
            let l1 = l.clone();
            b.read(move |_| l1.borrow_mut().push("read-next"));
            let l2 = l.clone();
            b.update(move |_| l2.borrow_mut().push("update-next"));
        });

        batcher.tick(0.0);
        assert_eq!(*log.borrow(), vec!["update"]);
        assert!(batcher.has_pending_work());

        batcher.tick(16.0);
        assert_eq!(*log.borrow(), vec!["update", "read-next", "update-next"]);
    }

    #[test]
    fn test_keep_alive_repeats_until_cancelled() {
        let batcher = Batcher::new();
        let count = Rc::new(Cell::new(0));

        let c = count.clone();
        let job = batcher.schedule(Phase::Update, move |_| c.set(c.get() + 1), true);

        batcher.tick(0.0);
        batcher.tick(16.0);
        assert_eq!(count.get(), 2);

        job.cancel();
        batcher.tick(32.0);
        assert_eq!(count.get(), 2);
        assert!(!job.is_scheduled());
        assert!(batcher.is_idle());
    }

    #[test]
    fn test_cancel_during_execution_finishes_current_run() {
        let batcher = Batcher::new();
        let count = Rc::new(Cell::new(0));
        let slot: Rc<RefCell<Option<FrameJob>>> = Rc::new(RefCell::new(None));

        let c = count.clone();
        let s = slot.clone();
        let job = batcher.schedule(
            Phase::Update,
            move |_| {
                if let Some(job) = s.borrow().as_ref() {
                    job.cancel();
                }
                c.set(c.get() + 1);
            },
            true,
        );
        *slot.borrow_mut() = Some(job);

        batcher.tick(0.0);
        assert_eq!(count.get(), 1);
        batcher.tick(16.0);
        assert_eq!(count.get(), 1);
    }

    #[test]
    fn test_cancel_before_run() {
        let batcher = Batcher::new();
        let ran = Rc::new(Cell::new(false));

        let r = ran.clone();
        let job = batcher.render(move |_| r.set(true));
        batcher.cancel(&job);

        batcher.tick(0.0);
        assert!(!ran.get());
    }

    #[test]
    fn test_wake_only_when_work_pending() {
        let batcher = Batcher::new();
        let wakes = Rc::new(Cell::new(0));
        let w = wakes.clone();
        batcher.set_wake_callback(move || w.set(w.get() + 1));

        batcher.tick(0.0);
        assert_eq!(wakes.get(), 0);

        batcher.read(|_| {});
        batcher.update(|_| {});
        assert_eq!(wakes.get(), 1);

        batcher.tick(16.0);
        assert_eq!(wakes.get(), 1);
        assert!(!batcher.is_frame_requested());
    }

    #[test]
    fn test_delta_is_clamped() {
        let batcher = Batcher::new();
        let deltas = Rc::new(RefCell::new(Vec::new()));

        let d = deltas.clone();
        batcher.schedule(Phase::Update, move |f| d.borrow_mut().push(f.delta_ms), true);

        batcher.tick(1000.0);
        batcher.tick(1010.0);
        batcher.tick(2000.0);
        batcher.tick(2000.0);

        let deltas = deltas.borrow();
        assert!((deltas[0] - 1000.0 / 60.0).abs() < 1e-3);
        assert_eq!(deltas[1], 10.0);
        assert_eq!(deltas[2], 40.0);
        assert_eq!(deltas[3], 1.0);
    }

    #[test]
    fn test_microtasks_run_before_phases() {
        let batcher = Batcher::new();
        let log = recorder();

        let l = log.clone();
        batcher.read(move |_| l.borrow_mut().push("read"));
        let l = log.clone();
        batcher.queue_microtask(move || l.borrow_mut().push("microtask"));

        batcher.tick(0.0);
        assert_eq!(*log.borrow(), vec!["microtask", "read"]);
    }

    #[test]
    fn test_panicking_callback_is_isolated() {
        let batcher = Batcher::new();
        let ran = Rc::new(Cell::new(false));

        batcher.update(|_| panic!("boom"));
        let r = ran.clone();
        batcher.update(move |_| r.set(true));

        batcher.tick(0.0);
        assert!(ran.get());
        assert!(batcher.is_idle());
    }
}
