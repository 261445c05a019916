//! Motion engine
//!
//! Ties the visual element tree, the projection tree and the per-value
//! animation drivers to one [`Batcher`]:
//!
//! - **read**: layout passes after [`MotionEngine::did_update`]
//! - **update**: frame-driven value animations and layout animations step
//! - **pre-render**: projection corrections are resolved
//! - **render**: dirty elements are written to the surface
//!
//! The update/pre-render/render jobs are keep-alive while anything animates
//! and cancel themselves once the engine is idle.
//!
//! Engine state sits behind one `RefCell`. Anything that can call back into
//! user code (resolving completions, notifying subscribers, cancelling native
//! animations) is collected while the state is borrowed and run afterwards.

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use rustc_hash::{FxHashMap, FxHashSet};
use slotmap::{new_key_type, SlotMap};

use glide_animation::animation::ValueAnimation;
use glide_animation::controls::{AnimationControls, ControlsHandler};
use glide_animation::definition::{AnimationDefinition, ValueTarget};
use glide_animation::handoff::{HandoffHost, HandoffState};
use glide_animation::transition::Transition;
use glide_animation::waapi::{start_waapi_animation, NativeAnimationHost, NativeOptions, WaapiAnimation};
use glide_core::completion::{Completion, Resolver};
use glide_core::error::Result;
use glide_core::frameloop::{Batcher, FrameJob, Phase};
use glide_core::surface::{InstanceId, Surface};
use glide_core::value::{ResolvedValues, Value};

use crate::config::EngineConfig;
use crate::node::{NodeId, ProjectionOptions};
use crate::transform::is_transform_key;
use crate::tree::{ProjectionEvent, ProjectionTree};
use crate::visual_element::{
    get_base_target_from_props, AnimateProp, ElementId, ElementKind, LayoutUpdateEvent,
    LifecycleEvents, MeasureEvent, MotionProps, PresenceContext, VisualElement, VisualTree,
};

new_key_type! {
    struct AnimationId;
}

type Deferred = Vec<Box<dyn FnOnce()>>;

fn run_deferred(deferred: Deferred) {
    for task in deferred {
        task();
    }
}

enum Driver {
    Frame(ValueAnimation),
    Native(WaapiAnimation),
}

struct ActiveAnimation {
    element: ElementId,
    name: String,
    driver: Driver,
    /// Value left behind by a native animation that finishes
    final_value: Option<Value>,
    resolver: Resolver,
}

struct ValuePlan {
    name: String,
    keyframes: Vec<Value>,
    transition: Transition,
}

#[derive(Default)]
struct EngineState {
    visuals: VisualTree,
    projection: ProjectionTree,
    animations: SlotMap<AnimationId, ActiveAnimation>,
    by_value: FxHashMap<(ElementId, String), AnimationId>,
    node_owners: FxHashMap<NodeId, ElementId>,
    /// Elements whose values changed since the last render
    updated: FxHashSet<ElementId>,
}

struct LoopJobs {
    update: FrameJob,
    pre_render: FrameJob,
    render: FrameJob,
}

struct EngineInner {
    batcher: Batcher,
    surface: Rc<dyn Surface>,
    native: Option<Rc<dyn NativeAnimationHost>>,
    handoff: Option<Rc<dyn HandoffHost>>,
    handoff_state: Rc<HandoffState>,
    config: EngineConfig,
    state: RefCell<EngineState>,
    loop_jobs: RefCell<Option<LoopJobs>>,
    layout_job: RefCell<Option<FrameJob>>,
}

// ============================================================================
// Builder
// ============================================================================

/// Configures a [`MotionEngine`]
pub struct EngineBuilder {
    surface: Rc<dyn Surface>,
    config: EngineConfig,
    batcher: Option<Batcher>,
    native: Option<Rc<dyn NativeAnimationHost>>,
    handoff: Option<Rc<dyn HandoffHost>>,
}

impl EngineBuilder {
    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Share an existing batcher instead of creating one
    pub fn batcher(mut self, batcher: Batcher) -> Self {
        self.batcher = Some(batcher);
        self
    }

    pub fn native_host(mut self, host: Rc<dyn NativeAnimationHost>) -> Self {
        self.native = Some(host);
        self
    }

    pub fn handoff_host(mut self, host: Rc<dyn HandoffHost>) -> Self {
        self.handoff = Some(host);
        self
    }

    pub fn build(self) -> MotionEngine {
        let batcher = self
            .batcher
            .unwrap_or_else(|| Batcher::with_config(self.config.batcher.clone()));
        let state = EngineState {
            projection: ProjectionTree::new(self.config.layout.clone()),
            ..Default::default()
        };
        MotionEngine {
            inner: Rc::new(EngineInner {
                batcher,
                surface: self.surface,
                native: self.native,
                handoff: self.handoff,
                handoff_state: Rc::new(HandoffState::new()),
                config: self.config,
                state: RefCell::new(state),
                loop_jobs: RefCell::new(None),
                layout_job: RefCell::new(None),
            }),
        }
    }
}

// ============================================================================
// Engine
// ============================================================================

/// Handle to the engine; clones share state
#[derive(Clone)]
pub struct MotionEngine {
    inner: Rc<EngineInner>,
}

impl MotionEngine {
    pub fn builder(surface: Rc<dyn Surface>) -> EngineBuilder {
        EngineBuilder {
            surface,
            config: EngineConfig::default(),
            batcher: None,
            native: None,
            handoff: None,
        }
    }

    pub fn new(surface: Rc<dyn Surface>) -> Self {
        Self::builder(surface).build()
    }

    fn from_weak(weak: &Weak<EngineInner>) -> Option<Self> {
        weak.upgrade().map(|inner| Self { inner })
    }

    fn downgrade(&self) -> Weak<EngineInner> {
        Rc::downgrade(&self.inner)
    }

    pub fn batcher(&self) -> &Batcher {
        &self.inner.batcher
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    pub fn handoff_state(&self) -> &HandoffState {
        &self.inner.handoff_state
    }

    /// Run one frame
    pub fn frame(&self, timestamp_ms: f64) {
        self.inner.batcher.tick(timestamp_ms);
    }

    // ------------------------------------------------------------------------
    // Element lifecycle
    // ------------------------------------------------------------------------

    /// Create an element under `parent`
    ///
    /// Elements that opt into layout tracking get a projection node parented
    /// to the closest projecting ancestor (the document root for portals).
    pub fn create_element(&self, kind: ElementKind, parent: Option<ElementId>, props: MotionProps) -> ElementId {
        let controls = match &props.animate {
            Some(AnimateProp::Controls(controls)) => Some(controls.clone()),
            _ => None,
        };
        let id = {
            let mut guard = self.inner.state.borrow_mut();
            let state = &mut *guard;
            let options = props.projection_options();
            let id = state.visuals.create(kind, parent, props);
            if let Some(options) = options {
                attach_projection(state, id, options);
            }
            id
        };
        if let Some(controls) = controls {
            self.subscribe_controls(id, &controls);
        }
        tracing::trace!(?id, ?kind, "element created");
        id
    }

    fn subscribe_controls(&self, id: ElementId, controls: &AnimationControls) {
        let handler = Rc::new(ElementControls {
            engine: self.downgrade(),
            element: id,
        });
        let subscription = controls.subscribe(handler);
        let previous = {
            let mut state = self.inner.state.borrow_mut();
            match state.visuals.get_mut(id) {
                Some(element) => element.animation_state.controls.replace(subscription),
                None => Some(subscription),
            }
        };
        if let Some(previous) = previous {
            previous.unsubscribe();
        }
    }

    /// Attach the host instance
    ///
    /// Elements taking over an optimized appear animation start their
    /// `animate` target immediately; everyone else starts after the frame
    /// renders.
    pub fn mount(&self, id: ElementId, instance: InstanceId) {
        let surface = self.inner.surface.clone();
        let (animate, appear_id, needs_layout) = {
            let mut guard = self.inner.state.borrow_mut();
            let state = &mut *guard;
            if !state.visuals.mount(id, instance, surface.as_ref()) {
                return;
            }
            let Some(element) = state.visuals.get_mut(id) else {
                return;
            };
            let animate = element.animate_target().cloned();
            if animate.is_some() {
                element.animation_state.last_target = animate.clone();
                element.animation_state.start_pending = true;
            }
            let appear_id = element.props().optimized_appear_id.clone();
            let mut needs_layout = false;
            if let Some(node) = element.projection() {
                state.projection.set_instance(node, Some(instance));
                needs_layout = state
                    .projection
                    .get(node)
                    .is_some_and(|n| n.snapshot().is_some());
            }
            state.updated.insert(id);
            (animate, appear_id, needs_layout)
        };

        if let Some(definition) = animate {
            let sync = self
                .inner
                .handoff
                .as_ref()
                .is_some_and(|host| self.inner.handoff_state.wants_handoff(host.as_ref(), appear_id.as_deref()));
            if sync {
                self.start_from_props(id, definition);
            } else {
                let weak = self.downgrade();
                let mut definition = Some(definition);
                self.inner.batcher.post_render(move |_| {
                    if let (Some(engine), Some(definition)) = (Self::from_weak(&weak), definition.take()) {
                        engine.start_pending(id, definition);
                    }
                });
            }
        }
        if self.inner.handoff.is_some() {
            self.inner.handoff_state.schedule_complete(&self.inner.batcher);
        }
        if needs_layout {
            self.schedule_layout_pass();
        }
        self.ensure_loop();
    }

    fn start_from_props(&self, id: ElementId, definition: AnimationDefinition) {
        {
            let mut state = self.inner.state.borrow_mut();
            match state.visuals.get_mut(id) {
                Some(element) => {
                    element.animation_state.last_target = Some(definition.clone());
                    element.animation_state.start_pending = false;
                }
                None => return,
            }
        }
        if let Err(error) = self.animate(id, &definition) {
            tracing::warn!(?id, %error, "animate prop rejected");
        }
    }

    /// Start the target recorded at mount unless an update already started
    /// a newer one
    fn start_pending(&self, id: ElementId, definition: AnimationDefinition) {
        let pending = self
            .inner
            .state
            .borrow_mut()
            .visuals
            .get_mut(id)
            .is_some_and(|element| std::mem::take(&mut element.animation_state.start_pending));
        if pending {
            self.start_from_props(id, definition);
        }
    }

    /// Apply new props
    ///
    /// Style changes render on the next frame, a changed `animate` target
    /// starts animating (values dropped from it return to their base
    /// target), and projection options are merged. When the element stops
    /// being present its `exit` animation plays; the returned completion
    /// tells the host when it can remove the element.
    pub fn update(&self, id: ElementId, props: MotionProps, presence: PresenceContext) -> Option<Completion> {
        let new_controls = match &props.animate {
            Some(AnimateProp::Controls(controls)) => Some(controls.clone()),
            _ => None,
        };
        let weak = self.downgrade();
        let mut deferred = Deferred::new();
        let (run, exit, leaving, resubscribe, unsubscribe) = {
            let mut guard = self.inner.state.borrow_mut();
            let state = &mut *guard;
            let element = state.visuals.get_mut(id)?;

            let was_present = element.presence.is_present;
            element.presence = presence;

            for (name, value) in &props.style {
                let animating = state.by_value.contains_key(&(id, name.clone()));
                if !animating && element.props.style.get(name) != Some(value) {
                    element.set_value(name, value.clone());
                    state.updated.insert(id);
                }
            }

            // Values that lose their source fall back to `initial`, or are
            // dropped when there is nothing to fall back to
            let new_target = props.animate_target();
            let dropped: Vec<String> = element
                .props
                .style
                .keys()
                .filter(|name| {
                    !props.style.contains_key(*name)
                        && !new_target.is_some_and(|target| target.values.contains_key(*name))
                        && !state.by_value.contains_key(&(id, (*name).clone()))
                })
                .cloned()
                .collect();
            let mut removed: Vec<String> = Vec::new();
            for name in dropped {
                match get_base_target_from_props(&props, &name) {
                    Some(base) => element.set_value(&name, base),
                    None => removed.push(name),
                }
                state.updated.insert(id);
            }

            let old_controls = match &element.props.animate {
                Some(AnimateProp::Controls(controls)) => Some(controls.clone()),
                _ => None,
            };
            let same_controls = match (&old_controls, &new_controls) {
                (Some(old), Some(new)) => old.ptr_eq(new),
                (None, None) => true,
                _ => false,
            };
            let unsubscribe = if same_controls {
                None
            } else {
                element.animation_state.controls.take()
            };
            let resubscribe = if same_controls { None } else { new_controls };

            let mut run = None;
            if let Some(AnimateProp::Target(target)) = &props.animate {
                let last = element.animation_state.last_target.as_ref();
                if last != Some(target) {
                    let mut definition = target.clone();
                    if let Some(last) = last {
                        for name in last.values.keys() {
                            if target.values.contains_key(name) {
                                continue;
                            }
                            match get_base_target_from_props(&props, name) {
                                Some(base) => {
                                    definition.values.insert(name.clone(), ValueTarget::Single(base));
                                }
                                None if !removed.contains(name) => removed.push(name.clone()),
                                None => {}
                            }
                        }
                    }
                    element.animation_state.last_target = Some(target.clone());
                    element.animation_state.start_pending = false;
                    run = Some(definition);
                }
            }

            let leaving = was_present && !presence.is_present;
            let exit = if leaving { props.exit.clone() } else { None };
            let options = props.projection_options();
            let node = element.projection();
            element.props = props;

            match (node, options) {
                (Some(node), Some(options)) => {
                    state.projection.set_options(node, &options.into());
                }
                (Some(node), None) => {
                    state.projection.set_options(node, &ProjectionOptions::default().into());
                }
                (None, Some(options)) => attach_projection(state, id, options),
                (None, None) => {}
            }

            for name in removed {
                if let Some(animation_id) = state.by_value.get(&(id, name.clone())).copied() {
                    stop_animation(state, animation_id, false, &weak, &mut deferred);
                }
                if let Some(element) = state.visuals.get_mut(id) {
                    element.remove_value(&name);
                }
                state.updated.insert(id);
            }

            (run, exit, leaving, resubscribe, unsubscribe)
        };
        run_deferred(deferred);

        if let Some(subscription) = unsubscribe {
            subscription.unsubscribe();
        }
        if let Some(controls) = resubscribe {
            self.subscribe_controls(id, &controls);
        }
        if let Some(definition) = run {
            if let Err(error) = self.animate(id, &definition) {
                tracing::warn!(?id, %error, "animate prop rejected");
            }
        }
        self.ensure_loop();

        match exit {
            Some(exit) => Some(self.animate(id, &exit).unwrap_or_else(|error| {
                tracing::warn!(?id, %error, "exit animation rejected");
                Completion::resolved()
            })),
            None if leaving => Some(Completion::resolved()),
            None => None,
        }
    }

    /// Tear down an element and everything below it
    ///
    /// Running animations stop (their completions resolve), the projection
    /// node is released (handing its box to any shared `layout_id`
    /// successor) and `unmount` subscribers are notified.
    pub fn unmount(&self, id: ElementId) {
        let weak = self.downgrade();
        let mut deferred = Deferred::new();
        {
            let mut guard = self.inner.state.borrow_mut();
            let state = &mut *guard;
            for element_id in state.visuals.subtree_post_order(id) {
                stop_element_animations(state, element_id, false, &weak, &mut deferred);
                if let Some(element) = state.visuals.remove(element_id) {
                    release_element(state, element, &mut deferred);
                }
            }
        }
        run_deferred(deferred);
        tracing::trace!(?id, "element unmounted");
    }

    // ------------------------------------------------------------------------
    // Layout
    // ------------------------------------------------------------------------

    /// Snapshot every tracked element before the host changes layout
    pub fn will_update(&self) {
        let mut deferred = Deferred::new();
        {
            let mut guard = self.inner.state.borrow_mut();
            let state = &mut *guard;
            for element_id in state.node_owners.values() {
                if let Some(element) = state.visuals.get(*element_id) {
                    let events = element.events().clone();
                    deferred.push(Box::new(move || events.before_layout_measure.notify(&())));
                }
            }
            state.projection.will_update(self.inner.surface.as_ref());
        }
        run_deferred(deferred);
    }

    /// The host finished changing layout; measure it on the next read phase
    pub fn did_update(&self) {
        self.schedule_layout_pass();
    }

    fn schedule_layout_pass(&self) {
        if self
            .inner
            .layout_job
            .borrow()
            .as_ref()
            .is_some_and(FrameJob::is_scheduled)
        {
            return;
        }
        let weak = self.downgrade();
        let job = self.inner.batcher.read(move |_| {
            if let Some(engine) = Self::from_weak(&weak) {
                engine.layout_pass();
            }
        });
        *self.inner.layout_job.borrow_mut() = Some(job);
    }

    fn layout_pass(&self) {
        let mut deferred = Deferred::new();
        {
            let mut guard = self.inner.state.borrow_mut();
            let state = &mut *guard;
            let events = state.projection.update_layout(self.inner.surface.as_ref());
            tracing::debug!(events = events.len(), "layout pass");
            dispatch_projection_events(state, events, &mut deferred);
        }
        run_deferred(deferred);
        self.ensure_loop();
    }

    // ------------------------------------------------------------------------
    // Value animation
    // ------------------------------------------------------------------------

    /// Animate an element's values towards `definition`
    ///
    /// Every value is validated before anything starts; invalid transition
    /// options are returned as an error. The completion resolves once every
    /// value has finished, been stopped or been replaced. Unknown elements
    /// resolve immediately.
    pub fn animate(&self, id: ElementId, definition: &AnimationDefinition) -> Result<Completion> {
        let inner = &self.inner;
        let weak = self.downgrade();
        let mut deferred = Deferred::new();
        let all = {
            let mut guard = inner.state.borrow_mut();
            let state = &mut *guard;
            let Some(element) = state.visuals.get(id) else {
                return Ok(Completion::resolved());
            };
            let fallback = element
                .props()
                .transition
                .clone()
                .unwrap_or_else(|| inner.config.animation.transition.clone());
            let instance = element.instance();
            let events = element.events().clone();
            let handing_off = element
                .props()
                .optimized_appear_id
                .clone()
                .filter(|_| !inner.handoff_state.is_complete())
                .zip(inner.handoff.clone());

            let mut plans = Vec::with_capacity(definition.values.len());
            for (name, target) in &definition.values {
                let keyframes = resolve_keyframes(element, name, target);
                if keyframes.is_empty() {
                    continue;
                }
                let transition = definition.transition_for(name, &fallback).clone();
                transition.validate(keyframes.len())?;
                plans.push(ValuePlan {
                    name: name.clone(),
                    keyframes,
                    transition,
                });
            }

            let mut completions = Vec::with_capacity(plans.len());
            for plan in plans {
                let key = (id, plan.name.clone());
                let mut velocity = 0.0;
                if let Some(previous) = state.by_value.get(&key).copied() {
                    if let Some(Driver::Frame(driver)) = state.animations.get(previous).map(|a| &a.driver) {
                        velocity = driver.velocity();
                    }
                    stop_animation(state, previous, false, &weak, &mut deferred);
                }

                let (completion, resolver) = Completion::pending();
                completions.push(completion);

                let native = inner.native.clone().zip(instance).filter(|_| {
                    handing_off.is_none()
                        && (plan.transition.prefer_native || inner.config.animation.prefer_native)
                        && !is_transform_key(&plan.name)
                });
                let native_options = NativeOptions::from_transition(&plan.transition);

                if let (Some((host, instance)), Some(options)) = (native, native_options) {
                    match start_waapi_animation(host, instance, &plan.name, &plan.keyframes, &options) {
                        Ok(animation) => {
                            let finished = animation.finished();
                            let animation_id = state.animations.insert(ActiveAnimation {
                                element: id,
                                name: plan.name.clone(),
                                driver: Driver::Native(animation),
                                final_value: plan.keyframes.last().cloned(),
                                resolver,
                            });
                            state.by_value.insert(key, animation_id);
                            let weak = weak.clone();
                            finished.on_resolve(move || {
                                let Some(engine) = Self::from_weak(&weak) else {
                                    return;
                                };
                                let weak = engine.downgrade();
                                engine.inner.batcher.queue_microtask(move || {
                                    if let Some(engine) = Self::from_weak(&weak) {
                                        engine.finish_native(animation_id);
                                    }
                                });
                            });
                        }
                        Err(error) => {
                            tracing::warn!(value = %plan.name, %error, "native animation failed; value stops animating");
                            deferred.push(Box::new(move || resolver.resolve()));
                        }
                    }
                    continue;
                }

                let numbers: Option<Vec<f32>> = plan.keyframes.iter().map(Value::as_number).collect();
                let Some(numbers) = numbers else {
                    // Non-numeric values can't be interpolated here; jump to the end
                    if let (Some(element), Some(last)) = (state.visuals.get_mut(id), plan.keyframes.last()) {
                        element.set_value(&plan.name, last.clone());
                        state.updated.insert(id);
                    }
                    deferred.push(Box::new(move || resolver.resolve()));
                    continue;
                };

                let mut driver = match ValueAnimation::new(&numbers, &plan.transition, velocity) {
                    Ok(driver) => driver,
                    Err(error) => {
                        tracing::warn!(value = %plan.name, %error, "could not build value animation");
                        deferred.push(Box::new(move || resolver.resolve()));
                        continue;
                    }
                };
                if let Some((appear_id, host)) = &handing_off {
                    if let Some(elapsed) = host.handoff_animation(appear_id, &plan.name) {
                        tracing::debug!(value = %plan.name, elapsed_ms = elapsed, "took over optimized appear animation");
                        driver.skip(elapsed);
                    }
                }
                if let Some(element) = state.visuals.get_mut(id) {
                    element.set_value(&plan.name, Value::Number(driver.value()));
                    state.updated.insert(id);
                }
                let animation_id = state.animations.insert(ActiveAnimation {
                    element: id,
                    name: plan.name,
                    driver: Driver::Frame(driver),
                    final_value: None,
                    resolver,
                });
                state.by_value.insert(key, animation_id);
            }

            let all = Completion::all(completions);
            let started = definition.clone();
            deferred.push(Box::new({
                let all = all.clone();
                move || {
                    events.animation_start.notify(&started);
                    all.on_resolve(move || events.animation_complete.notify(&started));
                }
            }));
            all
        };
        run_deferred(deferred);
        self.ensure_loop();
        Ok(all)
    }

    fn finish_native(&self, animation_id: AnimationId) {
        let resolver = {
            let mut guard = self.inner.state.borrow_mut();
            let state = &mut *guard;
            if !matches!(state.animations.get(animation_id).map(|a| &a.driver), Some(Driver::Native(_))) {
                return;
            }
            let Some(animation) = state.animations.remove(animation_id) else {
                return;
            };
            state.by_value.remove(&(animation.element, animation.name.clone()));
            if let (Some(element), Some(value)) = (state.visuals.get_mut(animation.element), animation.final_value) {
                element.set_value(&animation.name, value);
                state.updated.insert(animation.element);
            }
            animation.resolver
        };
        resolver.resolve();
        self.ensure_loop();
    }

    fn commit_value(&self, id: ElementId, name: &str, value: Value) {
        {
            let mut guard = self.inner.state.borrow_mut();
            let state = &mut *guard;
            if state.by_value.contains_key(&(id, name.to_string())) {
                return;
            }
            if let Some(element) = state.visuals.get_mut(id) {
                element.set_value(name, value);
                state.updated.insert(id);
            }
        }
        self.ensure_loop();
    }

    /// Stop every running animation of an element where it is
    ///
    /// Native animations commit their displayed value. Completions resolve.
    pub fn stop(&self, id: ElementId) {
        let weak = self.downgrade();
        let mut deferred = Deferred::new();
        {
            let mut guard = self.inner.state.borrow_mut();
            let state = &mut *guard;
            let stopped = stop_element_animations(state, id, true, &weak, &mut deferred);
            self.cancel_optimized(state, id, stopped.iter().map(String::as_str), true);
        }
        run_deferred(deferred);
        self.ensure_loop();
    }

    /// Jump values to `definition`'s final values without animating
    pub fn set_values(&self, id: ElementId, definition: &AnimationDefinition) {
        let weak = self.downgrade();
        let mut deferred = Deferred::new();
        {
            let mut guard = self.inner.state.borrow_mut();
            let state = &mut *guard;
            if !state.visuals.contains(id) {
                return;
            }
            for (name, target) in &definition.values {
                if let Some(previous) = state.by_value.get(&(id, name.clone())).copied() {
                    stop_animation(state, previous, false, &weak, &mut deferred);
                }
                if let (Some(element), Some(value)) = (state.visuals.get_mut(id), target.final_value()) {
                    element.set_value(name, value.clone());
                    state.updated.insert(id);
                }
            }
            self.cancel_optimized(state, id, definition.values.keys().map(String::as_str), false);
        }
        run_deferred(deferred);
        self.ensure_loop();
    }

    fn cancel_optimized<'a>(
        &self,
        state: &EngineState,
        id: ElementId,
        names: impl Iterator<Item = &'a str>,
        can_resume: bool,
    ) {
        let Some(host) = &self.inner.handoff else {
            return;
        };
        if self.inner.handoff_state.is_complete() {
            return;
        }
        let Some(appear_id) = state
            .visuals
            .get(id)
            .and_then(|e| e.props().optimized_appear_id.as_deref())
        else {
            return;
        };
        for name in names {
            host.cancel_optimized_animation(appear_id, name, can_resume);
        }
    }

    // ------------------------------------------------------------------------
    // Frame loop
    // ------------------------------------------------------------------------

    fn ensure_loop(&self) {
        if self.inner.loop_jobs.borrow().is_some() {
            return;
        }
        let batcher = &self.inner.batcher;
        let job = |phase: Phase, run: fn(&MotionEngine, f32)| {
            let weak = self.downgrade();
            batcher.schedule(
                phase,
                move |frame| {
                    if let Some(engine) = Self::from_weak(&weak) {
                        run(&engine, frame.delta_ms);
                    }
                },
                true,
            )
        };
        let jobs = LoopJobs {
            update: job(Phase::Update, MotionEngine::step),
            pre_render: job(Phase::PreRender, |engine, _| engine.resolve_projection()),
            render: job(Phase::Render, |engine, _| engine.render_frame()),
        };
        *self.inner.loop_jobs.borrow_mut() = Some(jobs);
    }

    fn stop_loop(&self) {
        let jobs = self.inner.loop_jobs.borrow_mut().take();
        if let Some(jobs) = jobs {
            jobs.update.cancel();
            jobs.pre_render.cancel();
            jobs.render.cancel();
            tracing::trace!("frame loop idle");
        }
    }

    fn step(&self, dt_ms: f32) {
        let mut deferred = Deferred::new();
        {
            let mut guard = self.inner.state.borrow_mut();
            let state = &mut *guard;
            let mut finished = Vec::new();
            for (animation_id, animation) in state.animations.iter_mut() {
                let Driver::Frame(driver) = &mut animation.driver else {
                    continue;
                };
                let sample = driver.tick(dt_ms);
                if let Some(element) = state.visuals.get_mut(animation.element) {
                    element.set_value(&animation.name, Value::Number(sample.value));
                    state.updated.insert(animation.element);
                }
                if sample.done {
                    finished.push(animation_id);
                }
            }
            for animation_id in finished {
                if let Some(animation) = state.animations.remove(animation_id) {
                    state.by_value.remove(&(animation.element, animation.name));
                    let resolver = animation.resolver;
                    deferred.push(Box::new(move || resolver.resolve()));
                }
            }

            let events = state.projection.advance(dt_ms);
            dispatch_projection_events(state, events, &mut deferred);
        }
        run_deferred(deferred);
    }

    fn resolve_projection(&self) {
        self.inner.state.borrow_mut().projection.resolve_projection();
    }

    fn render_frame(&self) {
        let mut deferred = Deferred::new();
        {
            let mut guard = self.inner.state.borrow_mut();
            let state = &mut *guard;
            for node in state.projection.take_needs_render() {
                let owner = state.node_owners.get(&node).copied();
                if let Some(element) = owner.and_then(|e| state.visuals.get_mut(e)) {
                    element.needs_render = true;
                }
            }

            let surface = self.inner.surface.as_ref();
            let projection = &state.projection;
            let mut rendered = 0usize;
            for (_, element) in state.visuals.iter_mut() {
                if !element.needs_render {
                    continue;
                }
                let transform = element
                    .projection()
                    .and_then(|node| projection.projection_transform(node));
                element.render(surface, transform.as_ref());
                rendered += 1;
            }
            tracing::trace!(rendered, "render");

            for id in state.updated.drain() {
                if let Some(element) = state.visuals.get(id) {
                    let events = element.events().clone();
                    let latest = element.latest().clone();
                    deferred.push(Box::new(move || events.update.notify(&latest)));
                }
            }
        }
        run_deferred(deferred);
        if self.is_idle() {
            self.stop_loop();
        }
    }

    /// Whether nothing needs another frame
    pub fn is_idle(&self) -> bool {
        let state = self.inner.state.borrow();
        let frame_driven = state
            .animations
            .values()
            .any(|a| matches!(a.driver, Driver::Frame(_)));
        let dirty = state.visuals.ids().into_iter().any(|id| {
            state
                .visuals
                .get(id)
                .is_some_and(|e| e.needs_render && e.is_mounted())
        });
        !frame_driven && !dirty && !state.projection.is_animating()
    }

    /// Whether the keep-alive frame jobs are scheduled
    pub fn is_running(&self) -> bool {
        self.inner.loop_jobs.borrow().is_some()
    }

    /// Drop every element, node and animation and reopen the handoff window
    pub fn reset(&self) {
        self.stop_loop();
        if let Some(job) = self.inner.layout_job.borrow_mut().take() {
            job.cancel();
        }
        let weak = self.downgrade();
        let mut deferred = Deferred::new();
        {
            let mut guard = self.inner.state.borrow_mut();
            let state = &mut *guard;
            let animations: Vec<AnimationId> = state.animations.keys().collect();
            for animation_id in animations {
                stop_animation(state, animation_id, false, &weak, &mut deferred);
            }
            for element in state.visuals.clear() {
                release_element(state, element, &mut deferred);
            }
            state.projection.reset();
            state.node_owners.clear();
            state.updated.clear();
        }
        self.inner.handoff_state.reset();
        run_deferred(deferred);
        tracing::debug!("engine reset");
    }

    // ------------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------------

    pub fn get_value(&self, id: ElementId, name: &str) -> Option<Value> {
        self.inner
            .state
            .borrow()
            .visuals
            .get(id)
            .and_then(|e| e.get_value(name).cloned())
    }

    pub fn latest(&self, id: ElementId) -> Option<ResolvedValues> {
        self.inner.state.borrow().visuals.get(id).map(|e| e.latest().clone())
    }

    /// Lifecycle subscriber lists of an element
    pub fn events(&self, id: ElementId) -> Option<LifecycleEvents> {
        self.inner.state.borrow().visuals.get(id).map(|e| e.events().clone())
    }

    pub fn projection_node(&self, id: ElementId) -> Option<NodeId> {
        self.inner.state.borrow().visuals.get(id).and_then(VisualElement::projection)
    }

    pub fn is_animating(&self, id: ElementId, name: &str) -> bool {
        self.inner.state.borrow().by_value.contains_key(&(id, name.to_string()))
    }

    pub fn with_element<R>(&self, id: ElementId, f: impl FnOnce(&VisualElement) -> R) -> Option<R> {
        self.inner.state.borrow().visuals.get(id).map(f)
    }

    pub fn with_projection<R>(&self, f: impl FnOnce(&ProjectionTree) -> R) -> R {
        f(&self.inner.state.borrow().projection)
    }
}

impl fmt::Debug for MotionEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.borrow();
        f.debug_struct("MotionEngine")
            .field("elements", &state.visuals.len())
            .field("nodes", &state.projection.len())
            .field("animations", &state.animations.len())
            .field("running", &self.is_running())
            .finish()
    }
}

// ============================================================================
// State helpers
// ============================================================================

fn attach_projection(state: &mut EngineState, id: ElementId, options: ProjectionOptions) {
    let Some(element) = state.visuals.get(id) else {
        return;
    };
    let parent = if element.props().portal {
        None
    } else {
        state.visuals.get_closest_projecting_node(id)
    };
    let instance = element.instance();
    let node = state.projection.create_node(parent, instance, options);
    if let Some(element) = state.visuals.get_mut(id) {
        element.projection = Some(node);
    }
    state.node_owners.insert(node, id);
}

/// Keyframes for `target`, starting from the current value when only the
/// final value is given
fn resolve_keyframes(element: &VisualElement, name: &str, target: &ValueTarget) -> Vec<Value> {
    let frames = target.keyframes();
    if frames.len() > 1 {
        return frames.to_vec();
    }
    let Some(to) = frames.first() else {
        return Vec::new();
    };
    let from = element
        .get_value(name)
        .cloned()
        .or_else(|| get_base_target_from_props(element.props(), name));
    vec![from.unwrap_or_else(|| to.clone()), to.clone()]
}

fn stop_animation(
    state: &mut EngineState,
    animation_id: AnimationId,
    can_resume: bool,
    engine: &Weak<EngineInner>,
    deferred: &mut Deferred,
) -> Option<String> {
    let ActiveAnimation {
        element,
        name,
        driver,
        resolver,
        ..
    } = state.animations.remove(animation_id)?;
    state.by_value.remove(&(element, name.clone()));

    match driver {
        Driver::Frame(mut driver) => driver.stop(),
        Driver::Native(native) => {
            let engine = engine.clone();
            let value_name = name.clone();
            deferred.push(Box::new(move || {
                let committed = native.cancel(can_resume);
                if let (Some(value), Some(engine)) = (committed, MotionEngine::from_weak(&engine)) {
                    engine.commit_value(element, &value_name, value);
                }
            }));
        }
    }
    deferred.push(Box::new(move || resolver.resolve()));
    Some(name)
}

fn stop_element_animations(
    state: &mut EngineState,
    id: ElementId,
    can_resume: bool,
    engine: &Weak<EngineInner>,
    deferred: &mut Deferred,
) -> Vec<String> {
    let animations: Vec<AnimationId> = state
        .animations
        .iter()
        .filter(|(_, a)| a.element == id)
        .map(|(animation_id, _)| animation_id)
        .collect();
    animations
        .into_iter()
        .filter_map(|animation_id| stop_animation(state, animation_id, can_resume, engine, deferred))
        .collect()
}

fn release_element(state: &mut EngineState, mut element: VisualElement, deferred: &mut Deferred) {
    if let Some(node) = element.projection() {
        state.projection.remove(node);
        state.node_owners.remove(&node);
    }
    if let Some(subscription) = element.animation_state.controls.take() {
        deferred.push(Box::new(move || subscription.unsubscribe()));
    }
    let events = element.events().clone();
    deferred.push(Box::new(move || {
        events.unmount.notify(&());
        events.clear();
    }));
}

fn dispatch_projection_events(state: &EngineState, events: Vec<ProjectionEvent>, deferred: &mut Deferred) {
    for event in events {
        let node = match &event {
            ProjectionEvent::LayoutMeasure { node, .. }
            | ProjectionEvent::LayoutUpdate { node, .. }
            | ProjectionEvent::LayoutAnimationStart(node)
            | ProjectionEvent::LayoutAnimationComplete(node) => *node,
        };
        let Some(element) = state.node_owners.get(&node).and_then(|e| state.visuals.get(*e)) else {
            continue;
        };
        let lists = element.events().clone();
        deferred.push(Box::new(move || match event {
            ProjectionEvent::LayoutMeasure { layout, prev, .. } => {
                lists.layout_measure.notify(&MeasureEvent { layout, prev })
            }
            ProjectionEvent::LayoutUpdate { delta, has_changed, .. } => lists
                .layout_update
                .notify(&LayoutUpdateEvent { delta, has_changed }),
            ProjectionEvent::LayoutAnimationStart(_) => lists.layout_animation_start.notify(&()),
            ProjectionEvent::LayoutAnimationComplete(_) => lists.layout_animation_complete.notify(&()),
        }));
    }
}

// ============================================================================
// Controls
// ============================================================================

/// Routes controls broadcasts to one element
struct ElementControls {
    engine: Weak<EngineInner>,
    element: ElementId,
}

impl ControlsHandler for ElementControls {
    fn start(&self, definition: &AnimationDefinition) -> Completion {
        let Some(engine) = MotionEngine::from_weak(&self.engine) else {
            return Completion::resolved();
        };
        engine.animate(self.element, definition).unwrap_or_else(|error| {
            tracing::warn!(element = ?self.element, %error, "controls start rejected");
            Completion::resolved()
        })
    }

    fn stop(&self) {
        if let Some(engine) = MotionEngine::from_weak(&self.engine) {
            engine.stop(self.element);
        }
    }

    fn set(&self, definition: &AnimationDefinition) {
        if let Some(engine) = MotionEngine::from_weak(&self.engine) {
            engine.set_values(self.element, definition);
        }
    }
}
