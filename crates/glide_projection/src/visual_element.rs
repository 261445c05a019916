//! Visual elements
//!
//! One [`VisualElement`] per tracked host element: its props, latest resolved
//! values, optional projection node and lifecycle subscriber lists. Elements
//! live in a [`VisualTree`] arena; children are kept in document order.
//!
//! Rendering turns the latest values into a [`RenderState`] (transform,
//! styles, CSS variables and SVG attributes) and writes it to the surface.

use indexmap::IndexMap;
use slotmap::{new_key_type, SlotMap};
use smallvec::SmallVec;

use glide_animation::controls::AnimationControls;
use glide_animation::definition::AnimationDefinition;
use glide_animation::transition::Transition;
use glide_core::events::{SubscriberList, Subscription};
use glide_core::geometry::{BoxDelta, LayoutBox};
use glide_core::surface::{InstanceId, Surface};
use glide_core::value::{ResolvedValues, Value};

use crate::node::{LayoutAnimationType, NodeId, ProjectionOptions};
use crate::transform::{build_transform, is_transform_key, ProjectionTransform};

new_key_type! {
    /// Handle to a visual element
    pub struct ElementId;
}

/// Which surface conventions an element follows
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ElementKind {
    #[default]
    Html,
    /// Non-transform values are written as attributes
    Svg,
}

// ============================================================================
// Props
// ============================================================================

/// What an element animates towards
#[derive(Clone, Debug)]
pub enum AnimateProp {
    Target(AnimationDefinition),
    /// Driven imperatively through the controls
    Controls(AnimationControls),
}

/// Element configuration supplied by the host
#[derive(Clone, Debug)]
pub struct MotionProps {
    pub style: ResolvedValues,
    /// Values applied at mount instead of `style`
    pub initial: Option<ResolvedValues>,
    pub animate: Option<AnimateProp>,
    /// Played when the element stops being present
    pub exit: Option<AnimationDefinition>,
    /// Default transition for this element's value animations
    pub transition: Option<Transition>,
    pub layout: Option<LayoutAnimationType>,
    pub layout_id: Option<String>,
    pub layout_scroll: bool,
    pub layout_root: bool,
    pub layout_transition: Option<Transition>,
    pub always_measure_layout: bool,
    /// When false the element never gets a projection node
    pub allow_projection: bool,
    /// Project from the document root instead of the closest projecting ancestor
    pub portal: bool,
    /// Id of a host-started appear animation to take over
    pub optimized_appear_id: Option<String>,
}

impl Default for MotionProps {
    fn default() -> Self {
        Self {
            style: ResolvedValues::new(),
            initial: None,
            animate: None,
            exit: None,
            transition: None,
            layout: None,
            layout_id: None,
            layout_scroll: false,
            layout_root: false,
            layout_transition: None,
            always_measure_layout: false,
            allow_projection: true,
            portal: false,
            optimized_appear_id: None,
        }
    }
}

impl MotionProps {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_style(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.style.insert(name.into(), value.into());
        self
    }

    pub fn with_animate(mut self, definition: AnimationDefinition) -> Self {
        self.animate = Some(AnimateProp::Target(definition));
        self
    }

    pub fn with_controls(mut self, controls: &AnimationControls) -> Self {
        self.animate = Some(AnimateProp::Controls(controls.clone()));
        self
    }

    pub fn with_layout(mut self, layout: LayoutAnimationType) -> Self {
        self.layout = Some(layout);
        self
    }

    pub fn with_layout_id(mut self, layout_id: impl Into<String>) -> Self {
        self.layout_id = Some(layout_id.into());
        self
    }

    pub fn with_transition(mut self, transition: Transition) -> Self {
        self.transition = Some(transition);
        self
    }

    /// Projection options, or `None` if the element doesn't track layout
    pub fn projection_options(&self) -> Option<ProjectionOptions> {
        let wants = self.layout.is_some()
            || self.layout_id.is_some()
            || self.layout_scroll
            || self.layout_root
            || self.always_measure_layout;
        if !self.allow_projection || !wants {
            return None;
        }
        Some(ProjectionOptions {
            layout_id: self.layout_id.clone(),
            layout: self.layout.or(self.layout_id.as_ref().map(|_| LayoutAnimationType::Both)),
            always_measure_layout: self.always_measure_layout,
            layout_scroll: self.layout_scroll,
            layout_root: self.layout_root,
            transition: self.layout_transition.clone(),
            ..Default::default()
        })
    }

    pub(crate) fn animate_target(&self) -> Option<&AnimationDefinition> {
        match &self.animate {
            Some(AnimateProp::Target(definition)) => Some(definition),
            _ => None,
        }
    }
}

/// Value an element returns to when `key` leaves its animate target
pub fn get_base_target_from_props(props: &MotionProps, key: &str) -> Option<Value> {
    props
        .style
        .get(key)
        .or_else(|| props.initial.as_ref().and_then(|i| i.get(key)))
        .cloned()
}

/// Presence of the element in its host
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PresenceContext {
    pub is_present: bool,
}

impl Default for PresenceContext {
    fn default() -> Self {
        Self { is_present: true }
    }
}

// ============================================================================
// Lifecycle events
// ============================================================================

/// Payload of [`LifecycleEvents::layout_measure`]
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MeasureEvent {
    pub layout: LayoutBox,
    pub prev: Option<LayoutBox>,
}

/// Payload of [`LifecycleEvents::layout_update`]
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LayoutUpdateEvent {
    pub delta: BoxDelta,
    pub has_changed: bool,
}

/// Typed subscriber lists for everything that happens to an element
#[derive(Clone, Debug, Default)]
pub struct LifecycleEvents {
    pub before_layout_measure: SubscriberList<()>,
    pub layout_measure: SubscriberList<MeasureEvent>,
    pub layout_update: SubscriberList<LayoutUpdateEvent>,
    pub update: SubscriberList<ResolvedValues>,
    pub animation_start: SubscriberList<AnimationDefinition>,
    pub animation_complete: SubscriberList<AnimationDefinition>,
    pub layout_animation_start: SubscriberList<()>,
    pub layout_animation_complete: SubscriberList<()>,
    pub unmount: SubscriberList<()>,
}

impl LifecycleEvents {
    /// Drop every subscriber
    pub fn clear(&self) {
        self.before_layout_measure.clear();
        self.layout_measure.clear();
        self.layout_update.clear();
        self.update.clear();
        self.animation_start.clear();
        self.animation_complete.clear();
        self.layout_animation_start.clear();
        self.layout_animation_complete.clear();
        self.unmount.clear();
    }
}

// ============================================================================
// Render state
// ============================================================================

/// Everything written to the surface for one element
#[derive(Clone, Debug, PartialEq)]
pub struct RenderState {
    pub transform: String,
    pub transform_origin: Option<String>,
    pub style: IndexMap<String, String>,
    pub vars: IndexMap<String, String>,
    pub attrs: IndexMap<String, String>,
}

impl Default for RenderState {
    fn default() -> Self {
        Self {
            transform: "none".to_string(),
            transform_origin: None,
            style: IndexMap::new(),
            vars: IndexMap::new(),
            attrs: IndexMap::new(),
        }
    }
}

/// Style properties that take a length; numbers get `px`
const LENGTH_PROPERTIES: &[&str] = &[
    "width",
    "height",
    "minWidth",
    "minHeight",
    "maxWidth",
    "maxHeight",
    "top",
    "right",
    "bottom",
    "left",
    "margin",
    "marginTop",
    "marginRight",
    "marginBottom",
    "marginLeft",
    "padding",
    "paddingTop",
    "paddingRight",
    "paddingBottom",
    "paddingLeft",
    "borderRadius",
    "borderWidth",
    "fontSize",
    "gap",
];

fn style_value(name: &str, value: &Value) -> String {
    match value {
        Value::Number(n) if LENGTH_PROPERTIES.contains(&name) => format!("{}px", n),
        other => other.to_string(),
    }
}

/// Build what an element of `kind` with `values` should look like
pub fn build_render_state(
    kind: ElementKind,
    values: &ResolvedValues,
    projection: Option<&ProjectionTransform>,
) -> RenderState {
    let mut state = RenderState {
        transform: build_transform(values, projection),
        transform_origin: projection.map(|_| "50% 50% 0".to_string()),
        ..Default::default()
    };

    for (name, value) in values {
        if is_transform_key(name) {
            continue;
        }
        if name.starts_with("--") {
            state.vars.insert(name.clone(), value.to_string());
        } else if kind == ElementKind::Svg && name != "opacity" {
            state.attrs.insert(name.clone(), value.to_string());
        } else {
            state.style.insert(name.clone(), style_value(name, value));
        }
    }
    state
}

/// Drop `key` from every output of `state`
pub fn remove_value_from_render_state(key: &str, state: &mut RenderState) {
    state.style.shift_remove(key);
    state.vars.shift_remove(key);
    state.attrs.shift_remove(key);
}

// ============================================================================
// Element
// ============================================================================

#[derive(Default)]
pub(crate) struct AnimationState {
    /// Target of the last `animate` prop that was started
    pub last_target: Option<AnimationDefinition>,
    /// `last_target` was recorded at mount and waits for the first frame
    pub start_pending: bool,
    pub controls: Option<Subscription>,
}

/// A tracked host element
pub struct VisualElement {
    kind: ElementKind,
    parent: Option<ElementId>,
    children: SmallVec<[ElementId; 4]>,
    instance: Option<InstanceId>,
    pub(crate) props: MotionProps,
    pub(crate) presence: PresenceContext,
    pub(crate) latest: ResolvedValues,
    pub(crate) projection: Option<NodeId>,
    pub(crate) render_state: RenderState,
    pub(crate) animation_state: AnimationState,
    pub(crate) needs_render: bool,
    /// Values dropped since the last render
    removed: SmallVec<[String; 2]>,
    events: LifecycleEvents,
}

impl VisualElement {
    fn new(kind: ElementKind, parent: Option<ElementId>, props: MotionProps) -> Self {
        let latest = props.initial.clone().unwrap_or_else(|| props.style.clone());
        Self {
            kind,
            parent,
            children: SmallVec::new(),
            instance: None,
            props,
            presence: PresenceContext::default(),
            latest,
            projection: None,
            render_state: RenderState::default(),
            animation_state: AnimationState::default(),
            needs_render: true,
            removed: SmallVec::new(),
            events: LifecycleEvents::default(),
        }
    }

    pub fn kind(&self) -> ElementKind {
        self.kind
    }

    pub fn parent(&self) -> Option<ElementId> {
        self.parent
    }

    pub fn children(&self) -> &[ElementId] {
        &self.children
    }

    pub fn instance(&self) -> Option<InstanceId> {
        self.instance
    }

    pub fn is_mounted(&self) -> bool {
        self.instance.is_some()
    }

    pub fn props(&self) -> &MotionProps {
        &self.props
    }

    pub fn presence(&self) -> PresenceContext {
        self.presence
    }

    /// Latest resolved values
    pub fn latest(&self) -> &ResolvedValues {
        &self.latest
    }

    pub fn get_value(&self, name: &str) -> Option<&Value> {
        self.latest.get(name)
    }

    pub fn projection(&self) -> Option<NodeId> {
        self.projection
    }

    pub fn events(&self) -> &LifecycleEvents {
        &self.events
    }

    /// What was last written to the surface
    pub fn render_state(&self) -> &RenderState {
        &self.render_state
    }

    pub(crate) fn set_value(&mut self, name: &str, value: Value) {
        self.latest.insert(name.to_string(), value);
        self.needs_render = true;
    }

    /// Forget a value; the next render clears it from the surface
    pub(crate) fn remove_value(&mut self, name: &str) {
        if self.latest.shift_remove(name).is_some() {
            self.removed.push(name.to_string());
            self.needs_render = true;
        }
    }

    /// Current animate target from props, if it is a plain definition
    pub(crate) fn animate_target(&self) -> Option<&AnimationDefinition> {
        self.props.animate_target()
    }

    /// Write the latest values to the surface
    ///
    /// Everything is rewritten because a layout pass may have reset the
    /// transform behind the element's back.
    pub fn render(&mut self, surface: &dyn Surface, projection: Option<&ProjectionTransform>) {
        self.needs_render = false;
        let removed = std::mem::take(&mut self.removed);
        for name in &removed {
            remove_value_from_render_state(name, &mut self.render_state);
        }
        let Some(instance) = self.instance else {
            return;
        };
        for name in &removed {
            if !is_transform_key(name) {
                surface.remove_style(instance, name);
            }
        }
        let next = build_render_state(self.kind, &self.latest, projection);

        surface.set_transform(instance, &next.transform);
        match &next.transform_origin {
            Some(origin) => surface.set_style(instance, "transform-origin", origin),
            None if self.render_state.transform_origin.is_some() => {
                surface.remove_style(instance, "transform-origin")
            }
            None => {}
        }
        for (name, value) in next.style.iter().chain(next.vars.iter()) {
            surface.set_style(instance, name, value);
        }
        for (name, value) in &next.attrs {
            surface.set_attribute(instance, name, value);
        }
        for name in self
            .render_state
            .style
            .keys()
            .chain(self.render_state.vars.keys())
        {
            if !next.style.contains_key(name) && !next.vars.contains_key(name) {
                surface.remove_style(instance, name);
            }
        }

        self.render_state = next;
    }
}

// ============================================================================
// Tree
// ============================================================================

/// Arena of visual elements
#[derive(Default)]
pub struct VisualTree {
    elements: SlotMap<ElementId, VisualElement>,
}

impl VisualTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an element under `parent`
    pub fn create(&mut self, kind: ElementKind, parent: Option<ElementId>, props: MotionProps) -> ElementId {
        let parent = parent.filter(|p| self.elements.contains_key(*p));
        let id = self.elements.insert(VisualElement::new(kind, parent, props));
        if let Some(parent) = parent.and_then(|p| self.elements.get_mut(p)) {
            parent.children.push(id);
        }
        id
    }

    pub fn get(&self, id: ElementId) -> Option<&VisualElement> {
        self.elements.get(id)
    }

    pub fn get_mut(&mut self, id: ElementId) -> Option<&mut VisualElement> {
        self.elements.get_mut(id)
    }

    pub fn contains(&self, id: ElementId) -> bool {
        self.elements.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn ids(&self) -> Vec<ElementId> {
        self.elements.keys().collect()
    }

    pub fn get_props(&self, id: ElementId) -> Option<&MotionProps> {
        self.elements.get(id).map(|e| &e.props)
    }

    /// Attach the host instance and slot the element into document order
    pub fn mount(&mut self, id: ElementId, instance: InstanceId, surface: &dyn Surface) -> bool {
        let Some(element) = self.elements.get_mut(id) else {
            return false;
        };
        element.instance = Some(instance);
        element.needs_render = true;
        if let Some(parent) = element.parent {
            self.sort_instance_node_position(parent, surface);
        }
        true
    }

    /// Order `parent`'s children by document position; unmounted ones last
    pub fn sort_instance_node_position(&mut self, parent: ElementId, surface: &dyn Surface) {
        let Some(children) = self.elements.get(parent).map(|p| p.children.clone()) else {
            return;
        };
        let mut keyed: SmallVec<[(ElementId, Option<InstanceId>); 4]> = children
            .iter()
            .map(|c| (*c, self.elements.get(*c).and_then(|e| e.instance)))
            .collect();
        keyed.sort_by(|(_, a), (_, b)| match (a, b) {
            (Some(a), Some(b)) => surface.compare_document_position(*a, *b),
            (Some(_), None) => std::cmp::Ordering::Less,
            (None, Some(_)) => std::cmp::Ordering::Greater,
            (None, None) => std::cmp::Ordering::Equal,
        });
        if let Some(parent) = self.elements.get_mut(parent) {
            parent.children = keyed.into_iter().map(|(id, _)| id).collect();
        }
    }

    /// Closest ancestor's projection node
    pub fn get_closest_projecting_node(&self, id: ElementId) -> Option<NodeId> {
        let mut current = self.elements.get(id).and_then(|e| e.parent);
        while let Some(ancestor) = current.and_then(|a| self.elements.get(a)) {
            if ancestor.projection.is_some() {
                return ancestor.projection;
            }
            current = ancestor.parent;
        }
        None
    }

    /// Elements below `id` followed by `id`, children first
    pub fn subtree_post_order(&self, id: ElementId) -> Vec<ElementId> {
        let mut order = Vec::new();
        let mut stack = vec![(id, false)];
        while let Some((current, expanded)) = stack.pop() {
            let Some(element) = self.elements.get(current) else {
                continue;
            };
            if expanded {
                order.push(current);
            } else {
                stack.push((current, true));
                stack.extend(element.children.iter().rev().map(|c| (*c, false)));
            }
        }
        order
    }

    /// Detach and drop an element; its children lose their parent
    ///
    /// Subscribers stay registered so the caller can still deliver `unmount`.
    pub fn remove(&mut self, id: ElementId) -> Option<VisualElement> {
        let element = self.elements.remove(id)?;
        if let Some(parent) = element.parent.and_then(|p| self.elements.get_mut(p)) {
            parent.children.retain(|c| *c != id);
        }
        for child in &element.children {
            if let Some(child) = self.elements.get_mut(*child) {
                child.parent = None;
            }
        }
        Some(element)
    }

    /// Remove every element
    pub fn clear(&mut self) -> Vec<VisualElement> {
        self.elements.drain().map(|(_, element)| element).collect()
    }

    pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = (ElementId, &mut VisualElement)> {
        self.elements.iter_mut()
    }
}
