//! Projection tree
//!
//! Arena of [`ProjectionNode`]s hanging off a single root. A layout change is
//! animated in two passes that never share a frame phase:
//!
//! 1. [`ProjectionTree::will_update`] snapshots every tracked node where it
//!    currently appears, before the host mutates its tree.
//! 2. [`ProjectionTree::update_layout`] (read phase of the next frame) measures
//!    the new layout top-down, resolves snapshot → target deltas and starts
//!    animations for the nodes that moved.
//!
//! Every later frame, [`ProjectionTree::advance`] steps the animations
//! and [`ProjectionTree::resolve_projection`] recomputes each node's
//! correction, mapping the desired box through the inverse of its ancestors'
//! corrections so children are not stretched by animating parents.

use rustc_hash::FxHashMap;
use slotmap::SlotMap;
use smallvec::SmallVec;

use glide_animation::animation::ValueAnimation;
use glide_core::geometry::{BoxDelta, LayoutBox, Point};
use glide_core::surface::{InstanceId, Surface};

use crate::config::LayoutConfig;
use crate::node::{
    LayoutAnimation, MeasuredLayout, NodeId, ProjectionNode, ProjectionOptions,
    ProjectionOptionsUpdate, PROGRESS_SCALE,
};
use crate::scroll::measure_scroll_offset;
use crate::transform::ProjectionTransform;

/// Something that happened to a node during a tree operation
#[derive(Clone, Debug, PartialEq)]
pub enum ProjectionEvent {
    /// The node was measured; `prev` is the previous document box
    LayoutMeasure {
        node: NodeId,
        layout: LayoutBox,
        prev: Option<LayoutBox>,
    },
    /// A snapshot was resolved against the new layout
    LayoutUpdate {
        node: NodeId,
        delta: BoxDelta,
        has_changed: bool,
    },
    LayoutAnimationStart(NodeId),
    LayoutAnimationComplete(NodeId),
}

/// Nodes sharing one `layout_id`
#[derive(Debug, Default)]
struct SharedLayout {
    members: SmallVec<[NodeId; 2]>,
    lead: Option<NodeId>,
    /// Box left behind by the last lead to be removed
    last_box: Option<LayoutBox>,
}

#[derive(Clone, Copy)]
struct MeasureContext {
    scroll: Point,
    document: LayoutBox,
}

/// The projection node arena
#[derive(Debug, Default)]
pub struct ProjectionTree {
    nodes: SlotMap<NodeId, ProjectionNode>,
    root: Option<NodeId>,
    shared: FxHashMap<String, SharedLayout>,
    config: LayoutConfig,
}

impl ProjectionTree {
    pub fn new(config: LayoutConfig) -> Self {
        Self {
            config,
            ..Default::default()
        }
    }

    pub fn config(&self) -> &LayoutConfig {
        &self.config
    }

    pub fn set_config(&mut self, config: LayoutConfig) {
        self.config = config;
    }

    // ========================================================================
    // Structure
    // ========================================================================

    /// The document root node, created on first use
    pub fn root(&mut self) -> NodeId {
        if let Some(root) = self.root.filter(|r| self.nodes.contains_key(*r)) {
            return root;
        }
        let options = ProjectionOptions {
            layout_scroll: true,
            ..Default::default()
        };
        let mut node = ProjectionNode::new(None, None, options);
        node.is_root = true;
        node.layout = Some(MeasuredLayout::default());
        let root = self.nodes.insert(node);
        self.root = Some(root);
        tracing::trace!(?root, "projection root created");
        root
    }

    pub fn root_id(&self) -> Option<NodeId> {
        self.root
    }

    /// Add a node under `parent` (the root when `None` or stale)
    pub fn create_node(
        &mut self,
        parent: Option<NodeId>,
        instance: Option<InstanceId>,
        options: ProjectionOptions,
    ) -> NodeId {
        let root = self.root();
        let parent = parent.filter(|p| self.nodes.contains_key(*p)).unwrap_or(root);
        let id = self.nodes.insert(ProjectionNode::new(Some(parent), instance, options));
        if let Some(parent) = self.nodes.get_mut(parent) {
            parent.children.push(id);
        }
        self.register_shared(id);
        id
    }

    pub fn get(&self, id: NodeId) -> Option<&ProjectionNode> {
        self.nodes.get(id)
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains_key(id)
    }

    /// Number of nodes, root included
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn set_instance(&mut self, id: NodeId, instance: Option<InstanceId>) {
        if let Some(node) = self.nodes.get_mut(id) {
            node.instance = instance;
        }
    }

    /// Merge `update` into the node's options
    ///
    /// Changing `layout_id` moves the node between shared groups.
    pub fn set_options(&mut self, id: NodeId, update: &ProjectionOptionsUpdate) -> bool {
        let Some(node) = self.nodes.get_mut(id) else {
            return false;
        };
        let old_id = node.options.layout_id.clone();
        let changed = node.options.merge(update);
        let new_id = node.options.layout_id.clone();

        if old_id != new_id {
            if let Some(old_id) = old_id {
                self.unregister_shared(id, &old_id);
            }
            self.register_shared(id);
        }
        changed
    }

    /// Move a node under another parent (the root when `None`)
    pub fn reparent(&mut self, id: NodeId, parent: Option<NodeId>) {
        if !self.nodes.contains_key(id) || self.root == Some(id) {
            return;
        }
        let root = self.root();
        let parent = parent
            .filter(|p| *p != id && self.nodes.contains_key(*p))
            .unwrap_or(root);
        let old = self.nodes.get(id).and_then(|n| n.parent);
        if old == Some(parent) {
            return;
        }
        if let Some(old) = old.and_then(|o| self.nodes.get_mut(o)) {
            old.children.retain(|c| *c != id);
        }
        if let Some(node) = self.nodes.get_mut(id) {
            node.parent = Some(parent);
        }
        if let Some(parent) = self.nodes.get_mut(parent) {
            parent.children.push(id);
        }
    }

    /// Remove a node; its children move up to its parent
    ///
    /// Removing the root resets the whole tree.
    pub fn remove(&mut self, id: NodeId) -> bool {
        if self.root == Some(id) {
            self.reset();
            return true;
        }
        if let Some(layout_id) = self.nodes.get(id).and_then(|n| n.options.layout_id.clone()) {
            self.unregister_shared(id, &layout_id);
        }
        let Some(node) = self.nodes.remove(id) else {
            return false;
        };

        let new_parent = node
            .parent
            .filter(|p| self.nodes.contains_key(*p))
            .or(self.root);
        if let Some(parent) = node.parent.and_then(|p| self.nodes.get_mut(p)) {
            parent.children.retain(|c| *c != id);
        }
        for child in &node.children {
            if let Some(child) = self.nodes.get_mut(*child) {
                child.parent = new_parent;
            }
        }
        if let Some(parent) = new_parent.and_then(|p| self.nodes.get_mut(p)) {
            parent.children.extend(node.children.iter().copied());
        }
        tracing::trace!(?id, "projection node removed");
        true
    }

    /// Drop every node, the root and all shared-layout state
    pub fn reset(&mut self) {
        self.nodes.clear();
        self.shared.clear();
        self.root = None;
    }

    /// Nodes in pre-order, parents before children
    pub fn top_down(&self) -> Vec<NodeId> {
        let mut order = Vec::with_capacity(self.nodes.len());
        let Some(root) = self.root else {
            return order;
        };
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            if let Some(node) = self.nodes.get(id) {
                order.push(id);
                stack.extend(node.children.iter().rev().copied());
            }
        }
        order
    }

    // ========================================================================
    // Shared layout
    // ========================================================================

    fn register_shared(&mut self, id: NodeId) {
        let Some(node) = self.nodes.get(id) else {
            return;
        };
        let Some(layout_id) = node.options.layout_id.clone() else {
            return;
        };
        let promote = node.options.initial_promotion;

        let entry = self.shared.entry(layout_id.clone()).or_default();
        let lead = entry.lead.filter(|l| *l != id && self.nodes.contains_key(*l));
        entry.members.push(id);

        let snapshot = match lead {
            Some(lead) if promote => {
                entry.lead = Some(id);
                self.nodes
                    .get(lead)
                    .and_then(|n| n.snapshot.or_else(|| n.projected_box()))
            }
            Some(_) => None,
            None => {
                entry.lead = Some(id);
                entry.last_box.take()
            }
        };

        if let Some(snapshot) = snapshot {
            tracing::debug!(layout_id = %layout_id, ?id, "shared layout handoff");
            if let Some(node) = self.nodes.get_mut(id) {
                node.snapshot = Some(snapshot);
            }
        }
    }

    fn unregister_shared(&mut self, id: NodeId, layout_id: &str) {
        let handoff = self
            .nodes
            .get(id)
            .and_then(|n| n.projected_box().or(n.snapshot));
        let Some(entry) = self.shared.get_mut(layout_id) else {
            return;
        };
        entry.members.retain(|m| *m != id);
        if entry.lead == Some(id) {
            entry.lead = entry.members.last().copied();
            match entry.lead.and_then(|lead| self.nodes.get_mut(lead)) {
                Some(next) => next.snapshot = handoff.or(next.snapshot),
                None => entry.last_box = handoff,
            }
        }
        if entry.members.is_empty() && entry.last_box.is_none() {
            self.shared.remove(layout_id);
        }
    }

    /// Current lead of a shared layout group
    pub fn lead(&self, layout_id: &str) -> Option<NodeId> {
        self.shared.get(layout_id).and_then(|s| s.lead)
    }

    // ========================================================================
    // Measurement
    // ========================================================================

    /// Write `none` to every node's transform so boxes measure untransformed
    pub fn reset_transforms(&mut self, surface: &dyn Surface) {
        for node in self.nodes.values_mut() {
            if let Some(instance) = node.instance {
                surface.set_transform(instance, "none");
                node.needs_render = true;
            }
        }
    }

    /// Measure every tracked node in one top-down pass
    ///
    /// Document boxes add back the scroll of every `layout_scroll` ancestor
    /// (the root tracks the document scroll), so they don't change while
    /// scrolling. Measuring twice without a surface change yields the same
    /// boxes.
    pub fn measure(&mut self, surface: &dyn Surface) -> Vec<ProjectionEvent> {
        let mut events = Vec::new();
        let Some(root) = self.root else {
            return events;
        };

        let mut stack = vec![(
            root,
            MeasureContext {
                scroll: Point::ZERO,
                document: LayoutBox::default(),
            },
        )];
        while let Some((id, ctx)) = stack.pop() {
            let Some(node) = self.nodes.get_mut(id) else {
                continue;
            };
            let mut child_ctx = ctx;

            if node.is_root {
                let scroll = measure_scroll_offset(surface, None);
                node.scroll = Some(scroll);
                child_ctx.scroll = scroll;
            } else if let Some(instance) = node.instance.filter(|_| node.options.tracks_layout()) {
                if let Some(viewport) = surface.bounding_box(instance) {
                    let document = viewport.translate(ctx.scroll.x, ctx.scroll.y);
                    let layout = MeasuredLayout {
                        local: document.to_local(&ctx.document),
                        document,
                    };
                    let prev = node.layout.replace(layout).map(|l| l.document);
                    events.push(ProjectionEvent::LayoutMeasure {
                        node: id,
                        layout: document,
                        prev,
                    });
                    child_ctx.document = document;
                }
                if node.options.layout_scroll {
                    let scroll = measure_scroll_offset(surface, Some(instance));
                    node.scroll = Some(scroll);
                    child_ctx.scroll = Point::new(ctx.scroll.x + scroll.x, ctx.scroll.y + scroll.y);
                } else {
                    node.scroll = None;
                }
            } else if let Some(layout) = node.layout {
                child_ctx.document = layout.document;
            }

            stack.extend(node.children.iter().rev().map(|c| (*c, child_ctx)));
        }
        events
    }

    /// Record where every tracked node appears before the host changes
    ///
    /// Existing snapshots (including ones handed over through a shared
    /// `layout_id`) are kept until the next [`update_layout`](Self::update_layout).
    pub fn will_update(&mut self, surface: &dyn Surface) {
        self.reset_transforms(surface);
        self.measure(surface);
        let mut count = 0usize;
        for node in self.nodes.values_mut() {
            if node.is_root || node.snapshot.is_some() || !node.options.tracks_layout() {
                continue;
            }
            // Displayed box: the untransformed layout under every active correction
            node.snapshot = node.projected_box();
            count += usize::from(node.snapshot.is_some());
        }
        tracing::trace!(nodes = count, "layout snapshot");
    }

    /// Measure the new layout and start animations for nodes that moved
    pub fn update_layout(&mut self, surface: &dyn Surface) -> Vec<ProjectionEvent> {
        self.reset_transforms(surface);
        let mut events = self.measure(surface);

        // Accumulated movement of `layout_root` ancestors
        let mut shifts: FxHashMap<NodeId, Point> = FxHashMap::default();
        for id in self.top_down() {
            let parent_shift = self
                .nodes
                .get(id)
                .and_then(|n| n.parent)
                .and_then(|p| shifts.get(&p).copied())
                .unwrap_or(Point::ZERO);
            let mut shift = parent_shift;

            let Some(node) = self.nodes.get_mut(id) else {
                continue;
            };
            let snapshot = node.snapshot.take();
            if let (Some(snapshot), Some(layout)) = (snapshot, node.layout) {
                let target = layout.document;
                let snapshot = snapshot.translate(parent_shift.x, parent_shift.y);
                if node.options.layout_root {
                    shift = Point::new(
                        parent_shift.x + target.x.min - snapshot.x.min,
                        parent_shift.y + target.y.min - snapshot.y.min,
                    );
                }

                let source = node.options.animation_type().adjust_snapshot(&snapshot, &target);
                let delta = BoxDelta::between(&source, &target);
                let has_changed = exceeds_threshold(&source, &target, self.config.threshold_px);
                node.layout_delta = Some(delta);
                events.push(ProjectionEvent::LayoutUpdate {
                    node: id,
                    delta,
                    has_changed,
                });

                if has_changed && node.options.animates_layout() {
                    events.extend(self.start_animation(id, source));
                } else if node.animation.take().is_some() {
                    events.push(ProjectionEvent::LayoutAnimationComplete(id));
                }
            }
            shifts.insert(id, shift);
        }

        self.resolve_projection();
        events
    }

    // ========================================================================
    // Animation
    // ========================================================================

    /// Animate the node from `from` to its current target
    ///
    /// An interrupted animation is replaced; the caller passes the displayed
    /// box so motion stays continuous.
    pub fn start_animation(&mut self, id: NodeId, from: LayoutBox) -> Option<ProjectionEvent> {
        let node = self.nodes.get_mut(id)?;
        let to = node.layout?.document;
        let transition = node
            .options
            .transition
            .as_ref()
            .unwrap_or(&self.config.transition);

        match ValueAnimation::new(&[0.0, PROGRESS_SCALE], transition, 0.0) {
            Ok(driver) => {
                node.animation = Some(LayoutAnimation {
                    driver,
                    from,
                    to,
                    fresh: true,
                });
                node.needs_render = true;
                tracing::debug!(?id, ?from, ?to, "layout animation start");
                Some(ProjectionEvent::LayoutAnimationStart(id))
            }
            Err(error) => {
                tracing::warn!(?id, %error, "invalid layout transition; jumping to new layout");
                node.animation = None;
                None
            }
        }
    }

    /// Step every layout animation by `dt_ms` and recompute corrections
    ///
    /// Animations started since the last call are not stepped, so their
    /// first painted frame shows the snapshot box.
    pub fn advance(&mut self, dt_ms: f32) -> Vec<ProjectionEvent> {
        let mut events = Vec::new();
        for (id, node) in self.nodes.iter_mut() {
            let Some(animation) = node.animation.as_mut() else {
                continue;
            };
            if std::mem::take(&mut animation.fresh) {
                node.needs_render = true;
                continue;
            }
            let sample = animation.driver.tick(dt_ms);
            node.needs_render = true;
            if sample.done {
                node.animation = None;
                tracing::debug!(?id, "layout animation complete");
                events.push(ProjectionEvent::LayoutAnimationComplete(id));
            }
        }
        self.resolve_projection();
        events
    }

    /// Stop a node's layout animation where it is
    pub fn stop_animation(&mut self, id: NodeId) -> Option<ProjectionEvent> {
        let node = self.nodes.get_mut(id)?;
        node.animation.take()?;
        node.needs_render = true;
        Some(ProjectionEvent::LayoutAnimationComplete(id))
    }

    pub fn is_animating(&self) -> bool {
        self.nodes.values().any(|n| n.animation.is_some())
    }

    /// Recompute every node's correction top-down
    pub fn resolve_projection(&mut self) {
        for id in self.top_down() {
            let parent_delta = self
                .nodes
                .get(id)
                .and_then(|n| n.parent)
                .and_then(|p| self.nodes.get(p))
                .map(|p| p.tree_delta)
                .unwrap_or(BoxDelta::IDENTITY);
            let Some(node) = self.nodes.get_mut(id) else {
                continue;
            };

            let delta = match (&node.animation, node.layout) {
                (Some(animation), Some(layout)) => BoxDelta::between(
                    &layout.document,
                    &parent_delta.invert().apply(&animation.visual_box()),
                ),
                (None, Some(layout))
                    if node.options.animates_layout() && !parent_delta.is_identity() =>
                {
                    // Undo the ancestors' correction so the node keeps its layout
                    BoxDelta::between(&layout.document, &parent_delta.invert().apply(&layout.document))
                }
                _ => BoxDelta::IDENTITY,
            };

            if delta != node.projection_delta {
                node.needs_render = true;
            }
            node.projection_delta = delta;
            node.tree_scale = Point::new(parent_delta.x.scale, parent_delta.y.scale);
            node.tree_delta = parent_delta.compose(&delta);
        }
    }

    // ========================================================================
    // Rendering
    // ========================================================================

    /// The node's correction as a centre-origin transform
    pub fn projection_transform(&self, id: NodeId) -> Option<ProjectionTransform> {
        let node = self.nodes.get(id)?;
        let layout = node.layout?;
        ProjectionTransform::from_delta(&node.projection_delta, &layout.document)
    }

    /// Nodes whose transform changed since the last call
    pub fn take_needs_render(&mut self) -> Vec<NodeId> {
        self.nodes
            .iter_mut()
            .filter(|(_, n)| n.needs_render)
            .map(|(id, n)| {
                n.needs_render = false;
                id
            })
            .collect()
    }
}

/// Whether moving from `source` to `target` is worth animating
fn exceeds_threshold(source: &LayoutBox, target: &LayoutBox, threshold: f32) -> bool {
    (source.x.min - target.x.min).abs() > threshold
        || (source.y.min - target.y.min).abs() > threshold
        || (source.width() - target.width()).abs() > threshold
        || (source.height() - target.height()).abs() > threshold
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::LayoutAnimationType;
    use crate::surface::MemorySurface;
    use glide_animation::easing::Easing;
    use glide_animation::transition::Transition;

    const EPS: f32 = 1e-3;

    fn rect(x: f32, y: f32, w: f32, h: f32) -> LayoutBox {
        LayoutBox::from_rect(x, y, w, h)
    }

    fn linear_tree() -> ProjectionTree {
        ProjectionTree::new(LayoutConfig {
            threshold_px: 0.5,
            transition: Transition::tween(100.0, Easing::Linear),
        })
    }

    fn layout_options() -> ProjectionOptions {
        ProjectionOptions {
            layout: Some(LayoutAnimationType::Both),
            ..Default::default()
        }
    }

    #[test]
    fn test_root_is_created_once() {
        let mut tree = ProjectionTree::default();
        let root = tree.root();
        assert_eq!(tree.root(), root);
        assert!(tree.get(root).unwrap().options().layout_scroll);
        assert_eq!(tree.len(), 1);

        tree.reset();
        assert!(tree.is_empty());
        assert_ne!(tree.root(), root);
    }

    #[test]
    fn test_document_box_composes_local_boxes() {
        let surface = MemorySurface::new();
        let page = surface.create_root(rect(0.0, 0.0, 1000.0, 1000.0));
        let outer = surface.append(page, rect(20.0, 30.0, 400.0, 400.0));
        let inner = surface.append(outer, rect(50.0, 80.0, 100.0, 100.0));

        let mut tree = ProjectionTree::default();
        let parent = tree.create_node(None, Some(outer), layout_options());
        let child = tree.create_node(Some(parent), Some(inner), layout_options());
        tree.measure(&surface);

        let parent_doc = tree.get(parent).unwrap().layout().unwrap().document;
        let child_layout = *tree.get(child).unwrap().layout().unwrap();
        assert_eq!(child_layout.local, rect(30.0, 50.0, 100.0, 100.0));
        assert_eq!(child_layout.local.to_document(&parent_doc), child_layout.document);
    }

    #[test]
    fn test_measure_is_idempotent_and_scroll_independent() {
        let surface = MemorySurface::new();
        let page = surface.create_root(rect(0.0, 0.0, 1000.0, 3000.0));
        let list = surface.append(page, rect(0.0, 100.0, 300.0, 300.0));
        let item = surface.append(list, rect(0.0, 600.0, 300.0, 50.0));

        let mut tree = ProjectionTree::default();
        let list_node = tree.create_node(
            None,
            Some(list),
            ProjectionOptions {
                layout_scroll: true,
                ..Default::default()
            },
        );
        let item_node = tree.create_node(Some(list_node), Some(item), layout_options());

        tree.measure(&surface);
        let first = *tree.get(item_node).unwrap().layout().unwrap();
        tree.measure(&surface);
        assert_eq!(*tree.get(item_node).unwrap().layout().unwrap(), first);

        surface.set_scroll(list, 0.0, 250.0);
        surface.set_document_scroll(0.0, 40.0);
        tree.measure(&surface);
        assert_eq!(tree.get(item_node).unwrap().layout().unwrap().document, first.document);
        assert_eq!(tree.get(list_node).unwrap().scroll(), Some(Point::new(0.0, 250.0)));
    }

    #[test]
    fn test_flip_animation_runs_back_to_identity() {
        let surface = MemorySurface::new();
        let page = surface.create_root(rect(0.0, 0.0, 1000.0, 1000.0));
        let boxed = surface.append(page, rect(0.0, 0.0, 100.0, 100.0));

        let mut tree = linear_tree();
        let node = tree.create_node(None, Some(boxed), layout_options());
        tree.measure(&surface);

        tree.will_update(&surface);
        surface.set_layout(boxed, rect(50.0, 50.0, 200.0, 200.0));
        let events = tree.update_layout(&surface);
        assert!(events.contains(&ProjectionEvent::LayoutAnimationStart(node)));

        let n = tree.get(node).unwrap();
        let delta = n.layout_delta().unwrap();
        assert!((delta.x.scale - 2.0).abs() < EPS);
        assert!((delta.x.translate - 50.0).abs() < EPS);
        assert!(delta.compose(&n.projection_delta()).is_identity());

        // The frame that started the animation paints the snapshot box
        let events = tree.advance(16.0);
        assert!(events.is_empty());
        let first = tree.get(node).unwrap().projected_box().unwrap();
        assert!(first.approx_eq(&rect(0.0, 0.0, 100.0, 100.0), EPS));
        assert_eq!(tree.get(node).unwrap().animation_progress(), Some(0.0));

        let events = tree.advance(50.0);
        assert!(events.is_empty());
        let halfway = tree.get(node).unwrap().projected_box().unwrap();
        assert!(halfway.approx_eq(&rect(25.0, 25.0, 150.0, 150.0), EPS));

        let events = tree.advance(50.0);
        assert_eq!(events, vec![ProjectionEvent::LayoutAnimationComplete(node)]);
        assert!(tree.get(node).unwrap().projection_delta().is_identity());
        assert!(tree.projection_transform(node).is_none());
    }

    #[test]
    fn test_small_change_does_not_animate() {
        let surface = MemorySurface::new();
        let page = surface.create_root(rect(0.0, 0.0, 1000.0, 1000.0));
        let boxed = surface.append(page, rect(0.0, 0.0, 100.0, 100.0));

        let mut tree = linear_tree();
        let node = tree.create_node(None, Some(boxed), layout_options());
        tree.will_update(&surface);
        surface.set_layout(boxed, rect(0.2, 0.0, 100.0, 100.0));
        let events = tree.update_layout(&surface);

        assert!(events.iter().any(|e| matches!(
            e,
            ProjectionEvent::LayoutUpdate { has_changed: false, .. }
        )));
        assert!(!tree.get(node).unwrap().is_animating());
    }

    #[test]
    fn test_children_are_not_stretched_by_animating_parent() {
        let surface = MemorySurface::new();
        let page = surface.create_root(rect(0.0, 0.0, 1000.0, 1000.0));
        let parent_el = surface.append(page, rect(0.0, 0.0, 100.0, 100.0));
        let child_el = surface.append(parent_el, rect(0.0, 0.0, 50.0, 50.0));

        let mut tree = linear_tree();
        let parent = tree.create_node(None, Some(parent_el), layout_options());
        let child = tree.create_node(Some(parent), Some(child_el), layout_options());

        tree.will_update(&surface);
        surface.set_layout(parent_el, rect(0.0, 0.0, 200.0, 200.0));
        tree.update_layout(&surface);

        let child_node = tree.get(child).unwrap();
        assert!(!child_node.is_animating());
        assert!((child_node.projection_delta().x.scale - 2.0).abs() < EPS);
        assert!((child_node.tree_scale().x - 0.5).abs() < EPS);
        assert!(child_node
            .projected_box()
            .unwrap()
            .approx_eq(&rect(0.0, 0.0, 50.0, 50.0), EPS));
    }

    #[test]
    fn test_shared_layout_id_hands_over_target_box() {
        let surface = MemorySurface::new();
        let page = surface.create_root(rect(0.0, 0.0, 1000.0, 1000.0));
        let thumb = surface.append(page, rect(10.0, 10.0, 50.0, 50.0));
        let hero = surface.append(page, rect(0.0, 200.0, 500.0, 300.0));

        let shared = ProjectionOptions {
            layout_id: Some("photo".into()),
            ..Default::default()
        };
        let mut tree = linear_tree();
        let old = tree.create_node(None, Some(thumb), shared.clone());
        tree.measure(&surface);
        let old_target = tree.get(old).unwrap().target().unwrap();

        tree.remove(old);
        let new = tree.create_node(None, Some(hero), shared);
        assert_eq!(tree.lead("photo"), Some(new));
        assert_eq!(tree.get(new).unwrap().snapshot(), Some(old_target));

        let events = tree.update_layout(&surface);
        assert!(events.contains(&ProjectionEvent::LayoutAnimationStart(new)));
    }

    #[test]
    fn test_promotion_takes_mounted_lead_box() {
        let surface = MemorySurface::new();
        let page = surface.create_root(rect(0.0, 0.0, 1000.0, 1000.0));
        let a = surface.append(page, rect(10.0, 10.0, 50.0, 50.0));
        let b = surface.append(page, rect(300.0, 300.0, 80.0, 80.0));

        let shared = ProjectionOptions {
            layout_id: Some("tab".into()),
            ..Default::default()
        };
        let mut tree = linear_tree();
        let first = tree.create_node(None, Some(a), shared.clone());
        tree.measure(&surface);

        let second = tree.create_node(None, Some(b), shared.clone());
        assert_eq!(tree.lead("tab"), Some(second));
        assert_eq!(tree.get(second).unwrap().snapshot(), Some(rect(10.0, 10.0, 50.0, 50.0)));

        let follower = tree.create_node(
            None,
            Some(b),
            ProjectionOptions {
                initial_promotion: false,
                ..shared
            },
        );
        assert_eq!(tree.lead("tab"), Some(second));
        assert!(tree.get(follower).unwrap().snapshot().is_none());
        assert!(tree.contains(first));
    }

    #[test]
    fn test_remove_reparents_children() {
        let mut tree = ProjectionTree::default();
        let a = tree.create_node(None, None, layout_options());
        let b = tree.create_node(Some(a), None, layout_options());
        let c = tree.create_node(Some(b), None, layout_options());

        assert!(tree.remove(b));
        assert_eq!(tree.get(c).unwrap().parent(), Some(a));
        assert_eq!(tree.get(a).unwrap().children(), &[c]);
        assert!(!tree.remove(b));
    }

    #[test]
    fn test_layout_root_children_ignore_root_movement() {
        let surface = MemorySurface::new();
        let page = surface.create_root(rect(0.0, 0.0, 1000.0, 1000.0));
        let panel = surface.append(page, rect(0.0, 0.0, 400.0, 400.0));
        let item = surface.append(panel, rect(10.0, 10.0, 50.0, 50.0));

        let mut tree = linear_tree();
        let panel_node = tree.create_node(
            None,
            Some(panel),
            ProjectionOptions {
                layout_root: true,
                ..Default::default()
            },
        );
        let item_node = tree.create_node(Some(panel_node), Some(item), layout_options());

        tree.will_update(&surface);
        surface.set_layout(panel, rect(0.0, 100.0, 400.0, 400.0));
        surface.set_layout(item, rect(10.0, 110.0, 50.0, 50.0));
        tree.update_layout(&surface);

        assert!(!tree.get(item_node).unwrap().is_animating());
        assert!(!tree.get(panel_node).unwrap().is_animating());
    }
}
