//! In-memory surface
//!
//! A DOM-like element tree held entirely in memory. Element boxes are given in
//! document coordinates and ignore transforms; viewport boxes subtract the
//! scroll of every ancestor and of the document (except inside fixed
//! elements). Writes are recorded so they can be inspected.
//!
//! Also acts as a native animation host (animations run until finished or
//! cancelled from the outside) and as a handoff host for optimized appear
//! animations.

use std::cell::RefCell;
use std::cmp::Ordering;

use indexmap::IndexMap;
use rustc_hash::FxHashMap;
use slotmap::{Key, SlotMap};
use smallvec::SmallVec;

use glide_animation::handoff::HandoffHost;
use glide_animation::waapi::{
    NativeAnimationHost, NativeAnimationId, NativeHandle, NativeKeyframes, NativeTiming,
};
use glide_core::completion::{Completion, Resolver};
use glide_core::error::{GlideError, Result};
use glide_core::geometry::{LayoutBox, Point};
use glide_core::surface::{InstanceId, Position, Surface};
use glide_core::value::Value;

#[derive(Debug, Default)]
struct MemoryNode {
    parent: Option<InstanceId>,
    children: Vec<InstanceId>,
    layout: LayoutBox,
    position: Position,
    scroll: Point,
    scroll_size: Option<(f32, f32)>,
    transform: String,
    styles: IndexMap<String, String>,
    attributes: IndexMap<String, String>,
}

struct NativeRecord {
    instance: InstanceId,
    keyframes: NativeKeyframes,
    timing: NativeTiming,
    resolver: Resolver,
}

#[derive(Default)]
struct MemoryInner {
    nodes: SlotMap<InstanceId, MemoryNode>,
    document_scroll: Point,
    native: SlotMap<NativeAnimationId, NativeRecord>,
    reject_native: bool,
    optimized: FxHashMap<(String, String), f32>,
    transform_writes: usize,
}

impl MemoryInner {
    fn ancestors(&self, instance: InstanceId) -> SmallVec<[InstanceId; 8]> {
        let mut chain = SmallVec::new();
        let mut current = self.nodes.get(instance).and_then(|n| n.parent);
        while let Some(id) = current {
            chain.push(id);
            current = self.nodes.get(id).and_then(|n| n.parent);
        }
        chain
    }

    /// Root-first path ending at `instance`
    fn path(&self, instance: InstanceId) -> SmallVec<[InstanceId; 8]> {
        let mut path = self.ancestors(instance);
        path.reverse();
        path.push(instance);
        path
    }

    fn detach(&mut self, instance: InstanceId) {
        let parent = self.nodes.get(instance).and_then(|n| n.parent);
        if let Some(parent) = parent.and_then(|p| self.nodes.get_mut(p)) {
            parent.children.retain(|c| *c != instance);
        }
        if let Some(node) = self.nodes.get_mut(instance) {
            node.parent = None;
        }
    }
}

/// In-memory element tree implementing every host contract
#[derive(Default)]
pub struct MemorySurface {
    inner: RefCell<MemoryInner>,
}

impl MemorySurface {
    pub fn new() -> Self {
        Self::default()
    }

    // ------------------------------------------------------------------
    // Tree building
    // ------------------------------------------------------------------

    /// Create a parentless element
    pub fn create_root(&self, layout: LayoutBox) -> InstanceId {
        self.inner.borrow_mut().nodes.insert(MemoryNode {
            layout,
            ..Default::default()
        })
    }

    /// Create an element as the last child of `parent`
    pub fn append(&self, parent: InstanceId, layout: LayoutBox) -> InstanceId {
        let index = self
            .inner
            .borrow()
            .nodes
            .get(parent)
            .map(|n| n.children.len())
            .unwrap_or(0);
        self.insert(parent, index, layout)
    }

    /// Create an element at `index` among `parent`'s children
    pub fn insert(&self, parent: InstanceId, index: usize, layout: LayoutBox) -> InstanceId {
        let mut inner = self.inner.borrow_mut();
        let id = inner.nodes.insert(MemoryNode {
            parent: Some(parent),
            layout,
            ..Default::default()
        });
        if let Some(parent) = inner.nodes.get_mut(parent) {
            let index = index.min(parent.children.len());
            parent.children.insert(index, id);
        }
        id
    }

    /// Move an element (with its subtree) under `parent` at `index`
    pub fn move_to(&self, instance: InstanceId, parent: InstanceId, index: usize) {
        let mut inner = self.inner.borrow_mut();
        inner.detach(instance);
        if let Some(node) = inner.nodes.get_mut(instance) {
            node.parent = Some(parent);
        }
        if let Some(parent) = inner.nodes.get_mut(parent) {
            let index = index.min(parent.children.len());
            parent.children.insert(index, instance);
        }
    }

    /// Remove an element and its subtree
    pub fn remove(&self, instance: InstanceId) {
        let mut inner = self.inner.borrow_mut();
        inner.detach(instance);
        let mut stack = vec![instance];
        while let Some(id) = stack.pop() {
            if let Some(node) = inner.nodes.remove(id) {
                stack.extend(node.children);
            }
        }
    }

    pub fn contains(&self, instance: InstanceId) -> bool {
        self.inner.borrow().nodes.contains_key(instance)
    }

    // ------------------------------------------------------------------
    // Geometry setters
    // ------------------------------------------------------------------

    /// Set the element's box in document coordinates
    pub fn set_layout(&self, instance: InstanceId, layout: LayoutBox) {
        if let Some(node) = self.inner.borrow_mut().nodes.get_mut(instance) {
            node.layout = layout;
        }
    }

    pub fn layout(&self, instance: InstanceId) -> Option<LayoutBox> {
        self.inner.borrow().nodes.get(instance).map(|n| n.layout)
    }

    pub fn set_position(&self, instance: InstanceId, position: Position) {
        if let Some(node) = self.inner.borrow_mut().nodes.get_mut(instance) {
            node.position = position;
        }
    }

    pub fn set_scroll(&self, instance: InstanceId, left: f32, top: f32) {
        if let Some(node) = self.inner.borrow_mut().nodes.get_mut(instance) {
            node.scroll = Point::new(left, top);
        }
    }

    /// Set the scrollable content size (defaults to the client size)
    pub fn set_scroll_size(&self, instance: InstanceId, width: f32, height: f32) {
        if let Some(node) = self.inner.borrow_mut().nodes.get_mut(instance) {
            node.scroll_size = Some((width, height));
        }
    }

    pub fn set_document_scroll(&self, left: f32, top: f32) {
        self.inner.borrow_mut().document_scroll = Point::new(left, top);
    }

    // ------------------------------------------------------------------
    // Inspecting writes
    // ------------------------------------------------------------------

    /// Last written transform, empty if never written
    pub fn transform(&self, instance: InstanceId) -> String {
        self.inner
            .borrow()
            .nodes
            .get(instance)
            .map(|n| n.transform.clone())
            .unwrap_or_default()
    }

    pub fn transform_writes(&self) -> usize {
        self.inner.borrow().transform_writes
    }

    pub fn style(&self, instance: InstanceId, name: &str) -> Option<String> {
        self.inner
            .borrow()
            .nodes
            .get(instance)
            .and_then(|n| n.styles.get(name).cloned())
    }

    pub fn attribute(&self, instance: InstanceId, name: &str) -> Option<String> {
        self.inner
            .borrow()
            .nodes
            .get(instance)
            .and_then(|n| n.attributes.get(name).cloned())
    }

    // ------------------------------------------------------------------
    // Native animations
    // ------------------------------------------------------------------

    /// Make subsequent native animation requests fail
    pub fn set_reject_native(&self, reject: bool) {
        self.inner.borrow_mut().reject_native = reject;
    }

    /// Running native animations
    pub fn native_animations(&self) -> Vec<NativeAnimationId> {
        self.inner.borrow().native.keys().collect()
    }

    pub fn native_animation(
        &self,
        id: NativeAnimationId,
    ) -> Option<(InstanceId, NativeKeyframes, NativeTiming)> {
        self.inner
            .borrow()
            .native
            .get(id)
            .map(|r| (r.instance, r.keyframes.clone(), r.timing.clone()))
    }

    /// Finish a native animation: its last keyframe is written as a style
    /// and its completion resolves
    pub fn finish_native(&self, id: NativeAnimationId) {
        let record = {
            let mut inner = self.inner.borrow_mut();
            let Some(record) = inner.native.remove(id) else {
                return;
            };
            if let Some(last) = record.keyframes.values.last() {
                let property = record.keyframes.property.clone();
                let value = last.to_string();
                if let Some(node) = inner.nodes.get_mut(record.instance) {
                    node.styles.insert(property, value);
                }
            }
            record
        };
        record.resolver.resolve();
    }

    // ------------------------------------------------------------------
    // Optimized appear animations
    // ------------------------------------------------------------------

    /// Pretend `value_name` of `appear_id` has been animating natively for
    /// `elapsed_ms`
    pub fn add_optimized_animation(&self, appear_id: &str, value_name: &str, elapsed_ms: f32) {
        self.inner
            .borrow_mut()
            .optimized
            .insert((appear_id.to_string(), value_name.to_string()), elapsed_ms);
    }

    fn with_node<R>(&self, instance: InstanceId, default: R, f: impl FnOnce(&MemoryNode) -> R) -> R {
        self.inner.borrow().nodes.get(instance).map(f).unwrap_or(default)
    }

    fn with_node_mut(&self, instance: InstanceId, f: impl FnOnce(&mut MemoryNode)) {
        if let Some(node) = self.inner.borrow_mut().nodes.get_mut(instance) {
            f(node);
        }
    }
}

impl Surface for MemorySurface {
    fn bounding_box(&self, instance: InstanceId) -> Option<LayoutBox> {
        let inner = self.inner.borrow();
        let node = inner.nodes.get(instance)?;
        let ancestors = inner.ancestors(instance);

        let mut scroll = Point::ZERO;
        let mut fixed = node.position == Position::Fixed;
        for id in &ancestors {
            if let Some(ancestor) = inner.nodes.get(*id) {
                scroll.x += ancestor.scroll.x;
                scroll.y += ancestor.scroll.y;
                fixed |= ancestor.position == Position::Fixed;
            }
        }
        if !fixed {
            scroll.x += inner.document_scroll.x;
            scroll.y += inner.document_scroll.y;
        }
        Some(node.layout.translate(-scroll.x, -scroll.y))
    }

    fn offset_left(&self, instance: InstanceId) -> f32 {
        let origin = self
            .offset_parent(instance)
            .and_then(|p| self.layout(p))
            .map(|l| l.x.min)
            .unwrap_or(0.0);
        self.with_node(instance, 0.0, |n| n.layout.x.min - origin)
    }

    fn offset_top(&self, instance: InstanceId) -> f32 {
        let origin = self
            .offset_parent(instance)
            .and_then(|p| self.layout(p))
            .map(|l| l.y.min)
            .unwrap_or(0.0);
        self.with_node(instance, 0.0, |n| n.layout.y.min - origin)
    }

    /// Nearest positioned ancestor, else the topmost ancestor
    fn offset_parent(&self, instance: InstanceId) -> Option<InstanceId> {
        let inner = self.inner.borrow();
        let ancestors = inner.ancestors(instance);
        ancestors
            .iter()
            .copied()
            .find(|id| {
                inner
                    .nodes
                    .get(*id)
                    .is_some_and(|n| n.position != Position::Static)
            })
            .or_else(|| ancestors.last().copied())
    }

    fn scroll_left(&self, instance: InstanceId) -> f32 {
        self.with_node(instance, 0.0, |n| n.scroll.x)
    }

    fn scroll_top(&self, instance: InstanceId) -> f32 {
        self.with_node(instance, 0.0, |n| n.scroll.y)
    }

    fn scroll_width(&self, instance: InstanceId) -> f32 {
        self.with_node(instance, 0.0, |n| {
            n.scroll_size.map(|(w, _)| w).unwrap_or_else(|| n.layout.width())
        })
    }

    fn scroll_height(&self, instance: InstanceId) -> f32 {
        self.with_node(instance, 0.0, |n| {
            n.scroll_size.map(|(_, h)| h).unwrap_or_else(|| n.layout.height())
        })
    }

    fn client_width(&self, instance: InstanceId) -> f32 {
        self.with_node(instance, 0.0, |n| n.layout.width())
    }

    fn client_height(&self, instance: InstanceId) -> f32 {
        self.with_node(instance, 0.0, |n| n.layout.height())
    }

    fn document_scroll(&self) -> Point {
        self.inner.borrow().document_scroll
    }

    fn position(&self, instance: InstanceId) -> Position {
        self.with_node(instance, Position::Static, |n| n.position)
    }

    fn compare_document_position(&self, a: InstanceId, b: InstanceId) -> Ordering {
        if a == b {
            return Ordering::Equal;
        }
        let inner = self.inner.borrow();
        let path_a = inner.path(a);
        let path_b = inner.path(b);

        let common = path_a
            .iter()
            .zip(path_b.iter())
            .take_while(|(x, y)| x == y)
            .count();

        if common == path_a.len() {
            // a is an ancestor of b
            return Ordering::Less;
        }
        if common == path_b.len() {
            return Ordering::Greater;
        }
        if common == 0 {
            return a.data().as_ffi().cmp(&b.data().as_ffi());
        }

        let parent = path_a[common - 1];
        let siblings = inner
            .nodes
            .get(parent)
            .map(|n| n.children.as_slice())
            .unwrap_or(&[]);
        let index = |id: InstanceId| siblings.iter().position(|c| *c == id);
        index(path_a[common]).cmp(&index(path_b[common]))
    }

    fn set_transform(&self, instance: InstanceId, transform: &str) {
        let mut inner = self.inner.borrow_mut();
        inner.transform_writes += 1;
        if let Some(node) = inner.nodes.get_mut(instance) {
            node.transform = transform.to_string();
        }
    }

    fn set_style(&self, instance: InstanceId, name: &str, value: &str) {
        self.with_node_mut(instance, |n| {
            n.styles.insert(name.to_string(), value.to_string());
        });
    }

    fn remove_style(&self, instance: InstanceId, name: &str) {
        self.with_node_mut(instance, |n| {
            n.styles.shift_remove(name);
        });
    }

    fn set_attribute(&self, instance: InstanceId, name: &str, value: &str) {
        self.with_node_mut(instance, |n| {
            n.attributes.insert(name.to_string(), value.to_string());
        });
    }
}

impl NativeAnimationHost for MemorySurface {
    fn animate(
        &self,
        instance: InstanceId,
        keyframes: &NativeKeyframes,
        timing: &NativeTiming,
    ) -> Result<NativeHandle> {
        let mut inner = self.inner.borrow_mut();
        if inner.reject_native {
            return Err(GlideError::NativeAnimation(format!(
                "host rejected animation of '{}'",
                keyframes.property
            )));
        }
        if !inner.nodes.contains_key(instance) {
            return Err(GlideError::NativeAnimation("element is detached".into()));
        }

        let (finished, resolver) = Completion::pending();
        let id = inner.native.insert(NativeRecord {
            instance,
            keyframes: keyframes.clone(),
            timing: timing.clone(),
            resolver,
        });
        Ok(NativeHandle { id, finished })
    }

    fn cancel(&self, id: NativeAnimationId, commit: bool) -> Option<Value> {
        let (record, displayed) = {
            let mut inner = self.inner.borrow_mut();
            let record = inner.native.remove(id)?;
            // No clock here, so the displayed value is whatever was last
            // committed, falling back to the first keyframe
            let displayed = inner
                .nodes
                .get(record.instance)
                .and_then(|n| n.styles.get(&record.keyframes.property).cloned())
                .map(|s| s.parse::<f32>().map(Value::Number).unwrap_or(Value::Text(s)))
                .or_else(|| record.keyframes.values.first().cloned());
            (record, displayed)
        };
        record.resolver.resolve();
        if commit {
            displayed
        } else {
            None
        }
    }
}

impl HandoffHost for MemorySurface {
    fn has_optimized_animation(&self, appear_id: &str, value_name: Option<&str>) -> bool {
        self.inner
            .borrow()
            .optimized
            .keys()
            .any(|(id, value)| id == appear_id && value_name.map_or(true, |v| v == value))
    }

    fn handoff_animation(&self, appear_id: &str, value_name: &str) -> Option<f32> {
        self.inner
            .borrow_mut()
            .optimized
            .remove(&(appear_id.to_string(), value_name.to_string()))
    }

    fn cancel_optimized_animation(&self, appear_id: &str, value_name: &str, _can_resume: bool) {
        self.inner
            .borrow_mut()
            .optimized
            .remove(&(appear_id.to_string(), value_name.to_string()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rect(x: f32, y: f32, w: f32, h: f32) -> LayoutBox {
        LayoutBox::from_rect(x, y, w, h)
    }

    #[test]
    fn test_bounding_box_subtracts_scroll() {
        let surface = MemorySurface::new();
        let root = surface.create_root(rect(0.0, 0.0, 800.0, 2000.0));
        let list = surface.append(root, rect(0.0, 100.0, 300.0, 300.0));
        let item = surface.append(list, rect(0.0, 500.0, 300.0, 50.0));

        surface.set_scroll(list, 0.0, 200.0);
        surface.set_document_scroll(0.0, 50.0);

        assert_eq!(surface.bounding_box(list), Some(rect(0.0, 50.0, 300.0, 300.0)));
        assert_eq!(surface.bounding_box(item), Some(rect(0.0, 250.0, 300.0, 50.0)));

        surface.set_position(list, Position::Fixed);
        assert_eq!(surface.bounding_box(item), Some(rect(0.0, 300.0, 300.0, 50.0)));
    }

    #[test]
    fn test_offset_parent_chain() {
        let surface = MemorySurface::new();
        let root = surface.create_root(rect(0.0, 0.0, 800.0, 800.0));
        let outer = surface.append(root, rect(10.0, 10.0, 500.0, 500.0));
        let inner = surface.append(outer, rect(30.0, 40.0, 100.0, 100.0));

        assert_eq!(surface.offset_parent(inner), Some(root));
        assert_eq!(surface.offset_left(inner), 30.0);

        surface.set_position(outer, Position::Relative);
        assert_eq!(surface.offset_parent(inner), Some(outer));
        assert_eq!(surface.offset_left(inner), 20.0);
        assert_eq!(surface.offset_top(inner), 30.0);
        assert_eq!(surface.offset_parent(root), None);
    }

    #[test]
    fn test_document_order() {
        let surface = MemorySurface::new();
        let root = surface.create_root(rect(0.0, 0.0, 1.0, 1.0));
        let a = surface.append(root, rect(0.0, 0.0, 1.0, 1.0));
        let b = surface.append(root, rect(0.0, 0.0, 1.0, 1.0));
        let a_child = surface.append(a, rect(0.0, 0.0, 1.0, 1.0));

        assert_eq!(surface.compare_document_position(a, b), Ordering::Less);
        assert_eq!(surface.compare_document_position(a_child, b), Ordering::Less);
        assert_eq!(surface.compare_document_position(a, a_child), Ordering::Less);
        assert_eq!(surface.compare_document_position(b, a_child), Ordering::Greater);

        surface.move_to(b, root, 0);
        assert_eq!(surface.compare_document_position(a, b), Ordering::Greater);
    }

    #[test]
    fn test_native_cancel_commits_displayed_value() {
        let surface = MemorySurface::new();
        let root = surface.create_root(rect(0.0, 0.0, 10.0, 10.0));
        let keyframes = NativeKeyframes {
            property: "opacity".into(),
            values: vec![Value::Number(0.2), Value::Number(1.0)],
            offset: None,
            easing: None,
        };
        let timing = NativeTiming {
            delay_ms: 0.0,
            duration_ms: 300.0,
            easing: "linear".into(),
            fill: Default::default(),
            iterations: 1,
            direction: Default::default(),
        };

        let handle = surface.animate(root, &keyframes, &timing).unwrap();
        assert_eq!(surface.cancel(handle.id, true), Some(Value::Number(0.2)));
        assert!(handle.finished.is_resolved());
        assert!(surface.native_animations().is_empty());

        surface.set_reject_native(true);
        assert!(surface.animate(root, &keyframes, &timing).is_err());
    }
}
