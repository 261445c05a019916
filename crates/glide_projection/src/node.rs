//! Projection nodes
//!
//! One node per element that tracks its layout. A node remembers where its
//! element was before a change (the snapshot), where layout put it afterwards
//! (the target) and the corrective delta that makes it appear to still be at
//! the snapshot. Animating that delta back to identity is the FLIP animation.
//!
//! Nodes live in the [`ProjectionTree`](crate::tree::ProjectionTree) arena and
//! link to each other through [`NodeId`] handles.

use serde::{Deserialize, Serialize};
use slotmap::new_key_type;
use smallvec::SmallVec;

use glide_animation::animation::ValueAnimation;
use glide_animation::transition::Transition;
use glide_core::geometry::{Axis, BoxDelta, LayoutBox, Point};
use glide_core::surface::InstanceId;

new_key_type! {
    /// Handle to a projection node
    pub struct NodeId;
}

/// Animation progress runs over `[0, PROGRESS_SCALE]` so spring rest
/// thresholds stay meaningful
pub(crate) const PROGRESS_SCALE: f32 = 1000.0;

// ============================================================================
// Options
// ============================================================================

/// Which parts of a layout change animate
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LayoutAnimationType {
    /// Position and size
    #[default]
    Both,
    /// Position animates; size jumps to the new layout
    Position,
    /// Size animates; position jumps to the new layout
    Size,
}

impl LayoutAnimationType {
    /// Where the animation starts from, given the snapshot and target boxes
    pub fn adjust_snapshot(&self, snapshot: &LayoutBox, target: &LayoutBox) -> LayoutBox {
        match self {
            LayoutAnimationType::Both => *snapshot,
            LayoutAnimationType::Position => LayoutBox::new(
                Axis::new(snapshot.x.min, snapshot.x.min + target.width()),
                Axis::new(snapshot.y.min, snapshot.y.min + target.height()),
            ),
            LayoutAnimationType::Size => LayoutBox::new(
                Axis::new(target.x.min, target.x.min + snapshot.width()),
                Axis::new(target.y.min, target.y.min + snapshot.height()),
            ),
        }
    }
}

/// Per-node layout tracking options
#[derive(Clone, Debug, PartialEq)]
pub struct ProjectionOptions {
    /// Nodes sharing an id animate between each other across unmount/mount
    pub layout_id: Option<String>,
    /// Animate layout changes of this node
    pub layout: Option<LayoutAnimationType>,
    /// Measure even when nothing animates, so descendants can be corrected
    pub always_measure_layout: bool,
    /// Record the node's scroll offset; descendants' boxes add it back
    pub layout_scroll: bool,
    /// Descendants animate relative to this node instead of the page
    pub layout_root: bool,
    /// Layout transition; the engine default when `None`
    pub transition: Option<Transition>,
    /// A node registering with a `layout_id` whose lead is still mounted
    /// takes over immediately
    pub initial_promotion: bool,
}

impl Default for ProjectionOptions {
    fn default() -> Self {
        Self {
            layout_id: None,
            layout: None,
            always_measure_layout: false,
            layout_scroll: false,
            layout_root: false,
            transition: None,
            initial_promotion: true,
        }
    }
}

impl ProjectionOptions {
    /// Whether layout changes of this node animate
    pub fn animates_layout(&self) -> bool {
        self.layout.is_some() || self.layout_id.is_some()
    }

    /// Whether the node is measured at all during a layout pass
    pub fn tracks_layout(&self) -> bool {
        self.animates_layout() || self.always_measure_layout || self.layout_scroll || self.layout_root
    }

    pub fn animation_type(&self) -> LayoutAnimationType {
        self.layout.unwrap_or_default()
    }

    /// Apply the keys present in `update`; returns whether anything changed
    pub fn merge(&mut self, update: &ProjectionOptionsUpdate) -> bool {
        let before = self.clone();
        if let Some(layout_id) = &update.layout_id {
            self.layout_id = layout_id.clone();
        }
        if let Some(layout) = update.layout {
            self.layout = layout;
        }
        if let Some(always) = update.always_measure_layout {
            self.always_measure_layout = always;
        }
        if let Some(scroll) = update.layout_scroll {
            self.layout_scroll = scroll;
        }
        if let Some(root) = update.layout_root {
            self.layout_root = root;
        }
        if let Some(transition) = &update.transition {
            self.transition = transition.clone();
        }
        if let Some(promotion) = update.initial_promotion {
            self.initial_promotion = promotion;
        }
        *self != before
    }
}

/// Partial [`ProjectionOptions`]; `None` leaves a key untouched
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ProjectionOptionsUpdate {
    pub layout_id: Option<Option<String>>,
    pub layout: Option<Option<LayoutAnimationType>>,
    pub always_measure_layout: Option<bool>,
    pub layout_scroll: Option<bool>,
    pub layout_root: Option<bool>,
    pub transition: Option<Option<Transition>>,
    pub initial_promotion: Option<bool>,
}

impl From<ProjectionOptions> for ProjectionOptionsUpdate {
    fn from(options: ProjectionOptions) -> Self {
        Self {
            layout_id: Some(options.layout_id),
            layout: Some(options.layout),
            always_measure_layout: Some(options.always_measure_layout),
            layout_scroll: Some(options.layout_scroll),
            layout_root: Some(options.layout_root),
            transition: Some(options.transition),
            initial_promotion: Some(options.initial_promotion),
        }
    }
}

// ============================================================================
// Node state
// ============================================================================

/// A measured layout
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MeasuredLayout {
    /// Relative to the parent node's document box
    pub local: LayoutBox,
    /// Scroll-independent page box
    pub document: LayoutBox,
}

/// A running layout animation
#[derive(Clone, Debug)]
pub(crate) struct LayoutAnimation {
    pub driver: ValueAnimation,
    pub from: LayoutBox,
    pub to: LayoutBox,
    /// Not yet painted; the first `advance` holds it at `from`
    pub fresh: bool,
}

impl LayoutAnimation {
    pub fn progress(&self) -> f32 {
        self.driver.value() / PROGRESS_SCALE
    }

    /// Box the node should appear at right now
    pub fn visual_box(&self) -> LayoutBox {
        self.from.mix(&self.to, self.progress())
    }
}

/// A node in the projection tree
#[derive(Debug)]
pub struct ProjectionNode {
    pub(crate) parent: Option<NodeId>,
    pub(crate) children: SmallVec<[NodeId; 4]>,
    pub(crate) instance: Option<InstanceId>,
    pub(crate) options: ProjectionOptions,
    pub(crate) is_root: bool,
    pub(crate) layout: Option<MeasuredLayout>,
    pub(crate) snapshot: Option<LayoutBox>,
    pub(crate) layout_delta: Option<BoxDelta>,
    pub(crate) projection_delta: BoxDelta,
    /// Ancestors' accumulated delta composed with this node's own
    pub(crate) tree_delta: BoxDelta,
    pub(crate) tree_scale: Point,
    pub(crate) scroll: Option<Point>,
    pub(crate) animation: Option<LayoutAnimation>,
    pub(crate) needs_render: bool,
}

impl ProjectionNode {
    pub(crate) fn new(parent: Option<NodeId>, instance: Option<InstanceId>, options: ProjectionOptions) -> Self {
        Self {
            parent,
            children: SmallVec::new(),
            instance,
            options,
            is_root: false,
            layout: None,
            snapshot: None,
            layout_delta: None,
            projection_delta: BoxDelta::IDENTITY,
            tree_delta: BoxDelta::IDENTITY,
            tree_scale: Point::new(1.0, 1.0),
            scroll: None,
            animation: None,
            needs_render: false,
        }
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    pub fn instance(&self) -> Option<InstanceId> {
        self.instance
    }

    pub fn options(&self) -> &ProjectionOptions {
        &self.options
    }

    pub fn is_root(&self) -> bool {
        self.is_root
    }

    pub fn layout(&self) -> Option<&MeasuredLayout> {
        self.layout.as_ref()
    }

    pub fn snapshot(&self) -> Option<LayoutBox> {
        self.snapshot
    }

    /// The box layout last placed this node at
    pub fn target(&self) -> Option<LayoutBox> {
        self.layout.map(|l| l.document)
    }

    /// Snapshot to target mapping from the last layout change
    pub fn layout_delta(&self) -> Option<BoxDelta> {
        self.layout_delta
    }

    /// Correction currently applied to this node
    pub fn projection_delta(&self) -> BoxDelta {
        self.projection_delta
    }

    /// Accumulated scale of every ancestor's correction
    pub fn tree_scale(&self) -> Point {
        self.tree_scale
    }

    pub fn scroll(&self) -> Option<Point> {
        self.scroll
    }

    pub fn is_animating(&self) -> bool {
        self.animation.is_some()
    }

    /// Layout animation progress in `[0, 1]` (springs may overshoot)
    pub fn animation_progress(&self) -> Option<f32> {
        self.animation.as_ref().map(LayoutAnimation::progress)
    }

    /// Where the node currently appears, including every active correction
    pub fn projected_box(&self) -> Option<LayoutBox> {
        self.layout.map(|l| self.tree_delta.apply(&l.document))
    }

    pub fn needs_render(&self) -> bool {
        self.needs_render
    }
}
