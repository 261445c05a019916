//! Host surface contract
//!
//! The engine never touches a concrete element tree. Everything it reads
//! (boxes, offsets, scroll state) and writes (transforms, styles, attributes)
//! goes through [`Surface`], keyed by the host's [`InstanceId`].
//!
//! Reads happen in the batcher's read phase and writes in the render phase;
//! implementations may rely on that ordering.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};
use slotmap::new_key_type;

use crate::geometry::{LayoutBox, Point};

new_key_type! {
    /// Handle to a host element
    pub struct InstanceId;
}

/// Computed `position` of an element
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Position {
    #[default]
    Static,
    Relative,
    Absolute,
    Fixed,
    Sticky,
}

/// Read/write access to the host element tree
pub trait Surface {
    /// Viewport-relative border box, or `None` if the instance is detached
    fn bounding_box(&self, instance: InstanceId) -> Option<LayoutBox>;

    fn offset_left(&self, instance: InstanceId) -> f32;
    fn offset_top(&self, instance: InstanceId) -> f32;
    fn offset_parent(&self, instance: InstanceId) -> Option<InstanceId>;

    fn scroll_left(&self, instance: InstanceId) -> f32;
    fn scroll_top(&self, instance: InstanceId) -> f32;
    fn scroll_width(&self, instance: InstanceId) -> f32;
    fn scroll_height(&self, instance: InstanceId) -> f32;
    fn client_width(&self, instance: InstanceId) -> f32;
    fn client_height(&self, instance: InstanceId) -> f32;

    /// Scroll offset of the document itself
    fn document_scroll(&self) -> Point {
        Point::ZERO
    }

    fn position(&self, instance: InstanceId) -> Position;

    /// `Less` when `a` precedes `b` in document order
    fn compare_document_position(&self, a: InstanceId, b: InstanceId) -> Ordering;

    /// Write the `transform` style; `"none"` clears it
    fn set_transform(&self, instance: InstanceId, transform: &str);
    fn set_style(&self, instance: InstanceId, name: &str, value: &str);
    fn remove_style(&self, instance: InstanceId, name: &str);
    fn set_attribute(&self, instance: InstanceId, name: &str, value: &str);

    fn scroll_offset(&self, instance: InstanceId) -> Point {
        Point::new(self.scroll_left(instance), self.scroll_top(instance))
    }
}
