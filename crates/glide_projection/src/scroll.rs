//! Scroll and geometry measurement
//!
//! Tracks how far a scroll container has scrolled and where a target element
//! sits inside it. Offsets describe when progress starts and ends as pairs of
//! "target edge meets container edge":
//!
//! ```text
//!   [start start, end end]   progress 0 when the target's start meets the
//!                            container's start, 1 when the ends meet
//! ```
//!
//! All reads go through [`Surface`] and belong in the batcher's read phase.

use serde::{Deserialize, Serialize};
use smallvec::{smallvec, SmallVec};

use glide_core::geometry::Point;
use glide_core::surface::{InstanceId, Position, Surface};
use glide_core::warn::warn_once;

/// Samples further apart than this report zero velocity
const MAX_VELOCITY_ELAPSED_MS: f64 = 50.0;

const STATIC_CONTAINER_WARNING: &str = "Please ensure that the container has a non-static position, \
like 'relative', 'fixed', or 'absolute' to ensure scroll offset is calculated correctly.";

/// Scroll state along one axis
#[derive(Clone, Debug, Default, PartialEq)]
pub struct AxisScrollInfo {
    /// Current scroll position
    pub current: f32,
    /// Resolved offsets in pixels of scroll position
    pub offset: SmallVec<[f32; 4]>,
    /// Progress in `[0, 1]`
    pub progress: f32,
    /// Scrollable distance (scroll size minus client size)
    pub scroll_length: f32,
    /// Target position within the container
    pub target_offset: f32,
    pub target_length: f32,
    pub container_length: f32,
    /// Pixels per second
    pub velocity: f32,
}

/// Scroll state of a container
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ScrollInfo {
    /// Timestamp of the last update in milliseconds
    pub time: f64,
    pub x: AxisScrollInfo,
    pub y: AxisScrollInfo,
}

impl ScrollInfo {
    pub fn axis(&self, axis: ScrollAxis) -> &AxisScrollInfo {
        match axis {
            ScrollAxis::X => &self.x,
            ScrollAxis::Y => &self.y,
        }
    }

    fn axis_mut(&mut self, axis: ScrollAxis) -> &mut AxisScrollInfo {
        match axis {
            ScrollAxis::X => &mut self.x,
            ScrollAxis::Y => &mut self.y,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScrollAxis {
    X,
    #[default]
    Y,
}

/// A point along an element's length
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Edge {
    Start,
    Center,
    End,
    /// Fraction of the length
    Fraction(f32),
    /// Absolute distance from the start
    Pixels(f32),
}

impl Edge {
    fn resolve(&self, length: f32, inset: f32) -> f32 {
        let delta = match *self {
            Edge::Start => 0.0,
            Edge::Center => 0.5 * length,
            Edge::End => length,
            Edge::Fraction(f) => f * length,
            Edge::Pixels(px) => px,
        };
        inset + delta
    }
}

/// "Target edge meets container edge"
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ScrollOffset {
    pub target: Edge,
    pub container: Edge,
}

impl ScrollOffset {
    pub const fn new(target: Edge, container: Edge) -> Self {
        Self { target, container }
    }

    /// Target entering from the end of the container
    pub const ENTER: [ScrollOffset; 2] = [
        ScrollOffset::new(Edge::Start, Edge::End),
        ScrollOffset::new(Edge::End, Edge::End),
    ];

    /// Target leaving through the start of the container
    pub const EXIT: [ScrollOffset; 2] = [
        ScrollOffset::new(Edge::Start, Edge::Start),
        ScrollOffset::new(Edge::End, Edge::Start),
    ];

    /// Any overlap between target and container
    pub const ANY: [ScrollOffset; 2] = [
        ScrollOffset::new(Edge::End, Edge::Start),
        ScrollOffset::new(Edge::Start, Edge::End),
    ];

    /// Target fully inside the container
    pub const ALL: [ScrollOffset; 2] = [
        ScrollOffset::new(Edge::Start, Edge::Start),
        ScrollOffset::new(Edge::End, Edge::End),
    ];

    /// Scroll position at which this offset is reached
    fn resolve(&self, container_length: f32, target_length: f32, target_inset: f32) -> f32 {
        let target_point = self.target.resolve(target_length, target_inset);
        let container_point = self.container.resolve(container_length, 0.0);
        target_point - container_point
    }
}

/// What a scroll handler tracks
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ScrollInfoOptions {
    /// Element whose position drives progress; the container when `None`
    pub target: Option<InstanceId>,
    pub axis: ScrollAxis,
    /// Progress window; [`ScrollOffset::ALL`] when `None`
    pub offset: Option<Vec<ScrollOffset>>,
}

/// Scroll offset of `instance` (the document when `None`)
pub fn measure_scroll_offset(surface: &dyn Surface, instance: Option<InstanceId>) -> Point {
    match instance {
        Some(instance) => surface.scroll_offset(instance),
        None => surface.document_scroll(),
    }
}

/// Sum of offset positions from `target` up to (excluding) `container`
fn calc_inset(surface: &dyn Surface, target: InstanceId, container: InstanceId) -> Point {
    let mut inset = Point::ZERO;
    let mut node = Some(target);
    while let Some(current) = node {
        if current == container {
            break;
        }
        inset.x += surface.offset_left(current);
        inset.y += surface.offset_top(current);
        node = surface.offset_parent(current);
    }
    inset
}

/// Measure target position and lengths
///
/// Pure read; nothing is cached between calls.
pub fn measure(
    surface: &dyn Surface,
    container: InstanceId,
    target: Option<InstanceId>,
    info: &mut ScrollInfo,
) {
    let target = target.unwrap_or(container);

    let inset = if target == container {
        Point::ZERO
    } else {
        calc_inset(surface, target, container)
    };
    info.x.target_offset = inset.x;
    info.y.target_offset = inset.y;

    if target == container {
        info.x.target_length = surface.scroll_width(target);
        info.y.target_length = surface.scroll_height(target);
    } else {
        info.x.target_length = surface.client_width(target);
        info.y.target_length = surface.client_height(target);
    }
    info.x.container_length = surface.client_width(container);
    info.y.container_length = surface.client_height(container);

    if target != container && surface.position(container) == Position::Static {
        warn_once(STATIC_CONTAINER_WARNING);
    }
}

fn progress(from: f32, to: f32, value: f32) -> f32 {
    let range = to - from;
    if range == 0.0 {
        1.0
    } else {
        (value - from) / range
    }
}

fn update_axis(
    surface: &dyn Surface,
    container: InstanceId,
    axis: ScrollAxis,
    info: &mut ScrollInfo,
    time: f64,
) {
    let prev_time = info.time;
    let (current, scroll_size, client_size) = match axis {
        ScrollAxis::X => (
            surface.scroll_left(container),
            surface.scroll_width(container),
            surface.client_width(container),
        ),
        ScrollAxis::Y => (
            surface.scroll_top(container),
            surface.scroll_height(container),
            surface.client_height(container),
        ),
    };

    let axis_info = info.axis_mut(axis);
    let prev = axis_info.current;
    axis_info.current = current;
    axis_info.scroll_length = scroll_size - client_size;
    axis_info.offset = smallvec![0.0, axis_info.scroll_length];
    axis_info.progress = progress(0.0, axis_info.scroll_length, current);

    let elapsed = time - prev_time;
    axis_info.velocity = if elapsed <= 0.0 || elapsed > MAX_VELOCITY_ELAPSED_MS {
        0.0
    } else {
        (current - prev) * 1000.0 / elapsed as f32
    };
}

/// Refresh current position, scroll length, progress and velocity
pub fn update_scroll_info(
    surface: &dyn Surface,
    container: InstanceId,
    info: &mut ScrollInfo,
    time: f64,
) {
    update_axis(surface, container, ScrollAxis::X, info, time);
    update_axis(surface, container, ScrollAxis::Y, info, time);
    info.time = time;
}

/// Piecewise-linear map of `value` from `input` stops onto `output` stops
///
/// Extrapolates past the ends; callers clamp.
fn interpolate(input: &[f32], output: &[f32], value: f32) -> f32 {
    let n = input.len().min(output.len());
    if n == 0 {
        return 0.0;
    }
    if n == 1 {
        return output[0];
    }

    let segment = if value <= input[0] {
        0
    } else {
        (0..n - 1)
            .find(|&i| value < input[i + 1])
            .unwrap_or(n - 2)
    };
    let local = progress(input[segment], input[segment + 1], value);
    output[segment] + (output[segment + 1] - output[segment]) * local
}

/// Resolve `options.offset` into scroll positions and recompute progress
pub fn resolve_offsets(
    surface: &dyn Surface,
    container: InstanceId,
    info: &mut ScrollInfo,
    options: &ScrollInfoOptions,
) {
    let target = options.target.unwrap_or(container);
    let axis = options.axis;

    let inset = if target == container {
        Point::ZERO
    } else {
        calc_inset(surface, target, container)
    };
    let (target_length, container_length, target_inset) = match (axis, target == container) {
        (ScrollAxis::X, true) => (surface.scroll_width(target), surface.client_width(container), inset.x),
        (ScrollAxis::X, false) => (surface.client_width(target), surface.client_width(container), inset.x),
        (ScrollAxis::Y, true) => (surface.scroll_height(target), surface.client_height(container), inset.y),
        (ScrollAxis::Y, false) => (surface.client_height(target), surface.client_height(container), inset.y),
    };

    let definition: &[ScrollOffset] = options
        .offset
        .as_deref()
        .unwrap_or(&ScrollOffset::ALL);

    let axis_info = info.axis_mut(axis);
    axis_info.offset = definition
        .iter()
        .map(|offset| offset.resolve(container_length, target_length, target_inset))
        .collect();

    let stops: SmallVec<[f32; 4]> = glide_animation::keyframes::default_times(definition.len());
    axis_info.progress = interpolate(&axis_info.offset, &stops, axis_info.current).clamp(0.0, 1.0);
}

/// Callback invoked with fresh scroll info
pub type OnScroll = Box<dyn Fn(&ScrollInfo)>;

/// Measures and tracks one scroll container
///
/// Run [`measure`](Self::measure) and [`update`](Self::update) from a
/// keep-alive read job, then [`notify`](Self::notify).
pub struct ScrollHandler {
    container: InstanceId,
    options: ScrollInfoOptions,
    info: ScrollInfo,
    on_scroll: OnScroll,
}

impl ScrollHandler {
    pub fn new<F>(container: InstanceId, options: ScrollInfoOptions, on_scroll: F) -> Self
    where
        F: Fn(&ScrollInfo) + 'static,
    {
        Self {
            container,
            options,
            info: ScrollInfo::default(),
            on_scroll: Box::new(on_scroll),
        }
    }

    pub fn measure(&mut self, surface: &dyn Surface) {
        measure(surface, self.container, self.options.target, &mut self.info);
    }

    pub fn update(&mut self, surface: &dyn Surface, time: f64) {
        update_scroll_info(surface, self.container, &mut self.info, time);
        if self.options.offset.is_some() || self.options.target.is_some() {
            resolve_offsets(surface, self.container, &mut self.info, &self.options);
        }
    }

    pub fn notify(&self) {
        (self.on_scroll)(&self.info);
    }

    pub fn info(&self) -> &ScrollInfo {
        &self.info
    }

    pub fn container(&self) -> InstanceId {
        self.container
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::surface::memory::MemorySurface;
    use glide_core::geometry::LayoutBox;
    use std::cell::RefCell;
    use std::rc::Rc;

    /// Container 300×300 at (0,0) with 500px of scrollable content and a
    /// 100px tall target 400px down.
    fn scroll_fixture() -> (Rc<MemorySurface>, InstanceId, InstanceId) {
        let surface = Rc::new(MemorySurface::new());
        let root = surface.create_root(LayoutBox::from_rect(0.0, 0.0, 1000.0, 1000.0));
        let container = surface.append(root, LayoutBox::from_rect(0.0, 0.0, 300.0, 300.0));
        surface.set_position(container, Position::Relative);
        surface.set_scroll_size(container, 500.0, 1200.0);
        let target = surface.append(container, LayoutBox::from_rect(20.0, 400.0, 100.0, 100.0));
        (surface, container, target)
    }

    #[test]
    fn test_measure_container_as_target() {
        let (surface, container, _) = scroll_fixture();
        let mut info = ScrollInfo::default();
        measure(surface.as_ref(), container, None, &mut info);

        assert_eq!(info.x.target_offset, 0.0);
        assert_eq!(info.x.target_length, 500.0);
        assert_eq!(info.x.container_length, 300.0);
        assert_eq!(info.y.target_length, 1200.0);
    }

    #[test]
    fn test_measure_target_inside_container() {
        let (surface, container, target) = scroll_fixture();
        let mut info = ScrollInfo::default();
        measure(surface.as_ref(), container, Some(target), &mut info);

        assert_eq!(info.x.target_offset, 20.0);
        assert_eq!(info.y.target_offset, 400.0);
        assert_eq!(info.y.target_length, 100.0);
        assert_eq!(info.y.container_length, 300.0);
    }

    #[test]
    fn test_static_container_warns_once() {
        let (surface, container, target) = scroll_fixture();
        surface.set_position(container, Position::Static);
        glide_core::warn::reset_warnings();

        let mut info = ScrollInfo::default();
        measure(surface.as_ref(), container, Some(target), &mut info);
        measure(surface.as_ref(), container, Some(target), &mut info);

        assert!(glide_core::warn::has_warned(STATIC_CONTAINER_WARNING));
        assert_eq!(info.y.target_offset, 400.0);
    }

    #[test]
    fn test_update_progress_and_velocity() {
        let (surface, container, _) = scroll_fixture();
        let mut info = ScrollInfo::default();
        update_scroll_info(surface.as_ref(), container, &mut info, 0.0);

        surface.set_scroll(container, 0.0, 450.0);
        update_scroll_info(surface.as_ref(), container, &mut info, 10.0);

        assert_eq!(info.y.scroll_length, 900.0);
        assert_eq!(info.y.progress, 0.5);
        assert_eq!(info.y.velocity, 45000.0);
        assert_eq!(info.time, 10.0);

        update_scroll_info(surface.as_ref(), container, &mut info, 500.0);
        assert_eq!(info.y.velocity, 0.0);
    }

    #[test]
    fn test_resolve_offsets_for_target() {
        let (surface, container, target) = scroll_fixture();
        let options = ScrollInfoOptions {
            target: Some(target),
            axis: ScrollAxis::Y,
            offset: Some(ScrollOffset::ENTER.to_vec()),
        };
        let mut info = ScrollInfo::default();

        // Target top (400) meets container bottom (300) at scroll 100,
        // target bottom (500) meets container bottom at scroll 200
        surface.set_scroll(container, 0.0, 150.0);
        update_scroll_info(surface.as_ref(), container, &mut info, 0.0);
        resolve_offsets(surface.as_ref(), container, &mut info, &options);

        assert_eq!(info.y.offset.as_slice(), &[100.0, 200.0]);
        assert_eq!(info.y.progress, 0.5);

        surface.set_scroll(container, 0.0, 10.0);
        update_scroll_info(surface.as_ref(), container, &mut info, 16.0);
        resolve_offsets(surface.as_ref(), container, &mut info, &options);
        assert_eq!(info.y.progress, 0.0);
    }

    #[test]
    fn test_handler_notifies_with_latest_info() {
        let (surface, container, target) = scroll_fixture();
        let seen = Rc::new(RefCell::new(Vec::new()));

        let s = seen.clone();
        let mut handler = ScrollHandler::new(
            container,
            ScrollInfoOptions {
                target: Some(target),
                ..Default::default()
            },
            move |info| s.borrow_mut().push(info.y.progress),
        );

        surface.set_scroll(container, 0.0, 400.0);
        handler.measure(surface.as_ref());
        handler.update(surface.as_ref(), 0.0);
        handler.notify();

        // ALL window: 400 - 0 .. 500 - 300
        assert_eq!(handler.info().y.offset.as_slice(), &[400.0, 200.0]);
        assert_eq!(seen.borrow().len(), 1);
    }
}
