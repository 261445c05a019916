//! Glide Layout Projection
//!
//! Layout animations for DOM-like element trees.
//!
//! # Features
//!
//! - **Visual Elements**: Latest values, render state and lifecycle events per node
//! - **Projection Tree**: Snapshot/measure passes and FLIP corrections with stretch correction
//! - **Shared Layout**: Boxes handed between nodes registered under one `layout_id`
//! - **Scroll Measurement**: Offsets, progress and velocity of scroll containers
//! - **Motion Engine**: Ties elements, projection and value animations to one batcher
//!
//! # Example
//!
//! ```rust
//! use std::rc::Rc;
//!
//! use glide_core::geometry::LayoutBox;
//! use glide_projection::{ElementKind, MemorySurface, MotionEngine, MotionProps};
//!
//! let surface = Rc::new(MemorySurface::new());
//! let page = surface.create_root(LayoutBox::from_rect(0.0, 0.0, 800.0, 600.0));
//! let engine = MotionEngine::new(surface.clone());
//!
//! let id = engine.create_element(ElementKind::Html, None, MotionProps::new().with_style("x", 10.0f32));
//! engine.mount(id, page);
//! engine.frame(0.0);
//!
//! assert_eq!(surface.transform(page), "translateX(10px)");
//! ```

pub mod config;
pub mod engine;
pub mod node;
pub mod scroll;
pub mod surface;
pub mod transform;
pub mod tree;
pub mod visual_element;

#[cfg(test)]
mod tests;

pub use config::{AnimationConfig, EngineConfig, LayoutConfig};
pub use engine::{EngineBuilder, MotionEngine};
pub use node::{LayoutAnimationType, MeasuredLayout, NodeId, ProjectionNode, ProjectionOptions, ProjectionOptionsUpdate};
pub use scroll::{ScrollHandler, ScrollInfo, ScrollInfoOptions, ScrollOffset};
pub use surface::MemorySurface;
pub use transform::{build_transform, ProjectionTransform};
pub use tree::{ProjectionEvent, ProjectionTree};
pub use visual_element::{
    AnimateProp, ElementId, ElementKind, LifecycleEvents, MotionProps, PresenceContext, VisualElement,
};
