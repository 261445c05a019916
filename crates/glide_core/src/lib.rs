//! Glide Core Runtime
//!
//! Foundational primitives for the glide layout-animation engine:
//!
//! - **Frame Batcher**: Phased per-frame scheduling so reads never interleave with writes
//! - **Geometry**: Axis/box intervals and scale-then-translate deltas
//! - **Subscriber Lists**: Typed lifecycle events with explicit subscription handles
//! - **Completions**: Single-threaded futures resolved by callbacks
//! - **Surface**: The read/write contract with the host element tree
//!
//! # Example
//!
//! ```rust
//! use glide_core::geometry::{BoxDelta, LayoutBox};
//!
//! let before = LayoutBox::from_rect(0.0, 0.0, 100.0, 100.0);
//! let after = LayoutBox::from_rect(50.0, 50.0, 200.0, 200.0);
//!
//! let delta = BoxDelta::between(&before, &after);
//! assert_eq!(delta.x.scale, 2.0);
//! assert_eq!(delta.x.translate, 50.0);
//! ```

pub mod completion;
pub mod error;
pub mod events;
pub mod frameloop;
pub mod geometry;
pub mod surface;
pub mod value;
pub mod warn;

pub use completion::{Completion, Resolver};
pub use error::{GlideError, Result};
pub use events::{SubscriberId, SubscriberList, Subscription};
pub use frameloop::{Batcher, BatcherConfig, FrameData, FrameJob, JobId, Phase};
pub use geometry::{Axis, AxisDelta, BoxDelta, LayoutBox, Point};
pub use surface::{InstanceId, Position, Surface};
pub use value::{ResolvedValues, Value};
pub use warn::warn_once;
