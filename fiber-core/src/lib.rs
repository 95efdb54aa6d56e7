//! # Fabric Fiber Core
//!
//! Ordered, declarative object lifecycles for retained-mode drawing surfaces.
//! Objects are declared in a tree of scopes, created asynchronously, and
//! always end up layered by `(priority, sequence)` regardless of which
//! creation finished first.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │                 fiber-core                  │
//! ├─────────────────────────────────────────────┤
//! │  ObjectBinding   │  RenderContext           │
//! │  - mount         │  - scopes / overrides    │
//! │  - update        │  - sequence allocator    │
//! │  - unmount       │  - attach / teardown     │
//! ├─────────────────────────────────────────────┤
//! │  SequentialTask  │  StackOrderReconciler    │
//! │  Queue           │  - (priority, sequence)  │
//! │  - priority/FIFO │  - stable re-sort        │
//! ├─────────────────────────────────────────────┤
//! │  Surface (MemorySurface) │ ImageLoader      │
//! └─────────────────────────────────────────────┘
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![deny(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod binding;
pub mod bitmap;
pub mod bounds;
pub mod cancel;
pub mod context;
pub mod element;
pub mod error;
pub mod geometry;
pub mod model;
pub mod queue;
pub mod reconciler;
pub mod shapes;
pub mod surface;

pub use binding::{BindingOptions, ObjectBinding, ObjectFactory};
pub use bitmap::{DecodedImage, FileImageLoader, ImageFactory, ImageLoader, MemoryImageLoader};
pub use bounds::{bind_drag_bounds, clamp_within};
pub use cancel::CancelToken;
pub use context::{ContextConfig, ContextState, RenderContext, ScopeOptions};
pub use element::{ListenerId, ObjectEvent, ObjectHandle, ObjectId, ObjectKind};
pub use error::{FiberError, FiberResult};
pub use geometry::{parse_path, BezPath, Geometry, Point, Rect, Size};
pub use model::{normalize_key_selection, Length, PropKey, Props};
pub use queue::{spawn_detached, SequentialTaskQueue, TaskHandle, TaskOptions};
pub use reconciler::{StackKey, StackOrderReconciler};
pub use shapes::ShapeFactory;
pub use surface::{DocumentObject, MemorySurface, Surface, SurfaceDocument, SurfaceEvent};

/// Fiber core version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
