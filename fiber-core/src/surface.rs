//! Drawing surface abstraction and the in-memory implementation.

use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::element::{ObjectHandle, ObjectId, ObjectKind};
use crate::geometry::{Geometry, Size};
use crate::model::Props;
use crate::{FiberError, FiberResult};

/// Diagnostic events fired on a surface.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum SurfaceEvent {
    /// Constructing an object failed; nothing was added.
    ObjectError {
        /// Kind of the object that failed.
        kind: ObjectKind,
        /// Failure description.
        message: String,
    },
    /// Loading an image failed; nothing was added.
    ImageError {
        /// Source that failed to load.
        src: String,
        /// Failure description.
        message: String,
    },
}

/// A retained-mode drawing surface.
///
/// The object list is ordered bottom to top. Implementations use interior
/// mutability; every method takes `&self`.
pub trait Surface: Send + Sync {
    /// Append an object on top.
    fn add(&self, object: ObjectHandle);

    /// Remove an object. Returns whether it was present.
    fn remove(&self, id: ObjectId) -> bool;

    /// Current objects, bottom to top.
    fn objects(&self) -> Vec<ObjectHandle>;

    /// Move an object to `index`. Returns whether it was present.
    fn move_to(&self, id: ObjectId, index: usize) -> bool;

    /// Ask for a repaint.
    fn request_render(&self);

    /// Logical size in CSS-style pixels.
    fn dimensions(&self) -> Size;

    /// Set the logical (layout) size.
    fn set_logical_size(&self, size: Size);

    /// Set the backing-store (device pixel) size.
    fn set_backing_size(&self, size: Size);

    /// Fire a diagnostic event.
    fn fire(&self, event: SurfaceEvent);

    /// Release the surface. Later mutations are ignored.
    fn dispose(&self);
}

#[derive(Debug, Default)]
struct SurfaceState {
    objects: Vec<ObjectHandle>,
    logical: Size,
    backing: Size,
    render_count: u64,
    events: VecDeque<SurfaceEvent>,
    event_capacity: usize,
    disposed: bool,
}

/// In-memory surface used by tests and the demo host.
///
/// Records render requests and the most recent fired events (as many as the
/// event capacity), and rebroadcasts events to subscribers.
#[derive(Debug)]
pub struct MemorySurface {
    state: Mutex<SurfaceState>,
    events_tx: broadcast::Sender<SurfaceEvent>,
}

impl MemorySurface {
    /// Default capacity of the event broadcast channel.
    pub const DEFAULT_EVENT_CAPACITY: usize = 64;

    /// Create a surface with the given logical size.
    #[must_use]
    pub fn new(width: f64, height: f64) -> Self {
        Self::with_event_capacity(width, height, Self::DEFAULT_EVENT_CAPACITY)
    }

    /// Create a surface with a custom event channel capacity.
    #[must_use]
    pub fn with_event_capacity(width: f64, height: f64, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (events_tx, _) = broadcast::channel(capacity);
        let size = Size::new(width, height);
        Self {
            state: Mutex::new(SurfaceState {
                logical: size,
                backing: size,
                event_capacity: capacity,
                ..SurfaceState::default()
            }),
            events_tx,
        }
    }

    /// Subscribe to diagnostic events fired from now on.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<SurfaceEvent> {
        self.events_tx.subscribe()
    }

    /// IDs of the current objects, bottom to top.
    #[must_use]
    pub fn order(&self) -> Vec<ObjectId> {
        self.lock().objects.iter().map(ObjectHandle::id).collect()
    }

    /// Number of objects on the surface.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().objects.len()
    }

    /// Whether the surface holds no objects.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().objects.is_empty()
    }

    /// Whether the object is on the surface.
    #[must_use]
    pub fn contains(&self, id: ObjectId) -> bool {
        self.lock().objects.iter().any(|o| o.id() == id)
    }

    /// Number of repaint requests so far.
    #[must_use]
    pub fn render_count(&self) -> u64 {
        self.lock().render_count
    }

    /// Recorded events, oldest first.
    #[must_use]
    pub fn events(&self) -> Vec<SurfaceEvent> {
        self.lock().events.iter().cloned().collect()
    }

    /// Take the recorded events, oldest first, leaving none behind.
    #[must_use]
    pub fn drain_events(&self) -> Vec<SurfaceEvent> {
        self.lock().events.drain(..).collect()
    }

    /// Backing-store size.
    #[must_use]
    pub fn backing_size(&self) -> Size {
        self.lock().backing
    }

    /// Whether [`Surface::dispose`] has been called.
    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.lock().disposed
    }

    /// Serialisable snapshot of the surface.
    #[must_use]
    pub fn document(&self) -> SurfaceDocument {
        let state = self.lock();
        SurfaceDocument {
            width: state.logical.width,
            height: state.logical.height,
            objects: state
                .objects
                .iter()
                .map(|object| DocumentObject {
                    id: object.id(),
                    kind: object.kind(),
                    props: object.props(),
                    geometry: object.geometry(),
                })
                .collect(),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, SurfaceState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Surface for MemorySurface {
    fn add(&self, object: ObjectHandle) {
        let mut state = self.lock();
        if state.disposed || state.objects.iter().any(|o| o.id() == object.id()) {
            return;
        }
        state.objects.push(object);
    }

    fn remove(&self, id: ObjectId) -> bool {
        let mut state = self.lock();
        let before = state.objects.len();
        state.objects.retain(|o| o.id() != id);
        state.objects.len() != before
    }

    fn objects(&self) -> Vec<ObjectHandle> {
        self.lock().objects.clone()
    }

    fn move_to(&self, id: ObjectId, index: usize) -> bool {
        let mut state = self.lock();
        let Some(from) = state.objects.iter().position(|o| o.id() == id) else {
            return false;
        };
        let object = state.objects.remove(from);
        let to = index.min(state.objects.len());
        state.objects.insert(to, object);
        true
    }

    fn request_render(&self) {
        let mut state = self.lock();
        if !state.disposed {
            state.render_count += 1;
        }
    }

    fn dimensions(&self) -> Size {
        self.lock().logical
    }

    fn set_logical_size(&self, size: Size) {
        self.lock().logical = size;
    }

    fn set_backing_size(&self, size: Size) {
        self.lock().backing = size;
    }

    fn fire(&self, event: SurfaceEvent) {
        {
            let mut state = self.lock();
            if state.disposed {
                return;
            }
            if state.events.len() >= state.event_capacity {
                state.events.pop_front();
            }
            state.events.push_back(event.clone());
        }
        // No subscribers is fine.
        let _ = self.events_tx.send(event);
    }

    fn dispose(&self) {
        let mut state = self.lock();
        state.objects.clear();
        state.disposed = true;
    }
}

/// One object in a [`SurfaceDocument`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentObject {
    /// Object identity.
    pub id: ObjectId,
    /// Object kind.
    pub kind: ObjectKind,
    /// Properties at snapshot time.
    pub props: Props,
    /// Geometry at snapshot time.
    #[serde(default, skip_serializing_if = "is_no_geometry")]
    pub geometry: Geometry,
}

fn is_no_geometry(geometry: &Geometry) -> bool {
    *geometry == Geometry::None
}

/// Serialisable view of a surface, bottom to top.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SurfaceDocument {
    /// Logical width.
    pub width: f64,
    /// Logical height.
    pub height: f64,
    /// Objects in stacking order.
    pub objects: Vec<DocumentObject>,
}

impl SurfaceDocument {
    /// Kinds in stacking order.
    #[must_use]
    pub fn kinds(&self) -> Vec<ObjectKind> {
        self.objects.iter().map(|o| o.kind).collect()
    }

    /// Serialize to pretty JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> FiberResult<String> {
        serde_json::to_string_pretty(self).map_err(FiberError::Serialization)
    }
}
