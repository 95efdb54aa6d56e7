//! Surface objects - the live instances that bindings create and the surface
//! stacks.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::geometry::{Geometry, Rect, Size};
use crate::model::{PropKey, Props};

/// Unique identifier for a surface object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectId(Uuid);

impl ObjectId {
    /// Create a new unique object ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ObjectId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The kind of object a binding manages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObjectKind {
    /// Rectangle, optionally with rounded corners.
    Rect,
    /// Circle.
    Circle,
    /// Ellipse.
    Ellipse,
    /// Isosceles triangle.
    Triangle,
    /// Straight line between two points.
    Line,
    /// Closed vertex list.
    Polygon,
    /// Open vertex list.
    Polyline,
    /// SVG path.
    Path,
    /// Text label.
    Text,
    /// Bitmap image.
    Image,
}

const COMMON_KEYS: [PropKey; 15] = [
    PropKey::Left,
    PropKey::Top,
    PropKey::Width,
    PropKey::Height,
    PropKey::ScaleX,
    PropKey::ScaleY,
    PropKey::Angle,
    PropKey::Opacity,
    PropKey::Fill,
    PropKey::Stroke,
    PropKey::StrokeWidth,
    PropKey::Selectable,
    PropKey::Evented,
    PropKey::HasControls,
    PropKey::Visible,
];

const fn with_common<const N: usize, const M: usize>(extra: [PropKey; N]) -> [PropKey; M] {
    let mut keys = [PropKey::Left; M];
    let mut i = 0;
    while i < COMMON_KEYS.len() {
        keys[i] = COMMON_KEYS[i];
        i += 1;
    }
    let mut j = 0;
    while j < N {
        keys[COMMON_KEYS.len() + j] = extra[j];
        j += 1;
    }
    keys
}

const RECT_KEYS: [PropKey; 17] = with_common([PropKey::Rx, PropKey::Ry]);
const CIRCLE_KEYS: [PropKey; 16] = with_common([PropKey::Radius]);
const ELLIPSE_KEYS: [PropKey; 17] = with_common([PropKey::Rx, PropKey::Ry]);
const LINE_KEYS: [PropKey; 19] = with_common([PropKey::X1, PropKey::Y1, PropKey::X2, PropKey::Y2]);
const POINT_KEYS: [PropKey; 16] = with_common([PropKey::Points]);
const PATH_KEYS: [PropKey; 16] = with_common([PropKey::Path]);
const TEXT_KEYS: [PropKey; 20] = with_common([
    PropKey::Text,
    PropKey::FontFamily,
    PropKey::FontSize,
    PropKey::FontWeight,
    PropKey::TextAlign,
]);
const IMAGE_KEYS: [PropKey; 17] = with_common([PropKey::Src, PropKey::CrossOrigin]);

impl ObjectKind {
    /// Every object kind.
    pub const ALL: [ObjectKind; 10] = [
        Self::Rect,
        Self::Circle,
        Self::Ellipse,
        Self::Triangle,
        Self::Line,
        Self::Polygon,
        Self::Polyline,
        Self::Path,
        Self::Text,
        Self::Image,
    ];

    /// Allowlist of properties a model may bind for this kind.
    #[must_use]
    pub fn bindable_keys(self) -> &'static [PropKey] {
        match self {
            Self::Rect => &RECT_KEYS,
            Self::Circle => &CIRCLE_KEYS,
            Self::Ellipse => &ELLIPSE_KEYS,
            Self::Triangle => &COMMON_KEYS,
            Self::Line => &LINE_KEYS,
            Self::Polygon | Self::Polyline => &POINT_KEYS,
            Self::Path => &PATH_KEYS,
            Self::Text => &TEXT_KEYS,
            Self::Image => &IMAGE_KEYS,
        }
    }

    /// Restrict a model to this kind's allowlist.
    #[must_use]
    pub fn restrict(self, props: &Props) -> Props {
        props.pick(self.bindable_keys())
    }

    /// Lowercase name, as used in scene files and diagnostics.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Rect => "rect",
            Self::Circle => "circle",
            Self::Ellipse => "ellipse",
            Self::Triangle => "triangle",
            Self::Line => "line",
            Self::Polygon => "polygon",
            Self::Polyline => "polyline",
            Self::Path => "path",
            Self::Text => "text",
            Self::Image => "image",
        }
    }
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Events an object emits to its listeners.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObjectEvent {
    /// The object is being dragged; listeners may still adjust it.
    Moving,
    /// An interaction finished and changed the object.
    Modified,
}

/// Handle returned by [`ObjectHandle::on`], used to detach the listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Callback = Arc<dyn Fn(&ObjectHandle) + Send + Sync>;

struct Listener {
    id: ListenerId,
    event: ObjectEvent,
    callback: Callback,
}

#[derive(Debug, Clone, Default)]
struct ObjectState {
    props: Props,
    geometry: Geometry,
    intrinsic: Option<Size>,
}

struct ObjectInner {
    id: ObjectId,
    kind: ObjectKind,
    state: Mutex<ObjectState>,
    listeners: Mutex<Vec<Listener>>,
    next_listener: AtomicU64,
}

/// Shared handle to a live surface object.
///
/// Cloning the handle does not clone the object; identity is the
/// [`ObjectId`].
#[derive(Clone)]
pub struct ObjectHandle {
    inner: Arc<ObjectInner>,
}

impl ObjectHandle {
    /// Create an object with the given properties and geometry.
    #[must_use]
    pub fn new(kind: ObjectKind, props: Props, geometry: Geometry) -> Self {
        Self {
            inner: Arc::new(ObjectInner {
                id: ObjectId::new(),
                kind,
                state: Mutex::new(ObjectState {
                    props,
                    geometry,
                    intrinsic: None,
                }),
                listeners: Mutex::new(Vec::new()),
                next_listener: AtomicU64::new(0),
            }),
        }
    }

    /// Record the natural size of the underlying resource (e.g. image pixels).
    #[must_use]
    pub fn with_intrinsic_size(self, size: Size) -> Self {
        self.lock_state().intrinsic = Some(size);
        self
    }

    /// Object identity.
    #[must_use]
    pub fn id(&self) -> ObjectId {
        self.inner.id
    }

    /// Object kind.
    #[must_use]
    pub fn kind(&self) -> ObjectKind {
        self.inner.kind
    }

    /// Snapshot of the current properties.
    #[must_use]
    pub fn props(&self) -> Props {
        self.lock_state().props.clone()
    }

    /// Snapshot of the current geometry.
    #[must_use]
    pub fn geometry(&self) -> Geometry {
        self.lock_state().geometry.clone()
    }

    /// Natural size of the underlying resource, if any.
    #[must_use]
    pub fn intrinsic_size(&self) -> Option<Size> {
        self.lock_state().intrinsic
    }

    /// Generic property assignment. Returns whether anything changed.
    pub fn assign(&self, next: &Props) -> bool {
        self.lock_state().props.assign(next)
    }

    /// Replace the geometry. Returns whether it changed.
    pub fn set_geometry(&self, geometry: Geometry) -> bool {
        let mut state = self.lock_state();
        if state.geometry == geometry {
            return false;
        }
        state.geometry = geometry;
        true
    }

    /// Bounding rectangle in logical pixels, ignoring rotation.
    ///
    /// Percent lengths resolve against `reference`.
    #[must_use]
    pub fn bounding_rect(&self, reference: Size) -> Rect {
        let state = self.lock_state();
        let props = &state.props;
        let scale_x = props.scale_x.unwrap_or(1.0);
        let scale_y = props.scale_y.unwrap_or(1.0);
        let extent = state.geometry.extent();

        let base_width = props
            .width
            .map(|w| w.resolve(reference.width))
            .or_else(|| match self.inner.kind {
                ObjectKind::Circle => props.radius.map(|r| r * 2.0),
                ObjectKind::Ellipse => props.rx.map(|r| r * 2.0),
                _ => None,
            })
            .or(extent.map(|e| e.width()))
            .or(state.intrinsic.map(|s| s.width))
            .unwrap_or(0.0);
        let base_height = props
            .height
            .map(|h| h.resolve(reference.height))
            .or_else(|| match self.inner.kind {
                ObjectKind::Circle => props.radius.map(|r| r * 2.0),
                ObjectKind::Ellipse => props.ry.map(|r| r * 2.0),
                _ => None,
            })
            .or(extent.map(|e| e.height()))
            .or(state.intrinsic.map(|s| s.height))
            .unwrap_or(0.0);

        Rect::from_origin_size(
            (props.left.unwrap_or(0.0), props.top.unwrap_or(0.0)),
            (base_width * scale_x, base_height * scale_y),
        )
    }

    /// Attach a listener for `event`.
    pub fn on<F>(&self, event: ObjectEvent, callback: F) -> ListenerId
    where
        F: Fn(&ObjectHandle) + Send + Sync + 'static,
    {
        let id = ListenerId(self.inner.next_listener.fetch_add(1, Ordering::Relaxed));
        self.lock_listeners().push(Listener {
            id,
            event,
            callback: Arc::new(callback),
        });
        id
    }

    /// Detach a listener. Returns whether it was attached.
    pub fn off(&self, id: ListenerId) -> bool {
        let mut listeners = self.lock_listeners();
        let before = listeners.len();
        listeners.retain(|l| l.id != id);
        listeners.len() != before
    }

    /// Number of attached listeners.
    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.lock_listeners().len()
    }

    /// Invoke every listener of `event`.
    pub fn emit(&self, event: ObjectEvent) {
        // Callbacks run without the listener lock so they may attach or detach.
        let callbacks: Vec<Callback> = self
            .lock_listeners()
            .iter()
            .filter(|l| l.event == event)
            .map(|l| Arc::clone(&l.callback))
            .collect();
        for callback in callbacks {
            callback(self);
        }
    }

    /// Apply an interactive change (drag, resize), then emit
    /// [`ObjectEvent::Moving`] followed by [`ObjectEvent::Modified`].
    pub fn interact<F>(&self, change: F)
    where
        F: FnOnce(&mut Props),
    {
        change(&mut self.lock_state().props);
        self.emit(ObjectEvent::Moving);
        self.emit(ObjectEvent::Modified);
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, ObjectState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_listeners(&self) -> std::sync::MutexGuard<'_, Vec<Listener>> {
        self.inner
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl PartialEq for ObjectHandle {
    fn eq(&self, other: &Self) -> bool {
        self.inner.id == other.inner.id
    }
}

impl Eq for ObjectHandle {}

impl fmt::Debug for ObjectHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectHandle")
            .field("id", &self.inner.id)
            .field("kind", &self.inner.kind)
            .field("props", &self.props())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use super::*;
    use crate::geometry::Point;
    use crate::model::Length;

    fn rect(left: f64, top: f64) -> ObjectHandle {
        ObjectHandle::new(
            ObjectKind::Rect,
            Props {
                left: Some(left),
                top: Some(top),
                width: Some(Length::Px(100.0)),
                height: Some(Length::Px(50.0)),
                ..Props::default()
            },
            Geometry::None,
        )
    }

    #[test]
    fn test_allowlists_include_common_and_specific_keys() {
        for kind in ObjectKind::ALL {
            let keys = kind.bindable_keys();
            assert!(keys.contains(&PropKey::Left), "{kind} should bind left");
            assert!(keys.contains(&PropKey::Opacity), "{kind} should bind opacity");
        }
        assert!(ObjectKind::Line.bindable_keys().contains(&PropKey::X2));
        assert!(ObjectKind::Text.bindable_keys().contains(&PropKey::FontSize));
        assert!(!ObjectKind::Rect.bindable_keys().contains(&PropKey::Text));
        assert!(!ObjectKind::Triangle.bindable_keys().contains(&PropKey::Src));
    }

    #[test]
    fn test_restrict_strips_foreign_keys() {
        let props = Props {
            radius: Some(20.0),
            text: Some("not a circle field".into()),
            ..Props::default()
        };
        let restricted = ObjectKind::Circle.restrict(&props);
        assert_eq!(restricted.radius, Some(20.0));
        assert!(restricted.text.is_none());
    }

    #[test]
    fn test_listeners_attach_and_detach() {
        let object = rect(0.0, 0.0);
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        let id = object.on(ObjectEvent::Modified, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        object.interact(|props| props.left = Some(30.0));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(object.props().left, Some(30.0));

        assert!(object.off(id));
        assert!(!object.off(id));
        object.emit(ObjectEvent::Modified);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(object.listener_count(), 0);
    }

    #[test]
    fn test_moving_listener_runs_before_modified() {
        let object = rect(0.0, 0.0);
        object.on(ObjectEvent::Moving, |obj| {
            obj.assign(&Props {
                left: Some(5.0),
                ..Props::default()
            });
        });
        let seen = Arc::new(Mutex::new(None));
        let sink = Arc::clone(&seen);
        object.on(ObjectEvent::Modified, move |obj| {
            *sink.lock().expect("lock") = obj.props().left;
        });

        object.interact(|props| props.left = Some(-40.0));
        assert_eq!(*seen.lock().expect("lock"), Some(5.0));
    }

    #[test]
    fn test_bounding_rect_uses_scale_and_kind_fallbacks() {
        let object = rect(10.0, 20.0);
        object.assign(&Props {
            scale_x: Some(2.0),
            ..Props::default()
        });
        let bounds = object.bounding_rect(Size::new(800.0, 600.0));
        assert!((bounds.width() - 200.0).abs() < f64::EPSILON);
        assert!((bounds.height() - 50.0).abs() < f64::EPSILON);

        let circle = ObjectHandle::new(
            ObjectKind::Circle,
            Props {
                radius: Some(30.0),
                ..Props::default()
            },
            Geometry::None,
        );
        assert!((circle.bounding_rect(Size::default()).width() - 60.0).abs() < f64::EPSILON);

        let polyline = ObjectHandle::new(
            ObjectKind::Polyline,
            Props::default(),
            Geometry::Points {
                points: vec![Point::new(0.0, 40.0), Point::new(300.0, 80.0)],
            },
        );
        assert!((polyline.bounding_rect(Size::default()).width() - 300.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_handles_compare_by_identity() {
        let a = rect(0.0, 0.0);
        let b = rect(0.0, 0.0);
        assert_eq!(a, a.clone());
        assert_ne!(a, b);
    }
}
