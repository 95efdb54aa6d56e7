//! Hierarchical render context.
//!
//! A [`RenderContext`] is either the root of a surface or a scope nested
//! under another context. The root owns the task queue, the sequence
//! allocator, the attached surface and its reconciler; scopes forward every
//! request upward, overriding priority and bypass on the way.
//!
//! ```text
//! root (queue, sequence, surface, reconciler)
//!  ├── scope { priority: 7 }
//!  │     └── scope { bypass }      tasks: priority 7, bypass
//!  └── scope { }                   tasks: caller's options
//! ```
//!
//! Precedence: the nearest enclosing scope with a fixed priority wins over
//! outer scopes and over the caller; bypass is set if the caller or any
//! enclosing scope asks for it.

use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use crate::bounds::bind_drag_bounds;
use crate::element::{ObjectHandle, ObjectId};
use crate::geometry::Size;
use crate::queue::{spawn_detached, SequentialTaskQueue, TaskHandle, TaskOptions};
use crate::reconciler::StackOrderReconciler;
use crate::surface::{Surface, SurfaceEvent};
use crate::{FiberError, FiberResult};

/// Default pixel ratio.
pub const DEFAULT_PIXEL_RATIO: f64 = 1.0;

/// Default capacity of model update channels.
pub const DEFAULT_EVENT_CAPACITY: usize = 64;

/// Root configuration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ContextConfig {
    /// Device pixels per logical pixel. Non-positive values become `1.0`.
    pub pixel_ratio: f64,
    /// Clamp dragged objects inside the surface.
    pub clamp_to_bounds: bool,
    /// Capacity of each binding's model update channel.
    pub event_capacity: usize,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            pixel_ratio: DEFAULT_PIXEL_RATIO,
            clamp_to_bounds: false,
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}

impl ContextConfig {
    /// Create configuration from environment variables, falling back to
    /// defaults.
    ///
    /// - `FIBER_PIXEL_RATIO`: device pixel ratio
    /// - `FIBER_CLAMP_BOUNDS`: `1`/`true` to clamp dragged objects
    /// - `FIBER_EVENT_CAPACITY`: model update channel capacity
    #[must_use]
    pub fn from_env() -> Self {
        let pixel_ratio = std::env::var("FIBER_PIXEL_RATIO")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_PIXEL_RATIO);
        let clamp_to_bounds = std::env::var("FIBER_CLAMP_BOUNDS")
            .ok()
            .is_some_and(|v| parse_flag(&v));
        let event_capacity = std::env::var("FIBER_EVENT_CAPACITY")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_EVENT_CAPACITY);
        Self {
            pixel_ratio,
            clamp_to_bounds,
            event_capacity,
        }
        .normalized()
    }

    /// Set the pixel ratio.
    #[must_use]
    pub fn with_pixel_ratio(mut self, pixel_ratio: f64) -> Self {
        self.pixel_ratio = pixel_ratio;
        self.normalized()
    }

    /// Enable or disable drag-bounds clamping.
    #[must_use]
    pub fn with_clamp_to_bounds(mut self, clamp: bool) -> Self {
        self.clamp_to_bounds = clamp;
        self
    }

    fn normalized(mut self) -> Self {
        if !(self.pixel_ratio.is_finite() && self.pixel_ratio > 0.0) {
            self.pixel_ratio = DEFAULT_PIXEL_RATIO;
        }
        self.event_capacity = self.event_capacity.max(1);
        self
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

/// Overrides a scope applies to everything it mediates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScopeOptions {
    /// Fixed priority forced onto tasks and objects.
    pub priority: Option<i32>,
    /// Run every task outside the queue.
    pub bypass: bool,
}

impl ScopeOptions {
    /// Scope with a fixed priority.
    #[must_use]
    pub const fn with_priority(priority: i32) -> Self {
        Self {
            priority: Some(priority),
            bypass: false,
        }
    }

    /// Scope that bypasses the queue.
    #[must_use]
    pub const fn bypass() -> Self {
        Self {
            priority: None,
            bypass: true,
        }
    }
}

/// Lifecycle state of a context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextState {
    /// No surface yet; queued tasks are buffered.
    Unattached,
    /// A surface is attached.
    Attached,
    /// Torn down; every operation is a no-op.
    TornDown,
}

enum Attachment {
    Unattached,
    Attached {
        surface: Arc<dyn Surface>,
        reconciler: Arc<StackOrderReconciler>,
    },
    TornDown,
}

struct RootNode {
    config: ContextConfig,
    queue: SequentialTaskQueue,
    sequence: AtomicU64,
    attachment: RwLock<Attachment>,
}

struct ScopeNode {
    parent: Option<RenderContext>,
    options: ScopeOptions,
    fallback_sequence: AtomicU64,
    torn_down: AtomicBool,
}

enum Node {
    Root(RootNode),
    Scope(ScopeNode),
}

/// Handle to a node of the context tree. Cheap to clone.
#[derive(Clone)]
pub struct RenderContext {
    node: Arc<Node>,
}

impl RenderContext {
    /// Create a root context. It starts unattached with a paused queue.
    #[must_use]
    pub fn root(config: ContextConfig) -> Self {
        Self {
            node: Arc::new(Node::Root(RootNode {
                config: config.normalized(),
                queue: SequentialTaskQueue::new(),
                sequence: AtomicU64::new(0),
                attachment: RwLock::new(Attachment::Unattached),
            })),
        }
    }

    /// Create a nested scope.
    #[must_use]
    pub fn scope(&self, options: ScopeOptions) -> Self {
        Self::scope_node(Some(self.clone()), options)
    }

    /// Create a scope with no root above it.
    ///
    /// Tasks run immediately, objects cannot be added and sequence numbers
    /// come from a local counter.
    #[must_use]
    pub fn orphan(options: ScopeOptions) -> Self {
        Self::scope_node(None, options)
    }

    fn scope_node(parent: Option<RenderContext>, options: ScopeOptions) -> Self {
        Self {
            node: Arc::new(Node::Scope(ScopeNode {
                parent,
                options,
                fallback_sequence: AtomicU64::new(0),
                torn_down: AtomicBool::new(false),
            })),
        }
    }

    /// Whether this context is a root.
    #[must_use]
    pub fn is_root(&self) -> bool {
        matches!(*self.node, Node::Root(_))
    }

    /// Attach the drawing surface.
    ///
    /// The backing store is sized from the surface's logical size and the
    /// configured pixel ratio.
    ///
    /// # Errors
    ///
    /// Returns [`FiberError::InvalidOperation`] if there is no root, or the
    /// root is already attached or torn down.
    pub fn attach(&self, surface: Arc<dyn Surface>) -> FiberResult<()> {
        let root = self
            .root_node()
            .ok_or_else(|| FiberError::InvalidOperation("no root context to attach to".into()))?;
        let mut attachment = root.write_attachment();
        match *attachment {
            Attachment::Unattached => {}
            Attachment::Attached { .. } => {
                return Err(FiberError::InvalidOperation(
                    "a surface is already attached".into(),
                ))
            }
            Attachment::TornDown => {
                return Err(FiberError::InvalidOperation(
                    "context has been torn down".into(),
                ))
            }
        }

        let logical = surface.dimensions();
        surface.set_backing_size(backing_size(logical, root.config.pixel_ratio));
        let reconciler = Arc::new(StackOrderReconciler::new(Arc::clone(&surface)));
        *attachment = Attachment::Attached {
            surface,
            reconciler,
        };
        tracing::debug!(
            width = logical.width,
            height = logical.height,
            pixel_ratio = root.config.pixel_ratio,
            "Surface attached"
        );
        Ok(())
    }

    /// Start draining the root queue.
    ///
    /// # Errors
    ///
    /// Returns [`FiberError::InvalidOperation`] unless a surface is attached,
    /// and [`FiberError::NoRuntime`] outside a tokio runtime.
    pub fn start(&self) -> FiberResult<()> {
        match self.state() {
            ContextState::Attached => {}
            ContextState::Unattached => {
                return Err(FiberError::InvalidOperation(
                    "attach a surface before starting".into(),
                ))
            }
            ContextState::TornDown => {
                return Err(FiberError::InvalidOperation(
                    "context has been torn down".into(),
                ))
            }
        }
        match self.root_node() {
            Some(root) => root.queue.start(),
            None => Ok(()),
        }
    }

    /// Submit a task through the nearest queue.
    ///
    /// Scope overrides are applied first. Without a root the task runs
    /// immediately; after tear-down the handle resolves to
    /// [`FiberError::Discarded`].
    pub fn add_sequential_task<F, Fut, T>(&self, task: F, options: TaskOptions) -> TaskHandle<T>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = FiberResult<T>> + Send + 'static,
        T: Send + 'static,
    {
        if self.is_torn_down() {
            return TaskHandle::discarded();
        }
        let options = self.resolve_options(options);
        match self.root_node() {
            Some(root) => root.queue.submit(task, options),
            None => spawn_detached(task),
        }
    }

    /// Add an object to the surface and register its stacking key.
    ///
    /// Returns `false` (and does nothing) when no surface is attached or the
    /// context is torn down.
    pub fn add_object(&self, object: &ObjectHandle, priority: Option<i32>, sequence: u64) -> bool {
        if self.is_torn_down() {
            return false;
        }
        let Some((root, surface, reconciler)) = self.attached() else {
            tracing::debug!(object = %object.id(), "No surface attached; object not added");
            return false;
        };
        let priority = self.resolve_priority(priority);

        surface.add(object.clone());
        if root.config.clamp_to_bounds {
            bind_drag_bounds(object, &surface);
        }
        reconciler.register(object.id(), priority, sequence);
        true
    }

    /// Remove an object from the surface. Returns whether it was there.
    pub fn remove_object(&self, id: ObjectId) -> bool {
        let Some((_, surface, reconciler)) = self.attached() else {
            return false;
        };
        reconciler.forget(id);
        let removed = surface.remove(id);
        if removed {
            surface.request_render();
        }
        removed
    }

    /// Next stacking sequence number.
    ///
    /// Comes from the root allocator and is never reused; a scope without a
    /// root uses its own counter.
    #[must_use]
    pub fn claim_object_sequence(&self) -> u64 {
        if let Some(root) = self.root_node() {
            return root.sequence.fetch_add(1, Ordering::Relaxed);
        }
        match &*self.node {
            Node::Scope(scope) => scope.fallback_sequence.fetch_add(1, Ordering::Relaxed),
            Node::Root(root) => root.sequence.fetch_add(1, Ordering::Relaxed),
        }
    }

    /// Fire a diagnostic event on the attached surface.
    pub fn report(&self, event: SurfaceEvent) {
        match self.surface() {
            Some(surface) if !self.is_torn_down() => surface.fire(event),
            _ => tracing::debug!(?event, "No surface to report to"),
        }
    }

    /// The attached surface.
    #[must_use]
    pub fn surface(&self) -> Option<Arc<dyn Surface>> {
        self.attached().map(|(_, surface, _)| surface)
    }

    /// The reconciler of the attached surface.
    #[must_use]
    pub fn reconciler(&self) -> Option<Arc<StackOrderReconciler>> {
        self.attached().map(|(_, _, reconciler)| reconciler)
    }

    /// Logical size of the attached surface, or zero.
    #[must_use]
    pub fn surface_size(&self) -> Size {
        self.surface()
            .map(|surface| surface.dimensions())
            .unwrap_or_default()
    }

    /// Root configuration, or the default for a scope without a root.
    #[must_use]
    pub fn config(&self) -> ContextConfig {
        self.root_node()
            .map(|root| root.config)
            .unwrap_or_default()
    }

    /// The root's task queue.
    #[must_use]
    pub fn queue(&self) -> Option<SequentialTaskQueue> {
        self.root_node().map(|root| root.queue.clone())
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> ContextState {
        if self.is_torn_down() {
            return ContextState::TornDown;
        }
        match self.root_node() {
            Some(root) => match *root.read_attachment() {
                Attachment::Unattached => ContextState::Unattached,
                Attachment::Attached { .. } => ContextState::Attached,
                Attachment::TornDown => ContextState::TornDown,
            },
            None => ContextState::Unattached,
        }
    }

    /// Resize the surface: logical size as given, backing store scaled by
    /// the pixel ratio. Returns whether a surface was resized.
    pub fn resize(&self, width: f64, height: f64) -> bool {
        if self.is_torn_down() {
            return false;
        }
        let Some((root, surface, _)) = self.attached() else {
            return false;
        };
        let logical = Size::new(width, height);
        surface.set_logical_size(logical);
        surface.set_backing_size(backing_size(logical, root.config.pixel_ratio));
        surface.request_render();
        true
    }

    /// Tear this context down.
    ///
    /// A scope stops mediating for its subtree. The root additionally closes
    /// its queue, discarding pending tasks, and disposes the surface.
    pub fn teardown(&self) {
        match &*self.node {
            Node::Scope(scope) => {
                scope.torn_down.store(true, Ordering::Release);
            }
            Node::Root(root) => {
                root.queue.close();
                let previous = std::mem::replace(&mut *root.write_attachment(), Attachment::TornDown);
                if let Attachment::Attached { surface, .. } = previous {
                    surface.dispose();
                }
                tracing::debug!("Root context torn down");
            }
        }
    }

    /// Resolve once the root queue has nothing pending or running.
    pub async fn on_idle(&self) {
        if let Some(queue) = self.queue() {
            queue.on_idle().await;
        }
    }

    /// Priority an object or task ends up with after scope overrides.
    #[must_use]
    pub fn resolve_priority(&self, requested: Option<i32>) -> Option<i32> {
        self.scopes()
            .find_map(|scope| scope.options.priority)
            .or(requested)
    }

    /// Options a task ends up with after scope overrides.
    #[must_use]
    pub fn resolve_options(&self, requested: TaskOptions) -> TaskOptions {
        TaskOptions {
            priority: self.resolve_priority(requested.priority),
            bypass: requested.bypass || self.scopes().any(|scope| scope.options.bypass),
        }
    }

    fn is_torn_down(&self) -> bool {
        if self.scopes().any(|scope| scope.torn_down.load(Ordering::Acquire)) {
            return true;
        }
        self.root_node()
            .is_some_and(|root| matches!(*root.read_attachment(), Attachment::TornDown))
    }

    fn scopes(&self) -> impl Iterator<Item = &ScopeNode> {
        let mut current = Some(self);
        std::iter::from_fn(move || loop {
            let context = current?;
            match &*context.node {
                Node::Root(_) => {
                    current = None;
                }
                Node::Scope(scope) => {
                    current = scope.parent.as_ref();
                    return Some(scope);
                }
            }
        })
    }

    fn root_node(&self) -> Option<&RootNode> {
        let mut current = self;
        loop {
            match &*current.node {
                Node::Root(root) => return Some(root),
                Node::Scope(scope) => current = scope.parent.as_ref()?,
            }
        }
    }

    fn attached(&self) -> Option<(&RootNode, Arc<dyn Surface>, Arc<StackOrderReconciler>)> {
        let root = self.root_node()?;
        let attachment = root.read_attachment();
        match &*attachment {
            Attachment::Attached {
                surface,
                reconciler,
            } => Some((root, Arc::clone(surface), Arc::clone(reconciler))),
            Attachment::Unattached | Attachment::TornDown => None,
        }
    }
}

impl RootNode {
    fn read_attachment(&self) -> std::sync::RwLockReadGuard<'_, Attachment> {
        self.attachment
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn write_attachment(&self) -> std::sync::RwLockWriteGuard<'_, Attachment> {
        self.attachment
            .write()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for RenderContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut debug = f.debug_struct("RenderContext");
        match &*self.node {
            Node::Root(root) => debug.field("config", &root.config),
            Node::Scope(scope) => debug.field("options", &scope.options),
        };
        debug.field("state", &self.state()).finish_non_exhaustive()
    }
}

fn backing_size(logical: Size, pixel_ratio: f64) -> Size {
    Size::new(logical.width * pixel_ratio, logical.height * pixel_ratio)
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::element::ObjectKind;
    use crate::geometry::Geometry;
    use crate::model::Props;
    use crate::reconciler::StackKey;
    use crate::surface::MemorySurface;

    fn attached_root(config: ContextConfig) -> (RenderContext, Arc<MemorySurface>) {
        let root = RenderContext::root(config);
        let surface = Arc::new(MemorySurface::new(800.0, 600.0));
        root.attach(surface.clone()).expect("attach should succeed");
        (root, surface)
    }

    fn rect() -> ObjectHandle {
        ObjectHandle::new(ObjectKind::Rect, Props::default(), Geometry::None)
    }

    #[test]
    fn test_scope_priority_is_forced() {
        let root = RenderContext::root(ContextConfig::default());
        let scope = root.scope(ScopeOptions::with_priority(7));

        assert_eq!(scope.resolve_priority(None), Some(7));
        assert_eq!(scope.resolve_priority(Some(2)), Some(7));
        assert_eq!(root.resolve_priority(Some(2)), Some(2));
        assert_eq!(root.resolve_priority(None), None);
    }

    #[test]
    fn test_nearest_scope_wins() {
        let root = RenderContext::root(ContextConfig::default());
        let outer = root.scope(ScopeOptions::with_priority(1));
        let inner = outer.scope(ScopeOptions::with_priority(9));
        let passthrough = inner.scope(ScopeOptions::default());

        assert_eq!(passthrough.resolve_priority(Some(3)), Some(9));
        assert_eq!(outer.resolve_priority(Some(3)), Some(1));
    }

    #[test]
    fn test_bypass_propagates_down() {
        let root = RenderContext::root(ContextConfig::default());
        let bypass = root.scope(ScopeOptions::bypass());
        let nested = bypass.scope(ScopeOptions::with_priority(4));

        let resolved = nested.resolve_options(TaskOptions::default());
        assert!(resolved.bypass);
        assert_eq!(resolved.priority, Some(4));
        assert!(!root.resolve_options(TaskOptions::default()).bypass);
    }

    #[test]
    fn test_sequence_is_shared_through_scopes() {
        let root = RenderContext::root(ContextConfig::default());
        let a = root.scope(ScopeOptions::default());
        let b = a.scope(ScopeOptions::with_priority(3));

        let claimed = [
            root.claim_object_sequence(),
            a.claim_object_sequence(),
            b.claim_object_sequence(),
            root.claim_object_sequence(),
        ];
        assert_eq!(claimed, [0, 1, 2, 3]);
    }

    #[test]
    fn test_orphan_scope_counts_locally() {
        let orphan = RenderContext::orphan(ScopeOptions::default());
        assert_eq!(orphan.claim_object_sequence(), 0);
        assert_eq!(orphan.claim_object_sequence(), 1);
        assert_eq!(orphan.state(), ContextState::Unattached);
        assert!(!orphan.add_object(&rect(), None, 0));
        assert!(orphan.attach(Arc::new(MemorySurface::new(1.0, 1.0))).is_err());
    }

    #[tokio::test]
    async fn test_orphan_scope_runs_tasks_immediately() {
        let orphan = RenderContext::orphan(ScopeOptions::with_priority(2));
        let value = orphan
            .add_sequential_task(|| async { Ok(5) }, TaskOptions::default())
            .await
            .expect("orphan task should run");
        assert_eq!(value, 5);
    }

    #[tokio::test]
    async fn test_tasks_buffer_until_attached_and_started() {
        let root = RenderContext::root(ContextConfig::default());
        let log = Arc::new(Mutex::new(Vec::new()));
        let task_log = Arc::clone(&log);
        let handle = root.add_sequential_task(
            move || async move {
                task_log.lock().expect("log lock").push("ran");
                Ok(())
            },
            TaskOptions::default(),
        );

        assert!(root.start().is_err());
        tokio::task::yield_now().await;
        assert!(log.lock().expect("log lock").is_empty());

        root.attach(Arc::new(MemorySurface::new(100.0, 100.0)))
            .expect("attach should succeed");
        root.start().expect("start should succeed");
        handle.await.expect("task should run");
        assert_eq!(*log.lock().expect("log lock"), vec!["ran"]);
    }

    #[test]
    fn test_add_object_applies_scope_priority() {
        let (root, surface) = attached_root(ContextConfig::default());
        let scope = root.scope(ScopeOptions::with_priority(-2));

        let plain = rect();
        assert!(root.add_object(&plain, None, root.claim_object_sequence()));
        let scoped = rect();
        assert!(scope.add_object(&scoped, Some(5), scope.claim_object_sequence()));

        let reconciler = root.reconciler().expect("attached root has a reconciler");
        assert_eq!(reconciler.key_of(scoped.id()), Some(StackKey::new(-2, 1)));
        assert_eq!(surface.order(), vec![scoped.id(), plain.id()]);

        assert!(root.remove_object(plain.id()));
        assert!(!root.remove_object(plain.id()));
        assert_eq!(reconciler.key_of(plain.id()), None);
    }

    #[test]
    fn test_add_object_before_attach_is_rejected() {
        let root = RenderContext::root(ContextConfig::default());
        assert!(!root.add_object(&rect(), None, 0));
        assert_eq!(root.state(), ContextState::Unattached);
    }

    #[test]
    fn test_attach_twice_fails() {
        let (root, _) = attached_root(ContextConfig::default());
        assert!(root.attach(Arc::new(MemorySurface::new(1.0, 1.0))).is_err());
        assert_eq!(root.state(), ContextState::Attached);
    }

    #[tokio::test]
    async fn test_teardown_makes_operations_noops() {
        let (root, surface) = attached_root(ContextConfig::default());
        let scope = root.scope(ScopeOptions::default());
        let pending = scope.add_sequential_task(|| async { Ok(()) }, TaskOptions::default());

        root.teardown();

        assert_eq!(scope.state(), ContextState::TornDown);
        assert!(matches!(pending.await, Err(FiberError::Discarded)));
        let late = scope.add_sequential_task(|| async { Ok(()) }, TaskOptions::bypass());
        assert!(matches!(late.await, Err(FiberError::Discarded)));
        assert!(!scope.add_object(&rect(), None, 0));
        assert!(!root.resize(10.0, 10.0));
        assert!(surface.is_disposed());
        root.teardown();
    }

    #[tokio::test]
    async fn test_scope_teardown_leaves_siblings_alone() {
        let (root, surface) = attached_root(ContextConfig::default());
        let gone = root.scope(ScopeOptions::default());
        let child = gone.scope(ScopeOptions::default());
        let sibling = root.scope(ScopeOptions::default());

        gone.teardown();

        assert_eq!(child.state(), ContextState::TornDown);
        assert!(!child.add_object(&rect(), None, 0));
        assert!(sibling.add_object(&rect(), None, 0));
        assert_eq!(surface.len(), 1);
    }

    #[test]
    fn test_resize_applies_pixel_ratio() {
        let (root, surface) =
            attached_root(ContextConfig::default().with_pixel_ratio(2.0));
        assert_eq!(surface.backing_size(), Size::new(1600.0, 1200.0));

        assert!(root.resize(300.0, 200.0));
        assert_eq!(surface.dimensions(), Size::new(300.0, 200.0));
        assert_eq!(surface.backing_size(), Size::new(600.0, 400.0));
    }

    #[test]
    fn test_config_normalizes_pixel_ratio() {
        assert!((ContextConfig::default().with_pixel_ratio(0.0).pixel_ratio - 1.0).abs() < f64::EPSILON);
        assert!((ContextConfig::default().with_pixel_ratio(-3.0).pixel_ratio - 1.0).abs() < f64::EPSILON);
        assert!((ContextConfig::default().with_pixel_ratio(f64::NAN).pixel_ratio - 1.0).abs() < f64::EPSILON);
        assert!((ContextConfig::default().with_pixel_ratio(1.5).pixel_ratio - 1.5).abs() < f64::EPSILON);
        assert!(parse_flag("TRUE"));
        assert!(parse_flag(" 1 "));
        assert!(!parse_flag("nope"));
    }

    #[test]
    fn test_clamping_binds_drag_bounds() {
        let (root, _) = attached_root(ContextConfig::default().with_clamp_to_bounds(true));
        let object = rect();
        object.assign(&Props {
            width: Some(crate::model::Length::Px(100.0)),
            height: Some(crate::model::Length::Px(100.0)),
            ..Props::default()
        });
        assert!(root.add_object(&object, None, 0));

        object.interact(|props| props.left = Some(-50.0));
        assert_eq!(object.props().left, Some(0.0));
    }

    #[test]
    fn test_report_reaches_surface() {
        let (root, surface) = attached_root(ContextConfig::default());
        let event = SurfaceEvent::ObjectError {
            kind: ObjectKind::Path,
            message: "bad".into(),
        };
        root.scope(ScopeOptions::default()).report(event.clone());
        assert_eq!(surface.events(), vec![event]);
    }
}
