//! Object lifecycle binding.
//!
//! An [`ObjectBinding`] ties a model value to one live surface object:
//!
//! - **mount** claims a stacking sequence and queues creation through the
//!   context. Creation resolves `defaults → model`, restricts it to the kind's
//!   allowlist, builds the object through an [`ObjectFactory`], listens for
//!   interactive modifications and adds the object to the surface.
//! - **update** applies a new model to the live object, or rebuilds it when
//!   the factory says the change alters the object's identity.
//! - **unmount** cancels pending loads, removes the object and detaches
//!   listeners. It never fails.
//!
//! Interactive changes are published as fresh model values on a broadcast
//! channel; applying such a value back is a no-op.

use std::sync::{Arc, Mutex, PoisonError, Weak};

use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::cancel::CancelToken;
use crate::context::{ContextState, RenderContext};
use crate::element::{ListenerId, ObjectEvent, ObjectHandle, ObjectKind};
use crate::geometry::Size;
use crate::model::{PropKey, Props};
use crate::queue::{TaskHandle, TaskOptions};
use crate::surface::SurfaceEvent;
use crate::{FiberError, FiberResult};

/// Builds and updates objects of one kind.
#[async_trait]
pub trait ObjectFactory: Send + Sync + 'static {
    /// Kind of object produced.
    fn kind(&self) -> ObjectKind;

    /// Default model values, overridden by the bound model.
    fn defaults(&self) -> Props;

    /// Whether `props` describe an object that can exist at all.
    fn is_creatable(&self, _props: &Props) -> bool {
        true
    }

    /// Whether moving from `previous` to `next` needs a new object.
    fn needs_rebuild(&self, _previous: &Props, _next: &Props) -> bool {
        false
    }

    /// Build the object. Loads must give up once `cancel` fires.
    ///
    /// # Errors
    ///
    /// Returns [`FiberError::Cancelled`] when cancelled, or any construction
    /// or load failure.
    async fn create(
        &self,
        initial: Props,
        bounds: Size,
        cancel: &CancelToken,
    ) -> FiberResult<ObjectHandle>;

    /// Keys whose published value is taken from the model instead of the
    /// live object.
    fn model_keys(&self) -> &'static [PropKey] {
        &[]
    }

    /// Apply a resolved model to a live object. Returns whether it changed.
    fn apply(&self, object: &ObjectHandle, next: &Props, _bounds: Size) -> bool {
        object.assign(next)
    }

    /// Diagnostic fired when creation fails.
    fn failure_event(&self, _props: &Props, error: &FiberError) -> SurfaceEvent {
        SurfaceEvent::ObjectError {
            kind: self.kind(),
            message: error.to_string(),
        }
    }
}

/// Per-binding options.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BindingOptions {
    /// Explicit stacking sequence instead of a freshly claimed one.
    ///
    /// This is a caller-chosen override: it does not consume a number from
    /// the root allocator and may equal a sequence already handed out. Equal
    /// keys keep the order in which the objects reached the surface.
    pub sequence: Option<u64>,
    /// Requested priority for the creation task and the object.
    pub priority: Option<i32>,
    /// Keys published on interactive changes. Defaults to the keys the model
    /// defines.
    pub bound_keys: Option<Vec<PropKey>>,
}

impl BindingOptions {
    /// Options with an explicit stacking sequence. See
    /// [`sequence`](Self::sequence).
    #[must_use]
    pub fn with_sequence(mut self, sequence: u64) -> Self {
        self.sequence = Some(sequence);
        self
    }

    /// Options with a requested priority.
    #[must_use]
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = Some(priority);
        self
    }

    /// Options with an explicit list of published keys.
    #[must_use]
    pub fn with_bound_keys(mut self, keys: Vec<PropKey>) -> Self {
        self.bound_keys = Some(keys);
        self
    }
}

struct Slot {
    object: Option<ObjectHandle>,
    listener: Option<ListenerId>,
    generation: u64,
    cancel: CancelToken,
    started: bool,
    unmounted: bool,
}

impl Slot {
    fn detach(&mut self) -> Option<ObjectHandle> {
        let object = self.object.take()?;
        if let Some(listener) = self.listener.take() {
            object.off(listener);
        }
        Some(object)
    }
}

struct Shared {
    factory: Box<dyn ObjectFactory>,
    context: RenderContext,
    sequence: u64,
    priority: Option<i32>,
    bound_keys: Option<Vec<PropKey>>,
    model: Mutex<Props>,
    slot: Mutex<Slot>,
    updates: broadcast::Sender<Props>,
}

impl Shared {
    fn lock_slot(&self) -> std::sync::MutexGuard<'_, Slot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn model(&self) -> Props {
        self.model
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn replace_model(&self, next: Props) -> Props {
        let mut model = self.model.lock().unwrap_or_else(PoisonError::into_inner);
        std::mem::replace(&mut *model, next)
    }

    /// `defaults → model`, restricted to the kind's allowlist.
    fn resolve(&self, model: &Props) -> Props {
        self.factory
            .kind()
            .restrict(&self.factory.defaults().overlay(model))
    }

    fn published_keys(&self) -> Vec<PropKey> {
        let allowed = self.factory.kind().bindable_keys();
        let keys = match &self.bound_keys {
            Some(keys) => keys.clone(),
            None => self.model().defined_keys(),
        };
        keys.into_iter().filter(|key| allowed.contains(key)).collect()
    }
}

/// Binds a model value to one live surface object.
///
/// Dropping the binding unmounts it.
pub struct ObjectBinding {
    shared: Arc<Shared>,
    pending: Mutex<Option<TaskHandle<()>>>,
}

impl ObjectBinding {
    /// Mount a binding: claim a sequence and queue the object's creation.
    pub fn mount<F: ObjectFactory>(
        context: &RenderContext,
        factory: F,
        model: Props,
        options: BindingOptions,
    ) -> Self {
        let sequence = options
            .sequence
            .unwrap_or_else(|| context.claim_object_sequence());
        let (updates, _) = broadcast::channel(context.config().event_capacity);
        let cancel = CancelToken::new();
        let shared = Arc::new(Shared {
            factory: Box::new(factory),
            context: context.clone(),
            sequence,
            priority: options.priority,
            bound_keys: options.bound_keys,
            model: Mutex::new(model),
            slot: Mutex::new(Slot {
                object: None,
                listener: None,
                generation: 0,
                cancel: cancel.clone(),
                started: false,
                unmounted: false,
            }),
            updates,
        });

        tracing::debug!(
            kind = %shared.factory.kind(),
            sequence,
            priority = ?shared.priority,
            "Mounting binding"
        );
        let task_shared = Arc::clone(&shared);
        let handle = context.add_sequential_task(
            move || create_object(task_shared, 0, cancel),
            TaskOptions {
                priority: shared.priority,
                bypass: false,
            },
        );

        Self {
            shared,
            pending: Mutex::new(Some(handle)),
        }
    }

    /// Apply a new model.
    ///
    /// Kinds that need a new object for this change are rebuilt outside the
    /// queue, replacing the old object at the same stacking key once ready.
    /// While the context is unattached the rebuild waits in the queue.
    /// Before the first creation has started the model is simply recorded
    /// for it.
    pub fn update(&self, next: Props) {
        let shared = &self.shared;
        let previous = shared.replace_model(next.clone());
        let previous = shared.resolve(&previous);
        let next = shared.resolve(&next);

        let mut slot = shared.lock_slot();
        if slot.unmounted || !slot.started {
            return;
        }

        if shared.factory.needs_rebuild(&previous, &next) {
            slot.cancel.cancel();
            slot.cancel = CancelToken::new();
            slot.generation += 1;

            if !shared.factory.is_creatable(&next) {
                if let Some(object) = slot.detach() {
                    shared.context.remove_object(object.id());
                }
                return;
            }

            let generation = slot.generation;
            let cancel = slot.cancel.clone();
            drop(slot);
            tracing::debug!(kind = %shared.factory.kind(), generation, "Rebuilding object");
            let options = if shared.context.state() == ContextState::Attached {
                TaskOptions::bypass()
            } else {
                TaskOptions {
                    priority: shared.priority,
                    bypass: false,
                }
            };
            let task_shared = Arc::clone(shared);
            let handle = shared.context.add_sequential_task(
                move || create_object(task_shared, generation, cancel),
                options,
            );
            *self.lock_pending() = Some(handle);
            return;
        }

        let Some(object) = slot.object.clone() else {
            return;
        };
        drop(slot);

        let bounds = shared.context.surface_size();
        if shared.factory.apply(&object, &next, bounds) {
            if let Some(surface) = shared.context.surface() {
                surface.request_render();
            }
        }
    }

    /// Remove the object and stop pending work. Idempotent.
    pub fn unmount(&self) {
        let shared = &self.shared;
        let mut slot = shared.lock_slot();
        if slot.unmounted {
            return;
        }
        slot.unmounted = true;
        slot.cancel.cancel();
        if let Some(object) = slot.detach() {
            shared.context.remove_object(object.id());
        }
        tracing::debug!(kind = %shared.factory.kind(), "Unmounted binding");
    }

    /// Wait for the latest creation or rebuild task to finish.
    ///
    /// # Errors
    ///
    /// Returns the task's failure, e.g. a load error.
    pub async fn settled(&self) -> FiberResult<()> {
        let handle = self.lock_pending().take();
        match handle {
            Some(handle) => match handle.await {
                Err(FiberError::Discarded) => Ok(()),
                other => other,
            },
            None => Ok(()),
        }
    }

    /// Receive model values published on interactive changes.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<Props> {
        self.shared.updates.subscribe()
    }

    /// The live object, if created.
    #[must_use]
    pub fn object(&self) -> Option<ObjectHandle> {
        self.shared.lock_slot().object.clone()
    }

    /// The current model.
    #[must_use]
    pub fn model(&self) -> Props {
        self.shared.model()
    }

    /// Kind of the bound object.
    #[must_use]
    pub fn kind(&self) -> ObjectKind {
        self.shared.factory.kind()
    }

    /// Stacking sequence of this binding.
    #[must_use]
    pub fn sequence(&self) -> u64 {
        self.shared.sequence
    }

    /// Whether [`unmount`](Self::unmount) has not been called yet.
    #[must_use]
    pub fn is_mounted(&self) -> bool {
        !self.shared.lock_slot().unmounted
    }

    fn lock_pending(&self) -> std::sync::MutexGuard<'_, Option<TaskHandle<()>>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for ObjectBinding {
    fn drop(&mut self) {
        self.unmount();
    }
}

impl std::fmt::Debug for ObjectBinding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectBinding")
            .field("kind", &self.kind())
            .field("sequence", &self.shared.sequence)
            .field("object", &self.object().map(|o| o.id()))
            .finish_non_exhaustive()
    }
}

/// Creation task body. Skips silently when unmounted or superseded.
async fn create_object(shared: Arc<Shared>, generation: u64, cancel: CancelToken) -> FiberResult<()> {
    {
        let mut slot = shared.lock_slot();
        if slot.unmounted || slot.generation != generation {
            return Ok(());
        }
        slot.started = true;
    }

    let initial = shared.resolve(&shared.model());
    if !shared.factory.is_creatable(&initial) {
        return Ok(());
    }
    let kind = shared.factory.kind();
    let bounds = shared.context.surface_size();

    let object = match shared.factory.create(initial.clone(), bounds, &cancel).await {
        Ok(object) => object,
        Err(err) if err.is_cancellation() || cancel.is_cancelled() => {
            tracing::debug!(%kind, generation, "Creation cancelled");
            return Ok(());
        }
        Err(err) => {
            tracing::warn!(%kind, error = %err, "Failed to create object");
            shared
                .context
                .report(shared.factory.failure_event(&initial, &err));
            let mut slot = shared.lock_slot();
            if !slot.unmounted && slot.generation == generation {
                if let Some(previous) = slot.detach() {
                    shared.context.remove_object(previous.id());
                }
            }
            return Err(err);
        }
    };

    let mut slot = shared.lock_slot();
    if slot.unmounted || slot.generation != generation || cancel.is_cancelled() {
        return Ok(());
    }
    if let Some(previous) = slot.detach() {
        shared.context.remove_object(previous.id());
    }
    if !shared.context.add_object(&object, shared.priority, shared.sequence) {
        tracing::debug!(%kind, "Object created but context could not add it");
        return Ok(());
    }
    slot.listener = Some(publish_modifications(&object, Arc::downgrade(&shared)));
    slot.object = Some(object);
    Ok(())
}

/// Publish a snapshot of the bound keys whenever the object is modified.
fn publish_modifications(object: &ObjectHandle, shared: Weak<Shared>) -> ListenerId {
    object.on(ObjectEvent::Modified, move |target| {
        let Some(shared) = shared.upgrade() else {
            return;
        };
        let (from_model, from_object): (Vec<PropKey>, Vec<PropKey>) = shared
            .published_keys()
            .into_iter()
            .partition(|key| shared.factory.model_keys().contains(key));
        let snapshot = target
            .props()
            .pick(&from_object)
            .overlay(&shared.model().pick(&from_model));
        // Nobody listening is fine.
        let _ = shared.updates.send(snapshot);
    })
}
