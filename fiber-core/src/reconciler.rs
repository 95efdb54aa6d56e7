//! Stacking-order reconciliation.
//!
//! Every object on the surface has a [`StackKey`]. After each registration the
//! surface's object list is stably sorted by ascending key, so the final layer
//! order depends only on the keys and never on the order in which
//! asynchronous creations happened to finish.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError};

use serde::{Deserialize, Serialize};

use crate::element::ObjectId;
use crate::surface::Surface;

/// Ordering key of a surface object. Lower keys are painted first.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
pub struct StackKey {
    /// Layer priority; absent priorities are `0`.
    pub priority: i32,
    /// Declaration sequence from the root allocator.
    pub sequence: u64,
}

impl StackKey {
    /// Create a key.
    #[must_use]
    pub const fn new(priority: i32, sequence: u64) -> Self {
        Self { priority, sequence }
    }
}

/// Keeps the surface's object list sorted by [`StackKey`].
pub struct StackOrderReconciler {
    surface: Arc<dyn Surface>,
    keys: Mutex<HashMap<ObjectId, StackKey>>,
}

impl StackOrderReconciler {
    /// Create a reconciler for `surface`.
    #[must_use]
    pub fn new(surface: Arc<dyn Surface>) -> Self {
        Self {
            surface,
            keys: Mutex::new(HashMap::new()),
        }
    }

    /// The reconciled surface.
    #[must_use]
    pub fn surface(&self) -> &Arc<dyn Surface> {
        &self.surface
    }

    /// Record the key of an object already on the surface, then reorder.
    pub fn register(&self, id: ObjectId, priority: Option<i32>, sequence: u64) {
        let key = StackKey::new(priority.unwrap_or(0), sequence);
        tracing::debug!(object = %id, priority = key.priority, sequence, "Registering object");
        self.lock().insert(id, key);
        self.reorder();
    }

    /// Drop the key of a removed object. Returns the key it had.
    pub fn forget(&self, id: ObjectId) -> Option<StackKey> {
        self.lock().remove(&id)
    }

    /// Key recorded for an object.
    #[must_use]
    pub fn key_of(&self, id: ObjectId) -> Option<StackKey> {
        self.lock().get(&id).copied()
    }

    /// Number of tracked objects.
    #[must_use]
    pub fn tracked(&self) -> usize {
        self.lock().len()
    }

    /// Sort the surface's objects by ascending key and request a repaint.
    ///
    /// Objects without a key are adopted as `(0, index)` with the index at
    /// which they are first seen, so repeated calls leave the order unchanged.
    /// Keys of objects that have left the surface are pruned.
    pub fn reorder(&self) {
        let mut keys = self.lock();
        let objects = self.surface.objects();

        let present: HashSet<ObjectId> = objects.iter().map(|o| o.id()).collect();
        keys.retain(|id, _| present.contains(id));

        let mut ranked: Vec<(StackKey, ObjectId)> = objects
            .iter()
            .enumerate()
            .map(|(index, object)| {
                let key = *keys
                    .entry(object.id())
                    .or_insert_with(|| StackKey::new(0, index as u64));
                (key, object.id())
            })
            .collect();
        // Stable: equal keys keep their current relative order.
        ranked.sort_by_key(|(key, _)| *key);

        let mut moved = 0usize;
        for (target, ((_, id), current)) in ranked.iter().zip(objects.iter()).enumerate() {
            if *id != current.id() || moved > 0 {
                if self.surface.move_to(*id, target) {
                    moved += 1;
                }
                tracing::trace!(object = %id, index = target, "Moved object");
            }
        }
        drop(keys);

        if moved > 0 {
            tracing::debug!(moved, total = objects.len(), "Reordered surface");
        }
        self.surface.request_render();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<ObjectId, StackKey>> {
        self.keys.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for StackOrderReconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StackOrderReconciler")
            .field("tracked", &self.tracked())
            .finish_non_exhaustive()
    }
}
