//! Set of sectors with an active attempt.

use crate::types::SectorId;
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};

/// Sectors currently owned by a pipeline attempt
///
/// A sector enters when intake accepts it and leaves when its attempt chain
/// finishes (success or abandonment). Cloning shares the same set. The lock is
/// only held for the set operation itself.
#[derive(Clone, Debug, Default)]
pub struct InFlightSet {
    inner: Arc<Mutex<HashSet<SectorId>>>,
}

impl InFlightSet {
    /// Create an empty set
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashSet<SectorId>> {
        // A panic while holding the lock cannot leave a HashSet half-updated
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Claim `id`; returns false if another attempt already holds it
    pub fn try_insert(&self, id: SectorId) -> bool {
        self.lock().insert(id)
    }

    /// Release `id`; returns false if it was not held
    pub fn remove(&self, id: SectorId) -> bool {
        self.lock().remove(&id)
    }

    /// Whether an attempt for `id` is active
    pub fn contains(&self, id: SectorId) -> bool {
        self.lock().contains(&id)
    }

    /// Number of active sectors
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// True when no sector is active
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}
