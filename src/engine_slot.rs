//! A thread-safe slot holding the currently active engine together with the document it was built
//! from. The refresh loop is the only writer; evaluation calls are readers.
use std::sync::{Arc, PoisonError, RwLock};

use crate::{engine::EvaluationEngine, ConfigurationDocument};

/// An engine paired with the document it was built from.
///
/// The pair is published as one value, so no reader can observe an engine next to a document it
/// was not built from.
pub struct ActiveEngine {
    engine: Arc<dyn EvaluationEngine>,
    document: Arc<ConfigurationDocument>,
}

impl ActiveEngine {
    pub(crate) fn new(engine: Arc<dyn EvaluationEngine>, document: ConfigurationDocument) -> Self {
        ActiveEngine {
            engine,
            document: Arc::new(document),
        }
    }

    pub fn engine(&self) -> &Arc<dyn EvaluationEngine> {
        &self.engine
    }

    pub fn document(&self) -> &Arc<ConfigurationDocument> {
        &self.document
    }
}

/// `EngineSlot` is either empty (no document fetched yet) or holds the active engine.
///
/// Readers get a snapshot that is not affected by further writes.
#[derive(Default)]
pub(crate) struct EngineSlot {
    active: RwLock<Option<Arc<ActiveEngine>>>,
}

impl EngineSlot {
    pub fn new() -> Self {
        EngineSlot::default()
    }

    /// Get the currently active engine. Returns `None` before the first publish.
    pub fn get(&self) -> Option<Arc<ActiveEngine>> {
        // The guarded value is a single pointer that is replaced whole, so a poisoned lock still
        // holds a consistent value.
        let active = self.active.read().unwrap_or_else(PoisonError::into_inner);
        active.clone()
    }

    /// Publish a new engine, returning the previous one.
    pub fn publish(&self, active: ActiveEngine) -> Option<Arc<ActiveEngine>> {
        // Constructing new value before requesting the lock to minimize lock span.
        let new_value = Some(Arc::new(active));

        let mut slot = self.active.write().unwrap_or_else(PoisonError::into_inner);
        std::mem::replace(&mut *slot, new_value)
    }

    /// Forget the active engine.
    #[cfg(test)]
    pub fn clear(&self) {
        *self.active.write().unwrap_or_else(PoisonError::into_inner) = None;
    }
}
