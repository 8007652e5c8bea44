//! One refresh cycle: fetch, compare, build, publish.
use std::sync::Arc;

use crate::{
    change_detector::has_changed,
    configuration_fetcher::DocumentSource,
    engine::{EngineFactory, EngineOptions},
    engine_slot::{ActiveEngine, EngineSlot},
    Result,
};

/// Result of a successful refresh cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RefreshOutcome {
    /// The fetched document matches the active one; nothing was rebuilt.
    Unchanged,
    /// A new engine was built and published.
    Updated,
}

/// The sole writer of an [`EngineSlot`].
pub(crate) struct RefreshLoop {
    source: Box<dyn DocumentSource>,
    factory: Arc<dyn EngineFactory>,
    options: EngineOptions,
    slot: Arc<EngineSlot>,
}

impl RefreshLoop {
    pub fn new(
        source: Box<dyn DocumentSource>,
        factory: Arc<dyn EngineFactory>,
        options: EngineOptions,
        slot: Arc<EngineSlot>,
    ) -> RefreshLoop {
        RefreshLoop {
            source,
            factory,
            options,
            slot,
        }
    }

    /// Run one cycle.
    ///
    /// On error the slot is left untouched and the previously active engine keeps serving.
    pub fn refresh(&mut self) -> Result<RefreshOutcome> {
        let candidate = self.source.fetch()?;

        let active = self.slot.get();
        if !has_changed(active.as_ref().map(|active| &**active.document()), &candidate) {
            log::trace!(target: "datafile_manager", "configuration document unchanged");
            return Ok(RefreshOutcome::Unchanged);
        }

        log::debug!(target: "datafile_manager",
                    first = active.is_none();
                    "received an updated configuration document, rebuilding engine");

        // Build fully before touching the slot. Readers keep the old engine meanwhile.
        let engine = self.factory.build(&candidate, &self.options)?;
        self.slot.publish(ActiveEngine::new(engine, candidate));

        log::debug!(target: "datafile_manager", "published new evaluation engine");

        Ok(RefreshOutcome::Updated)
    }
}
