//! The process-wide [`FlagManager`].
//!
//! The first successful [`get_or_create`] call constructs the manager; later calls return the same
//! instance and ignore their configuration, including a different source key. [`reset`] tears the
//! instance down so the next call constructs a fresh one.
use std::sync::{Arc, PoisonError, RwLock};

use crate::{FlagManager, ManagerConfig, Result};

static INSTANCE: RwLock<Option<Arc<FlagManager>>> = RwLock::new(None);

/// Returns the process-wide manager, creating it from `config` on the first call.
///
/// # Errors
///
/// Fails only if no manager exists yet and creating one fails. A failed call leaves no instance
/// behind, so a later call can try again.
pub fn get_or_create(config: ManagerConfig) -> Result<Arc<FlagManager>> {
    if let Some(existing) = instance() {
        ignore_config(&existing, &config);
        return Ok(existing);
    }

    let mut instance = INSTANCE.write().unwrap_or_else(PoisonError::into_inner);
    // Another thread may have won the race between the read above and this write.
    if let Some(existing) = &*instance {
        ignore_config(existing, &config);
        return Ok(existing.clone());
    }

    let manager = Arc::new(FlagManager::new(config)?);
    *instance = Some(manager.clone());
    Ok(manager)
}

/// Returns the process-wide manager if it has been created.
pub fn instance() -> Option<Arc<FlagManager>> {
    INSTANCE
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .clone()
}

/// Drop the process-wide manager and stop its refresh thread.
///
/// Clones handed out earlier keep evaluating against their last engine but no longer refresh.
pub fn reset() -> Result<()> {
    // minimizing the scope of holding the write lock
    let existing = INSTANCE
        .write()
        .unwrap_or_else(PoisonError::into_inner)
        .take();
    match existing {
        Some(existing) => existing.shutdown(),
        None => Ok(()),
    }
}

fn ignore_config(existing: &FlagManager, config: &ManagerConfig) {
    if existing.source_key() != config.source_key() {
        log::debug!(target: "datafile_manager",
                    source_key:display = existing.source_key(),
                    ignored_source_key:display = config.source_key();
                    "flag manager already created, ignoring configuration");
    }
}
