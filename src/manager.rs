use std::{sync::Arc, time::Duration};

use rand::{thread_rng, Rng};

use crate::{
    configuration_fetcher::{ConfigurationFetcher, ConfigurationFetcherConfig, DocumentSource},
    engine::EvaluationEngine,
    engine_slot::EngineSlot,
    refresh_loop::RefreshLoop,
    refresh_thread::{RefreshThread, RefreshThreadConfig},
    Attributes, ConfigurationDocument, Error, ManagerConfig, Result,
};

const UNINITIALIZED_MESSAGE: &str = "is_feature_enabled called before the first configuration document was fetched. \
If the application just started, try again later, create the manager earlier during startup, \
or call FlagManager::wait_for_configuration() before evaluating flags";

/// Evaluates feature flags against whichever engine is currently active.
///
/// A background thread refreshes the configuration document and swaps in a new engine whenever
/// the document changes. Evaluation never blocks on the refresh thread.
///
/// # Uninitialized state
///
/// Until the first document is fetched there is no engine. Evaluations made in that window return
/// `Ok(false)`, unless [`ManagerConfig::strict_uninitialized`] is enabled, in which case they
/// return [`Error::Uninitialized`].
///
/// # Examples
/// ```no_run
/// # use datafile_manager::ManagerConfig;
/// let manager = ManagerConfig::from_source_key("source-key").to_manager().unwrap();
/// manager.wait_for_configuration().unwrap();
///
/// let enabled = manager
///     .is_feature_enabled("sale_price", "user-id", None)
///     .unwrap_or(false);
/// ```
pub struct FlagManager {
    source_key: String,
    strict_uninitialized: bool,
    slot: Arc<EngineSlot>,
    refresh_thread: Option<RefreshThread>,
}

impl FlagManager {
    /// Create a new `FlagManager` and start its refresh thread.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidBaseUrl`] if the base URL cannot be parsed.
    /// - [`Error::Io`] if the refresh thread failed to start.
    pub fn new(config: ManagerConfig) -> Result<FlagManager> {
        let source: Box<dyn DocumentSource> = match config.document_source {
            Some(source) => source,
            None => Box::new(ConfigurationFetcher::new(ConfigurationFetcherConfig {
                base_url: config.base_url,
                source_key: config.source_key.clone(),
                timeout: config.fetch_timeout,
            })?),
        };

        let slot = Arc::new(EngineSlot::new());
        let refresh_loop = RefreshLoop::new(
            source,
            config.engine_factory,
            config.engine_options,
            slot.clone(),
        );
        let refresh_thread = RefreshThread::start(
            refresh_loop,
            RefreshThreadConfig {
                interval: config.refresh_interval,
                jitter: config.refresh_jitter,
            },
        )?;

        log::debug!(target: "datafile_manager", source_key:display = config.source_key; "started flag manager");

        Ok(FlagManager {
            source_key: config.source_key,
            strict_uninitialized: config.strict_uninitialized,
            slot,
            refresh_thread: Some(refresh_thread),
        })
    }

    #[cfg(test)]
    fn new_with_slot(slot: Arc<EngineSlot>, strict_uninitialized: bool) -> Self {
        FlagManager {
            source_key: "test".to_owned(),
            strict_uninitialized,
            slot,
            refresh_thread: None,
        }
    }

    /// The source key this manager was created with.
    pub fn source_key(&self) -> &str {
        &self.source_key
    }

    /// Returns whether `flag_key` is enabled for the user.
    ///
    /// The result of the active engine is returned unchanged.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Uninitialized`] only if no configuration document has been fetched yet
    /// and strict mode is enabled. Refresh failures never surface here: the previously active
    /// engine keeps serving.
    pub fn is_feature_enabled(
        &self,
        flag_key: &str,
        user_id: &str,
        attributes: Option<&Attributes>,
    ) -> Result<bool> {
        let Some(active) = self.slot.get() else {
            return self.uninitialized(flag_key, user_id);
        };

        let empty = Attributes::new();
        let attributes = attributes.unwrap_or(&empty);
        let enabled = active
            .engine()
            .is_feature_enabled(flag_key, user_id, attributes);

        log::trace!(target: "datafile_manager",
                    flag_key,
                    user_id,
                    attributes:serde = attributes,
                    enabled;
                    "evaluated a flag");

        Ok(enabled)
    }

    /// Same as [`FlagManager::is_feature_enabled`] for a caller that has no user id. A random
    /// user id is generated for the evaluation.
    pub fn is_feature_enabled_anonymous(&self, flag_key: &str) -> Result<bool> {
        let user_id = thread_rng().gen::<u64>().to_string();
        log::debug!(target: "datafile_manager",
                    flag_key,
                    user_id:display = user_id;
                    "no user id supplied, using a random one");
        self.is_feature_enabled(flag_key, &user_id, None)
    }

    /// Returns keys of all flags enabled for the user.
    ///
    /// Follows the same uninitialized-state policy as [`FlagManager::is_feature_enabled`].
    pub fn enabled_features(
        &self,
        user_id: &str,
        attributes: Option<&Attributes>,
    ) -> Result<Vec<String>> {
        let Some(active) = self.slot.get() else {
            return self.uninitialized("*", user_id).map(|_| Vec::new());
        };
        Ok(active
            .engine()
            .enabled_features(user_id, attributes.unwrap_or(&Attributes::new())))
    }

    /// Currently active engine, or `None` before the first configuration document is fetched.
    ///
    /// The returned engine is a snapshot; later refreshes do not affect it.
    pub fn get_engine(&self) -> Option<Arc<dyn EvaluationEngine>> {
        self.slot.get().map(|active| active.engine().clone())
    }

    /// The document the active engine was built from.
    pub fn active_document(&self) -> Option<Arc<ConfigurationDocument>> {
        self.slot.get().map(|active| active.document().clone())
    }

    /// Block until the first configuration document is fetched and an engine is active.
    ///
    /// # Errors
    ///
    /// - [`Error::Stopped`] if the manager was stopped before any engine became active.
    /// - [`Error::RefreshThreadPanicked`] if the refresh thread died first.
    pub fn wait_for_configuration(&self) -> Result<()> {
        match &self.refresh_thread {
            Some(thread) => thread.wait_for_configuration(),
            None => Ok(()),
        }
    }

    /// Like [`FlagManager::wait_for_configuration`], giving up after `timeout`. Returns
    /// `Ok(false)` if no engine became active in time.
    pub fn wait_for_configuration_timeout(&self, timeout: Duration) -> Result<bool> {
        match &self.refresh_thread {
            Some(thread) => thread.wait_for_configuration_timeout(timeout),
            None => Ok(self.slot.get().is_some()),
        }
    }

    /// Stop refreshing. The active engine keeps serving.
    ///
    /// This function does not wait for the refresh thread to exit.
    pub fn stop(&self) {
        if let Some(thread) = &self.refresh_thread {
            thread.stop();
        }
    }

    /// Stop refreshing and block until the refresh thread exits.
    pub fn shutdown(&self) -> Result<()> {
        match &self.refresh_thread {
            Some(thread) => thread.shutdown(),
            None => Ok(()),
        }
    }

    fn uninitialized(&self, flag_key: &str, user_id: &str) -> Result<bool> {
        if self.strict_uninitialized {
            return Err(Error::Uninitialized);
        }
        log::debug!(target: "datafile_manager", flag_key, user_id; "{UNINITIALIZED_MESSAGE}");
        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use std::{collections::HashMap, sync::Arc};

    use serde_json::json;

    use super::FlagManager;
    use crate::{
        datafile::DatafileEngine,
        engine_slot::{ActiveEngine, EngineSlot},
        Attributes, ConfigurationDocument, Error,
    };

    fn publish(slot: &EngineSlot, content: serde_json::Value) {
        let document = ConfigurationDocument::new(content);
        let engine = Arc::new(DatafileEngine::from_document(&document).unwrap());
        slot.publish(ActiveEngine::new(engine, document));
    }

    #[test]
    fn returns_false_while_no_configuration() {
        let manager = FlagManager::new_with_slot(Arc::new(EngineSlot::new()), false);

        for flag_key in ["sale_price", "anything", ""] {
            assert!(!manager.is_feature_enabled(flag_key, "u1", None).unwrap());
        }
        assert!(!manager.is_feature_enabled_anonymous("sale_price").unwrap());
        assert!(manager.enabled_features("u1", None).unwrap().is_empty());
        assert!(manager.get_engine().is_none());
    }

    #[test]
    fn strict_mode_fails_while_no_configuration() {
        let manager = FlagManager::new_with_slot(Arc::new(EngineSlot::new()), true);

        assert!(matches!(
            manager.is_feature_enabled("sale_price", "u1", None),
            Err(Error::Uninitialized)
        ));
        assert!(matches!(
            manager.enabled_features("u1", None),
            Err(Error::Uninitialized)
        ));
    }

    #[test]
    fn strict_mode_evaluates_once_configured() {
        let slot = Arc::new(EngineSlot::new());
        let manager = FlagManager::new_with_slot(slot.clone(), true);
        publish(&slot, json!({"flags": {"sale_price": {"enabled": true}}}));

        assert!(manager.is_feature_enabled("sale_price", "u1", None).unwrap());
    }

    #[test]
    fn follows_engine_swaps() {
        let slot = Arc::new(EngineSlot::new());
        let manager = FlagManager::new_with_slot(slot.clone(), false);

        publish(&slot, json!({"flags": {"sale_price": {"enabled": false}}}));
        assert!(!manager.is_feature_enabled("sale_price", "u1", None).unwrap());
        let old_engine = manager.get_engine().unwrap();

        publish(&slot, json!({"flags": {"sale_price": {"enabled": true}}}));
        assert!(manager.is_feature_enabled("sale_price", "u1", None).unwrap());

        // Engines obtained earlier keep answering from their own document.
        assert!(!old_engine.is_feature_enabled("sale_price", "u1", &HashMap::new()));
        assert_eq!(
            *manager.active_document().unwrap(),
            ConfigurationDocument::new(json!({"flags": {"sale_price": {"enabled": true}}}))
        );
    }

    #[test]
    fn passes_attributes_to_engine() {
        let slot = Arc::new(EngineSlot::new());
        let manager = FlagManager::new_with_slot(slot.clone(), false);
        publish(
            &slot,
            json!({"flags": {"beta": {
                "enabled": true,
                "rules": [{"conditions": [{"attribute": "plan", "operator": "ONE_OF", "value": ["pro"]}]}]
            }}}),
        );

        let pro: Attributes = HashMap::from([("plan".to_owned(), "pro".into())]);
        assert!(manager.is_feature_enabled("beta", "u1", Some(&pro)).unwrap());
        assert!(!manager.is_feature_enabled("beta", "u1", None).unwrap());
        assert_eq!(manager.enabled_features("u1", Some(&pro)).unwrap(), vec!["beta"]);
    }

    #[test]
    fn wait_without_refresh_thread_reports_slot_state() {
        let slot = Arc::new(EngineSlot::new());
        let manager = FlagManager::new_with_slot(slot.clone(), false);
        assert!(!manager
            .wait_for_configuration_timeout(std::time::Duration::from_millis(1))
            .unwrap());

        publish(&slot, json!({"flags": {}}));
        assert!(manager
            .wait_for_configuration_timeout(std::time::Duration::from_millis(1))
            .unwrap());

        slot.clear();
        assert!(manager.get_engine().is_none());
    }
}
