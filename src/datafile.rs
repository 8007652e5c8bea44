//! Built-in evaluation engine for the flag datafile format.
//!
//! ```json
//! { "flags": { "sale_price": { "enabled": true, "rolloutPercentage": 50, "rules": [] } } }
//! ```
//!
//! A flag is enabled for a user when the flag is enabled, the user matches at least one rule (if
//! any rules are present), and the user falls inside the rollout percentage.
use std::{collections::HashMap, sync::Arc};

use serde::{Deserialize, Serialize};

use crate::{
    engine::{EngineFactory, EngineOptions, EvaluationEngine},
    rules::Rule,
    sharder::{Md5Sharder, Sharder},
    Attributes, ConfigurationDocument, EngineBuildError,
};

const TOTAL_SHARDS: u64 = 10_000;

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct Datafile {
    flags: HashMap<String, FeatureFlag>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct FeatureFlag {
    enabled: bool,
    #[serde(default = "default_rollout_percentage")]
    rollout_percentage: f64,
    #[serde(default)]
    rules: Vec<Rule>,
}

fn default_rollout_percentage() -> f64 {
    100.0
}

impl FeatureFlag {
    fn eval(
        &self,
        flag_key: &str,
        user_id: &str,
        attributes: &Attributes,
        sharder: &impl Sharder,
    ) -> bool {
        if !self.enabled {
            return false;
        }

        if !self.rules.is_empty() {
            // Augmenting attributes with id, so that user_id can be used in the rules.
            let mut augmented = attributes.clone();
            augmented
                .entry("id".into())
                .or_insert_with(|| user_id.into());

            if !self.rules.iter().any(|rule| rule.eval(&augmented)) {
                return false;
            }
        }

        let shard = sharder.get_shard(&format!("{flag_key}-{user_id}"), TOTAL_SHARDS);
        (shard as f64) < self.rollout_percentage * (TOTAL_SHARDS as f64 / 100.0)
    }
}

/// Engine answering queries from one parsed datafile.
#[derive(Debug)]
pub struct DatafileEngine {
    datafile: Datafile,
}

impl DatafileEngine {
    /// Parse and validate a document.
    pub fn from_document(document: &ConfigurationDocument) -> Result<Self, EngineBuildError> {
        let datafile: Datafile = document.deserialize()?;

        for (key, flag) in &datafile.flags {
            if !(0.0..=100.0).contains(&flag.rollout_percentage) {
                return Err(EngineBuildError::new(format!(
                    "flag {key:?} has rolloutPercentage {} outside of 0..=100",
                    flag.rollout_percentage
                )));
            }
        }

        Ok(DatafileEngine { datafile })
    }

    fn eval_with(
        &self,
        flag_key: &str,
        user_id: &str,
        attributes: &Attributes,
        sharder: &impl Sharder,
    ) -> bool {
        let Some(flag) = self.datafile.flags.get(flag_key) else {
            log::debug!(target: "datafile_manager", flag_key, user_id; "flag not found in datafile");
            return false;
        };
        flag.eval(flag_key, user_id, attributes, sharder)
    }
}

impl EvaluationEngine for DatafileEngine {
    fn is_feature_enabled(&self, flag_key: &str, user_id: &str, attributes: &Attributes) -> bool {
        self.eval_with(flag_key, user_id, attributes, &Md5Sharder)
    }

    fn enabled_features(&self, user_id: &str, attributes: &Attributes) -> Vec<String> {
        let mut keys: Vec<String> = self
            .datafile
            .flags
            .iter()
            .filter(|(key, flag)| flag.eval(key, user_id, attributes, &Md5Sharder))
            .map(|(key, _)| key.clone())
            .collect();
        keys.sort();
        keys
    }
}

/// Default [`EngineFactory`] producing a [`DatafileEngine`]. Auxiliary options are ignored.
#[derive(Debug, Default, Clone, Copy)]
pub struct DatafileEngineFactory;

impl EngineFactory for DatafileEngineFactory {
    fn build(
        &self,
        document: &ConfigurationDocument,
        _options: &EngineOptions,
    ) -> Result<Arc<dyn EvaluationEngine>, EngineBuildError> {
        Ok(Arc::new(DatafileEngine::from_document(document)?))
    }
}
