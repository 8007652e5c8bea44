//! Seams to the evaluation library: [`EvaluationEngine`] answers flag queries and
//! [`EngineFactory`] builds one from a [`ConfigurationDocument`].
use std::sync::Arc;

use serde_json::{Map, Value};

use crate::{Attributes, ConfigurationDocument, EngineBuildError};

/// Auxiliary options handed unchanged to [`EngineFactory::build`].
pub type EngineOptions = Map<String, Value>;

/// An immutable evaluation engine built from exactly one configuration document.
///
/// Engines are shared between concurrent evaluation calls, so they must not change once built.
pub trait EvaluationEngine: Send + Sync {
    /// Returns whether `flag_key` is enabled for the user.
    fn is_feature_enabled(&self, flag_key: &str, user_id: &str, attributes: &Attributes) -> bool;

    /// Returns keys of all flags enabled for the user.
    fn enabled_features(&self, _user_id: &str, _attributes: &Attributes) -> Vec<String> {
        Vec::new()
    }
}

/// Builds evaluation engines from configuration documents.
pub trait EngineFactory: Send + Sync {
    fn build(
        &self,
        document: &ConfigurationDocument,
        options: &EngineOptions,
    ) -> Result<Arc<dyn EvaluationEngine>, EngineBuildError>;
}

impl<F> EngineFactory for F
where
    F: Fn(&ConfigurationDocument, &EngineOptions) -> Result<Arc<dyn EvaluationEngine>, EngineBuildError>
        + Send
        + Sync,
{
    fn build(
        &self,
        document: &ConfigurationDocument,
        options: &EngineOptions,
    ) -> Result<Arc<dyn EvaluationEngine>, EngineBuildError> {
        self(document, options)
    }
}
