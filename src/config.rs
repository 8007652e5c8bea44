use std::{sync::Arc, time::Duration};

use serde_json::Value;

use crate::{
    configuration_fetcher::DocumentSource,
    datafile::DatafileEngineFactory,
    engine::{EngineFactory, EngineOptions},
    FlagManager, Result,
};

/// Configuration for [`FlagManager`].
///
/// # Examples
/// ```no_run
/// # use std::time::Duration;
/// # use datafile_manager::ManagerConfig;
/// let manager = ManagerConfig::from_source_key("source-key")
///     .strict_uninitialized(true)
///     .refresh_interval(Duration::from_secs(5))
///     .engine_option("skipJsonValidation", true)
///     .to_manager()
///     .unwrap();
/// ```
pub struct ManagerConfig {
    pub(crate) source_key: String,
    pub(crate) base_url: String,
    pub(crate) strict_uninitialized: bool,
    pub(crate) refresh_interval: Duration,
    pub(crate) refresh_jitter: Duration,
    pub(crate) fetch_timeout: Duration,
    pub(crate) engine_factory: Arc<dyn EngineFactory>,
    pub(crate) engine_options: EngineOptions,
    pub(crate) document_source: Option<Box<dyn DocumentSource>>,
}

impl ManagerConfig {
    /// Default base URL for configuration documents.
    pub const DEFAULT_BASE_URL: &'static str = "https://cdn.optimizely.com/datafiles";

    /// Default value for [`ManagerConfig::refresh_interval`].
    pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(1);

    /// Default value for [`ManagerConfig::fetch_timeout`].
    pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(10);

    /// Create a default configuration for the given source key.
    ///
    /// ```
    /// # use datafile_manager::ManagerConfig;
    /// ManagerConfig::from_source_key("source-key");
    /// ```
    pub fn from_source_key(source_key: impl Into<String>) -> Self {
        ManagerConfig {
            source_key: source_key.into(),
            base_url: ManagerConfig::DEFAULT_BASE_URL.to_owned(),
            strict_uninitialized: false,
            refresh_interval: ManagerConfig::DEFAULT_REFRESH_INTERVAL,
            refresh_jitter: Duration::ZERO,
            fetch_timeout: ManagerConfig::DEFAULT_FETCH_TIMEOUT,
            engine_factory: Arc::new(DatafileEngineFactory),
            engine_options: EngineOptions::new(),
            document_source: None,
        }
    }

    pub fn source_key(&self) -> &str {
        &self.source_key
    }

    /// Override base URL. The document is fetched from `{base_url}/{source_key}.json`.
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Fail evaluations made before the first document is fetched with
    /// [`Error::Uninitialized`](crate::Error::Uninitialized) instead of returning `false`.
    pub fn strict_uninitialized(mut self, strict: bool) -> Self {
        self.strict_uninitialized = strict;
        self
    }

    /// Interval to wait between refresh cycles.
    pub fn refresh_interval(mut self, interval: Duration) -> Self {
        self.refresh_interval = interval;
        self
    }

    /// Random amount subtracted from each wait between refresh cycles. Defaults to zero.
    pub fn refresh_jitter(mut self, jitter: Duration) -> Self {
        self.refresh_jitter = jitter;
        self
    }

    /// Upper bound for a single HTTP fetch.
    pub fn fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    /// Replace the engine library used to build evaluation engines.
    pub fn engine_factory(mut self, engine_factory: impl EngineFactory + 'static) -> Self {
        self.engine_factory = Arc::new(engine_factory);
        self
    }

    /// Add an auxiliary option passed through to the engine factory.
    pub fn engine_option(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.engine_options.insert(key.into(), value.into());
        self
    }

    /// Fetch documents from `source` instead of over HTTP.
    pub fn document_source(mut self, source: impl DocumentSource + 'static) -> Self {
        self.document_source = Some(Box::new(source));
        self
    }

    /// Create a new [`FlagManager`] and start refreshing.
    ///
    /// This creates an independent manager. Use [`crate::global::get_or_create`] for the
    /// process-wide one.
    pub fn to_manager(self) -> Result<FlagManager> {
        FlagManager::new(self)
    }
}
