//! Keeps a remotely fetched feature flag datafile fresh and evaluates flags against it.
//!
//! # Overview
//!
//! A [`FlagManager`] periodically fetches a [`ConfigurationDocument`] from a remote endpoint. When
//! the document differs from the active one, an [`EvaluationEngine`](engine::EvaluationEngine) is
//! built from it by an [`EngineFactory`](engine::EngineFactory) and swapped in atomically. Flag
//! evaluation always reads the engine that is active at call time and never waits for a refresh.
//!
//! Fetch and build failures are logged and otherwise ignored: the previous engine keeps serving
//! (stale configuration is preferred over disruption).
//!
//! Use [`ManagerConfig::to_manager`] for an independent manager or [`global::get_or_create`] for
//! one shared by the whole process.
//!
//! # Error Handling
//!
//! Errors are represented by the [`Error`] enum. Flag evaluation can only fail with
//! [`Error::Uninitialized`], and only in strict mode (see
//! [`ManagerConfig::strict_uninitialized`]). By default, evaluations made before the first
//! document is fetched return `false`.
//!
//! # Logging
//!
//! The crate uses the [`log`](https://docs.rs/log/latest/log/) crate with the `datafile_manager`
//! target. Consider integrating a `log`-compatible logger implementation for better visibility
//! into refresh cycles.

#![warn(rustdoc::missing_crate_level_docs)]

pub mod configuration_fetcher;
pub mod datafile;
pub mod engine;
pub mod global;

mod attributes;
mod change_detector;
mod config;
mod document;
mod engine_slot;
mod error;
mod manager;
mod refresh_loop;
mod refresh_thread;
mod rules;
mod sharder;

pub use attributes::{AttributeValue, Attributes};
pub use change_detector::has_changed;
pub use config::ManagerConfig;
pub use document::ConfigurationDocument;
pub use error::{EngineBuildError, Error, FetchError, Result};
pub use manager::FlagManager;
