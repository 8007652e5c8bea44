//! The remote configuration document, as fetched.
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde_json::Value;

/// A fetched configuration document.
///
/// The document is immutable once fetched. Equality compares the JSON content only: fetch
/// timestamps are ignored, and object key order never matters.
#[derive(Debug, Clone)]
pub struct ConfigurationDocument {
    content: Value,
    /// Timestamp when the document was fetched.
    fetched_at: DateTime<Utc>,
}

impl ConfigurationDocument {
    /// Wrap an already-parsed JSON value.
    pub fn new(content: Value) -> ConfigurationDocument {
        ConfigurationDocument {
            content,
            fetched_at: Utc::now(),
        }
    }

    /// Parse a document from a raw response body.
    pub fn from_slice(bytes: &[u8]) -> serde_json::Result<ConfigurationDocument> {
        Ok(ConfigurationDocument::new(serde_json::from_slice(bytes)?))
    }

    /// The parsed JSON content.
    pub fn content(&self) -> &Value {
        &self.content
    }

    /// When the document was fetched. Not part of equality.
    pub fn fetched_at(&self) -> DateTime<Utc> {
        self.fetched_at
    }

    /// Deserialize the document into a typed model.
    pub fn deserialize<T: DeserializeOwned>(&self) -> serde_json::Result<T> {
        T::deserialize(&self.content)
    }
}

impl PartialEq for ConfigurationDocument {
    fn eq(&self, other: &Self) -> bool {
        self.content == other.content
    }
}

impl From<Value> for ConfigurationDocument {
    fn from(value: Value) -> Self {
        ConfigurationDocument::new(value)
    }
}
