//! An HTTP client that fetches the configuration document from the server.
use std::time::Duration;

use reqwest::Url;

use crate::{ConfigurationDocument, Error, FetchError};

/// A source of configuration documents.
///
/// Each call performs exactly one fetch. Retries are the refresh loop's concern.
pub trait DocumentSource: Send {
    fn fetch(&mut self) -> Result<ConfigurationDocument, FetchError>;
}

impl<F> DocumentSource for F
where
    F: FnMut() -> Result<ConfigurationDocument, FetchError> + Send,
{
    fn fetch(&mut self) -> Result<ConfigurationDocument, FetchError> {
        self()
    }
}

/// Settings for [`ConfigurationFetcher`].
pub struct ConfigurationFetcherConfig {
    /// Base URL the document path is appended to.
    pub base_url: String,
    /// Identifies the document to fetch.
    pub source_key: String,
    /// Upper bound for one request, so a stalled connection cannot hold up the refresh cadence.
    pub timeout: Duration,
}

/// A client that fetches the configuration document from `{base_url}/{source_key}.json`.
pub struct ConfigurationFetcher {
    // Client holds a connection pool internally, so we're reusing the client between requests.
    client: reqwest::blocking::Client,
    url: Url,
}

impl ConfigurationFetcher {
    /// Create a fetcher.
    ///
    /// Must not be called from within an async runtime, as the underlying blocking client spins
    /// up its own.
    pub fn new(config: ConfigurationFetcherConfig) -> Result<ConfigurationFetcher, Error> {
        let url = document_url(&config.base_url, &config.source_key)?;

        let client = reqwest::blocking::Client::builder()
            .timeout(config.timeout)
            .user_agent(concat!("datafile-manager/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(FetchError::from)?;

        Ok(ConfigurationFetcher { client, url })
    }
}

impl DocumentSource for ConfigurationFetcher {
    fn fetch(&mut self) -> Result<ConfigurationDocument, FetchError> {
        log::debug!(target: "datafile_manager", url:display = self.url; "fetching configuration document");
        let response = self.client.get(self.url.clone()).send()?;

        let status = response.status();
        if !status.is_success() {
            if matches!(status.as_u16(), 401 | 403 | 404) {
                log::warn!(target: "datafile_manager", "configuration document not accessible ({status}). Check your source key");
            }
            return Err(FetchError::Status(status.as_u16()));
        }

        let body = response.bytes()?;
        let document = ConfigurationDocument::from_slice(&body)?;

        log::debug!(target: "datafile_manager", "successfully fetched configuration document");

        Ok(document)
    }
}

fn document_url(base_url: &str, source_key: &str) -> Result<Url, Error> {
    let mut url = Url::parse(base_url).map_err(Error::InvalidBaseUrl)?;
    url.path_segments_mut()
        .map_err(|()| Error::InvalidBaseUrl(url::ParseError::RelativeUrlWithCannotBeABaseBase))?
        .pop_if_empty()
        .push(&format!("{source_key}.json"));
    Ok(url)
}
