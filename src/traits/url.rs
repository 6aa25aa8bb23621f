use async_trait::async_trait;

use crate::traits::error::{Result, SocketError};
use crate::traits::retry::RetryInfo;

/// Trait for building the final connection URL
///
/// When configured, this replaces the default composition (resolved query
/// parameters appended to the configured URL) with caller-defined logic.
/// The provider receives the configured URL, the resolved parameters and
/// the retry metadata, and returns the URL handed to the connector.
#[async_trait]
pub trait UrlProvider: Send + Sync {
    /// Build the URL for the next connection attempt
    async fn resolve(
        &self,
        configured: &str,
        params: &[(String, String)],
        retry: &RetryInfo,
    ) -> Result<String>;
}

/// Append query parameters to a URL, preserving any existing query string
///
/// Keys and values are percent-encoded; pairs are merged after an existing
/// query with `&`. An empty parameter list returns the URL unchanged.
pub fn compose_url(base: &str, params: &[(String, String)]) -> Result<String> {
    if params.is_empty() {
        return Ok(base.to_string());
    }

    let mut url = url::Url::parse(base).map_err(|e| SocketError::InvalidUrl(e.to_string()))?;
    url.query_pairs_mut()
        .extend_pairs(params.iter().map(|(k, v)| (k.as_str(), v.as_str())));
    Ok(String::from(url))
}
