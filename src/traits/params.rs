use async_trait::async_trait;

use crate::traits::error::Result;
use crate::traits::retry::RetryInfo;

/// Query parameters resolved for one connection attempt
pub type QueryParams = Vec<(String, String)>;

/// Trait for resolving query parameters before each connection attempt
///
/// This is called at the start of every attempt (including reconnections),
/// allowing fresh credentials, tokens or nonces to be injected into the
/// connection URL. Resolution is raced against the socket's
/// `params_timeout`; on timeout the attempt fails and the retry machinery
/// takes over.
///
/// Returning [`SocketError::StopRetry`] ends the socket permanently
/// instead of failing just the attempt.
///
/// # Example
/// ```ignore
/// struct TokenQuery {
///     auth: AuthClient,
/// }
///
/// #[async_trait::async_trait]
/// impl QueryProvider for TokenQuery {
///     async fn query_params(&self, retry: &RetryInfo) -> Result<QueryParams> {
///         let token = self.auth.fresh_token().await
///             .map_err(|e| SocketError::Params(e.to_string()))?;
///         Ok(vec![
///             ("token".to_string(), token),
///             ("attempt".to_string(), retry.retry_count.to_string()),
///         ])
///     }
/// }
/// ```
///
/// [`SocketError::StopRetry`]: crate::traits::error::SocketError::StopRetry
#[async_trait]
pub trait QueryProvider: Send + Sync {
    /// Resolve the query parameters for the next attempt
    async fn query_params(&self, retry: &RetryInfo) -> Result<QueryParams>;
}

/// A query provider that returns the same fixed pairs on every attempt
pub struct StaticQuery {
    params: QueryParams,
}

impl StaticQuery {
    /// Create a provider from fixed key/value pairs
    pub fn new<K, V>(params: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            params: params
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

#[async_trait]
impl QueryProvider for StaticQuery {
    async fn query_params(&self, _retry: &RetryInfo) -> Result<QueryParams> {
        Ok(self.params.clone())
    }
}
