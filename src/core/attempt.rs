//! A single end-to-end connection attempt
//!
//! One attempt resolves query parameters, builds the final URL, asks the
//! connector for a transport and, when configured, waits for the
//! connection resolver to accept it. Each phase runs under its own
//! timeout. The caller drives the returned future inside a `select!`, so
//! dropping it cancels whatever phase is in flight.

use std::sync::Arc;

use tokio::time::timeout;
use tracing::debug;

use crate::core::config::SocketOptions;
use crate::traits::error::SocketError;
use crate::traits::retry::RetryInfo;
use crate::traits::transport::Connection;
use crate::traits::url::compose_url;

/// How an attempt failed
pub(crate) enum AttemptFailure {
    /// The stop sentinel came out of the query provider; no further
    /// attempts may be scheduled
    Terminal(SocketError),
    /// An ordinary failure, the retry machinery decides what happens next
    Failed(SocketError),
}

pub(crate) async fn run_attempt(
    options: Arc<SocketOptions>,
    retry: RetryInfo,
) -> Result<Connection, AttemptFailure> {
    let params = match &options.query {
        Some(provider) => {
            match timeout(options.params_timeout, provider.query_params(&retry)).await {
                Err(_) => {
                    debug!("query provider timed out");
                    return Err(AttemptFailure::Failed(SocketError::ParamsTimeout));
                }
                Ok(Err(e)) if e.is_stop_retry() => return Err(AttemptFailure::Terminal(e)),
                Ok(Err(e)) => return Err(AttemptFailure::Failed(e)),
                Ok(Ok(params)) => params,
            }
        }
        None => Vec::new(),
    };

    let url = match &options.url_provider {
        Some(provider) => provider
            .resolve(&options.url, &params, &retry)
            .await
            .map_err(AttemptFailure::Failed)?,
        None => compose_url(&options.url, &params).map_err(AttemptFailure::Failed)?,
    };

    debug!(attempt = retry.retry_count, %url, "connection attempt");
    let connection = match timeout(
        options.connection_timeout,
        options.connector.connect(&url, &options.protocols),
    )
    .await
    {
        Err(_) => {
            debug!("connection attempt timed out");
            return Err(AttemptFailure::Failed(SocketError::ConnectTimeout));
        }
        Ok(Err(e)) => return Err(AttemptFailure::Failed(e)),
        Ok(Ok(connection)) => connection,
    };

    if let Some(resolver) = &options.connection_resolver {
        if let Err(e) = resolver.resolve(&connection.info).await {
            debug!(error = %e, "connection resolver rejected the transport");
            let mut connection = connection;
            connection.sink.close(None, None).await;
            return Err(AttemptFailure::Failed(e));
        }
    }

    Ok(connection)
}
