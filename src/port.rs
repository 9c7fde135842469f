//! Shared plumbing for the external model-serving ports.
//!
//! Both the embedding and the generation backends are black boxes reached
//! over the network. Each call is a single attempt: it either succeeds,
//! fails with [`PortError::Unavailable`] carrying the backend's message, or
//! exceeds the configured bound and fails with [`PortError::Timeout`].

use std::future::Future;
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PortError {
    #[error("{0}")]
    Unavailable(String),

    #[error("timed out after {}s", .0.as_secs_f64())]
    Timeout(Duration),
}

impl PortError {
    pub fn unavailable<E: std::fmt::Display>(err: E) -> Self {
        PortError::Unavailable(err.to_string())
    }
}

/// Run a port call, bounded by `timeout` when one is configured.
///
/// `None` leaves the call unbounded.
pub async fn with_timeout<T, F>(timeout: Option<Duration>, call: F) -> Result<T, PortError>
where
    F: Future<Output = Result<T, PortError>>,
{
    match timeout {
        Some(limit) => match tokio::time::timeout(limit, call).await {
            Ok(result) => result,
            Err(_) => Err(PortError::Timeout(limit)),
        },
        None => call.await,
    }
}

/// Read a non-success HTTP response into a [`PortError`], keeping the body.
pub(crate) async fn http_error(backend: &str, response: reqwest::Response) -> PortError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    PortError::Unavailable(format!("{} API error {}: {}", backend, status, body.trim()))
}
