//! Shared outbound HTTP plumbing.

use crate::errors::AppError;
use std::time::Duration;

/// Default ceiling for any outbound call; individual calls may set a shorter one.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Builds the single pooled client shared by every upstream integration.
pub fn build_http_client() -> Result<reqwest::Client, AppError> {
    reqwest::Client::builder()
        .timeout(DEFAULT_TIMEOUT)
        .user_agent(concat!("patient-portal-api/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| AppError::InternalError(format!("Failed to create HTTP client: {}", e)))
}

/// Turns a non-2xx response into `UpstreamUnavailable`, keeping the body for logs.
pub async fn ensure_success(
    response: reqwest::Response,
    service: &str,
) -> Result<reqwest::Response, AppError> {
    if response.status().is_success() {
        return Ok(response);
    }

    let status = response.status();
    let error_text = response
        .text()
        .await
        .unwrap_or_else(|_| "Unknown error".to_string());
    tracing::warn!("{} returned {}: {}", service, status, error_text);
    Err(AppError::UpstreamUnavailable(format!(
        "{} returned {}",
        service, status
    )))
}
