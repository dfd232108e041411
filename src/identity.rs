use crate::errors::AppError;
use crate::upstream::{ensure_success, DEFAULT_TIMEOUT};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use uuid::Uuid;

#[derive(Debug, Deserialize)]
struct AuthUser {
    id: Option<String>,
}

/// Resolves bearer credentials to patient ids via the auth provider's
/// `GET /auth/v1/user` endpoint.
#[derive(Clone)]
pub struct IdentityClient {
    client: reqwest::Client,
    base_url: Option<String>,
    anon_key: Option<String>,
}

/// Strips an optional `Bearer ` prefix. Blank values count as missing.
pub fn bearer_token(authorization: Option<&str>) -> Result<&str, AppError> {
    let raw = authorization
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .ok_or(AppError::MissingCredential)?;

    let token = match raw.split_once(' ') {
        Some((scheme, rest)) if scheme.eq_ignore_ascii_case("bearer") => rest.trim(),
        None if raw.eq_ignore_ascii_case("bearer") => "",
        _ => raw,
    };

    if token.is_empty() {
        return Err(AppError::MissingCredential);
    }
    Ok(token)
}

/// Short, non-reversible tag for a credential so logs can correlate requests.
pub fn token_fingerprint(token: &str) -> String {
    let digest = Sha256::digest(token.as_bytes());
    hex::encode(&digest[..6])
}

impl IdentityClient {
    pub fn new(client: reqwest::Client, base_url: Option<String>, anon_key: Option<String>) -> Self {
        Self {
            client,
            base_url,
            anon_key,
        }
    }

    /// Returns the caller's id for the given `Authorization` header value.
    ///
    /// A missing header fails with `MissingCredential` before any network call.
    /// Every failure after that (transport, non-2xx, malformed body) is
    /// `Unauthenticated`.
    pub async fn resolve(&self, authorization: Option<&str>) -> Result<Uuid, AppError> {
        let token = bearer_token(authorization)?;
        let base_url = self
            .base_url
            .as_deref()
            .ok_or_else(|| AppError::ConfigMissing("Supabase URL not configured".to_string()))?;

        let fingerprint = token_fingerprint(token);
        let url = format!("{}/auth/v1/user", base_url);
        tracing::debug!("Resolving identity for token {}", fingerprint);

        let response = self
            .client
            .get(&url)
            .bearer_auth(token)
            .header("apikey", self.anon_key.as_deref().unwrap_or(""))
            .timeout(DEFAULT_TIMEOUT)
            .send()
            .await
            .map_err(|e| {
                AppError::Unauthenticated(format!("auth request failed: {}", e.without_url()))
            })?;

        let response = ensure_success(response, "Auth provider")
            .await
            .map_err(|e| AppError::Unauthenticated(e.to_string()))?;

        let user: AuthUser = response.json().await.map_err(|e| {
            AppError::Unauthenticated(format!("Failed to parse auth response: {}", e))
        })?;

        let id = user
            .id
            .ok_or_else(|| AppError::Unauthenticated("auth response missing 'id'".to_string()))?;
        let patient_id = Uuid::parse_str(&id)
            .map_err(|_| AppError::Unauthenticated(format!("auth id is not a UUID: {}", id)))?;

        tracing::info!("Token {} resolved to patient {}", fingerprint, patient_id);
        Ok(patient_id)
    }
}
