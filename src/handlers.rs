use crate::chat;
use crate::config::Config;
use crate::errors::AppError;
use crate::generation::GenerativeClient;
use crate::identity::IdentityClient;
use crate::marketplace::MarketplaceClient;
use crate::models::*;
use crate::profile_store::ProfileStore;
use axum::{
    body::Bytes,
    extract::{Query, State},
    http::{header::AUTHORIZATION, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;

/// Shared application state injected into handlers.
///
/// Built once at startup; nothing in here is mutated per request.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration.
    pub config: Config,
    /// Insurance profile persistence.
    pub store: Arc<dyn ProfileStore>,
    /// Bearer credential -> patient id.
    pub identity: IdentityClient,
    /// Marketplace plan quotes.
    pub marketplace: MarketplaceClient,
    /// Generative-text API.
    pub generator: GenerativeClient,
}

impl AppState {
    /// Wires every upstream client onto one shared HTTP client.
    pub fn new(config: Config, http: reqwest::Client, store: Arc<dyn ProfileStore>) -> Self {
        let identity = IdentityClient::new(
            http.clone(),
            config.auth_base_url.clone(),
            config.auth_anon_key.clone(),
        );
        let marketplace = MarketplaceClient::new(
            http.clone(),
            config.marketplace_base_url.clone(),
            config.marketplace_api_key.clone(),
        );
        let generator = GenerativeClient::new(
            http,
            config.gemini_base_url.clone(),
            config.gemini_api_key.clone(),
        );

        Self {
            config,
            store,
            identity,
            marketplace,
            generator,
        }
    }
}

fn authorization(headers: &HeaderMap) -> Option<&str> {
    headers.get(AUTHORIZATION).and_then(|v| v.to_str().ok())
}

/// GET /api/v1
pub async fn root() -> &'static str {
    "Patient Portal Backend API is running!"
}

/// Health check endpoint.
#[utoipa::path(
    get,
    path = "/api/v1/health",
    tag = "system",
    responses((status = 200, description = "Service status"))
)]
pub async fn health(State(state): State<Arc<AppState>>) -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::OK,
        Json(json!({
            "status": "ok",
            "timestamp": chrono::Utc::now().to_rfc3339(),
            "service": "patient-portal-api",
            "version": env!("CARGO_PKG_VERSION"),
            "environment": state.config.environment,
        })),
    )
}

/// GET /api/v1/insurance/me
///
/// Returns the caller's insurance profile, or `{}` when there is none or the
/// caller/store cannot be resolved. Never fails.
#[utoipa::path(
    get,
    path = "/api/v1/insurance/me",
    tag = "insurance",
    responses((status = 200, description = "Current user's insurance info, or an empty object", body = InsuranceProfile)),
    security(("bearer" = []))
)]
pub async fn get_my_insurance(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Json<serde_json::Value> {
    tracing::info!("GET /insurance/me");

    let profile = chat::load_profile(&state, authorization(&headers)).await;
    let body = profile
        .and_then(|p| serde_json::to_value(p).ok())
        .unwrap_or_else(|| json!({}));

    Json(body)
}

/// POST /api/v1/insurance/me
///
/// Creates or replaces the caller's insurance profile. Unlike the read path,
/// auth and store failures are returned to the caller.
///
/// The body is read as raw bytes and parsed only after the caller is
/// resolved, so an unauthenticated request is a 401 whatever it contains.
///
/// # Returns
/// The stored row, or 400 for a malformed or invalid body.
#[utoipa::path(
    post,
    path = "/api/v1/insurance/me",
    tag = "insurance",
    request_body = UpsertInsuranceRequest,
    responses(
        (status = 200, description = "Stored insurance info", body = InsuranceProfile),
        (status = 400, description = "Malformed body or validation failed"),
        (status = 401, description = "Missing or invalid credential"),
        (status = 503, description = "Auth provider not configured")
    ),
    security(("bearer" = []))
)]
pub async fn upsert_my_insurance(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<InsuranceProfile>, AppError> {
    tracing::info!("POST /insurance/me");

    let patient_id = state.identity.resolve(authorization(&headers)).await?;

    let Json(payload) = Json::<UpsertInsuranceRequest>::from_bytes(&body)
        .map_err(|rejection| AppError::BadRequest(rejection.body_text()))?;
    payload.validate()?;

    let profile = state.store.upsert(patient_id, &payload).await?;
    Ok(Json(profile))
}

/// POST /api/v1/insurance/chat
///
/// Always answers 200 with a message, whatever state the upstreams are in.
#[utoipa::path(
    post,
    path = "/api/v1/insurance/chat",
    tag = "insurance",
    request_body = ChatRequest,
    responses((status = 200, description = "Assistant reply", body = ChatResponse)),
    security(("bearer" = []))
)]
pub async fn chat(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(request): Json<ChatRequest>,
) -> Json<ChatResponse> {
    tracing::info!(
        "POST /insurance/chat - {} chars, {} attachment(s)",
        request.message.len(),
        request.attachments.len()
    );

    Json(chat::respond(&state, authorization(&headers), &request).await)
}

/// Message shown by the diagnostic endpoints when the caller cannot be resolved.
fn identity_failure_message(err: &AppError) -> &'static str {
    match err {
        AppError::MissingCredential => "Missing Authorization header",
        AppError::ConfigMissing(_) => "Supabase URL not configured",
        _ => "Unauthorized",
    }
}

/// GET /api/v1/marketplace/test
///
/// Diagnostic: is the marketplace key configured, and which shopping fields
/// are on file for the caller.
#[utoipa::path(
    get,
    path = "/api/v1/marketplace/test",
    tag = "marketplace",
    responses((status = 200, description = "Marketplace key presence and stored shopping parameters")),
    security(("bearer" = []))
)]
pub async fn marketplace_test(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Json<serde_json::Value> {
    tracing::info!("GET /marketplace/test");

    let patient_id = match state.identity.resolve(authorization(&headers)).await {
        Ok(id) => id,
        Err(e) => {
            tracing::warn!("marketplace/test identity failed: {}", e);
            return Json(json!({ "ok": false, "error": identity_failure_message(&e) }));
        }
    };

    let profile = match state.store.get(patient_id).await {
        Ok(profile) => profile,
        Err(e) => {
            tracing::error!("marketplace/test store read failed: {}", e);
            return Json(json!({ "ok": false, "error": "Unable to read insurance profile" }));
        }
    };

    let params = MarketplaceParams::from_profile(profile.as_ref());
    Json(json!({
        "ok": true,
        "marketplaceKeyPresent": state.marketplace.api_key_present(),
        "params": {
            "zip_code": params.zip_code,
            "county_name": params.county_name,
            "county_fips": params.county_fips,
            "state": params.state,
            "plan_year": params.plan_year,
            "household_size": params.household_size,
            "household_income": params.household_income,
            "member_ages": params.member_ages,
            "tobacco_use_adults": params.tobacco_use_adults,
            "preferred_providers": params.preferred_providers,
            "medications": params.medications,
            "pharmacy_zip": params.pharmacy_zip,
            "marketplace_consent": profile.as_ref().and_then(|p| p.marketplace_consent),
        },
    }))
}

#[derive(Serialize)]
struct PlansResponse {
    ok: bool,
    #[serde(flatten)]
    result: PlanSearchResult,
}

/// GET /api/v1/marketplace/plans?zip=&county_fips=&year=
///
/// Plan quotes for the caller's stored shopping fields, with query values
/// taking precedence.
#[utoipa::path(
    get,
    path = "/api/v1/marketplace/plans",
    tag = "marketplace",
    params(
        ("zip" = Option<String>, Query, description = "ZIP code override"),
        ("county_fips" = Option<String>, Query, description = "County FIPS override"),
        ("year" = Option<String>, Query, description = "Plan year override")
    ),
    responses((status = 200, description = "Local plan options", body = PlanSearchResult)),
    security(("bearer" = []))
)]
pub async fn marketplace_plans(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(overrides): Query<PlanQueryOverrides>,
) -> Response {
    tracing::info!("GET /marketplace/plans - overrides: {:?}", overrides);

    let patient_id = match state.identity.resolve(authorization(&headers)).await {
        Ok(id) => id,
        Err(e) => {
            tracing::warn!("marketplace/plans identity failed: {}", e);
            let message = match e {
                AppError::MissingCredential | AppError::ConfigMissing(_) => {
                    "Auth or Supabase not configured"
                }
                _ => "Unauthorized",
            };
            return Json(json!({ "ok": false, "error": message })).into_response();
        }
    };

    let profile = state.store.get(patient_id).await.unwrap_or_else(|e| {
        tracing::warn!("marketplace/plans store read failed, using overrides only: {}", e);
        None
    });

    let params = MarketplaceParams::from_profile(profile.as_ref()).with_overrides(&overrides);
    let result = state.marketplace.get_plans(&params).await;

    Json(PlansResponse { ok: true, result }).into_response()
}
