//! Router assembly, middleware and OpenAPI document.

use crate::handlers::{self, AppState};
use crate::models::*;
use axum::{
    extract::Request,
    http::{header, HeaderName, HeaderValue, Method},
    middleware::{self, Next},
    response::Response,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceBuilder;
use tower_governor::{
    governor::GovernorConfigBuilder, key_extractor::SmartIpKeyExtractor, GovernorLayer,
};
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    limit::RequestBodyLimitLayer,
    trace::TraceLayer,
};
use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};
use utoipa_swagger_ui::SwaggerUi;

/// Request size limit: chat attachments arrive inline as base64.
const BODY_LIMIT_BYTES: usize = 5 * 1024 * 1024;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Patient Portal API",
        description = "Healthcare patient portal backend API"
    ),
    paths(
        handlers::health,
        handlers::get_my_insurance,
        handlers::upsert_my_insurance,
        handlers::chat,
        handlers::marketplace_test,
        handlers::marketplace_plans
    ),
    components(schemas(
        InsuranceProfile,
        UpsertInsuranceRequest,
        ChatAttachment,
        ChatRequest,
        ChatResponse,
        MarketplaceParams,
        PlanQuote,
        PlanFetchError,
        PlanSearchResult
    )),
    modifiers(&BearerAuth),
    tags(
        (name = "insurance", description = "Insurance profile and assistant chat"),
        (name = "marketplace", description = "Marketplace plan quotes"),
        (name = "system", description = "Service status")
    )
)]
pub struct ApiDoc;

struct BearerAuth;

impl Modify for BearerAuth {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer",
                SecurityScheme::Http(HttpBuilder::new().scheme(HttpAuthScheme::Bearer).build()),
            );
        }
    }
}

/// Baseline security headers on every response.
pub async fn security_headers(req: Request, next: Next) -> Response {
    let mut response = next.run(req).await;
    let headers = response.headers_mut();
    headers.insert(
        header::X_CONTENT_TYPE_OPTIONS,
        HeaderValue::from_static("nosniff"),
    );
    headers.insert(header::X_FRAME_OPTIONS, HeaderValue::from_static("DENY"));
    headers.insert(
        header::REFERRER_POLICY,
        HeaderValue::from_static("no-referrer"),
    );
    response
}

/// CORS for the configured frontend origin.
///
/// A concrete origin is allowed with credentials. `*` allows any origin
/// without credentials, since browsers reject that combination.
fn cors_layer(origin: &str) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([
            header::AUTHORIZATION,
            header::CONTENT_TYPE,
            HeaderName::from_static("apikey"),
        ])
        .max_age(Duration::from_secs(3600));

    let origin = origin.trim();
    if origin == "*" {
        tracing::warn!("CORS_ORIGIN is '*': allowing any origin without credentials");
        return layer.allow_origin(AllowOrigin::any());
    }

    let layer = layer.allow_credentials(true);
    match origin.parse::<HeaderValue>() {
        Ok(value) => layer.allow_origin(value),
        Err(_) => {
            tracing::warn!("Invalid CORS_ORIGIN '{}', cross-origin requests disabled", origin);
            layer
        }
    }
}

/// The `/api/v1` routes that sit behind rate limiting.
fn api_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/v1", get(handlers::root))
        .route(
            "/api/v1/insurance/me",
            get(handlers::get_my_insurance).post(handlers::upsert_my_insurance),
        )
        .route("/api/v1/insurance/chat", post(handlers::chat))
        .route("/api/v1/marketplace/test", get(handlers::marketplace_test))
        .route("/api/v1/marketplace/plans", get(handlers::marketplace_plans))
}

/// Builds the full application router.
///
/// With `rate_limit` set, API routes are limited to 10 req/sec per client IP
/// (burst 20); the server must then be started with connect info so the key
/// extractor can fall back to the peer address.
pub fn router(state: Arc<AppState>, rate_limit: bool) -> anyhow::Result<Router> {
    let mut protected = api_routes().layer(RequestBodyLimitLayer::new(BODY_LIMIT_BYTES));

    if rate_limit {
        let governor_conf = Arc::new(
            GovernorConfigBuilder::default()
                .per_second(10)
                .burst_size(20)
                .key_extractor(SmartIpKeyExtractor)
                .finish()
                .ok_or_else(|| anyhow::anyhow!("Invalid rate limiter configuration"))?,
        );
        protected = protected.layer(GovernorLayer {
            config: governor_conf,
        });
    }

    let cors = cors_layer(&state.config.cors_origin);

    let app = Router::new()
        .route("/api/v1/health", get(handlers::health))
        .merge(protected)
        .merge(SwaggerUi::new("/api/docs").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors)
                .layer(middleware::from_fn(security_headers)),
        );

    Ok(app)
}
