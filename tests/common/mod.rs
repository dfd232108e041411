//! Shared fixtures for integration tests.
#![allow(dead_code)]

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use patient_portal_api::config::Config;
use patient_portal_api::errors::AppError;
use patient_portal_api::handlers::AppState;
use patient_portal_api::models::{InsuranceProfile, UpsertInsuranceRequest};
use patient_portal_api::profile_store::ProfileStore;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tower::ServiceExt;
use uuid::Uuid;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, Respond, ResponseTemplate};

pub const PATIENT_ID: &str = "6f1c2a4e-3b7d-4c1e-9a55-2d8f0b7e41aa";
pub const TOKEN: &str = "test-access-token";
pub const GENERATE_PATH: &str = "/v1beta/models/test-model:generateContent";

pub fn patient_id() -> Uuid {
    Uuid::parse_str(PATIENT_ID).unwrap()
}

/// Config pointing every upstream at the given mock server.
pub fn test_config(server_uri: &str) -> Config {
    Config {
        port: 0,
        environment: "test".to_string(),
        cors_origin: "http://localhost:3000".to_string(),
        database_url: "postgresql://test".to_string(),
        database_service_url: None,
        auth_base_url: Some(server_uri.to_string()),
        auth_anon_key: Some("anon-key".to_string()),
        marketplace_api_key: Some("marketplace-key".to_string()),
        marketplace_base_url: Some(format!("{}/marketplace", server_uri)),
        gemini_api_key: Some("gemini-key".to_string()),
        gemini_base_url: format!("{}{}", server_uri, GENERATE_PATH),
    }
}

/// In-memory stand-in for the Postgres store.
#[derive(Default)]
pub struct MemoryStore {
    rows: Mutex<HashMap<Uuid, InsuranceProfile>>,
    failing: bool,
}

impl MemoryStore {
    pub fn failing() -> Self {
        Self {
            failing: true,
            ..Default::default()
        }
    }

    pub fn with_profile(profile: InsuranceProfile) -> Self {
        let store = Self::default();
        store
            .rows
            .lock()
            .unwrap()
            .insert(profile.patient_id, profile);
        store
    }

    pub fn row(&self, patient_id: Uuid) -> Option<InsuranceProfile> {
        self.rows.lock().unwrap().get(&patient_id).cloned()
    }

    pub fn len(&self) -> usize {
        self.rows.lock().unwrap().len()
    }
}

#[async_trait]
impl ProfileStore for MemoryStore {
    async fn get(&self, patient_id: Uuid) -> Result<Option<InsuranceProfile>, AppError> {
        if self.failing {
            return Err(AppError::InternalError("store unavailable".to_string()));
        }
        Ok(self.row(patient_id))
    }

    async fn upsert(
        &self,
        patient_id: Uuid,
        fields: &UpsertInsuranceRequest,
    ) -> Result<InsuranceProfile, AppError> {
        if self.failing {
            return Err(AppError::InternalError("store unavailable".to_string()));
        }
        let profile = profile_from(patient_id, fields);
        self.rows
            .lock()
            .unwrap()
            .insert(patient_id, profile.clone());
        Ok(profile)
    }
}

pub fn profile_from(patient_id: Uuid, f: &UpsertInsuranceRequest) -> InsuranceProfile {
    InsuranceProfile {
        patient_id,
        insurance_provider: f.insurance_provider.clone(),
        policy_number: f.policy_number.clone(),
        group_number: f.group_number.clone(),
        member_id: f.member_id.clone(),
        coverage_type: f.coverage_type.clone(),
        copay_amount: f.copay_amount,
        deductible_amount: f.deductible_amount,
        deductible_met: f.deductible_met,
        out_of_pocket_max: f.out_of_pocket_max,
        out_of_pocket_met: f.out_of_pocket_met,
        expires_at: f.expires_at,
        zip_code: f.zip_code.clone(),
        county_name: f.county_name.clone(),
        county_fips: f.county_fips.clone(),
        state: f.state.clone(),
        plan_year: f.plan_year,
        household_size: f.household_size,
        household_income: f.household_income,
        member_ages: f.member_ages.clone(),
        tobacco_use_adults: f.tobacco_use_adults,
        preferred_providers: f.preferred_providers.clone(),
        medications: f.medications.clone(),
        pharmacy_zip: f.pharmacy_zip.clone(),
        marketplace_consent: f.marketplace_consent,
        created_at: None,
        updated_at: None,
    }
}

/// Minimal stored profile with a ZIP code on file.
pub fn profile_with_zip(zip: &str) -> InsuranceProfile {
    profile_from(
        patient_id(),
        &UpsertInsuranceRequest {
            insurance_provider: "Aetna".to_string(),
            policy_number: "POL-123".to_string(),
            member_id: "MEM-9".to_string(),
            zip_code: Some(zip.to_string()),
            ..Default::default()
        },
    )
}

pub fn app(config: Config, store: Arc<dyn ProfileStore>) -> Router {
    let state = Arc::new(AppState::new(config, reqwest::Client::new(), store));
    patient_portal_api::api::router(state, false).unwrap()
}

/// Auth provider accepts `TOKEN` and returns `PATIENT_ID`.
pub async fn mount_auth(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/auth/v1/user"))
        .and(header("authorization", format!("Bearer {}", TOKEN).as_str()))
        .and(header("apikey", "anon-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": PATIENT_ID,
            "email": "patient@example.com"
        })))
        .mount(server)
        .await;
}

/// Replies with the prompt it received, so tests can inspect what was sent.
pub struct EchoPrompt;

impl Respond for EchoPrompt {
    fn respond(&self, request: &wiremock::Request) -> ResponseTemplate {
        let body: Value = serde_json::from_slice(&request.body).unwrap_or(Value::Null);
        let text = body
            .pointer("/contents/0/parts/0/text")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        ResponseTemplate::new(200).set_body_json(json!({
            "candidates": [{"content": {"parts": [{"text": text}]}}]
        }))
    }
}

pub async fn mount_echo_generation(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path(GENERATE_PATH))
        .respond_with(EchoPrompt)
        .mount(server)
        .await;
}

pub fn get(uri: &str, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method("GET").uri(uri);
    if let Some(token) = token {
        builder = builder.header("authorization", format!("Bearer {}", token));
    }
    builder.body(Body::empty()).unwrap()
}

pub fn post_json(uri: &str, token: Option<&str>, body: Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json");
    if let Some(token) = token {
        builder = builder.header("authorization", format!("Bearer {}", token));
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

pub async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}
