use crate::errors::AppError;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

// ============ Database Models ============

/// A patient's stored insurance and marketplace-shopping attributes.
///
/// One row per patient in `insurance_info`, keyed by `patient_id`.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize, ToSchema)]
pub struct InsuranceProfile {
    /// Auth provider user id.
    pub patient_id: Uuid,
    pub insurance_provider: String,
    pub policy_number: String,
    pub group_number: Option<String>,
    pub member_id: String,
    pub coverage_type: Option<String>,
    pub copay_amount: Option<f64>,
    pub deductible_amount: Option<f64>,
    pub deductible_met: Option<f64>,
    pub out_of_pocket_max: Option<f64>,
    pub out_of_pocket_met: Option<f64>,
    pub expires_at: Option<NaiveDate>,

    // Marketplace shopping fields
    pub zip_code: Option<String>,
    pub county_name: Option<String>,
    /// Five-digit county FIPS code.
    pub county_fips: Option<String>,
    pub state: Option<String>,
    pub plan_year: Option<i32>,
    pub household_size: Option<i32>,
    pub household_income: Option<f64>,
    pub member_ages: Option<Vec<i32>>,
    pub tobacco_use_adults: Option<bool>,
    #[schema(value_type = Option<Object>)]
    pub preferred_providers: Option<serde_json::Value>,
    pub medications: Option<Vec<String>>,
    pub pharmacy_zip: Option<String>,
    pub marketplace_consent: Option<bool>,

    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

// ============ API Request/Response Models ============

/// Body of `POST /insurance/me`.
///
/// Unknown fields are rejected so typos do not silently drop data.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct UpsertInsuranceRequest {
    pub insurance_provider: String,
    pub policy_number: String,
    #[serde(default)]
    pub group_number: Option<String>,
    pub member_id: String,
    #[serde(default)]
    pub coverage_type: Option<String>,
    #[serde(default)]
    pub copay_amount: Option<f64>,
    #[serde(default)]
    pub deductible_amount: Option<f64>,
    #[serde(default)]
    pub deductible_met: Option<f64>,
    #[serde(default)]
    pub out_of_pocket_max: Option<f64>,
    #[serde(default)]
    pub out_of_pocket_met: Option<f64>,
    #[serde(default)]
    pub expires_at: Option<NaiveDate>,
    #[serde(default)]
    pub zip_code: Option<String>,
    #[serde(default)]
    pub county_name: Option<String>,
    #[serde(default)]
    pub county_fips: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub plan_year: Option<i32>,
    #[serde(default)]
    pub household_size: Option<i32>,
    #[serde(default)]
    pub household_income: Option<f64>,
    #[serde(default)]
    pub member_ages: Option<Vec<i32>>,
    #[serde(default)]
    pub tobacco_use_adults: Option<bool>,
    #[serde(default)]
    #[schema(value_type = Option<Object>)]
    pub preferred_providers: Option<serde_json::Value>,
    #[serde(default)]
    pub medications: Option<Vec<String>>,
    #[serde(default)]
    pub pharmacy_zip: Option<String>,
    #[serde(default)]
    pub marketplace_consent: Option<bool>,
}

impl UpsertInsuranceRequest {
    /// Checks the required identifiers and numeric sanity.
    pub fn validate(&self) -> Result<(), AppError> {
        let required = [
            ("insurance_provider", &self.insurance_provider),
            ("policy_number", &self.policy_number),
            ("member_id", &self.member_id),
        ];
        for (field, value) in required {
            if value.trim().is_empty() {
                return Err(AppError::BadRequest(format!("{} is required", field)));
            }
        }

        let amounts = [
            ("copay_amount", self.copay_amount),
            ("deductible_amount", self.deductible_amount),
            ("deductible_met", self.deductible_met),
            ("out_of_pocket_max", self.out_of_pocket_max),
            ("out_of_pocket_met", self.out_of_pocket_met),
            ("household_income", self.household_income),
        ];
        for (field, value) in amounts {
            if matches!(value, Some(v) if !v.is_finite() || v < 0.0) {
                return Err(AppError::BadRequest(format!(
                    "{} must be a non-negative number",
                    field
                )));
            }
        }

        if matches!(self.household_size, Some(size) if size < 0) {
            return Err(AppError::BadRequest(
                "household_size must be a non-negative number".to_string(),
            ));
        }
        if let Some(ref ages) = self.member_ages {
            if ages.iter().any(|age| !(0..=130).contains(age)) {
                return Err(AppError::BadRequest(
                    "member_ages must be between 0 and 130".to_string(),
                ));
            }
        }

        Ok(())
    }
}

/// A file sent alongside a chat message. Only the count is used.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ChatAttachment {
    pub name: String,
    /// MIME type, e.g. `image/png` or `application/pdf`.
    #[serde(rename = "mimeType")]
    pub mime_type: String,
    /// Base64-encoded content without a `data:` prefix.
    pub base64: String,
}

/// Body of `POST /insurance/chat`.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ChatRequest {
    pub message: String,
    #[serde(default)]
    pub attachments: Vec<ChatAttachment>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ChatResponse {
    pub message: String,
}

/// Query string of `GET /marketplace/plans`. Values override the stored profile.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PlanQueryOverrides {
    pub zip: Option<String>,
    pub county_fips: Option<String>,
    pub year: Option<String>,
}

// ============ Marketplace Models ============

/// Inputs to a marketplace plan search. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct MarketplaceParams {
    pub zip_code: Option<String>,
    pub county_name: Option<String>,
    pub county_fips: Option<String>,
    pub state: Option<String>,
    pub plan_year: Option<i32>,
    pub household_size: Option<i32>,
    pub household_income: Option<f64>,
    pub member_ages: Option<Vec<i32>>,
    pub tobacco_use_adults: Option<bool>,
    #[schema(value_type = Option<Object>)]
    pub preferred_providers: Option<serde_json::Value>,
    pub medications: Option<Vec<String>>,
    pub pharmacy_zip: Option<String>,
}

impl MarketplaceParams {
    /// Copies the shopping fields of a stored profile; `None` yields empty params.
    pub fn from_profile(profile: Option<&InsuranceProfile>) -> Self {
        let Some(p) = profile else {
            return Self::default();
        };
        Self {
            zip_code: p.zip_code.clone(),
            county_name: p.county_name.clone(),
            county_fips: p.county_fips.clone(),
            state: p.state.clone(),
            plan_year: p.plan_year,
            household_size: p.household_size,
            household_income: p.household_income,
            member_ages: p.member_ages.clone(),
            tobacco_use_adults: p.tobacco_use_adults,
            preferred_providers: p.preferred_providers.clone(),
            medications: p.medications.clone(),
            pharmacy_zip: p.pharmacy_zip.clone(),
        }
    }

    /// Applies query-string overrides; blank or unparsable values are ignored.
    pub fn with_overrides(mut self, overrides: &PlanQueryOverrides) -> Self {
        if let Some(zip) = non_blank(overrides.zip.as_deref()) {
            self.zip_code = Some(zip);
        }
        if let Some(fips) = non_blank(overrides.county_fips.as_deref()) {
            self.county_fips = Some(fips);
        }
        if let Some(year) = overrides
            .year
            .as_deref()
            .and_then(|y| y.trim().parse::<i32>().ok())
        {
            self.plan_year = Some(year);
        }
        self
    }
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// A marketplace plan offer in the fixed internal shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct PlanQuote {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    pub carrier: String,
    pub metal: String,
    pub monthly_premium: f64,
    pub deductible: f64,
    pub oop_max: f64,
    /// Plan type or network, e.g. `HMO`.
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub plan_type: Option<String>,
}

/// Tag reported when the plan search itself failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum PlanFetchError {
    PlanFetchFailed,
}

/// Outcome of a plan search. Always well-formed, even on upstream failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct PlanSearchResult {
    #[serde(rename = "apiKeyPresent")]
    pub api_key_present: bool,
    pub query: MarketplaceParams,
    pub plans: Vec<PlanQuote>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<PlanFetchError>,
}
