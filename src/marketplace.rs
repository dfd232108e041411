use crate::errors::AppError;
use crate::models::{MarketplaceParams, PlanFetchError, PlanQuote, PlanSearchResult};
use crate::upstream::ensure_success;
use chrono::{Datelike, Utc};
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;

/// At most this many upstream plans are normalized per search.
pub const PLAN_LIMIT: usize = 10;

const GEOCODE_TIMEOUT: Duration = Duration::from_secs(10);
const SEARCH_TIMEOUT: Duration = Duration::from_secs(20);

// Ordered alias chains: the first truthy field wins.
const ID_FIELDS: &[&str] = &["id", "planId", "hiosId", "plan_id", "marketing_name"];
const NAME_FIELDS: &[&str] = &["marketing_name", "name", "plan_marketing_name"];
const CARRIER_FIELDS: &[&str] = &["carrier", "issuer_name", "issuer"];
const METAL_FIELDS: &[&str] = &["metal_level", "metal", "metal_level_code"];
const PREMIUM_FIELDS: &[&str] = &["monthly_premium", "premium", "individual_rate"];
const DEDUCTIBLE_FIELDS: &[&str] = &["deductible_individual", "deductible", "individual_deductible"];
const OOP_MAX_FIELDS: &[&str] = &["oop_max_individual", "oop_max", "individual_oop_max"];
const TYPE_FIELDS: &[&str] = &["plan_type", "type", "network"];

/// An upstream plan object exactly as the marketplace returned it.
///
/// The only way out is [`RawPlan::normalize`].
#[derive(Debug, Clone)]
pub struct RawPlan(Value);

impl RawPlan {
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    fn text(&self, aliases: &[&str]) -> Option<String> {
        aliases
            .iter()
            .find_map(|field| self.0.get(*field).and_then(truthy_text))
    }

    fn number(&self, aliases: &[&str]) -> f64 {
        aliases
            .iter()
            .find_map(|field| self.0.get(*field).and_then(truthy_number))
            .unwrap_or(0.0)
    }

    pub fn normalize(&self) -> PlanQuote {
        PlanQuote {
            id: self.text(ID_FIELDS),
            name: self
                .text(NAME_FIELDS)
                .unwrap_or_else(|| "Unknown Plan".to_string()),
            carrier: self
                .text(CARRIER_FIELDS)
                .unwrap_or_else(|| "Unknown Carrier".to_string()),
            metal: self
                .text(METAL_FIELDS)
                .unwrap_or_else(|| "Unknown".to_string()),
            monthly_premium: self.number(PREMIUM_FIELDS),
            deductible: self.number(DEDUCTIBLE_FIELDS),
            oop_max: self.number(OOP_MAX_FIELDS),
            plan_type: self.text(TYPE_FIELDS),
        }
    }
}

/// Non-empty strings, non-zero numbers, and `{ "name": ... }` objects count as text.
fn truthy_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) if n.as_f64() != Some(0.0) => Some(n.to_string()),
        Value::Object(map) => map.get("name").and_then(truthy_text),
        _ => None,
    }
}

/// Non-zero numbers, or strings that parse as one (`"$1,234.50"` included).
fn truthy_number(value: &Value) -> Option<f64> {
    let number = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s
            .trim()
            .trim_start_matches('$')
            .replace(',', "")
            .parse::<f64>()
            .ok(),
        _ => None,
    }?;
    (number.is_finite() && number != 0.0).then_some(number)
}

/// Finds the plan array under `plans`, `results`, or the top level, and
/// normalizes its first [`PLAN_LIMIT`] entries.
pub fn normalize_plan_list(body: &Value) -> Vec<PlanQuote> {
    let list = body
        .get("plans")
        .filter(|v| !v.is_null())
        .or_else(|| body.get("results").filter(|v| !v.is_null()))
        .unwrap_or(body);

    list.as_array()
        .map(|plans| {
            plans
                .iter()
                .take(PLAN_LIMIT)
                .map(|plan| RawPlan::new(plan.clone()).normalize())
                .collect()
        })
        .unwrap_or_default()
}

/// Picks the county FIPS out of a `counties/by/zip` response.
fn county_fips_from(body: &Value) -> Option<String> {
    body.get(0)
        .and_then(|county| county.get("fips"))
        .and_then(truthy_text)
        .or_else(|| {
            body.get("counties")
                .and_then(|c| c.get(0))
                .and_then(|county| county.get("fips"))
                .and_then(truthy_text)
        })
}

#[derive(Debug, Serialize)]
struct HouseholdMember {
    age: i32,
    tobacco: bool,
}

#[derive(Debug, Serialize)]
struct Household {
    #[serde(skip_serializing_if = "Option::is_none")]
    size: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    income: Option<f64>,
    members: Vec<HouseholdMember>,
}

#[derive(Debug, Serialize)]
struct PlanSearchBody<'a> {
    zip: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    county_fips: Option<&'a str>,
    year: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    household: Option<Household>,
}

/// Household context is only sent when a size or member ages are known.
/// One tobacco flag covers every member.
fn household_for(params: &MarketplaceParams) -> Option<Household> {
    let has_size = matches!(params.household_size, Some(size) if size > 0);
    if !has_size && params.member_ages.is_none() {
        return None;
    }

    let tobacco = params.tobacco_use_adults.unwrap_or(false);
    Some(Household {
        size: params.household_size,
        income: params.household_income,
        members: params
            .member_ages
            .iter()
            .flatten()
            .map(|&age| HouseholdMember { age, tobacco })
            .collect(),
    })
}

/// Client for the marketplace pricing API.
#[derive(Clone)]
pub struct MarketplaceClient {
    client: reqwest::Client,
    base_url: Option<String>,
    api_key: Option<String>,
}

impl MarketplaceClient {
    /// Creates a new `MarketplaceClient`.
    ///
    /// # Arguments
    ///
    /// * `client` - Shared HTTP client.
    /// * `base_url` - Marketplace API root, e.g. `https://api.marketplace.cms.gov`.
    /// * `api_key` - Bearer key. Without it every search returns an empty result.
    pub fn new(client: reqwest::Client, base_url: Option<String>, api_key: Option<String>) -> Self {
        Self {
            client,
            base_url,
            api_key,
        }
    }

    pub fn api_key_present(&self) -> bool {
        self.api_key.is_some()
    }

    /// Fetches and normalizes local plan quotes.
    ///
    /// Never fails: missing configuration or input yields an empty list, and an
    /// upstream failure is reported through `error`.
    ///
    /// # Arguments
    ///
    /// * `params` - Shopping fields. Only `zip_code` is required for a search.
    ///
    /// # Returns
    ///
    /// * `PlanSearchResult` - Up to ten normalized plans, echoing `params` as `query`.
    pub async fn get_plans(&self, params: &MarketplaceParams) -> PlanSearchResult {
        let empty = |api_key_present: bool| PlanSearchResult {
            api_key_present,
            query: params.clone(),
            plans: Vec::new(),
            error: None,
        };

        let (Some(api_key), Some(base_url)) = (self.api_key.as_deref(), self.base_url.as_deref())
        else {
            tracing::debug!("Marketplace not configured; skipping plan search");
            return empty(false);
        };

        let Some(zip) = params
            .zip_code
            .as_deref()
            .map(str::trim)
            .filter(|zip| !zip.is_empty())
        else {
            tracing::debug!("No ZIP code available; skipping plan search");
            return empty(true);
        };

        match self.search(base_url, api_key, zip, params).await {
            Ok(plans) => {
                tracing::info!("Marketplace returned {} plan(s)", plans.len());
                PlanSearchResult {
                    plans,
                    ..empty(true)
                }
            }
            Err(e) => {
                tracing::warn!("Plan search failed: {}", e);
                PlanSearchResult {
                    error: Some(PlanFetchError::PlanFetchFailed),
                    ..empty(true)
                }
            }
        }
    }

    async fn search(
        &self,
        base_url: &str,
        api_key: &str,
        zip: &str,
        params: &MarketplaceParams,
    ) -> Result<Vec<PlanQuote>, AppError> {
        let county_fips = match params
            .county_fips
            .as_deref()
            .filter(|fips| !fips.trim().is_empty())
        {
            Some(fips) => Some(fips.to_string()),
            None => match self.resolve_county_fips(base_url, api_key, zip).await {
                Ok(fips) => fips,
                Err(e) => {
                    tracing::warn!("County lookup failed, continuing without: {}", e);
                    None
                }
            },
        };

        let year = params
            .plan_year
            .filter(|year| *year > 0)
            .unwrap_or_else(|| Utc::now().year());

        let body = PlanSearchBody {
            zip,
            county_fips: county_fips.as_deref(),
            year,
            household: household_for(params),
        };

        let url = endpoint(base_url, &["plans", "search"])?;
        tracing::debug!("POST {} (zip={}, county_fips={:?}, year={})", url, zip, county_fips, year);

        let response = self
            .client
            .post(url)
            .bearer_auth(api_key)
            .json(&body)
            .timeout(SEARCH_TIMEOUT)
            .send()
            .await
            .map_err(|e| {
                AppError::UpstreamUnavailable(format!(
                    "Plan search request failed: {}",
                    e.without_url()
                ))
            })?;

        let data: Value = ensure_success(response, "Marketplace plan search")
            .await?
            .json()
            .await
            .map_err(|e| {
                AppError::UpstreamUnavailable(format!("Failed to parse plan search response: {}", e.without_url()))
            })?;

        Ok(normalize_plan_list(&data))
    }

    /// Best-effort `GET counties/by/zip/{zip}`; `Ok(None)` when nothing matched.
    async fn resolve_county_fips(
        &self,
        base_url: &str,
        api_key: &str,
        zip: &str,
    ) -> Result<Option<String>, AppError> {
        let url = endpoint(base_url, &["counties", "by", "zip", zip])?;
        tracing::debug!("Resolving county FIPS for ZIP {}", zip);

        let response = self
            .client
            .get(url)
            .bearer_auth(api_key)
            .timeout(GEOCODE_TIMEOUT)
            .send()
            .await?;

        let data: Value = ensure_success(response, "Marketplace county lookup")
            .await?
            .json()
            .await?;

        Ok(county_fips_from(&data))
    }
}

/// Appends percent-encoded path segments to the configured base URL.
fn endpoint(base_url: &str, segments: &[&str]) -> Result<reqwest::Url, AppError> {
    let mut url = reqwest::Url::parse(base_url)
        .map_err(|e| AppError::ConfigMissing(format!("Invalid marketplace base URL: {}", e)))?;
    url.path_segments_mut()
        .map_err(|_| AppError::ConfigMissing("Marketplace base URL cannot be a base".to_string()))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_missing_carrier_uses_placeholder() {
        let plan = RawPlan::new(json!({"name": "Silver Saver", "premium": 320})).normalize();
        assert_eq!(plan.carrier, "Unknown Carrier");
        assert_eq!(plan.metal, "Unknown");
    }

    #[test]
    fn test_premium_alias_used_when_monthly_premium_absent() {
        let plan = RawPlan::new(json!({"premium": 412.5})).normalize();
        assert_eq!(plan.monthly_premium, 412.5);
        assert_eq!(plan.name, "Unknown Plan");
        assert_eq!(plan.deductible, 0.0);
        assert_eq!(plan.oop_max, 0.0);
    }

    #[test]
    fn test_alias_order_prefers_earlier_fields() {
        let plan = RawPlan::new(json!({
            "marketing_name": "Gold Plus",
            "name": "ignored",
            "issuer_name": "Oscar",
            "metal_level": "Gold",
            "monthly_premium": 500,
            "premium": 1,
            "deductible_individual": 1500,
            "oop_max_individual": 7000,
            "plan_type": "EPO",
            "network": "ignored"
        }))
        .normalize();
        assert_eq!(plan.name, "Gold Plus");
        assert_eq!(plan.carrier, "Oscar");
        assert_eq!(plan.monthly_premium, 500.0);
        assert_eq!(plan.deductible, 1500.0);
        assert_eq!(plan.oop_max, 7000.0);
        assert_eq!(plan.plan_type.as_deref(), Some("EPO"));
        // id falls back to marketing_name
        assert_eq!(plan.id.as_deref(), Some("Gold Plus"));
    }

    #[test]
    fn test_falsy_values_fall_through() {
        let plan = RawPlan::new(json!({
            "carrier": "",
            "issuer": {"name": "Ambetter"},
            "monthly_premium": 0,
            "individual_rate": "289.99"
        }))
        .normalize();
        assert_eq!(plan.carrier, "Ambetter");
        assert_eq!(plan.monthly_premium, 289.99);
    }

    #[test]
    fn test_plan_list_locations() {
        let under_plans = json!({"plans": [{"name": "A"}]});
        let under_results = json!({"results": [{"name": "B"}, {"name": "C"}]});
        let top_level = json!([{"name": "D"}]);
        let not_a_list = json!({"message": "nothing here"});

        assert_eq!(normalize_plan_list(&under_plans)[0].name, "A");
        assert_eq!(normalize_plan_list(&under_results).len(), 2);
        assert_eq!(normalize_plan_list(&top_level)[0].name, "D");
        assert!(normalize_plan_list(&not_a_list).is_empty());
    }

    #[test]
    fn test_plan_list_is_capped() {
        let plans: Vec<Value> = (0..25).map(|i| json!({"id": i + 1})).collect();
        let normalized = normalize_plan_list(&json!({ "plans": plans }));
        assert_eq!(normalized.len(), PLAN_LIMIT);
        assert_eq!(normalized[0].id.as_deref(), Some("1"));
    }

    #[test]
    fn test_county_fips_shapes() {
        assert_eq!(
            county_fips_from(&json!([{"fips": "36061", "name": "New York"}])).as_deref(),
            Some("36061")
        );
        assert_eq!(
            county_fips_from(&json!({"counties": [{"fips": "06075"}]})).as_deref(),
            Some("06075")
        );
        assert_eq!(county_fips_from(&json!({"counties": []})), None);
    }

    #[test]
    fn test_household_applies_tobacco_flag_to_everyone() {
        let params = MarketplaceParams {
            household_size: Some(3),
            household_income: Some(52000.0),
            member_ages: Some(vec![44, 41, 12]),
            tobacco_use_adults: Some(true),
            ..Default::default()
        };
        let household = serde_json::to_value(household_for(&params)).unwrap();
        assert_eq!(household["size"], json!(3));
        assert_eq!(household["members"].as_array().unwrap().len(), 3);
        assert!(household["members"]
            .as_array()
            .unwrap()
            .iter()
            .all(|m| m["tobacco"] == json!(true)));
    }

    #[test]
    fn test_household_omitted_without_size_or_ages() {
        let params = MarketplaceParams {
            household_income: Some(40000.0),
            household_size: Some(0),
            ..Default::default()
        };
        assert!(household_for(&params).is_none());
    }

    #[test]
    fn test_endpoint_encodes_segments() {
        let url = endpoint("https://api.example.com/v1", &["counties", "by", "zip", "100 01"]).unwrap();
        assert_eq!(url.as_str(), "https://api.example.com/v1/counties/by/zip/100%2001");

        let root = endpoint("https://api.example.com", &["plans", "search"]).unwrap();
        assert_eq!(root.as_str(), "https://api.example.com/plans/search");
    }

    #[tokio::test]
    async fn test_unconfigured_key_returns_empty_without_network() {
        let client = MarketplaceClient::new(
            reqwest::Client::new(),
            Some("http://127.0.0.1:9".to_string()),
            None,
        );
        let params = MarketplaceParams {
            zip_code: Some("10001".to_string()),
            ..Default::default()
        };
        let result = client.get_plans(&params).await;
        assert!(!result.api_key_present);
        assert!(result.plans.is_empty());
        assert!(result.error.is_none());
        assert_eq!(result.query, params);
    }

    #[tokio::test]
    async fn test_missing_zip_returns_empty_with_key_present() {
        let client = MarketplaceClient::new(
            reqwest::Client::new(),
            Some("http://127.0.0.1:9".to_string()),
            Some("key".to_string()),
        );
        let result = client.get_plans(&MarketplaceParams::default()).await;
        assert!(result.api_key_present);
        assert!(result.plans.is_empty());
        assert!(result.error.is_none());
    }
}
