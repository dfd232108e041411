//! Property tests for the parsing and summarizing helpers.

use patient_portal_api::chat::{summarize_plans, wants_plans, SUMMARY_PLAN_LIMIT};
use patient_portal_api::identity::bearer_token;
use patient_portal_api::marketplace::{normalize_plan_list, PLAN_LIMIT};
use patient_portal_api::models::{MarketplaceParams, PlanSearchResult};
use proptest::prelude::*;
use serde_json::{json, Value};

fn arb_field() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i32>().prop_map(|n| json!(n)),
        "[ -~]{0,12}".prop_map(Value::String),
        "[a-z]{1,8}".prop_map(|name| json!({ "name": name })),
    ]
}

fn arb_plan() -> impl Strategy<Value = Value> {
    (arb_field(), arb_field(), arb_field(), arb_field(), arb_field()).prop_map(
        |(name, carrier, metal, premium, plan_type)| {
            json!({
                "marketing_name": name,
                "issuer_name": carrier,
                "metal_level": metal,
                "premium": premium,
                "plan_type": plan_type
            })
        },
    )
}

proptest! {
    #[test]
    fn test_intent_classifier_never_panics(message in ".{0,200}") {
        let _ = wants_plans(&message);
    }

    #[test]
    fn test_bearer_token_is_never_blank(header in ".{0,40}") {
        if let Ok(token) = bearer_token(Some(&header)) {
            prop_assert!(!token.trim().is_empty());
        }
    }

    #[test]
    fn test_normalized_plans_are_capped_and_named(plans in prop::collection::vec(arb_plan(), 0..30)) {
        let count = plans.len();
        let normalized = normalize_plan_list(&json!({ "plans": plans }));

        prop_assert_eq!(normalized.len(), count.min(PLAN_LIMIT));
        for plan in &normalized {
            prop_assert!(!plan.name.is_empty());
            prop_assert!(!plan.carrier.is_empty());
            prop_assert!(!plan.metal.is_empty());
            prop_assert!(plan.monthly_premium.is_finite());
        }
    }

    #[test]
    fn test_summary_never_exceeds_limit(plans in prop::collection::vec(arb_plan(), 0..15)) {
        let result = PlanSearchResult {
            api_key_present: true,
            query: MarketplaceParams::default(),
            plans: normalize_plan_list(&Value::Array(plans)),
            error: None,
        };
        let summary = summarize_plans(&result);
        let entries = summary.lines().filter(|l| l.starts_with("  ")).count();
        prop_assert_eq!(entries, result.plans.len().min(SUMMARY_PLAN_LIMIT));
    }
}
