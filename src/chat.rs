//! Insurance chat orchestration.
//!
//! Each request is handled on its own: resolve the caller, load whatever profile
//! exists, optionally pull a few live plan quotes, compose the prompt and hand it
//! to the generation API. Every upstream failure degrades to less context; the
//! caller always gets a message back.

use crate::generation::Prompt;
use crate::handlers::AppState;
use crate::models::{ChatRequest, ChatResponse, InsuranceProfile, MarketplaceParams, PlanSearchResult};
use regex::Regex;
use std::sync::OnceLock;

/// Plans rendered into the prompt, out of the up-to-ten the marketplace returns.
pub const SUMMARY_PLAN_LIMIT: usize = 3;

/// Sent when the generation API itself could not be reached.
pub const UNAVAILABLE_MESSAGE: &str =
    "Sorry, the AI assistant is temporarily unavailable. Please try again shortly.";

const SYSTEM_INSTRUCTION: &str = "You are an expert health insurance assistant.
Respond in 3-6 concise bullet points or short sentences.
Bold key terms using **text** and keep tone clear and friendly.
Prioritize:
- A short comparison: **Your current plan** vs top local options (carrier + plan name, metal level, $premium/mo, deductible, OOP max)
- Practical guidance tailored to the user
Do not ask the user to fill the questionnaire unless a critical field is missing. If a critical field (like ZIP/county) is missing, ask ONE short follow-up question instead of deferring.
Avoid legal/financial guarantees.";

fn shopping_intent_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(better|best|compare|cheaper|options|plans?|providers?|insurance|insurer|carrier|carriers|policy)\b|in[- ]network|marketplace|healthcare\.gov",
        )
        .expect("shopping intent pattern is valid")
    })
}

/// Keyword heuristic for "the user is shopping for or comparing plans".
pub fn wants_plans(message: &str) -> bool {
    shopping_intent_regex().is_match(&message.to_lowercase())
}

/// One summary line, e.g. `  1. Oscar — Silver Simple (Silver, EPO) — $350/mo, ded $4000, OOP max $9100`.
fn plan_line(index: usize, plan: &crate::models::PlanQuote) -> String {
    let metal = match plan.plan_type {
        Some(ref plan_type) => format!("{}, {}", plan.metal, plan_type),
        None => plan.metal.clone(),
    };
    format!(
        "  {}. {} — {} ({}) — ${}/mo, ded ${}, OOP max ${}",
        index + 1,
        plan.carrier,
        plan.name,
        metal,
        plan.monthly_premium,
        plan.deductible,
        plan.oop_max
    )
}

/// Renders the "Top local plan options" block appended to the system prompt.
///
/// Empty when there is nothing to show. A failed search keeps the header and
/// says so, so the model does not assume no plans exist.
pub fn summarize_plans(result: &PlanSearchResult) -> String {
    if result.error.is_some() {
        return "\nTop local plan options: (unable to fetch live plans; showing none)".to_string();
    }

    let top: Vec<String> = result
        .plans
        .iter()
        .take(SUMMARY_PLAN_LIMIT)
        .enumerate()
        .map(|(i, plan)| plan_line(i, plan))
        .collect();

    if top.is_empty() {
        return String::new();
    }
    format!("\nTop local plan options:\n{}", top.join("\n"))
}

/// Note telling the model that files came with the message.
///
/// # Arguments
///
/// * `count` - Number of attachments on the request.
///
/// # Returns
///
/// * `String` - Empty when there are no attachments.
pub fn attachment_note(count: usize) -> String {
    if count == 0 {
        return String::new();
    }
    format!(
        "\n\nThe user provided {} attachment(s). If relevant (e.g., images or PDFs), consider them when answering.",
        count
    )
}

/// Pretty JSON of the stored profile; `{}` when nothing is on file.
pub fn profile_json(profile: Option<&InsuranceProfile>) -> String {
    profile
        .and_then(|p| serde_json::to_string_pretty(p).ok())
        .unwrap_or_else(|| "{}".to_string())
}

/// Builds the system half of the prompt.
///
/// # Arguments
///
/// * `profile` - The caller's stored profile, if any. Rendered as `{}` when absent.
/// * `plans_summary` - Output of [`summarize_plans`], possibly empty.
/// * `attachment_note` - Output of [`attachment_note`], possibly empty.
///
/// # Returns
///
/// * `String` - Fixed instruction, profile JSON, plan block and note, in that order.
pub fn compose_system_prompt(
    profile: Option<&InsuranceProfile>,
    plans_summary: &str,
    attachment_note: &str,
) -> String {
    format!(
        "{}\n\nUser's known insurance info (may be empty):\n{}{}{}",
        SYSTEM_INSTRUCTION,
        profile_json(profile),
        plans_summary,
        attachment_note
    )
}

/// Resolves the caller and loads their profile. Any failure means "no profile".
pub async fn load_profile(state: &AppState, authorization: Option<&str>) -> Option<InsuranceProfile> {
    let patient_id = match state.identity.resolve(authorization).await {
        Ok(id) => id,
        Err(e) => {
            tracing::debug!("Continuing without profile, identity unavailable: {}", e);
            return None;
        }
    };

    match state.store.get(patient_id).await {
        Ok(profile) => profile,
        Err(e) => {
            tracing::warn!("Continuing without profile, store read failed: {}", e);
            None
        }
    }
}

/// Handles one chat turn end to end.
///
/// # Arguments
///
/// * `state` - Shared clients and store.
/// * `authorization` - Raw `Authorization` header value, if sent.
/// * `request` - The user's message and attachments.
///
/// # Returns
///
/// * `ChatResponse` - Always a message: generated text, or the fixed
///   disabled/fallback/unavailable text when generation cannot answer.
pub async fn respond(
    state: &AppState,
    authorization: Option<&str>,
    request: &ChatRequest,
) -> ChatResponse {
    let profile = load_profile(state, authorization).await;

    let plans_summary = if wants_plans(&request.message) {
        let params = MarketplaceParams::from_profile(profile.as_ref());
        let result = state.marketplace.get_plans(&params).await;
        summarize_plans(&result)
    } else {
        String::new()
    };

    let prompt = Prompt {
        system: compose_system_prompt(
            profile.as_ref(),
            &plans_summary,
            &attachment_note(request.attachments.len()),
        ),
        user: request.message.clone(),
    };

    let message = match state.generator.generate(&prompt).await {
        Ok(text) => text,
        Err(e) => {
            tracing::error!("Generation failed, returning apology: {}", e);
            UNAVAILABLE_MESSAGE.to_string()
        }
    };

    ChatResponse { message }
}
