//! Analysis stage: turn unstructured negotiation context into a
//! structured decision input.
//!
//! Builds a bounded-window conversation summary plus a directional
//! framing, issues one [`AnalysisService`] call, and validates the JSON
//! verdict against a strict schema. The armed escalation gates are
//! rendered into the prompt for the service's judgment; the three
//! numerically checkable gates (target reached, max replies, price
//! change) are additionally re-evaluated here so those review outcomes
//! never depend on service judgment.

use serde::Deserialize;

use crate::llm::AnalysisService;
use crate::negotiation::price::must_negotiate_up;
use crate::negotiation::{AgentPolicy, NegotiationSnapshot, Sender};

use super::{
    AnalysisOutcome, CurrentPriceInfo, Intent, PipelineError, PriceSource, TargetPriceInfo,
};

/// How many trailing messages the conversation summary includes.
const HISTORY_WINDOW: usize = 12;

// ---------------------------------------------------------------------------
// Verdict schema
// ---------------------------------------------------------------------------

/// The JSON verdict the analysis call must return.
///
/// `intent`, `newTermsDetected`, and `needsReview` are required; a
/// missing or mistyped field is a verdict-shape error, not silently
/// defaulted. Unknown extra fields are ignored.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisVerdict {
    /// Classified counterparty intent.
    pub intent: Intent,
    /// Price explicitly mentioned in the latest message, if any.
    #[serde(default)]
    pub explicit_price_in_message: Option<f64>,
    /// The price now on the table, accounting for history.
    #[serde(default)]
    pub current_negotiation_price: Option<f64>,
    /// Whether terms beyond price were introduced.
    pub new_terms_detected: bool,
    /// Whether a human must review before continuing.
    pub needs_review: bool,
    /// Why review is needed; required iff `needsReview` is true.
    #[serde(default)]
    pub review_reason: Option<String>,
}

/// Validate a raw verdict payload against the schema.
///
/// # Errors
///
/// Returns [`PipelineError::VerdictShape`] on a missing/mistyped
/// required field, or when `needsReview` is set without a reason.
pub fn parse_verdict(payload: serde_json::Value) -> Result<AnalysisVerdict, PipelineError> {
    let verdict: AnalysisVerdict = serde_json::from_value(payload)
        .map_err(|e| PipelineError::VerdictShape(e.to_string()))?;
    let has_reason = verdict
        .review_reason
        .as_deref()
        .is_some_and(|r| !r.trim().is_empty());
    if verdict.needs_review && !has_reason {
        return Err(PipelineError::VerdictShape(
            "needsReview is set but reviewReason is missing".to_owned(),
        ));
    }
    Ok(verdict)
}

// ---------------------------------------------------------------------------
// Prompt assembly
// ---------------------------------------------------------------------------

/// Build the system/user prompt pair for the analysis call.
///
/// Exposed for conformance tests; the prompt is the only place the
/// service learns which gates are armed.
pub fn build_analysis_prompts(
    snapshot: &NegotiationSnapshot,
    policy: &AgentPolicy,
    target: &TargetPriceInfo,
    last_known_price: Option<f64>,
) -> (String, String) {
    let direction = if must_negotiate_up(last_known_price, Some(target.target)) {
        "We must negotiate the price UP toward the target."
    } else {
        "The current price already meets our target; we may accept or hold."
    };

    let mut system = String::new();
    system.push_str(
        "You analyze one side of a freight price negotiation. We are the seller. \
         Read the conversation and return a single JSON object with exactly these fields:\n\
         - \"intent\": one of \"agreement\", \"refusal\", \"counter_proposal\", \
         \"question\", \"new_terms\", \"other\", \"none\"\n\
         - \"explicitPriceInMessage\": number or null\n\
         - \"currentNegotiationPrice\": number or null (the price now on the table, \
         accounting for the whole history)\n\
         - \"newTermsDetected\": boolean\n\
         - \"needsReview\": boolean\n\
         - \"reviewReason\": string, required when needsReview is true\n\n",
    );
    system.push_str(direction);
    system.push_str("\n\nSet needsReview to true if ANY of these conditions hold:\n");
    for line in armed_trigger_lines(policy) {
        system.push_str("- ");
        system.push_str(&line);
        system.push('\n');
    }
    system.push_str(
        "If none of the listed conditions hold, set needsReview to false. \
         If there is no counterparty message yet (it is our opening turn), \
         that alone never requires review.",
    );

    let mut user = String::new();
    user.push_str(&format!(
        "Route: {} -> {} ({})\n",
        snapshot.request.origin, snapshot.request.destination, snapshot.request.distance
    ));
    if let Some(initial) = snapshot.request.initial_price {
        user.push_str(&format!("Initial requested price: {initial}\n"));
    }
    user.push_str(&format!("Our minimum acceptable price: {}\n", target.target));
    if let Some(price) = last_known_price {
        user.push_str(&format!("Last known counterparty price: {price}\n"));
    }
    user.push_str(&format!(
        "Automated replies sent so far: {} (limit {})\n",
        snapshot.auto_reply_count, policy.max_auto_replies
    ));
    user.push_str("\nConversation (most recent last):\n");
    user.push_str(&conversation_window(snapshot, HISTORY_WINDOW));
    match snapshot.latest_counterparty_message() {
        Some(message) => {
            user.push_str("\nLatest counterparty message to analyze:\n");
            user.push_str(&message.content);
        }
        None => {
            user.push_str("\nThere is no counterparty message yet; it is our opening turn.");
        }
    }

    (system, user)
}

/// Human-readable descriptions of the currently armed gates.
fn armed_trigger_lines(policy: &AgentPolicy) -> Vec<String> {
    let triggers = &policy.triggers;
    let mut lines = Vec::new();
    if triggers.target_reached.armed() {
        lines.push("the price on the table reaches or exceeds our minimum acceptable price".to_owned());
    }
    if triggers.agreement.armed() {
        lines.push("the counterparty explicitly agrees to a price".to_owned());
    }
    if triggers.new_terms.armed() {
        lines.push("the counterparty introduces terms beyond price (dates, load, payment, penalties)".to_owned());
    }
    if triggers.price_change.armed() {
        lines.push("the price on the table changed compared to the previous known price".to_owned());
    }
    if triggers.max_replies.armed() {
        lines.push("the automated reply count has reached its limit".to_owned());
    }
    if triggers.confusion.armed() {
        lines.push("the conversation appears stalled, circular, or confusing".to_owned());
    }
    if triggers.refusal.armed() {
        lines.push("the counterparty's refusal appears final".to_owned());
    }
    lines
}

/// Render the last `window` messages as labeled lines.
fn conversation_window(snapshot: &NegotiationSnapshot, window: usize) -> String {
    let start = snapshot.messages.len().saturating_sub(window);
    snapshot
        .messages
        .iter()
        .skip(start)
        .map(|m| format!("[{}] {}", sender_label(m.sender), m.content))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Prompt-facing label for a thread participant.
fn sender_label(sender: Sender) -> &'static str {
    match sender {
        Sender::Agent => "us",
        Sender::CounterpartySystem => "counterparty system",
        Sender::Counterparty => "counterparty",
        Sender::Operator => "operator",
    }
}

// ---------------------------------------------------------------------------
// Stage entry
// ---------------------------------------------------------------------------

/// Run the analysis stage.
///
/// On success, returns the updated operative price info and the analysis
/// outcome (with the deterministic gate backstop applied). The caller
/// keeps its prior price info when this returns an error.
///
/// # Errors
///
/// Returns [`PipelineError::Service`] on a call failure and
/// [`PipelineError::VerdictShape`] on a malformed verdict.
pub async fn analyze(
    service: &dyn AnalysisService,
    snapshot: &NegotiationSnapshot,
    policy: &AgentPolicy,
    target: &TargetPriceInfo,
    seed: &CurrentPriceInfo,
    prior_price: Option<f64>,
) -> Result<(CurrentPriceInfo, AnalysisOutcome), PipelineError> {
    let (system, user) = build_analysis_prompts(snapshot, policy, target, seed.price);
    let payload = service.analyze(&system, &user).await?;
    let verdict = parse_verdict(payload)?;

    let current = resolve_operative_price(&verdict, snapshot, seed);
    let outcome = apply_gate_backstop(verdict, snapshot, policy, target, &current, prior_price);

    tracing::debug!(
        intent = ?outcome.intent,
        price = ?current.price,
        needs_review = outcome.needs_review,
        "analysis verdict accepted"
    );
    Ok((current, outcome))
}

/// Resolve the operative price after a well-formed verdict.
///
/// Fallback order when the verdict reports no price: the last known
/// operative price (seeded from history), else the initial requested
/// price, else unknown.
fn resolve_operative_price(
    verdict: &AnalysisVerdict,
    snapshot: &NegotiationSnapshot,
    seed: &CurrentPriceInfo,
) -> CurrentPriceInfo {
    if let Some(price) = verdict.current_negotiation_price {
        let source = if verdict.intent == Intent::Agreement {
            PriceSource::Agreement
        } else {
            PriceSource::LlmAnalysis
        };
        return CurrentPriceInfo {
            price: Some(price),
            price_text: Some(price.to_string()),
            source,
            timestamp: chrono::Utc::now(),
        };
    }
    if seed.price.is_some() {
        return seed.clone();
    }
    if let Some(initial) = snapshot.request.initial_price {
        return CurrentPriceInfo {
            price: Some(initial),
            price_text: Some(initial.to_string()),
            source: PriceSource::Initial,
            timestamp: chrono::Utc::now(),
        };
    }
    seed.clone()
}

/// Re-evaluate the numerically checkable gates and fold the result into
/// the verdict. The service's own `needsReview` is always honored; the
/// backstop can only add a review, never remove one.
fn apply_gate_backstop(
    verdict: AnalysisVerdict,
    snapshot: &NegotiationSnapshot,
    policy: &AgentPolicy,
    target: &TargetPriceInfo,
    current: &CurrentPriceInfo,
    prior_price: Option<f64>,
) -> AnalysisOutcome {
    let triggers = &policy.triggers;
    let mut forced: Option<String> = None;

    if triggers.target_reached.armed() {
        if let Some(price) = current.price {
            if price >= target.target {
                forced = Some(format!(
                    "target price {} reached: operative price is {price}",
                    target.target
                ));
            }
        }
    }
    if forced.is_none()
        && triggers.max_replies.armed()
        && snapshot.auto_reply_count >= policy.max_auto_replies
    {
        forced = Some(format!(
            "automated reply limit reached ({} of {})",
            snapshot.auto_reply_count, policy.max_auto_replies
        ));
    }
    if forced.is_none() && triggers.price_change.armed() {
        if let (Some(prior), Some(price)) = (prior_price, current.price) {
            if price != prior {
                forced = Some(format!("operative price changed from {prior} to {price}"));
            }
        }
    }

    let needs_review = verdict.needs_review || forced.is_some();
    // The service's own reason wins when it asked for review itself.
    let review_reason = if verdict.needs_review {
        verdict.review_reason.clone()
    } else {
        forced
    };

    AnalysisOutcome {
        intent: verdict.intent,
        explicit_price: verdict.explicit_price_in_message,
        new_terms_detected: verdict.new_terms_detected,
        needs_review,
        review_reason,
    }
}
