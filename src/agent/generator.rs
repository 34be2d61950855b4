//! Generation stage: draft the outgoing reply and re-check the hard
//! business rules before letting it go out.
//!
//! Only runs when the analysis stage decided to continue. The style
//! guidance comes from the configured posture; the tactical instruction
//! is keyed off the analyzed intent. After the draft comes back, two
//! deterministic checks can still force a review outcome; the language
//! service never has the last word on whether a message is sent.

use crate::llm::{ChatMessage, DraftingService};
use crate::negotiation::price::must_negotiate_up;
use crate::negotiation::{AgentPolicy, NegotiationSnapshot, Posture, Sender};

use super::{AnalysisOutcome, CurrentPriceInfo, FinalAction, Intent, PipelineError, TargetPriceInfo};

/// What the generation stage decided.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratorOutcome {
    /// `Send` when the draft may go out, `Review` when a hard rule fired.
    pub final_action: FinalAction,
    /// The drafted text. Kept on review outcomes so the operator sees
    /// what would have been sent; absent only on errors.
    pub message: Option<String>,
    /// Why review was forced, when it was.
    pub review_reason: Option<String>,
}

// ---------------------------------------------------------------------------
// Style and tactics
// ---------------------------------------------------------------------------

/// Fixed tactical profile for a posture.
pub fn style_guidance(posture: Posture) -> &'static str {
    match posture {
        Posture::Conservative => {
            "Preserve the relationship. Be patient and courteous, concede slowly \
             in small steps, and never issue ultimatums."
        }
        Posture::Balanced => {
            "Be straightforward and professional. Justify the price with route \
             economics, propose concrete numbers, and keep the exchange time-boxed."
        }
        Posture::Aggressive => {
            "Apply pressure. Anchor high, mention competing demand for the \
             capacity, concede rarely, and push for a quick decision."
        }
    }
}

/// Tactical instruction for this turn, keyed off the analyzed intent.
fn tactic_for(
    intent: Intent,
    negotiate_up: bool,
    first_agent_message: bool,
    target: &TargetPriceInfo,
    current: &CurrentPriceInfo,
) -> String {
    if first_agent_message {
        return format!(
            "This is our first message in the thread. Open by anchoring clearly \
             above our minimum of {}; do not reveal the minimum itself.",
            target.target
        );
    }
    match intent {
        Intent::CounterProposal => {
            let current = current
                .price
                .map_or_else(|| "their latest offer".to_owned(), |p| p.to_string());
            if negotiate_up {
                format!(
                    "They countered at {current}. Counter back above it, moving \
                     toward {} without going below it.",
                    target.target
                )
            } else {
                "Their latest offer meets our goal. Confirm the number and move \
                 toward closing without reopening the price."
                    .to_owned()
            }
        }
        Intent::Question => {
            "Answer their question directly, then restate our price position.".to_owned()
        }
        Intent::Agreement => {
            "They appear to agree. Confirm the agreed price and the next step.".to_owned()
        }
        Intent::Refusal => {
            "They are refusing. Make one measured attempt to keep the door open \
             without conceding below our minimum."
                .to_owned()
        }
        Intent::NewTerms | Intent::Other | Intent::None => format!(
            "Keep the conversation on price. Our minimum acceptable total is {}.",
            target.target
        ),
    }
}

// ---------------------------------------------------------------------------
// Prompt assembly
// ---------------------------------------------------------------------------

/// Build the role-tagged message sequence for the drafting call.
///
/// The thread history is reinterpreted so the service can tell the
/// parties apart: our prior turns become `assistant`, operator notes
/// become `system` annotations, counterparty messages become `user`.
pub fn build_draft_messages(
    snapshot: &NegotiationSnapshot,
    policy: &AgentPolicy,
    target: &TargetPriceInfo,
    current: &CurrentPriceInfo,
    analysis: &AnalysisOutcome,
) -> Vec<ChatMessage> {
    let negotiate_up = must_negotiate_up(current.price, Some(target.target));
    let first_agent_message = !snapshot.agent_has_spoken();

    let mut system = String::new();
    system.push_str(&format!(
        "You write the next message for the seller in a freight price negotiation. \
         Route: {} -> {} ({}). Our minimum acceptable total price is {}; never \
         agree to less and never disclose it.\n\nStyle: {}\n\nThis turn: {}",
        snapshot.request.origin,
        snapshot.request.destination,
        snapshot.request.distance,
        target.target,
        style_guidance(policy.posture),
        tactic_for(
            analysis.intent,
            negotiate_up,
            first_agent_message,
            target,
            current
        ),
    ));
    system.push_str(
        "\n\nReply with the message text only, in the language the counterparty used.",
    );

    let mut messages = vec![ChatMessage::system(system)];
    for entry in &snapshot.messages {
        match entry.sender {
            Sender::Agent => messages.push(ChatMessage::assistant(entry.content.clone())),
            Sender::Operator => messages.push(ChatMessage::system(format!(
                "[operator note] {}",
                entry.content
            ))),
            Sender::Counterparty | Sender::CounterpartySystem => {
                messages.push(ChatMessage::user(entry.content.clone()));
            }
        }
    }
    if snapshot.messages.is_empty() {
        // Opening turn: give the model something to respond to.
        messages.push(ChatMessage::user(
            "(no messages yet; open the negotiation)".to_owned(),
        ));
    }
    messages
}

// ---------------------------------------------------------------------------
// Stage entry
// ---------------------------------------------------------------------------

/// Run the generation stage.
///
/// Issues one drafting call, then applies the deterministic
/// post-generation checks: a met target with an agreeing or
/// target-meeting counterparty, a final-looking refusal, or newly
/// introduced terms each force review regardless of the draft.
///
/// # Errors
///
/// Returns [`PipelineError::Service`] if the drafting call fails; no
/// partial text is returned in that case.
pub async fn generate(
    service: &dyn DraftingService,
    snapshot: &NegotiationSnapshot,
    policy: &AgentPolicy,
    target: &TargetPriceInfo,
    current: &CurrentPriceInfo,
    analysis: &AnalysisOutcome,
) -> Result<GeneratorOutcome, PipelineError> {
    let messages = build_draft_messages(snapshot, policy, target, current, analysis);
    let draft = service.draft(&messages).await?;
    tracing::debug!(chars = draft.len(), "draft received");

    let negotiate_up = must_negotiate_up(current.price, Some(target.target));

    if !negotiate_up && matches!(analysis.intent, Intent::Agreement | Intent::CounterProposal) {
        return Ok(GeneratorOutcome {
            final_action: FinalAction::Review,
            message: Some(draft),
            review_reason: Some(format!(
                "target price {} met; accept and confirm with the counterparty",
                target.target
            )),
        });
    }
    if analysis.intent == Intent::Refusal {
        return Ok(GeneratorOutcome {
            final_action: FinalAction::Review,
            message: Some(draft),
            review_reason: Some("counterparty refusal appears final".to_owned()),
        });
    }
    if analysis.new_terms_detected {
        return Ok(GeneratorOutcome {
            final_action: FinalAction::Review,
            message: Some(draft),
            review_reason: Some("counterparty introduced terms beyond price".to_owned()),
        });
    }

    Ok(GeneratorOutcome {
        final_action: FinalAction::Send,
        message: Some(draft),
        review_reason: None,
    })
}
