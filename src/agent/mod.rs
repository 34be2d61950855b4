//! The negotiation decision pipeline.
//!
//! One pipeline run walks `Start → Analyze → Generate → Done`, with
//! `Error` and `Review` as absorbing terminal outcomes reachable from
//! any stage:
//!
//! 1. **Start** ([`orchestrator`]): validates preconditions and computes
//!    the target price.
//! 2. **Analyze** ([`analyzer`]): asks the language service for a
//!    structured verdict on the counterparty's latest message and applies
//!    the escalation gates.
//! 3. **Generate** ([`generator`]): drafts a reply consistent with the
//!    configured posture, then re-checks the hard business rules before
//!    letting it go out.
//!
//! Every stage writes into a fresh [`PipelineState`]; the orchestrator is
//! the single place errors are normalized, so a run always ends with a
//! populated [`FinalAction`] and never propagates a fault to the caller.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::llm::LlmError;
use crate::negotiation::price::PriceError;
use crate::negotiation::NegotiationStatus;

pub mod analyzer;
pub mod generator;
pub mod orchestrator;

pub use orchestrator::NegotiationAgent;

// ---------------------------------------------------------------------------
// Terminal actions
// ---------------------------------------------------------------------------

/// Terminal outcome of one pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinalAction {
    /// The drafted reply may be sent.
    Send,
    /// A human must decide before anything is sent.
    Review,
    /// The run failed; see the error detail.
    Error,
}

// ---------------------------------------------------------------------------
// Price provenance
// ---------------------------------------------------------------------------

/// Which stage last wrote the operative price. Provenance, not a cache key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriceSource {
    /// Scanned from a counterparty message.
    Message,
    /// Taken from a structured counter offer.
    CounterOffer,
    /// The initial requested price.
    Initial,
    /// Price confirmed by an explicit agreement.
    Agreement,
    /// Price reported by the analysis verdict.
    LlmAnalysis,
    /// Written while handling a failure.
    Error,
    /// Loaded directly from the store record.
    Database,
    /// No price known yet.
    None,
}

/// The price currently considered "on the table", with provenance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurrentPriceInfo {
    /// Numeric price, if known.
    pub price: Option<f64>,
    /// The raw text the price was taken from, if any.
    pub price_text: Option<String>,
    /// Which stage last wrote this value.
    pub source: PriceSource,
    /// When this value was written.
    pub timestamp: DateTime<Utc>,
}

impl CurrentPriceInfo {
    /// Empty price info: nothing known yet.
    pub fn unknown() -> Self {
        Self {
            price: None,
            price_text: None,
            source: PriceSource::None,
            timestamp: Utc::now(),
        }
    }
}

/// The computed minimum acceptable price and its inputs.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TargetPriceInfo {
    /// Minimum acceptable total price (`distance × rate`).
    pub target: f64,
    /// Parsed trip distance in kilometres.
    pub distance_km: f64,
    /// Configured rate per kilometre.
    pub rate_per_km: f64,
}

// ---------------------------------------------------------------------------
// Analysis outcome
// ---------------------------------------------------------------------------

/// Counterparty intent classes the analysis can return.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    /// Explicit agreement to a price.
    Agreement,
    /// Refusal that appears final.
    Refusal,
    /// A new price proposal.
    CounterProposal,
    /// A question needing an answer, no new price.
    Question,
    /// Terms beyond price were introduced.
    NewTerms,
    /// Something else.
    Other,
    /// No counterparty message to classify (our opening turn).
    None,
}

/// What the analysis stage concluded, carried in the pipeline state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisOutcome {
    /// Classified counterparty intent.
    pub intent: Intent,
    /// Price explicitly mentioned in the latest message, if any.
    pub explicit_price: Option<f64>,
    /// Whether terms beyond price were introduced.
    pub new_terms_detected: bool,
    /// Whether a human must review before any reply is sent.
    pub needs_review: bool,
    /// Why review is needed; present iff `needs_review`.
    pub review_reason: Option<String>,
}

// ---------------------------------------------------------------------------
// Pipeline state
// ---------------------------------------------------------------------------

/// Working state for one pipeline run.
///
/// Created fresh at run start with no terminal action; each stage either
/// leaves the action unset (continue) or sets a terminal value (stop).
/// Owned exclusively by the orchestrator and returned to the caller at
/// run end; callers branch on [`PipelineState::final_action`] alone.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineState {
    /// Which negotiation this run was for.
    pub negotiation_id: Uuid,
    /// Terminal action; always `Some` when returned from a run.
    pub final_action: Option<FinalAction>,
    /// Computed target price info, once Start has succeeded.
    pub target: Option<TargetPriceInfo>,
    /// Operative price with provenance.
    pub current_price: CurrentPriceInfo,
    /// Analysis verdict summary, once Analyze has succeeded.
    pub analysis: Option<AnalysisOutcome>,
    /// Drafted reply text, once Generate has produced one.
    pub generated_message: Option<String>,
    /// Why a review outcome was forced, if it was.
    pub review_reason: Option<String>,
    /// Error detail for an error outcome.
    pub error: Option<String>,
}

impl PipelineState {
    /// Fresh state for a run against the given negotiation.
    pub fn new(negotiation_id: Uuid) -> Self {
        Self {
            negotiation_id,
            final_action: None,
            target: None,
            current_price: CurrentPriceInfo::unknown(),
            analysis: None,
            generated_message: None,
            review_reason: None,
            error: None,
        }
    }

    /// The terminal action, defaulting to `Error` if a run somehow ended
    /// without one. Orchestrator output always has it set.
    pub fn action(&self) -> FinalAction {
        self.final_action.unwrap_or(FinalAction::Error)
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors a pipeline stage can fail with.
///
/// Every variant is fatal to the run and is normalized by the
/// orchestrator into `FinalAction::Error`; nothing is retried here.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// The agent is switched off for this negotiation.
    #[error("agent is not active for this negotiation")]
    AgentInactive,
    /// The negotiation is no longer open for automated replies.
    #[error("negotiation status {0:?} is not open for automated replies")]
    NotActionable(NegotiationStatus),
    /// No target rate configured on the record.
    #[error("no target rate per km configured")]
    MissingRate,
    /// The trip distance could not be parsed to a number.
    #[error("could not parse trip distance from {0:?}")]
    UnparseableDistance(String),
    /// Target price computation rejected its inputs.
    #[error(transparent)]
    Price(#[from] PriceError),
    /// The language service call failed.
    #[error("language service call failed: {0}")]
    Service(#[from] LlmError),
    /// The analysis verdict was structurally invalid.
    #[error("malformed analysis verdict: {0}")]
    VerdictShape(String),
}
