//! Domain model for a freight price negotiation.
//!
//! Everything in this module is read-only input to the pipeline: the
//! [`NegotiationSnapshot`] is loaded from the store, passed in by value,
//! and never mutated. Message and offer logs are append-only and stored
//! in monotonically increasing timestamp order.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub mod history;
pub mod price;

// ---------------------------------------------------------------------------
// Thread participants and messages
// ---------------------------------------------------------------------------

/// Who authored an entry in the negotiation thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sender {
    /// The automated agent itself.
    Agent,
    /// The counterparty's automated system (e.g. their TMS).
    CounterpartySystem,
    /// The human counterparty.
    Counterparty,
    /// A human operator on our side annotating the thread.
    Operator,
}

impl Sender {
    /// Whether this sender sits on the counterparty's side of the table.
    pub fn is_counterparty(self) -> bool {
        matches!(self, Self::Counterparty | Self::CounterpartySystem)
    }
}

/// A single message in the negotiation thread.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreadMessage {
    /// Message author.
    pub sender: Sender,
    /// Free-form message text.
    pub content: String,
    /// When the message was recorded.
    pub timestamp: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Offers
// ---------------------------------------------------------------------------

/// Lifecycle status of a counter offer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OfferStatus {
    /// Offer is on the table.
    Pending,
    /// Offer was accepted.
    Accepted,
    /// Offer was explicitly rejected.
    Rejected,
    /// A later offer replaced this one.
    Superseded,
}

/// A price proposed by either side during the negotiation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CounterOffer {
    /// Proposed total price.
    pub price: f64,
    /// Which side proposed it.
    pub proposed_by: Sender,
    /// When the offer was recorded.
    pub timestamp: DateTime<Utc>,
    /// Current offer status.
    pub status: OfferStatus,
}

// ---------------------------------------------------------------------------
// Negotiation record
// ---------------------------------------------------------------------------

/// Lifecycle status of the negotiation record itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NegotiationStatus {
    /// Actively negotiating.
    Open,
    /// Waiting on the counterparty.
    Pending,
    /// Both sides agreed; thread is closed.
    Agreed,
    /// Negotiation fell through.
    Rejected,
    /// Request expired without agreement.
    Expired,
    /// Cancelled by an operator.
    Cancelled,
}

impl NegotiationStatus {
    /// Whether the pipeline may still act on this negotiation.
    pub fn is_actionable(self) -> bool {
        matches!(self, Self::Open | Self::Pending)
    }
}

/// The initial transport request the negotiation is about.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransportRequest {
    /// Pickup location.
    pub origin: String,
    /// Delivery location.
    pub destination: String,
    /// Trip distance as received, e.g. `"500 km"`. Parsed by the pipeline.
    pub distance: String,
    /// Price the counterparty opened with, if any.
    pub initial_price: Option<f64>,
    /// Load attributes (weight, pallets, equipment), free form.
    pub load_details: Option<String>,
}

/// Read-only snapshot of one negotiation, as loaded from the store.
///
/// Invariant: `messages` and `offers` are in non-decreasing timestamp
/// order as stored. The pipeline reads, never writes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NegotiationSnapshot {
    /// Negotiation identifier.
    pub id: Uuid,
    /// The transport request being negotiated.
    pub request: TransportRequest,
    /// Append-only message log.
    pub messages: Vec<ThreadMessage>,
    /// Append-only counter offer log.
    pub offers: Vec<CounterOffer>,
    /// Whether the automated agent is enabled for this negotiation.
    pub agent_active: bool,
    /// Seller's target rate per kilometre.
    pub rate_per_km: Option<f64>,
    /// How many automated replies have already been sent.
    pub auto_reply_count: u32,
    /// Record lifecycle status.
    pub status: NegotiationStatus,
}

impl NegotiationSnapshot {
    /// Most recent counterparty-side message, if any.
    ///
    /// `None` means it is our turn to open the conversation.
    pub fn latest_counterparty_message(&self) -> Option<&ThreadMessage> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.sender.is_counterparty())
    }

    /// Whether the agent has authored a message in this thread before.
    pub fn agent_has_spoken(&self) -> bool {
        self.messages.iter().any(|m| m.sender == Sender::Agent)
    }
}

// ---------------------------------------------------------------------------
// Policy
// ---------------------------------------------------------------------------

/// Configured negotiation style, shaping tone and concession pacing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Posture {
    /// Relationship-preserving, patient.
    Conservative,
    /// Straightforward, time-boxed.
    Balanced,
    /// Pressure-oriented.
    Aggressive,
}

/// Notify/bypass flag pair for one escalation trigger category.
///
/// The trigger is *armed* (forces human review) only when `notify` is
/// set and `bypass` is not.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TriggerGate {
    /// Whether the caller wants to hear about this condition.
    pub notify: bool,
    /// Whether the caller allows the agent to continue past it anyway.
    pub bypass: bool,
}

impl TriggerGate {
    /// Gate that forces review when its condition holds.
    pub const ARMED: Self = Self {
        notify: true,
        bypass: false,
    };

    /// Gate that never forces review.
    pub const OFF: Self = Self {
        notify: false,
        bypass: false,
    };

    /// Whether this gate currently forces review.
    pub fn armed(self) -> bool {
        self.notify && !self.bypass
    }
}

impl Default for TriggerGate {
    fn default() -> Self {
        Self::ARMED
    }
}

/// Per-category escalation gates.
///
/// By default every category is armed except `price_change`, which would
/// otherwise escalate on every routine counter proposal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReviewTriggers {
    /// Operative price reached or exceeded the target.
    pub target_reached: TriggerGate,
    /// Counterparty explicitly agreed.
    pub agreement: TriggerGate,
    /// Counterparty introduced terms beyond price.
    pub new_terms: TriggerGate,
    /// Operative price changed versus the prior known price.
    pub price_change: TriggerGate,
    /// Automated reply count reached the configured maximum.
    pub max_replies: TriggerGate,
    /// Conversation appears stalled or confusing.
    pub confusion: TriggerGate,
    /// Counterparty refusal appears final.
    pub refusal: TriggerGate,
}

impl Default for ReviewTriggers {
    fn default() -> Self {
        Self {
            target_reached: TriggerGate::ARMED,
            agreement: TriggerGate::ARMED,
            new_terms: TriggerGate::ARMED,
            price_change: TriggerGate::OFF,
            max_replies: TriggerGate::ARMED,
            confusion: TriggerGate::ARMED,
            refusal: TriggerGate::ARMED,
        }
    }
}

/// Caller-provided configuration governing one agent's behavior.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentPolicy {
    /// Negotiation posture.
    pub posture: Posture,
    /// Maximum automated replies before escalation.
    pub max_auto_replies: u32,
    /// Escalation gates.
    pub triggers: ReviewTriggers,
}

impl Default for AgentPolicy {
    fn default() -> Self {
        Self {
            posture: Posture::Balanced,
            max_auto_replies: 10,
            triggers: ReviewTriggers::default(),
        }
    }
}
