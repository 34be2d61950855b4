//! Reconstruction of the counterparty's price trail.
//!
//! Walks a negotiation's message and offer logs and produces a
//! chronological, de-duplicated series of prices the counterparty has
//! put on the table. Used for diagnostics and as the fallback source for
//! the operative price, never for control flow on its own.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::price::extract_amount;
use super::NegotiationSnapshot;

/// Where a reconstructed price point was observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PricePointSource {
    /// Scanned out of a counterparty message.
    Message,
    /// Taken from a structured counter offer.
    CounterOffer,
}

/// One counterparty-proposed price at a point in time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    /// The proposed price.
    pub price: f64,
    /// Where it was observed.
    pub source: PricePointSource,
    /// When it was recorded.
    pub timestamp: DateTime<Utc>,
}

/// Chronological, de-duplicated counterparty price series.
///
/// Messages are scanned best-effort with the numeric extractor; offers
/// contribute their structured price. Entries are merged in timestamp
/// order and consecutive repeats of the same price are collapsed.
pub fn counterparty_price_history(snapshot: &NegotiationSnapshot) -> Vec<PricePoint> {
    let mut points: Vec<PricePoint> = Vec::new();

    for message in &snapshot.messages {
        if !message.sender.is_counterparty() {
            continue;
        }
        if let Some(price) = extract_amount(&message.content) {
            points.push(PricePoint {
                price,
                source: PricePointSource::Message,
                timestamp: message.timestamp,
            });
        }
    }

    for offer in &snapshot.offers {
        if !offer.proposed_by.is_counterparty() {
            continue;
        }
        points.push(PricePoint {
            price: offer.price,
            source: PricePointSource::CounterOffer,
            timestamp: offer.timestamp,
        });
    }

    points.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));
    points.dedup_by(|next, prev| next.price == prev.price);
    points
}

/// Most recent counterparty-proposed price point, if any.
pub fn last_counterparty_price(snapshot: &NegotiationSnapshot) -> Option<PricePoint> {
    counterparty_price_history(snapshot).into_iter().last()
}
