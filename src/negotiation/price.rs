//! Price arithmetic: numeric extraction, target price, negotiation direction.
//!
//! Everything here is a pure function. Extraction is best-effort and
//! never fails; the target calculation rejects non-positive inputs.

// ---------------------------------------------------------------------------
// Numeric extraction
// ---------------------------------------------------------------------------

/// Pull a monetary or distance value out of free-form text.
///
/// Strips everything except digits, commas, and periods, removes commas
/// as thousands separators, and parses the remainder as a decimal.
/// Returns `None` for empty or unparseable input; never errors.
///
/// `extract_amount("€1,850.00 EUR")` is `Some(1850.0)`;
/// `extract_amount("no numbers here")` is `None`.
pub fn extract_amount(text: &str) -> Option<f64> {
    let kept: String = text
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == ',' || *c == '.')
        .collect();
    let normalized = kept.replace(',', "");
    if normalized.is_empty() {
        return None;
    }
    normalized.parse::<f64>().ok().filter(|v| v.is_finite())
}

// ---------------------------------------------------------------------------
// Target price
// ---------------------------------------------------------------------------

/// Errors from target price computation.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PriceError {
    /// Distance was missing, non-positive, or not a finite number.
    #[error("invalid trip distance: {0}")]
    InvalidDistance(String),
    /// Rate was missing, non-positive, or not a finite number.
    #[error("invalid rate per km: {0}")]
    InvalidRate(String),
}

/// Minimum acceptable total price for a trip: `distance × rate`.
///
/// # Errors
///
/// Returns [`PriceError`] if either input is non-finite or not
/// strictly positive.
pub fn target_price(distance_km: f64, rate_per_km: f64) -> Result<f64, PriceError> {
    if !distance_km.is_finite() || distance_km <= 0.0 {
        return Err(PriceError::InvalidDistance(distance_km.to_string()));
    }
    if !rate_per_km.is_finite() || rate_per_km <= 0.0 {
        return Err(PriceError::InvalidRate(rate_per_km.to_string()));
    }
    Ok(distance_km * rate_per_km)
}

// ---------------------------------------------------------------------------
// Direction
// ---------------------------------------------------------------------------

/// Whether the agent must push the price upward.
///
/// Total function: when either price is unknown the agent assumes it
/// must negotiate up: we are selling, and uncertainty is a risk of
/// under-pricing. Otherwise up ⇔ target > current.
pub fn must_negotiate_up(current: Option<f64>, target: Option<f64>) -> bool {
    match (current, target) {
        (Some(current), Some(target)) => target > current,
        _ => true,
    }
}
