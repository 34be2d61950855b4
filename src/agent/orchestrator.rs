//! Pipeline orchestrator: sequences Start → Analyze → Generate.
//!
//! Each stage fully completes (including its outbound service call)
//! before the next begins; the two service calls are the only awaits.
//! The orchestrator owns the [`PipelineState`] for the run and is the
//! single place stage errors are normalized into the `Error` terminal
//! action, so callers always get a complete state back.

use std::sync::Arc;

use crate::llm::{AnalysisService, DraftingService};
use crate::negotiation::history::{counterparty_price_history, last_counterparty_price, PricePointSource};
use crate::negotiation::price::{extract_amount, target_price};
use crate::negotiation::{AgentPolicy, NegotiationSnapshot};

use super::{
    analyzer, generator, CurrentPriceInfo, FinalAction, PipelineError, PipelineState, PriceSource,
    TargetPriceInfo,
};

/// Drives one negotiation pipeline run.
///
/// Holds the two language service capabilities as injected interfaces;
/// construction-time injection is what lets conformance tests substitute
/// deterministic stubs. Stateless across runs: every invocation operates
/// on the snapshot passed in and produces a fresh state.
pub struct NegotiationAgent {
    analysis: Arc<dyn AnalysisService>,
    drafting: Arc<dyn DraftingService>,
}

impl std::fmt::Debug for NegotiationAgent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NegotiationAgent").finish_non_exhaustive()
    }
}

impl NegotiationAgent {
    /// Create an agent over the given service capabilities.
    pub fn new(analysis: Arc<dyn AnalysisService>, drafting: Arc<dyn DraftingService>) -> Self {
        Self { analysis, drafting }
    }

    /// Run the pipeline once for the given snapshot and policy.
    ///
    /// Always returns a state with a populated
    /// [`final_action`](PipelineState::final_action); stage failures are
    /// converted here, never propagated.
    pub async fn run(&self, snapshot: &NegotiationSnapshot, policy: &AgentPolicy) -> PipelineState {
        let mut state = PipelineState::new(snapshot.id);

        if let Err(e) = self.run_stages(snapshot, policy, &mut state).await {
            tracing::warn!(negotiation = %snapshot.id, error = %e, "pipeline run failed");
            state.error = Some(e.to_string());
            state.final_action = Some(FinalAction::Error);
        }
        if state.final_action.is_none() {
            // Should be unreachable; normalize rather than hand back a
            // state the caller cannot branch on.
            state.error = Some("pipeline completed without a terminal action".to_owned());
            state.final_action = Some(FinalAction::Error);
        }

        tracing::info!(
            negotiation = %snapshot.id,
            action = ?state.action(),
            price = ?state.current_price.price,
            "pipeline run finished"
        );
        state
    }

    async fn run_stages(
        &self,
        snapshot: &NegotiationSnapshot,
        policy: &AgentPolicy,
        state: &mut PipelineState,
    ) -> Result<(), PipelineError> {
        // Start: preconditions, target price, operative price seed.
        let target = validate_preconditions(snapshot)?;
        state.target = Some(target);
        state.current_price = seed_price(snapshot);
        tracing::debug!(
            negotiation = %snapshot.id,
            target = target.target,
            seed_price = ?state.current_price.price,
            "preconditions validated"
        );

        // Analyze. On error the prior price info in `state` is preserved.
        let prior = prior_known_price(snapshot);
        let (current, outcome) = analyzer::analyze(
            self.analysis.as_ref(),
            snapshot,
            policy,
            &target,
            &state.current_price,
            prior,
        )
        .await?;
        state.current_price = current;
        state.analysis = Some(outcome.clone());
        if outcome.needs_review {
            state.review_reason = outcome.review_reason.clone();
            state.final_action = Some(FinalAction::Review);
            return Ok(());
        }

        // Generate.
        let drafted = generator::generate(
            self.drafting.as_ref(),
            snapshot,
            policy,
            &target,
            &state.current_price,
            &outcome,
        )
        .await?;
        state.generated_message = drafted.message;
        state.review_reason = drafted.review_reason;
        state.final_action = Some(drafted.final_action);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Start-stage helpers
// ---------------------------------------------------------------------------

/// Validate run preconditions and compute the target price.
///
/// Used by the pipeline's Start stage and by the CLI `check` command,
/// which must not touch the language service.
///
/// # Errors
///
/// Returns the specific [`PipelineError`] precondition variant: inactive
/// agent, non-actionable status, missing/invalid rate, or unparseable
/// distance.
pub fn validate_preconditions(
    snapshot: &NegotiationSnapshot,
) -> Result<TargetPriceInfo, PipelineError> {
    if !snapshot.agent_active {
        return Err(PipelineError::AgentInactive);
    }
    if !snapshot.status.is_actionable() {
        return Err(PipelineError::NotActionable(snapshot.status));
    }
    let rate_per_km = snapshot.rate_per_km.ok_or(PipelineError::MissingRate)?;
    let distance_km = extract_amount(&snapshot.request.distance)
        .ok_or_else(|| PipelineError::UnparseableDistance(snapshot.request.distance.clone()))?;
    let target = target_price(distance_km, rate_per_km)?;
    Ok(TargetPriceInfo {
        target,
        distance_km,
        rate_per_km,
    })
}

/// Seed the operative price before analysis: the last counterparty
/// price from the reconstructed history, else the stored initial price.
fn seed_price(snapshot: &NegotiationSnapshot) -> CurrentPriceInfo {
    if let Some(point) = last_counterparty_price(snapshot) {
        let source = match point.source {
            PricePointSource::Message => PriceSource::Message,
            PricePointSource::CounterOffer => PriceSource::CounterOffer,
        };
        return CurrentPriceInfo {
            price: Some(point.price),
            price_text: Some(point.price.to_string()),
            source,
            timestamp: point.timestamp,
        };
    }
    if let Some(initial) = snapshot.request.initial_price {
        return CurrentPriceInfo {
            price: Some(initial),
            price_text: Some(initial.to_string()),
            source: PriceSource::Database,
            timestamp: chrono::Utc::now(),
        };
    }
    CurrentPriceInfo::unknown()
}

/// The last counterparty price recorded strictly before the latest
/// counterparty message, the comparison point for the price-change gate.
fn prior_known_price(snapshot: &NegotiationSnapshot) -> Option<f64> {
    let latest = snapshot.latest_counterparty_message()?;
    counterparty_price_history(snapshot)
        .iter()
        .rev()
        .find(|point| point.timestamp < latest.timestamp)
        .map(|point| point.price)
}
