//! End-to-end pipeline runs with stubbed language services.

use std::sync::Arc;

use serde_json::json;

use brokerbot::agent::orchestrator::validate_preconditions;
use brokerbot::agent::{FinalAction, NegotiationAgent, PipelineError, PriceSource};
use brokerbot::negotiation::{AgentPolicy, NegotiationStatus, Sender};

use crate::support::{base_snapshot, msg, FailingAnalysis, ScriptedAnalysis, ScriptedDrafter};

fn agent_with(
    analysis: &Arc<ScriptedAnalysis>,
    drafter: &Arc<ScriptedDrafter>,
) -> NegotiationAgent {
    NegotiationAgent::new(
        Arc::clone(analysis) as Arc<dyn brokerbot::llm::AnalysisService>,
        Arc::clone(drafter) as Arc<dyn brokerbot::llm::DraftingService>,
    )
}

fn counter_verdict(price: f64) -> serde_json::Value {
    json!({
        "intent": "counter_proposal",
        "explicitPriceInMessage": price,
        "currentNegotiationPrice": price,
        "newTermsDetected": false,
        "needsReview": false
    })
}

// ---------- preconditions ----------

#[test]
fn preconditions_compute_target_from_distance_and_rate() {
    let snapshot = base_snapshot();
    let target = validate_preconditions(&snapshot).expect("preconditions should pass");
    assert_eq!(target.target, 1000.0);
    assert_eq!(target.distance_km, 500.0);
    assert_eq!(target.rate_per_km, 2.0);
}

#[test]
fn preconditions_reject_missing_rate() {
    let mut snapshot = base_snapshot();
    snapshot.rate_per_km = None;
    assert!(matches!(
        validate_preconditions(&snapshot),
        Err(PipelineError::MissingRate)
    ));
}

#[test]
fn preconditions_reject_unparseable_distance() {
    let mut snapshot = base_snapshot();
    snapshot.request.distance = "about a day of driving".to_owned();
    assert!(matches!(
        validate_preconditions(&snapshot),
        Err(PipelineError::UnparseableDistance(_))
    ));
}

#[test]
fn preconditions_reject_closed_negotiation() {
    let mut snapshot = base_snapshot();
    snapshot.status = NegotiationStatus::Agreed;
    assert!(matches!(
        validate_preconditions(&snapshot),
        Err(PipelineError::NotActionable(NegotiationStatus::Agreed))
    ));
}

// ---------- full runs ----------

#[tokio::test]
async fn inactive_agent_errors_without_service_calls() {
    let mut snapshot = base_snapshot();
    snapshot.agent_active = false;
    let analysis = Arc::new(ScriptedAnalysis::new(counter_verdict(950.0)));
    let drafter = Arc::new(ScriptedDrafter::new("unused"));

    let state = agent_with(&analysis, &drafter)
        .run(&snapshot, &AgentPolicy::default())
        .await;

    assert_eq!(state.action(), FinalAction::Error);
    assert!(state
        .error
        .as_deref()
        .is_some_and(|e| e.contains("not active")));
    assert_eq!(analysis.call_count(), 0);
    assert_eq!(drafter.call_count(), 0);
}

#[tokio::test]
async fn counter_below_target_is_sent() {
    // 500 km at 2.0/km: target 1000. Counterparty says "ok 950".
    let mut snapshot = base_snapshot();
    snapshot.messages = vec![
        msg(Sender::Agent, "we can do this lane for 1100", 0),
        msg(Sender::Counterparty, "ok 950", 1),
    ];
    let analysis = Arc::new(ScriptedAnalysis::new(counter_verdict(950.0)));
    let drafter = Arc::new(ScriptedDrafter::new("We can meet you at 1020."));

    let state = agent_with(&analysis, &drafter)
        .run(&snapshot, &AgentPolicy::default())
        .await;

    assert_eq!(state.action(), FinalAction::Send);
    assert_eq!(state.generated_message.as_deref(), Some("We can meet you at 1020."));
    assert_eq!(state.current_price.price, Some(950.0));
    assert_eq!(state.current_price.source, PriceSource::LlmAnalysis);
    assert!(state.review_reason.is_none());
    assert_eq!(analysis.call_count(), 1);
    assert_eq!(drafter.call_count(), 1);
}

#[tokio::test]
async fn agreement_at_target_reviews_without_drafting() {
    // The verdict itself does not ask for review; the target-reached gate
    // must force it anyway.
    let mut snapshot = base_snapshot();
    snapshot.messages = vec![
        msg(Sender::Agent, "we need 1000 for this", 0),
        msg(Sender::Counterparty, "deal, 1000 works", 1),
    ];
    let analysis = Arc::new(ScriptedAnalysis::new(json!({
        "intent": "agreement",
        "explicitPriceInMessage": 1000.0,
        "currentNegotiationPrice": 1000.0,
        "newTermsDetected": false,
        "needsReview": false
    })));
    let drafter = Arc::new(ScriptedDrafter::new("unused"));

    let state = agent_with(&analysis, &drafter)
        .run(&snapshot, &AgentPolicy::default())
        .await;

    assert_eq!(state.action(), FinalAction::Review);
    assert!(state
        .review_reason
        .as_deref()
        .is_some_and(|r| r.contains("target price 1000 reached")));
    assert_eq!(state.current_price.price, Some(1000.0));
    assert_eq!(state.current_price.source, PriceSource::Agreement);
    assert_eq!(drafter.call_count(), 0);
}

#[tokio::test]
async fn verdict_requesting_review_skips_drafting() {
    let mut snapshot = base_snapshot();
    snapshot.messages = vec![msg(Sender::Counterparty, "950, but only with pallets swapped", 0)];
    let analysis = Arc::new(ScriptedAnalysis::new(json!({
        "intent": "new_terms",
        "currentNegotiationPrice": 950.0,
        "newTermsDetected": true,
        "needsReview": true,
        "reviewReason": "pallet swap introduced, needs operator sign-off"
    })));
    let drafter = Arc::new(ScriptedDrafter::new("unused"));

    let state = agent_with(&analysis, &drafter)
        .run(&snapshot, &AgentPolicy::default())
        .await;

    assert_eq!(state.action(), FinalAction::Review);
    assert_eq!(
        state.review_reason.as_deref(),
        Some("pallet swap introduced, needs operator sign-off")
    );
    assert_eq!(drafter.call_count(), 0);
}

#[tokio::test]
async fn reply_limit_forces_review() {
    let mut snapshot = base_snapshot();
    snapshot.messages = vec![msg(Sender::Counterparty, "how about 900", 0)];
    snapshot.auto_reply_count = 10;
    let analysis = Arc::new(ScriptedAnalysis::new(counter_verdict(900.0)));
    let drafter = Arc::new(ScriptedDrafter::new("unused"));

    let state = agent_with(&analysis, &drafter)
        .run(&snapshot, &AgentPolicy::default())
        .await;

    assert_eq!(state.action(), FinalAction::Review);
    assert!(state
        .review_reason
        .as_deref()
        .is_some_and(|r| r.contains("reply limit")));
    assert_eq!(drafter.call_count(), 0);
}

#[tokio::test]
async fn malformed_verdict_errors_but_keeps_seeded_price() {
    let mut snapshot = base_snapshot();
    snapshot.messages = vec![msg(Sender::Counterparty, "I can pay 950 EUR", 0)];
    // Missing required needsReview field.
    let analysis = Arc::new(ScriptedAnalysis::new(json!({
        "intent": "counter_proposal",
        "newTermsDetected": false
    })));
    let drafter = Arc::new(ScriptedDrafter::new("unused"));

    let state = agent_with(&analysis, &drafter)
        .run(&snapshot, &AgentPolicy::default())
        .await;

    assert_eq!(state.action(), FinalAction::Error);
    assert!(state
        .error
        .as_deref()
        .is_some_and(|e| e.contains("malformed analysis verdict")));
    // The price seeded from the message history survives the failure.
    assert_eq!(state.current_price.price, Some(950.0));
    assert_eq!(state.current_price.source, PriceSource::Message);
    assert_eq!(drafter.call_count(), 0);
}

#[tokio::test]
async fn service_failure_becomes_error_action() {
    let mut snapshot = base_snapshot();
    snapshot.messages = vec![msg(Sender::Counterparty, "any movement on price?", 0)];
    let drafter = Arc::new(ScriptedDrafter::new("unused"));
    let agent = NegotiationAgent::new(
        Arc::new(FailingAnalysis),
        Arc::clone(&drafter) as Arc<dyn brokerbot::llm::DraftingService>,
    );

    let state = agent.run(&snapshot, &AgentPolicy::default()).await;

    assert_eq!(state.action(), FinalAction::Error);
    assert!(state
        .error
        .as_deref()
        .is_some_and(|e| e.contains("language service")));
    assert_eq!(drafter.call_count(), 0);
}

#[tokio::test]
async fn opening_turn_drafts_without_review() {
    // No counterparty message yet: the agent opens the thread.
    let snapshot = base_snapshot();
    let analysis = Arc::new(ScriptedAnalysis::new(json!({
        "intent": "none",
        "newTermsDetected": false,
        "needsReview": false
    })));
    let drafter = Arc::new(ScriptedDrafter::new(
        "Offering Rotterdam-Frankfurt capacity at 1150.",
    ));

    let state = agent_with(&analysis, &drafter)
        .run(&snapshot, &AgentPolicy::default())
        .await;

    assert_eq!(state.action(), FinalAction::Send);
    assert_eq!(state.current_price.source, PriceSource::None);
    assert!(state.current_price.price.is_none());
    assert_eq!(drafter.call_count(), 1);
}

#[tokio::test]
async fn repeated_runs_are_deterministic_with_fixed_services() {
    let mut snapshot = base_snapshot();
    snapshot.messages = vec![msg(Sender::Counterparty, "ok 950", 0)];
    let analysis = Arc::new(ScriptedAnalysis::new(counter_verdict(950.0)));
    let drafter = Arc::new(ScriptedDrafter::new("We can meet you at 1020."));
    let agent = agent_with(&analysis, &drafter);

    let first = agent.run(&snapshot, &AgentPolicy::default()).await;
    let second = agent.run(&snapshot, &AgentPolicy::default()).await;

    assert_eq!(first.action(), second.action());
    assert_eq!(first.generated_message, second.generated_message);
    assert_eq!(first.current_price.price, second.current_price.price);
    assert_eq!(analysis.call_count(), 2);
    assert_eq!(drafter.call_count(), 2);
}

#[tokio::test]
async fn armed_price_change_gate_forces_review() {
    let mut snapshot = base_snapshot();
    snapshot.messages = vec![
        msg(Sender::Counterparty, "we can pay 900", 0),
        msg(Sender::Agent, "we need more than that", 1),
        msg(Sender::Counterparty, "fine, 950", 2),
    ];
    let analysis = Arc::new(ScriptedAnalysis::new(counter_verdict(950.0)));
    let drafter = Arc::new(ScriptedDrafter::new("unused"));
    let mut policy = AgentPolicy::default();
    policy.triggers.price_change = brokerbot::negotiation::TriggerGate::ARMED;

    let state = agent_with(&analysis, &drafter).run(&snapshot, &policy).await;

    assert_eq!(state.action(), FinalAction::Review);
    assert!(state
        .review_reason
        .as_deref()
        .is_some_and(|r| r.contains("changed from 900 to 950")));
    assert_eq!(drafter.call_count(), 0);
}
