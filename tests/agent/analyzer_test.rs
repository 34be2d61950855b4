//! Verdict schema and analysis prompt tests.

use brokerbot::agent::analyzer::{build_analysis_prompts, parse_verdict};
use brokerbot::agent::{Intent, PipelineError, TargetPriceInfo};
use brokerbot::negotiation::{AgentPolicy, Sender, TriggerGate};
use serde_json::json;

use crate::support::{base_snapshot, msg};

fn target_1000() -> TargetPriceInfo {
    TargetPriceInfo {
        target: 1000.0,
        distance_km: 500.0,
        rate_per_km: 2.0,
    }
}

// ---------- parse_verdict ----------

#[test]
fn well_formed_verdict_parses() {
    let verdict = parse_verdict(json!({
        "intent": "counter_proposal",
        "explicitPriceInMessage": 950.0,
        "currentNegotiationPrice": 950.0,
        "newTermsDetected": false,
        "needsReview": false
    }))
    .expect("verdict should parse");
    assert_eq!(verdict.intent, Intent::CounterProposal);
    assert_eq!(verdict.explicit_price_in_message, Some(950.0));
    assert_eq!(verdict.current_negotiation_price, Some(950.0));
    assert!(!verdict.new_terms_detected);
    assert!(!verdict.needs_review);
}

#[test]
fn missing_required_field_is_shape_error() {
    // No needsReview.
    let result = parse_verdict(json!({
        "intent": "question",
        "newTermsDetected": false
    }));
    assert!(matches!(result, Err(PipelineError::VerdictShape(_))));
}

#[test]
fn mistyped_field_is_shape_error() {
    let result = parse_verdict(json!({
        "intent": "question",
        "newTermsDetected": "no",
        "needsReview": false
    }));
    assert!(matches!(result, Err(PipelineError::VerdictShape(_))));
}

#[test]
fn review_without_reason_is_shape_error() {
    let result = parse_verdict(json!({
        "intent": "agreement",
        "newTermsDetected": false,
        "needsReview": true
    }));
    assert!(matches!(result, Err(PipelineError::VerdictShape(_))));

    let result = parse_verdict(json!({
        "intent": "agreement",
        "newTermsDetected": false,
        "needsReview": true,
        "reviewReason": "   "
    }));
    assert!(matches!(result, Err(PipelineError::VerdictShape(_))));
}

#[test]
fn review_with_reason_parses() {
    let verdict = parse_verdict(json!({
        "intent": "agreement",
        "newTermsDetected": false,
        "needsReview": true,
        "reviewReason": "counterparty agreed to the price"
    }))
    .expect("verdict should parse");
    assert!(verdict.needs_review);
    assert_eq!(
        verdict.review_reason.as_deref(),
        Some("counterparty agreed to the price")
    );
}

#[test]
fn unknown_extra_fields_are_ignored() {
    let verdict = parse_verdict(json!({
        "intent": "other",
        "newTermsDetected": false,
        "needsReview": false,
        "confidence": 0.93
    }))
    .expect("extra fields should be ignored");
    assert_eq!(verdict.intent, Intent::Other);
}

// ---------- build_analysis_prompts ----------

#[test]
fn prompts_frame_direction_upward_when_below_target() {
    let snapshot = base_snapshot();
    let (system, _user) =
        build_analysis_prompts(&snapshot, &AgentPolicy::default(), &target_1000(), Some(900.0));
    assert!(system.contains("UP"));
}

#[test]
fn prompts_frame_direction_as_met_when_at_target() {
    let snapshot = base_snapshot();
    let (system, _user) =
        build_analysis_prompts(&snapshot, &AgentPolicy::default(), &target_1000(), Some(1000.0));
    assert!(system.contains("already meets our target"));
}

#[test]
fn prompts_list_only_armed_triggers() {
    let snapshot = base_snapshot();
    let (system, _user) =
        build_analysis_prompts(&snapshot, &AgentPolicy::default(), &target_1000(), None);
    // Armed by default.
    assert!(system.contains("explicitly agrees"));
    assert!(system.contains("refusal appears final"));
    // price_change is off by default.
    assert!(!system.contains("changed compared to the previous"));
}

#[test]
fn bypassed_trigger_drops_out_of_prompt() {
    let snapshot = base_snapshot();
    let mut policy = AgentPolicy::default();
    policy.triggers.refusal = TriggerGate {
        notify: true,
        bypass: true,
    };
    let (system, _user) = build_analysis_prompts(&snapshot, &policy, &target_1000(), None);
    assert!(!system.contains("refusal appears final"));
}

#[test]
fn user_prompt_carries_latest_message_and_context() {
    let mut snapshot = base_snapshot();
    snapshot.request.initial_price = Some(1200.0);
    snapshot.messages = vec![
        msg(Sender::Agent, "we can do this for 1400", 0),
        msg(Sender::Counterparty, "too high, 950 is my best", 1),
    ];
    snapshot.auto_reply_count = 3;

    let (_system, user) =
        build_analysis_prompts(&snapshot, &AgentPolicy::default(), &target_1000(), Some(950.0));
    assert!(user.contains("Rotterdam -> Frankfurt"));
    assert!(user.contains("Initial requested price: 1200"));
    assert!(user.contains("Last known counterparty price: 950"));
    assert!(user.contains("Automated replies sent so far: 3 (limit 10)"));
    assert!(user.contains("Latest counterparty message to analyze:\ntoo high, 950 is my best"));
}

#[test]
fn conversation_summary_keeps_only_the_recent_window() {
    let mut snapshot = base_snapshot();
    // 14 alternating turns; the summary window holds 12.
    snapshot.messages = (0..14u32)
        .map(|i| {
            let sender = if i % 2 == 0 {
                Sender::Counterparty
            } else {
                Sender::Agent
            };
            msg(sender, &format!("turn {i};"), i)
        })
        .collect();

    let (_system, user) =
        build_analysis_prompts(&snapshot, &AgentPolicy::default(), &target_1000(), None);
    // The two oldest turns fall out of the window.
    assert!(!user.contains("turn 0;"));
    assert!(!user.contains("turn 1;"));
    for i in 2..14u32 {
        assert!(user.contains(&format!("turn {i};")), "turn {i} missing");
    }
}

#[test]
fn conversation_summary_uses_plain_sender_labels() {
    let mut snapshot = base_snapshot();
    snapshot.messages = vec![
        msg(Sender::CounterpartySystem, "offer updated to 950", 0),
        msg(Sender::Operator, "hold at 1000", 1),
        msg(Sender::Agent, "we need 1050", 2),
    ];

    let (_system, user) =
        build_analysis_prompts(&snapshot, &AgentPolicy::default(), &target_1000(), None);
    assert!(user.contains("[counterparty system] offer updated to 950"));
    assert!(user.contains("[operator] hold at 1000"));
    assert!(user.contains("[us] we need 1050"));
    assert!(!user.contains("CounterpartySystem"));
}

#[test]
fn user_prompt_marks_opening_turn() {
    let snapshot = base_snapshot();
    let (_system, user) =
        build_analysis_prompts(&snapshot, &AgentPolicy::default(), &target_1000(), None);
    assert!(user.contains("no counterparty message yet"));
}
