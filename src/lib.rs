//! Brokerbot, an automated freight price negotiation agent.
//!
//! Acts for the seller in a freight negotiation thread: computes the
//! minimum acceptable price for a trip, analyzes the counterparty's
//! latest message via a language service, and either drafts the next
//! reply or escalates the thread for human review.
//!
//! See `DESIGN.md` for full architecture documentation.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod logging;

pub mod llm;
pub mod negotiation;
pub mod store;

pub mod agent;
