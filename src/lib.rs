//! Wedding Planner Orchestrator
//!
//! Dialogue orchestration engine for a wedding planning assistant:
//! - Parses one utterance into a closed intent and normalized slots
//! - Routes it to tools, a clarification question, or a plain reply
//! - Runs tools concurrently with per-tool timeouts and partial failure
//! - Merges writes into per-user memory under a per-user lock
//! - Synthesizes a reply with quick actions
//!
//! TURN:
//! PARSE → ROUTE → {EXECUTE_TOOLS} → MERGE → RESPOND → END

pub mod agent;
pub mod api;
pub mod config;
pub mod error;
pub mod execution;
pub mod gemini;
pub mod memory;
pub mod merge;
pub mod models;
pub mod parser;
pub mod router;
pub mod scheduler;
pub mod synthesizer;
pub mod tools;

pub use error::{OrchestrationError, Result};

// Re-export common types
pub use agent::{Orchestrator, TurnOutcome, TurnStatus};
pub use models::*;
