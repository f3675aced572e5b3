//! Error types for the wedding planner orchestrator

use thiserror::Error;

/// Result type alias for orchestrator operations
pub type Result<T> = std::result::Result<T, OrchestrationError>;

#[derive(Error, Debug)]
pub enum OrchestrationError {

    // =============================
    // Turn Pipeline Errors
    // =============================

    #[error("Ambiguous input: {0}")]
    ParseAmbiguous(String),

    #[error("Missing slot: {0}")]
    MissingSlot(String),

    #[error("Tool '{tool}' timed out after {timeout_ms} ms")]
    ToolTimeout { tool: String, timeout_ms: u64 },

    #[error("Tool error: {0}")]
    ToolError(String),

    #[error("Budget for '{category}' is locked; confirmation required")]
    LockedBudgetConflict { category: String },

    #[error("All dispatched tools failed: {0}")]
    AllToolsFailed(String),

    #[error("State persistence error: {0}")]
    PersistenceError(String),

    #[error("Malformed model output: {0}")]
    MalformedOutput(String),

    #[error("Calculation error: {0}")]
    CalculationError(String),

    #[error("Invalid tool input: {0}")]
    InvalidToolInput(String),

    #[error("Invalid transition: {0}")]
    InvalidTransition(String),

    #[error("LLM error: {0}")]
    LlmError(String),

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    // =============================
    // External Library Conversions
    // =============================

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("HTTP client error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("SQL error: {0}")]
    SqlError(#[from] sqlx::Error),

    #[error("UUID parse error: {0}")]
    UuidError(#[from] uuid::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl OrchestrationError {
    /// The request itself was unusable; no retry can succeed.
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            OrchestrationError::CalculationError(_) | OrchestrationError::InvalidToolInput(_)
        )
    }

    /// Message fit to show a user: the bare reason for input errors.
    pub fn user_message(&self) -> String {
        match self {
            OrchestrationError::CalculationError(reason)
            | OrchestrationError::InvalidToolInput(reason) => reason.clone(),
            other => other.to_string(),
        }
    }
}
