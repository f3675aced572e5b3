//! Runtime configuration
//!
//! Everything is read from the environment (after `.env` is loaded by the
//! binaries). Unset variables fall back to defaults; malformed numbers are
//! reported instead of silently ignored.

use crate::error::OrchestrationError;
use crate::models::UserId;
use crate::Result;
use std::env;
use std::time::Duration;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub gemini_api_key: Option<String>,
    pub database_url: Option<String>,
    pub search_api_base_url: Option<String>,
    /// Default per-tool timeout
    pub tool_timeout: Duration,
    /// Bound on language-generation and summarization calls
    pub llm_timeout: Duration,
    /// Number of prior turns handed to the parser
    pub context_window_turns: usize,
    pub catalog_result_limit: u32,
    /// Single-user trial mode: every console turn is attributed to this user
    pub trial_user_id: UserId,
    pub follow_up_delay: Duration,
    pub api_port: u16,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            gemini_api_key: None,
            database_url: None,
            search_api_base_url: None,
            tool_timeout: Duration::from_millis(3_000),
            llm_timeout: Duration::from_millis(8_000),
            context_window_turns: 6,
            catalog_result_limit: 5,
            trial_user_id: Uuid::nil(),
            follow_up_delay: Duration::from_secs(30),
            api_port: 8080,
        }
    }
}

impl OrchestratorConfig {
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let trial_user_id = match non_empty("PLANNER_USER_ID") {
            Some(raw) => Uuid::parse_str(&raw)?,
            None => defaults.trial_user_id,
        };

        Ok(Self {
            gemini_api_key: non_empty("GEMINI_API_KEY")
                .filter(|k| k != "your_gemini_api_key_here"),
            database_url: non_empty("POSTGRES_URL").or_else(|| non_empty("DATABASE_URL")),
            search_api_base_url: non_empty("SEARCH_API_BASE_URL")
                .map(|u| u.trim_end_matches('/').to_string()),
            tool_timeout: parse_var::<u64>("TOOL_TIMEOUT_MS")?
                .map(Duration::from_millis)
                .unwrap_or(defaults.tool_timeout),
            llm_timeout: parse_var::<u64>("LLM_TIMEOUT_MS")?
                .map(Duration::from_millis)
                .unwrap_or(defaults.llm_timeout),
            context_window_turns: parse_var::<usize>("CONTEXT_WINDOW_TURNS")?
                .unwrap_or(defaults.context_window_turns),
            catalog_result_limit: parse_var::<u32>("CATALOG_RESULT_LIMIT")?
                .map(|n| n.clamp(1, 20))
                .unwrap_or(defaults.catalog_result_limit),
            trial_user_id,
            follow_up_delay: parse_var::<u64>("FOLLOW_UP_DELAY_SECS")?
                .map(Duration::from_secs)
                .unwrap_or(defaults.follow_up_delay),
            api_port: match parse_var::<u16>("PORT")? {
                Some(port) => port,
                None => parse_var::<u16>("API_PORT")?.unwrap_or(defaults.api_port),
            },
        })
    }
}

fn non_empty(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parse_var<T: std::str::FromStr>(key: &str) -> Result<Option<T>> {
    match non_empty(key) {
        None => Ok(None),
        Some(raw) => raw.trim().parse::<T>().map(Some).map_err(|_| {
            OrchestrationError::ConfigError(format!("{} has an invalid value: {}", key, raw))
        }),
    }
}
