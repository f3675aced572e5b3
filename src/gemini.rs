//! Gemini API client
//!
//! Shared by the understanding, generation and summarization capabilities.
//! Uses a long-lived reqwest::Client for connection pooling.

use crate::error::OrchestrationError;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error};

const DEFAULT_MODEL_URL: &str =
    "https://generativelanguage.googleapis.com/v1beta/models/gemini-2.0-flash:generateContent";

/// Base instruction every prompt role extends.
pub const PLANNER_PERSONA: &str = r#"You are a warm, practical wedding planning assistant.

Guidelines:
- Amounts are in Korean won; keep figures exactly as given
- Be concise and concrete
- Never invent vendors, prices or dates that are not in the provided context
- Answer in the language the couple used"#;

/// Reusable Gemini client (connection-pooled)
pub struct GeminiClient {
    client: Client,
    api_key: String,
    base_url: String,
    request_timeout: Duration,
}

impl GeminiClient {
    pub fn new(api_key: String, request_timeout: Duration) -> Self {
        let client = Client::builder()
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(8)
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            client,
            api_key,
            base_url: DEFAULT_MODEL_URL.to_string(),
            request_timeout,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Generate a completion for `query` under `system_prompt`.
    pub async fn generate(
        &self,
        query: &str,
        system_prompt: &str,
        temperature: f32,
    ) -> crate::Result<(String, f32)> {
        if self.api_key.is_empty() {
            return Err(OrchestrationError::LlmError(
                "GEMINI_API_KEY not configured".to_string(),
            ));
        }

        let url = format!("{}?key={}", self.base_url, self.api_key);

        let request = GeminiRequest {
            contents: vec![Content {
                parts: vec![Part {
                    text: query.to_string(),
                }],
            }],
            generation_config: GenerationConfig {
                temperature,
                top_p: 0.9,
                top_k: 40,
                max_output_tokens: 1024,
            },
            system_instruction: SystemInstruction {
                parts: vec![Part {
                    text: format!("{}\n\n{}", PLANNER_PERSONA, system_prompt),
                }],
            },
        };

        debug!(prompt_chars = query.len(), "Calling Gemini API");

        let response = self
            .client
            .post(&url)
            .timeout(self.request_timeout)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                error!("Gemini API request failed: {}", e);
                OrchestrationError::LlmError(format!("Gemini API error: {}", e))
            })?;

        if !response.status().is_success() {
            let error_text = response.text().await.unwrap_or_default();
            error!("Gemini API error response: {}", error_text);
            return Err(OrchestrationError::LlmError(format!(
                "Gemini API error: {}",
                error_text
            )));
        }

        let gemini_response: GeminiResponse = response.json().await.map_err(|e| {
            error!("Failed to parse Gemini response: {}", e);
            OrchestrationError::LlmError(format!("Gemini parse error: {}", e))
        })?;

        let answer = gemini_response
            .candidates
            .first()
            .and_then(|c| c.content.parts.first())
            .map(|p| p.text.clone())
            .ok_or_else(|| OrchestrationError::LlmError("Empty response from Gemini".to_string()))?;

        let confidence = calculate_confidence(&gemini_response);

        debug!(confidence, "Gemini response received");

        Ok((answer, confidence))
    }
}

/// Strip markdown code fences models like to wrap JSON in.
pub fn strip_code_fences(response: &str) -> &str {
    response
        .trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim()
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    contents: Vec<Content>,
    generation_config: GenerationConfig,
    system_instruction: SystemInstruction,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    top_p: f32,
    top_k: i32,
    max_output_tokens: i32,
}

#[derive(Debug, Serialize)]
struct SystemInstruction {
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Content,
    finish_reason: Option<String>,
}

/// Calculate response confidence
fn calculate_confidence(response: &GeminiResponse) -> f32 {
    let Some(candidate) = response.candidates.first() else {
        return 0.5;
    };
    let base_confidence: f32 = 0.85;

    let finish_confidence = match candidate.finish_reason.as_deref() {
        Some("STOP") => 1.0,
        Some("MAX_TOKENS") => 0.8,
        Some("SAFETY") => 0.6,
        _ => 0.7,
    };

    let response_length = candidate
        .content
        .parts
        .first()
        .map(|p| p.text.len())
        .unwrap_or(0);

    let length_confidence = if response_length < 20 {
        0.6
    } else if response_length > 2000 {
        0.8
    } else {
        1.0
    };

    (base_confidence * finish_confidence * length_confidence).clamp(0.5, 0.98)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_serialization() {
        let request = GeminiRequest {
            contents: vec![Content {
                parts: vec![Part {
                    text: "Recommend a studio in Gangnam".to_string(),
                }],
            }],
            generation_config: GenerationConfig {
                temperature: 0.3,
                top_p: 0.9,
                top_k: 40,
                max_output_tokens: 1024,
            },
            system_instruction: SystemInstruction {
                parts: vec![Part {
                    text: PLANNER_PERSONA.to_string(),
                }],
            },
        };

        let json = serde_json::to_string(&request).unwrap();
        assert!(json.contains("Recommend a studio in Gangnam"));
        assert!(json.contains("generationConfig"));
        assert!(json.contains("maxOutputTokens"));
    }

    #[test]
    fn test_strip_code_fences() {
        assert_eq!(strip_code_fences("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_code_fences("  {\"a\":1} "), "{\"a\":1}");
    }

    #[test]
    fn test_confidence_bounds() {
        let response: GeminiResponse = serde_json::from_str(
            r#"{"candidates":[{"content":{"parts":[{"text":"ok"}]},"finishReason":"STOP"}]}"#,
        )
        .unwrap();
        let confidence = calculate_confidence(&response);
        assert!((0.5..=0.98).contains(&confidence));

        let empty: GeminiResponse = serde_json::from_str("{}").unwrap();
        assert_eq!(calculate_confidence(&empty), 0.5);
    }

    #[tokio::test]
    async fn test_missing_key_is_llm_error() {
        let client = GeminiClient::new(String::new(), Duration::from_secs(1));
        let result = client.generate("hi", "", 0.2).await;
        assert!(matches!(result, Err(OrchestrationError::LlmError(_))));
    }
}
