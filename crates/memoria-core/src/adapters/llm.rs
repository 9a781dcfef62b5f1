//! Abstract LLM provider interface
//!
//! Backs the re-ranker (§4.E.5), the reflection engine (§4.G), and the
//! summarization worker. [`FallbackLlmProvider`] is a rule-based stand-in
//! used when no external model is wired; it keeps the engine's reduced
//! surface usable (REDESIGN FLAGS: optional ML dependencies expose a
//! capability flag, not a hard failure).

use async_trait::async_trait;

use crate::error::StorageError;

pub type LlmResult<T> = std::result::Result<T, StorageError>;

#[derive(Debug, Clone)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Clone)]
pub struct ExtractedEntity {
    pub text: String,
    pub entity_type: String,
    pub confidence: f32,
}

#[async_trait]
pub trait LlmProvider: Send + Sync {
    async fn generate(
        &self,
        prompt: &str,
        system_prompt: Option<&str>,
        max_tokens: usize,
        temperature: f32,
        stop_sequences: &[String],
    ) -> LlmResult<String>;

    async fn generate_with_context(&self, messages: &[ChatMessage], max_tokens: usize) -> LlmResult<String>;

    fn count_tokens(&self, text: &str) -> usize;

    fn supports_function_calling(&self) -> bool;

    async fn extract_entities(&self, text: &str) -> LlmResult<Vec<ExtractedEntity>>;

    async fn summarize(&self, text: &str, max_length: usize) -> LlmResult<String>;
}

/// A deterministic, model-free provider: truncation-based "generation",
/// frequency-based "summarization", capitalized-word "entity extraction".
/// Good enough to keep fusion re-ranking, reflection, and summarization
/// exercised end to end without a network dependency.
#[derive(Default)]
pub struct FallbackLlmProvider;

impl FallbackLlmProvider {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl LlmProvider for FallbackLlmProvider {
    async fn generate(
        &self,
        prompt: &str,
        system_prompt: Option<&str>,
        max_tokens: usize,
        _temperature: f32,
        stop_sequences: &[String],
    ) -> LlmResult<String> {
        let mut text = match system_prompt {
            Some(sys) => format!("{sys}\n{prompt}"),
            None => prompt.to_string(),
        };
        for stop in stop_sequences {
            if let Some(idx) = text.find(stop.as_str()) {
                text.truncate(idx);
            }
        }
        let approx_chars = max_tokens.saturating_mul(4);
        text.truncate(text.len().min(approx_chars));
        Ok(text)
    }

    async fn generate_with_context(&self, messages: &[ChatMessage], max_tokens: usize) -> LlmResult<String> {
        let joined = messages
            .iter()
            .map(|m| format!("{}: {}", m.role, m.content))
            .collect::<Vec<_>>()
            .join("\n");
        self.generate(&joined, None, max_tokens, 0.0, &[]).await
    }

    fn count_tokens(&self, text: &str) -> usize {
        (text.len() / 4).max(1)
    }

    fn supports_function_calling(&self) -> bool {
        false
    }

    async fn extract_entities(&self, text: &str) -> LlmResult<Vec<ExtractedEntity>> {
        let entities = text
            .split_whitespace()
            .filter(|w| w.chars().next().is_some_and(|c| c.is_uppercase()))
            .map(|w| ExtractedEntity {
                text: w.trim_matches(|c: char| !c.is_alphanumeric()).to_string(),
                entity_type: "unknown".to_string(),
                confidence: 0.4,
            })
            .filter(|e| !e.text.is_empty())
            .collect();
        Ok(entities)
    }

    async fn summarize(&self, text: &str, max_length: usize) -> LlmResult<String> {
        let mut summary: String = text.split_whitespace().collect::<Vec<_>>().join(" ");
        summary.truncate(max_length);
        Ok(summary)
    }
}
