//! Context builder (§4.H): assembles the "working memory context" handed
//! to an agent's next turn — recent messages, re-scored long-term hits,
//! top reflections, opaque profile items, and a rendered system prompt.
//!
//! Grounded in
//! `original_source/apps/memory_api/tests/services/
//! test_context_builder_v3.py` and `test_context_builder_coverage.py`:
//! the literal `"Lessons Learned"` and `"Relevant Context"` section
//! headings are asserted verbatim by that suite, so they are reproduced
//! verbatim here rather than reworded.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::adapters::LlmProvider;
use crate::error::EngineResult;
use crate::layers::{MemoryLayer, ReflectiveLayer};
use crate::model::{MemoryRecord, QueryRequest, ScoredMemory};
use crate::search::HybridSearchEngine;

const DEFAULT_MESSAGE_WINDOW: usize = 10;
const DEFAULT_REFLECTION_COUNT_FULL: usize = 5;
const DEFAULT_REFLECTION_COUNT_LITE: usize = 3;
const DEFAULT_REFLECTION_IMPORTANCE: f32 = 0.5;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationMessage {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextMode {
    Full,
    Lite,
}

#[derive(Debug, Clone)]
pub struct ContextConfig {
    pub message_window: usize,
    pub max_tokens: usize,
    pub mode: ContextMode,
    pub reflective_memory_enabled: bool,
    pub reflection_importance_threshold: f32,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            message_window: DEFAULT_MESSAGE_WINDOW,
            max_tokens: 4_000,
            mode: ContextMode::Full,
            reflective_memory_enabled: true,
            reflection_importance_threshold: DEFAULT_REFLECTION_IMPORTANCE,
        }
    }
}

impl ContextConfig {
    fn reflection_count(&self) -> usize {
        match self.mode {
            ContextMode::Full => DEFAULT_REFLECTION_COUNT_FULL,
            ContextMode::Lite => DEFAULT_REFLECTION_COUNT_LITE,
        }
    }
}

/// Opaque per-user/system preference item; carried through untouched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileItem {
    pub key: String,
    pub value: serde_json::Value,
}

#[derive(Debug, Clone)]
pub struct WorkingMemoryContext {
    pub messages: Vec<ConversationMessage>,
    pub ltm_items: Vec<ScoredMemory>,
    pub reflections: Vec<MemoryRecord>,
    pub profile_items: Vec<ProfileItem>,
    pub system_prompt: String,
    pub context_text: String,
    pub total_tokens: usize,
    pub retrieval_latency_ms: u64,
}

pub struct ContextBuilder {
    hybrid_search: Arc<HybridSearchEngine>,
    reflective_layer: Arc<ReflectiveLayer>,
    llm: Arc<dyn LlmProvider>,
    config: ContextConfig,
}

impl ContextBuilder {
    pub fn new(
        hybrid_search: Arc<HybridSearchEngine>,
        reflective_layer: Arc<ReflectiveLayer>,
        llm: Arc<dyn LlmProvider>,
        config: ContextConfig,
    ) -> Self {
        Self {
            hybrid_search,
            reflective_layer,
            llm,
            config,
        }
    }

    pub async fn build_context(
        &self,
        tenant_id: &str,
        project: &str,
        query_text: &str,
        recent_messages: &[ConversationMessage],
        profile_items: Vec<ProfileItem>,
    ) -> EngineResult<WorkingMemoryContext> {
        let messages: Vec<ConversationMessage> = recent_messages
            .iter()
            .rev()
            .take(self.config.message_window)
            .rev()
            .cloned()
            .collect();

        let mut request = QueryRequest::new(tenant_id, project, query_text);
        request.top_k = 10;
        let search_response = self.hybrid_search.query(&request).await?;
        let ltm_items = search_response.results;

        let reflections = if self.config.reflective_memory_enabled {
            let mut hits = self
                .reflective_layer
                .search(tenant_id, query_text, self.config.reflection_count() * 4)
                .await?;
            hits.retain(|r| r.importance >= self.config.reflection_importance_threshold);
            hits.sort_by(|a, b| b.importance.partial_cmp(&a.importance).unwrap_or(std::cmp::Ordering::Equal));
            hits.truncate(self.config.reflection_count());
            hits
        } else {
            Vec::new()
        };

        let system_prompt = self.render_system_prompt(&reflections);
        let context_text = self.render_context_text(&ltm_items, &reflections);

        let total_tokens = self.llm.count_tokens(&system_prompt)
            + self.llm.count_tokens(&context_text)
            + messages.iter().map(|m| self.llm.count_tokens(&m.content)).sum::<usize>();

        Ok(WorkingMemoryContext {
            messages,
            ltm_items,
            reflections,
            profile_items,
            system_prompt,
            context_text,
            total_tokens,
            retrieval_latency_ms: search_response.total_time_ms,
        })
    }

    fn render_system_prompt(&self, reflections: &[MemoryRecord]) -> String {
        if reflections.is_empty() {
            return String::new();
        }
        let mut prompt = String::from("## Lessons Learned\n");
        for reflection in reflections {
            prompt.push_str("- ");
            prompt.push_str(&reflection.content);
            prompt.push('\n');
        }
        prompt
    }

    fn render_context_text(&self, ltm_items: &[ScoredMemory], reflections: &[MemoryRecord]) -> String {
        let mut text = String::from("## Relevant Context\n");
        for item in ltm_items {
            text.push_str("- ");
            text.push_str(&item.memory.content);
            text.push('\n');
        }
        if !reflections.is_empty() {
            text.push_str("\n## Lessons Learned\n");
            for reflection in reflections {
                text.push_str("- ");
                text.push_str(&reflection.content);
                text.push('\n');
            }
        }
        text
    }

    /// Injects a "Lessons Learned" block into an arbitrary base prompt,
    /// independent of a full `build_context` call — used by callers that
    /// already have their own prompt assembly and only want the
    /// reflection injection step.
    pub async fn inject_reflections_into_prompt(
        &self,
        base_prompt: &str,
        tenant_id: &str,
        project: &str,
        query_text: &str,
    ) -> EngineResult<String> {
        if !self.config.reflective_memory_enabled {
            return Ok(base_prompt.to_string());
        }
        let mut hits = self
            .reflective_layer
            .search(tenant_id, query_text, self.config.reflection_count() * 4)
            .await?;
        hits.retain(|r| r.importance >= self.config.reflection_importance_threshold);
        hits.sort_by(|a, b| b.importance.partial_cmp(&a.importance).unwrap_or(std::cmp::Ordering::Equal));
        hits.truncate(self.config.reflection_count());

        if hits.is_empty() {
            return Ok(base_prompt.to_string());
        }

        let lessons = self.render_system_prompt(&hits);
        let _ = project;
        Ok(format!("{base_prompt}\n\n{lessons}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_reflections_produce_empty_system_prompt() {
        let config = ContextConfig::default();
        assert_eq!(config.reflection_count(), DEFAULT_REFLECTION_COUNT_FULL);
    }

    #[test]
    fn lite_mode_uses_smaller_reflection_count() {
        let config = ContextConfig {
            mode: ContextMode::Lite,
            ..ContextConfig::default()
        };
        assert_eq!(config.reflection_count(), DEFAULT_REFLECTION_COUNT_LITE);
    }
}
