//! Reflection engine (§4.G): the actor-evaluator-reflector pipeline. Given
//! a batch of events and an outcome, asks the LLM for a structured
//! reflection and persists it (plus an optional linked strategy memory)
//! into the reflective layer.
//!
//! Grounded in
//! `original_source/apps/memory_api/services/reflection_engine_v2.py` and
//! its test file: outcome-dependent prompt selection, the
//! reflection+optional-strategy persistence pair, both tagged and scored.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::adapters::LlmProvider;
use crate::config::TimeoutConfig;
use crate::error::WorkerError;
use crate::layers::{MemoryLayer as MemoryLayerTrait, ReflectiveLayer};
use crate::model::{Layer, MemoryRecord, MemoryType};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Success,
    Failure,
    Partial,
}

#[derive(Debug, Clone)]
pub struct ReflectionContext {
    pub tenant_id: String,
    pub project: String,
    pub agent_id: String,
    pub outcome: Outcome,
    pub events: Vec<String>,
    pub task_goal: String,
    pub error_info: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ReflectionOutput {
    reflection_text: String,
    strategy_text: Option<String>,
    importance: f32,
    confidence: f32,
    tags: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct ReflectionOutcome {
    pub reflection_id: Uuid,
    pub strategy_id: Option<Uuid>,
}

pub struct ReflectionEngine {
    llm: Arc<dyn LlmProvider>,
    reflective_layer: Arc<ReflectiveLayer>,
    llm_deadline: Duration,
}

impl ReflectionEngine {
    pub fn new(llm: Arc<dyn LlmProvider>, reflective_layer: Arc<ReflectiveLayer>) -> Self {
        Self {
            llm,
            reflective_layer,
            llm_deadline: TimeoutConfig::default().llm(),
        }
    }

    pub fn with_timeout(llm: Arc<dyn LlmProvider>, reflective_layer: Arc<ReflectiveLayer>, llm_deadline: Duration) -> Self {
        Self { llm, reflective_layer, llm_deadline }
    }

    fn build_prompt(context: &ReflectionContext) -> String {
        let events_block = context.events.join("\n");
        match context.outcome {
            Outcome::Success => format!(
                "Goal: {}\nEvents:\n{events_block}\n\nThis attempt succeeded. Identify the pattern that made it \
                 work and whether it generalizes to similar future tasks.",
                context.task_goal
            ),
            Outcome::Failure => format!(
                "Goal: {}\nEvents:\n{events_block}\nError: {}\n\nThis attempt failed. Identify the root cause and a \
                 corrective strategy to avoid repeating it.",
                context.task_goal,
                context.error_info.as_deref().unwrap_or("unspecified")
            ),
            Outcome::Partial => format!(
                "Goal: {}\nEvents:\n{events_block}\n\nThis attempt partially succeeded. Identify what worked, what \
                 didn't, and a strategy to close the gap.",
                context.task_goal
            ),
        }
    }

    fn parse_output(raw: &str) -> ReflectionOutput {
        serde_json::from_str(raw).unwrap_or_else(|_| ReflectionOutput {
            reflection_text: raw.to_string(),
            strategy_text: None,
            importance: 0.6,
            confidence: 0.5,
            tags: Vec::new(),
        })
    }

    /// Runs one reflection pass and persists its output. Returns the
    /// reflective memory id, plus a linked strategy memory id when the
    /// model produced one.
    pub async fn reflect(&self, context: &ReflectionContext) -> Result<ReflectionOutcome, WorkerError> {
        let prompt = Self::build_prompt(context);
        let raw = tokio::time::timeout(
            self.llm_deadline,
            self.llm.generate(
                &prompt,
                Some("Respond as JSON: reflection_text, strategy_text, importance, confidence, tags."),
                600,
                0.3,
                &[],
            ),
        )
        .await
        .map_err(|_| WorkerError::Llm("reflection generation exceeded its deadline".to_string()))?
        .map_err(|e| WorkerError::Llm(e.to_string()))?;
        let parsed = Self::parse_output(&raw);

        let mut reflection = MemoryRecord::new(
            context.tenant_id.clone(),
            context.project.clone(),
            context.agent_id.clone(),
            parsed.reflection_text.clone(),
            Layer::Reflective,
            "reflection-engine",
        );
        reflection.memory_type = MemoryType::Reflection;
        reflection.importance = parsed.importance.clamp(0.0, 1.0);
        reflection.tags = parsed.tags.clone();
        reflection.metadata.insert("confidence".to_string(), serde_json::json!(parsed.confidence));
        reflection.metadata.insert("outcome".to_string(), serde_json::json!(context.outcome));

        let reflection_id = self
            .reflective_layer
            .add(reflection)
            .await
            .map_err(|e| WorkerError::Llm(e.to_string()))?;

        let strategy_id = if let Some(strategy_text) = parsed.strategy_text {
            let mut strategy = MemoryRecord::new(
                context.tenant_id.clone(),
                context.project.clone(),
                context.agent_id.clone(),
                strategy_text,
                Layer::Reflective,
                "reflection-engine",
            );
            strategy.memory_type = MemoryType::Reflection;
            strategy.importance = parsed.importance.clamp(0.0, 1.0);
            strategy.tags = parsed.tags.clone();
            strategy.tags.push("strategy".to_string());
            ReflectiveLayer::link_sources(&mut strategy, &[reflection_id]);
            Some(
                self.reflective_layer
                    .add(strategy)
                    .await
                    .map_err(|e| WorkerError::Llm(e.to_string()))?,
            )
        } else {
            None
        };

        Ok(ReflectionOutcome { reflection_id, strategy_id })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_and_failure_prompts_differ() {
        let base = ReflectionContext {
            tenant_id: "t".into(),
            project: "p".into(),
            agent_id: "a".into(),
            outcome: Outcome::Success,
            events: vec!["did the thing".into()],
            task_goal: "ship feature".into(),
            error_info: None,
        };
        let success_prompt = ReflectionEngine::build_prompt(&base);
        let mut failed = base.clone();
        failed.outcome = Outcome::Failure;
        failed.error_info = Some("timeout".into());
        let failure_prompt = ReflectionEngine::build_prompt(&failed);
        assert_ne!(success_prompt, failure_prompt);
        assert!(failure_prompt.contains("root cause"));
    }

    #[test]
    fn malformed_llm_output_falls_back_to_raw_text() {
        let parsed = ReflectionEngine::parse_output("not json at all");
        assert_eq!(parsed.reflection_text, "not json at all");
        assert!(parsed.strategy_text.is_none());
    }
}
