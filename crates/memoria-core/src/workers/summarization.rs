//! Summarization worker (§4.G): folds a finished session's memories into
//! one structured summary persisted in the long-term layer.
//!
//! Grounded in
//! `original_source/apps/memory_api/workers/memory_maintenance.py` and
//! its test file: session grouping by `session_id` metadata, the
//! event-count threshold, and the `"summary"`/`"summarization-worker"`
//! tag/source pair on the persisted result.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::adapters::{storage::MemoryFilter, LlmProvider, MemoryStorage};
use crate::config::{SummarizationConfig, TimeoutConfig};
use crate::error::WorkerError;
use crate::model::{Layer, MemoryRecord, MemoryType};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSummary {
    pub summary_text: String,
    pub key_topics: Vec<String>,
    pub sentiment: Sentiment,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Sentiment {
    Positive,
    Neutral,
    Negative,
}

pub struct SummarizationWorker {
    storage: Arc<dyn MemoryStorage>,
    llm: Arc<dyn LlmProvider>,
    config: SummarizationConfig,
    llm_deadline: Duration,
}

impl SummarizationWorker {
    pub fn new(storage: Arc<dyn MemoryStorage>, llm: Arc<dyn LlmProvider>, config: SummarizationConfig) -> Self {
        Self {
            storage,
            llm,
            config,
            llm_deadline: TimeoutConfig::default().llm(),
        }
    }

    pub fn with_timeout(
        storage: Arc<dyn MemoryStorage>,
        llm: Arc<dyn LlmProvider>,
        config: SummarizationConfig,
        llm_deadline: Duration,
    ) -> Self {
        Self { storage, llm, config, llm_deadline }
    }

    /// Groups a tenant's episodic/working memories by `session_id` and
    /// summarizes any session whose event count has crossed the
    /// threshold. Sessions already summarized (tagged `"summary"`) are
    /// not reprocessed — the caller is expected to track which sessions
    /// have ended; this worker only checks the count gate.
    pub async fn run_for_tenant(&self, tenant_id: &str) -> Result<usize, WorkerError> {
        if !self.config.enabled {
            return Err(WorkerError::Disabled);
        }

        let filter = MemoryFilter {
            layer: Some(Layer::Episodic),
            ..Default::default()
        };
        let memories = self.storage.list_memories(tenant_id, &filter, usize::MAX, 0, "created_at", false).await?;

        let mut by_session: HashMap<String, Vec<MemoryRecord>> = HashMap::new();
        for record in memories {
            if let Some(session_id) = record.session_id.clone() {
                by_session.entry(session_id).or_default().push(record);
            }
        }

        let mut summarized = 0;
        for (session_id, mut events) in by_session {
            if events.len() < self.config.min_events {
                continue;
            }
            events.sort_by_key(|e| e.created_at);
            if events.iter().any(|e| e.tags.iter().any(|t| t == "summary")) {
                continue;
            }

            let summary = self.summarize_session(&events).await?;
            let joined_topics = summary.key_topics.join(", ");
            let mut record = MemoryRecord::new(
                tenant_id,
                events[0].project.clone(),
                events[0].agent_id.clone(),
                format!("{}\n\nKey topics: {joined_topics}", summary.summary_text),
                Layer::Episodic,
                "summarization-worker",
            );
            record.session_id = Some(session_id);
            record.memory_type = MemoryType::Text;
            record.tags.push("summary".to_string());
            record.importance = 0.6;
            record.metadata.insert("sentiment".to_string(), serde_json::json!(summary.sentiment));
            record.metadata.insert("key_topics".to_string(), serde_json::json!(summary.key_topics));

            self.storage.store_memory(record).await?;
            summarized += 1;
        }

        Ok(summarized)
    }

    async fn summarize_session(&self, events: &[MemoryRecord]) -> Result<SessionSummary, WorkerError> {
        let transcript = events
            .iter()
            .map(|e| e.content.as_str())
            .collect::<Vec<_>>()
            .join("\n");
        let prompt = format!(
            "Summarize this session in one paragraph, then list 3-5 key topics, then classify overall \
             sentiment as positive, neutral, or negative. Session:\n{transcript}"
        );
        let response = tokio::time::timeout(self.llm_deadline, self.llm.generate(&prompt, None, 512, 0.2, &[]))
            .await
            .map_err(|_| WorkerError::Llm("session summarization exceeded its deadline".to_string()))?
            .map_err(|e| WorkerError::Llm(e.to_string()))?;

        let sentiment = if response.to_lowercase().contains("negative") {
            Sentiment::Negative
        } else if response.to_lowercase().contains("positive") {
            Sentiment::Positive
        } else {
            Sentiment::Neutral
        };
        let key_topics = extract_topics(&response);

        Ok(SessionSummary {
            summary_text: response,
            key_topics,
            sentiment,
        })
    }
}

fn extract_topics(text: &str) -> Vec<String> {
    text.split(|c: char| c == ',' || c == '\n')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty() && s.len() < 40)
        .take(5)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn topic_extraction_trims_and_caps() {
        let topics = extract_topics("deploys, bug fixes, onboarding, \nrelease planning");
        assert!(topics.len() <= 5);
        assert!(topics.iter().all(|t| !t.is_empty()));
    }
}
