//! Anchor strategy (§4.D): deterministic exact-match retrieval keyed off
//! regex-identified "hard" and "soft" identifiers in the query text.
//!
//! Grounded in `original_source/rae-core/rae_core/search/strategies/
//! anchor.py`: the same tiered pattern table (Tier 1 hard IDs at weight
//! 100, Tier 2 soft context boosters at weight 5-10), the same
//! exact-phrase lookup per match, and the same max-across-anchors merge
//! when one record is hit by several anchors. A query with no recognized
//! pattern returns zero results (§8 invariant 6) without ever touching
//! storage.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use uuid::Uuid;

use crate::adapters::MemoryStorage;
use crate::error::SearchError;
use crate::model::{QueryFilters, StrategyHit, StrategyKind};

use super::SearchStrategy;

struct AnchorPattern {
    name: &'static str,
    regex: Regex,
    weight: f32,
}

static PATTERNS: Lazy<Vec<AnchorPattern>> = Lazy::new(|| {
    vec![
        // Tier 1: hard, near-unique identifiers.
        AnchorPattern {
            name: "uuid",
            regex: Regex::new(r"(?i)\b[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12}\b").unwrap(),
            weight: 100.0,
        },
        AnchorPattern {
            name: "error_hex",
            regex: Regex::new(r"(?i)\b0x[0-9a-f]{3,}\b").unwrap(),
            weight: 100.0,
        },
        AnchorPattern {
            name: "ticket_id",
            regex: Regex::new(r"(?i)\b(ticket|issue|pr|bug)[\s#_-]+(\d{3,})\b").unwrap(),
            weight: 100.0,
        },
        // Tier 2: soft, contextual boosters.
        AnchorPattern {
            name: "log_level",
            regex: Regex::new(r"\[(ERROR|CRITICAL|WARN|INFO)\]").unwrap(),
            weight: 5.0,
        },
        AnchorPattern {
            name: "http_code",
            regex: Regex::new(r"\b[45]\d{2}\b").unwrap(),
            weight: 5.0,
        },
        AnchorPattern {
            name: "date_iso",
            regex: Regex::new(r"\b\d{4}-\d{2}-\d{2}\b").unwrap(),
            weight: 10.0,
        },
    ]
});

/// Extracts `(value, weight)` pairs for every anchor found in `query`.
/// `ticket_id` emits both a spaced and a concatenated form (`"ticket 001"`
/// and `"ticket001"`) since source text may use either separator.
fn extract_anchors(query: &str) -> Vec<(String, f32)> {
    let mut found = Vec::new();
    for pattern in PATTERNS.iter() {
        for caps in pattern.regex.captures_iter(query) {
            if pattern.name == "ticket_id" {
                let kind = &caps[1];
                let digits = &caps[2];
                found.push((format!("{kind} {digits}"), pattern.weight));
                found.push((format!("{kind}{digits}"), pattern.weight));
            } else {
                found.push((caps[0].to_string(), pattern.weight));
            }
        }
    }
    found
}

pub struct AnchorStrategy {
    storage: Arc<dyn MemoryStorage>,
}

impl AnchorStrategy {
    pub fn new(storage: Arc<dyn MemoryStorage>) -> Self {
        Self { storage }
    }
}

#[async_trait]
impl SearchStrategy for AnchorStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Anchor
    }

    async fn search(
        &self,
        tenant_id: &str,
        _project: &str,
        query_text: &str,
        filters: &QueryFilters,
        limit: usize,
    ) -> Result<Vec<StrategyHit>, SearchError> {
        let anchors = extract_anchors(query_text);
        if anchors.is_empty() {
            return Ok(Vec::new());
        }

        let layer = filters.layers.as_ref().and_then(|l| l.first().copied());
        let mut best: HashMap<Uuid, f32> = HashMap::new();
        let mut importance_of: HashMap<Uuid, f32> = HashMap::new();

        for (value, weight) in anchors {
            let hits = self.storage.search_memories(tenant_id, layer, &value, limit, true).await?;
            for hit in hits {
                importance_of.insert(hit.memory.id, hit.memory.importance);
                best.entry(hit.memory.id)
                    .and_modify(|current| *current = current.max(weight))
                    .or_insert(weight);
            }
        }

        let mut results: Vec<StrategyHit> = best
            .into_iter()
            .map(|(memory_id, score)| StrategyHit {
                memory_id,
                score,
                importance: importance_of.get(&memory_id).copied().unwrap_or(0.0),
            })
            .collect();
        results.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        results.truncate(limit);
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_anchor_yields_empty_extraction() {
        assert!(extract_anchors("what did we learn yesterday").is_empty());
    }

    #[test]
    fn uuid_is_tier_one() {
        let anchors = extract_anchors("see 4eb0c9d1-8f3a-4c2e-9b1a-6d2f1e0a9c3b for detail");
        assert_eq!(anchors.len(), 1);
        assert_eq!(anchors[0].1, 100.0);
    }

    #[test]
    fn ticket_id_emits_two_forms() {
        let anchors = extract_anchors("show me bug #457");
        assert!(anchors.iter().any(|(v, _)| v == "bug 457"));
        assert!(anchors.iter().any(|(v, _)| v == "bug457"));
        assert!(anchors.iter().all(|(_, w)| *w == 100.0));
    }

    #[test]
    fn log_level_is_tier_two() {
        let anchors = extract_anchors("[ERROR] connection refused");
        assert_eq!(anchors, vec![("ERROR".to_string(), 5.0)]);
    }
}
