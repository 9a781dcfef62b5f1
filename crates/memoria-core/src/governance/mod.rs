//! Governance tagging (§6 "Governance policies").
//!
//! Callers may attach a [`GovernancePattern`] to a `store` call describing
//! the agentic pattern that produced the fragment (a prompt chain, a
//! routing decision, a tool call, a reflection, or a recorded failure).
//! `apply_governance_tags` maps that pattern to zero or more additive tags;
//! existing tags are never removed or replaced.

use serde::{Deserialize, Serialize};

/// Cost/usage metrics attached to a tool-invocation governance pattern.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct CostMetrics {
    pub token_count: u64,
    pub latency_ms: u64,
}

/// The agentic pattern a stored fragment originated from. Drives additive
/// tagging only — it never blocks a store the way the info-class/layer
/// security invariant does.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "pattern_type", content = "fields", rename_all = "snake_case")]
pub enum GovernancePattern {
    PromptChaining { chain_length: u32 },
    RoutingDecision { decision_basis_confidence: f32 },
    ToolInvocation { cost_metrics: CostMetrics },
    Reflection { confidence_before: f32, confidence_after: f32 },
    FailureRecord { is_failure: bool, failure_trace: String },
}

const CHAIN_LENGTH_THRESHOLD: u32 = 10;
const ROUTING_CONFIDENCE_THRESHOLD: f32 = 0.4;
const TOOL_TOKEN_THRESHOLD: u64 = 10_000;

/// Additive tag derivation. Returns only the tags the pattern contributes;
/// callers merge the result into the record's existing tag set (never
/// replacing it).
pub fn governance_tags(pattern: &GovernancePattern) -> Vec<String> {
    match pattern {
        GovernancePattern::PromptChaining { chain_length } if *chain_length >= CHAIN_LENGTH_THRESHOLD => {
            vec!["high_risk_sequence".to_string()]
        }
        GovernancePattern::RoutingDecision { decision_basis_confidence }
            if *decision_basis_confidence < ROUTING_CONFIDENCE_THRESHOLD =>
        {
            vec!["hitl_review_required".to_string()]
        }
        GovernancePattern::ToolInvocation { cost_metrics } if cost_metrics.token_count > TOOL_TOKEN_THRESHOLD => {
            vec!["heavy_tool_use".to_string()]
        }
        GovernancePattern::Reflection { confidence_before, confidence_after }
            if confidence_after < confidence_before =>
        {
            vec!["deeper_reflection_needed".to_string()]
        }
        _ => Vec::new(),
    }
}

/// Merges the pattern's derived tags into `existing`, preserving order and
/// skipping duplicates.
pub fn apply_governance_tags(existing: &[String], pattern: &GovernancePattern) -> Vec<String> {
    let mut tags = existing.to_vec();
    for tag in governance_tags(pattern) {
        if !tags.contains(&tag) {
            tags.push(tag);
        }
    }
    tags
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn long_prompt_chain_is_flagged() {
        let tags = governance_tags(&GovernancePattern::PromptChaining { chain_length: 12 });
        assert_eq!(tags, vec!["high_risk_sequence"]);
    }

    #[test]
    fn short_prompt_chain_is_not_flagged() {
        let tags = governance_tags(&GovernancePattern::PromptChaining { chain_length: 3 });
        assert!(tags.is_empty());
    }

    #[test]
    fn low_confidence_routing_requires_review() {
        let tags = governance_tags(&GovernancePattern::RoutingDecision {
            decision_basis_confidence: 0.1,
        });
        assert_eq!(tags, vec!["hitl_review_required"]);
    }

    #[test]
    fn heavy_tool_use_over_threshold() {
        let tags = governance_tags(&GovernancePattern::ToolInvocation {
            cost_metrics: CostMetrics {
                token_count: 15_000,
                latency_ms: 200,
            },
        });
        assert_eq!(tags, vec!["heavy_tool_use"]);
    }

    #[test]
    fn reflection_confidence_drop_needs_deeper_pass() {
        let tags = governance_tags(&GovernancePattern::Reflection {
            confidence_before: 0.8,
            confidence_after: 0.5,
        });
        assert_eq!(tags, vec!["deeper_reflection_needed"]);
    }

    #[test]
    fn existing_tags_are_preserved() {
        let existing = vec!["user-tag".to_string()];
        let merged = apply_governance_tags(&existing, &GovernancePattern::PromptChaining { chain_length: 20 });
        assert_eq!(merged, vec!["user-tag".to_string(), "high_risk_sequence".to_string()]);
    }
}
