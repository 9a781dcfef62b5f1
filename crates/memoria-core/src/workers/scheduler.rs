//! Maintenance scheduler (§4.G): orchestrates hourly and daily
//! maintenance cycles across a tenant set, isolating per-tenant failures
//! and emitting a structured report per run.
//!
//! Grounded in
//! `original_source/apps/memory_api/workers/memory_maintenance.py` and
//! its test file: hourly cycle is lightweight-only, daily cycle runs
//! decay → summarization → dreaming in order, per tenant, with failures
//! logged rather than aborting the batch.

use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tokio_util::sync::CancellationToken;

use super::decay::DecayWorker;
use super::dreaming::DreamingWorker;
use super::summarization::SummarizationWorker;
use crate::error::WorkerError;

#[derive(Debug, Clone, Serialize)]
pub struct StepReport {
    pub step: String,
    pub tenants_processed: usize,
    pub tenants_failed: usize,
    pub items_affected: usize,
    pub elapsed_ms: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct MaintenanceReport {
    pub cycle: String,
    pub steps: Vec<StepReport>,
    pub total_elapsed_ms: u64,
}

/// A tenant/project/agent triple the dreaming step needs, since dreaming
/// is scoped narrower than decay/summarization (which are per-tenant).
pub struct DreamingTarget {
    pub tenant_id: String,
    pub project: String,
    pub agent_id: String,
}

pub struct MaintenanceScheduler {
    decay: Arc<DecayWorker>,
    summarization: Arc<SummarizationWorker>,
    dreaming: Arc<DreamingWorker>,
    cancellation: CancellationToken,
}

impl MaintenanceScheduler {
    pub fn new(decay: Arc<DecayWorker>, summarization: Arc<SummarizationWorker>, dreaming: Arc<DreamingWorker>) -> Self {
        Self {
            decay,
            summarization,
            dreaming,
            cancellation: CancellationToken::new(),
        }
    }

    /// Same as [`Self::new`], but the remainder of a cycle's per-tenant
    /// batch is skipped (not counted as failed, just left unprocessed) as
    /// soon as `cancellation` fires — an explicit abort signal, distinct
    /// from any single worker's own adapter-call deadline (§5).
    pub fn with_cancellation(
        decay: Arc<DecayWorker>,
        summarization: Arc<SummarizationWorker>,
        dreaming: Arc<DreamingWorker>,
        cancellation: CancellationToken,
    ) -> Self {
        Self {
            decay,
            summarization,
            dreaming,
            cancellation,
        }
    }

    /// Hourly cycle: lightweight tasks only. Decay is cheap enough (one
    /// SQL pass per tenant) to run hourly; summarization and dreaming are
    /// daily-only.
    pub async fn run_hourly(&self, tenant_ids: &[String]) -> MaintenanceReport {
        let started = Instant::now();
        let decay_step = self.run_decay_step(tenant_ids).await;
        MaintenanceReport {
            cycle: "hourly".to_string(),
            steps: vec![decay_step],
            total_elapsed_ms: started.elapsed().as_millis() as u64,
        }
    }

    /// Daily cycle: decay → summarization → dreaming, each step isolating
    /// tenant-level failures from the rest of the batch.
    pub async fn run_daily(&self, tenant_ids: &[String], dreaming_targets: &[DreamingTarget]) -> MaintenanceReport {
        let started = Instant::now();
        let decay_step = self.run_decay_step(tenant_ids).await;
        let summarization_step = self.run_summarization_step(tenant_ids).await;
        let dreaming_step = self.run_dreaming_step(dreaming_targets).await;

        MaintenanceReport {
            cycle: "daily".to_string(),
            steps: vec![decay_step, summarization_step, dreaming_step],
            total_elapsed_ms: started.elapsed().as_millis() as u64,
        }
    }

    async fn run_decay_step(&self, tenant_ids: &[String]) -> StepReport {
        let started = Instant::now();
        let mut processed = 0;
        let mut failed = 0;
        let mut affected = 0;
        for tenant_id in tenant_ids {
            if self.cancellation.is_cancelled() {
                break;
            }
            match self.decay.run_for_tenant(tenant_id).await {
                Ok(count) => {
                    processed += 1;
                    affected += count;
                }
                Err(err) => {
                    failed += 1;
                    tracing::warn!(tenant_id = %tenant_id, error = %err, "decay worker failed for tenant");
                }
            }
        }
        StepReport {
            step: "decay".to_string(),
            tenants_processed: processed,
            tenants_failed: failed,
            items_affected: affected,
            elapsed_ms: started.elapsed().as_millis() as u64,
        }
    }

    async fn run_summarization_step(&self, tenant_ids: &[String]) -> StepReport {
        let started = Instant::now();
        let mut processed = 0;
        let mut failed = 0;
        let mut affected = 0;
        for tenant_id in tenant_ids {
            if self.cancellation.is_cancelled() {
                break;
            }
            match self.summarization.run_for_tenant(tenant_id).await {
                Ok(count) => {
                    processed += 1;
                    affected += count;
                }
                Err(WorkerError::Disabled) => {
                    processed += 1;
                }
                Err(err) => {
                    failed += 1;
                    tracing::warn!(tenant_id = %tenant_id, error = %err, "summarization worker failed for tenant");
                }
            }
        }
        StepReport {
            step: "summarization".to_string(),
            tenants_processed: processed,
            tenants_failed: failed,
            items_affected: affected,
            elapsed_ms: started.elapsed().as_millis() as u64,
        }
    }

    async fn run_dreaming_step(&self, targets: &[DreamingTarget]) -> StepReport {
        let started = Instant::now();
        let mut processed = 0;
        let mut failed = 0;
        let mut affected = 0;
        for target in targets {
            if self.cancellation.is_cancelled() {
                break;
            }
            match self.dreaming.run(&target.tenant_id, &target.project, &target.agent_id).await {
                Ok(Some(_)) => {
                    processed += 1;
                    affected += 1;
                }
                Ok(None) => {
                    processed += 1;
                }
                Err(WorkerError::Disabled) => {
                    processed += 1;
                }
                Err(err) => {
                    failed += 1;
                    tracing::warn!(tenant_id = %target.tenant_id, error = %err, "dreaming worker failed for target");
                }
            }
        }
        StepReport {
            step: "dreaming".to_string(),
            tenants_processed: processed,
            tenants_failed: failed,
            items_affected: affected,
            elapsed_ms: started.elapsed().as_millis() as u64,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::{BruteForceVectorStore, FallbackLlmProvider, LlmProvider, SqliteAdapter};
    use crate::config::{DecayConfig, DreamingConfig, LayerConfig, SummarizationConfig};
    use crate::layers::{LayerAdapters, ReflectiveLayer};
    use crate::workers::ReflectionEngine;

    fn scheduler_with(cancellation: CancellationToken) -> MaintenanceScheduler {
        let storage = Arc::new(SqliteAdapter::open_in_memory().expect("in-memory sqlite"));
        let adapters = LayerAdapters {
            storage: storage.clone(),
            vector_store: Arc::new(BruteForceVectorStore::new()),
        };
        let llm: Arc<dyn LlmProvider> = Arc::new(FallbackLlmProvider::new());
        let reflective = Arc::new(ReflectiveLayer::new(adapters, &LayerConfig::default()));
        let reflection_engine = Arc::new(ReflectionEngine::new(llm.clone(), reflective));
        let decay = Arc::new(DecayWorker::new(storage.clone(), DecayConfig::default()));
        let summarization = Arc::new(SummarizationWorker::new(storage.clone(), llm, SummarizationConfig::default()));
        let dreaming = Arc::new(DreamingWorker::new(storage, reflection_engine, DreamingConfig::default()));
        MaintenanceScheduler::with_cancellation(decay, summarization, dreaming, cancellation)
    }

    #[tokio::test]
    async fn pre_cancelled_token_skips_the_whole_tenant_batch() {
        let token = CancellationToken::new();
        token.cancel();
        let scheduler = scheduler_with(token);

        let report = scheduler.run_hourly(&["tenant-a".to_string(), "tenant-b".to_string()]).await;

        assert_eq!(report.steps[0].tenants_processed, 0);
        assert_eq!(report.steps[0].tenants_failed, 0);
    }

    #[tokio::test]
    async fn live_token_processes_the_whole_batch() {
        let scheduler = scheduler_with(CancellationToken::new());

        let report = scheduler.run_hourly(&["tenant-a".to_string(), "tenant-b".to_string()]).await;

        assert_eq!(report.steps[0].tenants_processed, 2);
    }
}
