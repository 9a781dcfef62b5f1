//! Search strategies (§4.D) and hybrid fusion (§4.E)
//!
//! Five independent retrieval producers, each yielding an ordered
//! `Vec<StrategyHit>` capped at k, plus the fusion pipeline that merges
//! their output into one ranked response.

mod anchor;
mod dense;
mod fusion;
mod graph;
mod multi_vector;
mod sparse;

pub use anchor::AnchorStrategy;
pub use dense::DenseVectorStrategy;
pub use fusion::{HybridSearchEngine, StrategyError};
pub use graph::GraphStrategy;
pub use multi_vector::{MultiVectorSpace, MultiVectorStrategy};
pub use sparse::SparseStrategy;

use async_trait::async_trait;

use crate::error::SearchError;
use crate::model::{QueryFilters, StrategyHit, StrategyKind};

/// A single retrieval producer. Strategy failures are isolated by the
/// fusion pipeline: a returned `Err` is logged and treated as an empty
/// result stream, never propagated to the caller.
#[async_trait]
pub trait SearchStrategy: Send + Sync {
    fn kind(&self) -> StrategyKind;

    async fn search(
        &self,
        tenant_id: &str,
        project: &str,
        query_text: &str,
        filters: &QueryFilters,
        limit: usize,
    ) -> Result<Vec<StrategyHit>, SearchError>;
}
