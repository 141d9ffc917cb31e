mod graph_store;
mod numa;
mod pool;

pub use crate::error::BackendError;
pub use graph_store::{CsrSnapshot, EdgeOutcome, PartitionedGraph, UpdateError};
pub use numa::{detect_domains, Placement};
pub use pool::{DrainStats, WorkerPool};

use crate::config::{BackendVariant, RunConfig, SearchMode};
use tracing::info;

/// What the orchestrator needs from a graph engine.
///
/// Submissions are addressed to a worker index and only queued; nothing is visible until
/// [`GraphBackend::start`] returns. Operations queued under the same index are applied in
/// submission order. Operations under different indices may be applied in any relative
/// order, including concurrently on the same edge, and implementations must tolerate that.
pub trait GraphBackend: Send {
    fn submit_add(&mut self, thread_index: usize, src: usize, dst: usize)
        -> Result<(), BackendError>;

    fn submit_delete(
        &mut self,
        thread_index: usize,
        src: usize,
        dst: usize,
    ) -> Result<(), BackendError>;

    /// Run `thread_count` workers until every queued operation is applied exactly once.
    fn start(&mut self, thread_count: usize) -> Result<DrainStats, BackendError>;

    /// Release what the last `start` held. Valid once per `start`.
    fn stop(&mut self) -> Result<(), BackendError>;

    fn edge_count(&self) -> usize;
}

/// Construction arguments every backend variant accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackendParams {
    pub threads: usize,
    pub search: SearchMode,
    /// Largest node id plus one.
    pub node_capacity: usize,
    pub partitions_per_domain: usize,
}

impl BackendParams {
    pub fn from_config(config: &RunConfig, node_capacity: usize) -> Self {
        Self {
            threads: config.threads,
            search: config.search,
            node_capacity,
            partitions_per_domain: config.partitions_per_domain,
        }
    }
}

/// Instantiate the backend selected by `variant`.
pub fn build(variant: BackendVariant, params: BackendParams) -> Box<dyn GraphBackend> {
    let placement = match variant {
        BackendVariant::Baseline => Placement::flat(1),
        BackendVariant::PartitionedParallel => Placement::flat(params.partitions_per_domain),
        BackendVariant::PartitionedParallelNuma => {
            Placement::numa(detect_domains(), params.partitions_per_domain)
        }
    };
    info!(
        %variant,
        threads = params.threads,
        node_capacity = params.node_capacity,
        search = ?params.search,
        domains = placement.domains,
        partitions = placement.partition_count(),
        "constructing backend"
    );
    Box::new(WorkerPool::new(params, placement))
}
