use crate::{
    config::RunConfig,
    error::ParseError,
    operation_log::{self, EdgeOperation, Operation, OperationLog, ParsedLog},
};
use rand::{rngs::StdRng, Rng, SeedableRng};
use std::{
    fs::File,
    io::{self, BufWriter, Write},
    path::Path,
};
use tracing::{info, instrument, warn};

/// Both operation logs of a run plus the values derived from them.
#[derive(Debug, Clone)]
pub struct Workload {
    pub core: OperationLog,
    pub updates: OperationLog,
    /// Max of the core header count and every id in either file.
    pub node_bound: usize,
    /// Update records to execute, never more than `updates.len()`.
    pub size: usize,
}

impl Workload {
    /// Parse the base graph (header form, default ADD) and the update file (header-less).
    #[instrument(name = "load_workload", level = "debug", skip_all)]
    pub fn load(config: &RunConfig) -> Result<Self, ParseError> {
        let core = operation_log::read_with_header(&config.core_graph, Operation::Add)?;
        let updates = operation_log::read(&config.update_file, config.update_default)?;
        let workload = Self::from_parsed(core, updates, config.requested_size);

        if workload.core.is_empty() {
            warn!(path = %config.core_graph.display(), "core graph contains no edges");
        }
        if workload.updates.is_empty() {
            warn!(path = %config.update_file.display(), "update file contains no edges");
        }
        info!(
            core_edges = workload.core.len(),
            update_edges = workload.updates.len(),
            workload_size = workload.size,
            node_bound = workload.node_bound,
            "workload loaded"
        );
        Ok(workload)
    }

    pub fn from_parsed(core: ParsedLog, updates: ParsedLog, requested_size: usize) -> Self {
        let node_bound = core.node_bound.max(updates.node_bound);
        let size = requested_size.min(updates.log.len());
        Self {
            core: core.log,
            updates: updates.log,
            node_bound,
            size,
        }
    }

    /// Capacity handed to the backend; id 0 is a valid node.
    ///
    /// The parser refuses `usize::MAX` as an id, so the addition only saturates for a
    /// hand-built workload.
    #[inline]
    pub fn node_capacity(&self) -> usize {
        self.node_bound.saturating_add(1)
    }

    /// The prefix of the update log that phase 2 executes.
    #[inline]
    pub fn update_slice(&self) -> &[EdgeOperation] {
        &self.updates.records()[..self.size]
    }
}

/// Shape of a generated benchmark input.
#[derive(Debug, Clone)]
pub struct SyntheticShape {
    pub nodes: usize,
    pub core_edges: usize,
    pub updates: usize,
    /// Share of updates that delete a core edge instead of adding a new one.
    pub delete_ratio: f64,
    pub seed: u64,
}

impl Default for SyntheticShape {
    fn default() -> Self {
        Self {
            nodes: 1 << 12,
            core_edges: 1 << 15,
            updates: 1 << 14,
            delete_ratio: 0.25,
            seed: 0x5eed,
        }
    }
}

/// Write a base-graph file with a header and an update file with explicit markers.
pub fn generate(shape: &SyntheticShape, core_path: &Path, update_path: &Path) -> io::Result<()> {
    let nodes = shape.nodes.max(1);
    let delete_ratio = shape.delete_ratio.clamp(0.0, 1.0);
    let mut rng = StdRng::seed_from_u64(shape.seed);

    let core: Vec<(usize, usize)> = (0..shape.core_edges)
        .map(|_| (rng.random_range(0..nodes), rng.random_range(0..nodes)))
        .collect();

    let mut out = BufWriter::new(File::create(core_path)?);
    writeln!(out, "{} {}", nodes - 1, core.len())?;
    for (src, dst) in &core {
        writeln!(out, "{src} {dst}")?;
    }
    out.flush()?;

    let mut out = BufWriter::new(File::create(update_path)?);
    for _ in 0..shape.updates {
        if !core.is_empty() && rng.random_bool(delete_ratio) {
            let (src, dst) = core[rng.random_range(0..core.len())];
            writeln!(out, "{src} {dst} 0")?;
        } else {
            let (src, dst) = (rng.random_range(0..nodes), rng.random_range(0..nodes));
            writeln!(out, "{src} {dst} 1")?;
        }
    }
    out.flush()
}
