use super::{
    graph_store::{EdgeOutcome, PartitionedGraph, UpdateError},
    numa::Placement,
    BackendError, BackendParams, GraphBackend,
};
use crate::operation_log::{EdgeOperation, Operation};
use std::{mem, ops::AddAssign, thread};
use tracing::{debug, info, instrument, warn};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DrainStats {
    pub adds_applied: usize,
    pub deletes_applied: usize,
    pub redundant: usize,
    /// Operations naming an id outside the node capacity.
    pub rejected: usize,
    /// Operations whose source row lives on another domain than the worker.
    pub remote: usize,
}

impl DrainStats {
    #[inline]
    pub fn applied(&self) -> usize {
        self.adds_applied + self.deletes_applied
    }

    #[inline]
    pub fn processed(&self) -> usize {
        self.applied() + self.redundant + self.rejected
    }
}

impl AddAssign for DrainStats {
    fn add_assign(&mut self, other: Self) {
        self.adds_applied += other.adds_applied;
        self.deletes_applied += other.deletes_applied;
        self.redundant += other.redundant;
        self.rejected += other.rejected;
        self.remote += other.remote;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PoolState {
    Accepting,
    Drained,
}

/// Per-worker FIFO queues drained by scoped threads into a [`PartitionedGraph`].
#[derive(Debug)]
pub struct WorkerPool {
    graph: PartitionedGraph,
    placement: Placement,
    queues: Vec<Vec<EdgeOperation>>,
    state: PoolState,
}

impl WorkerPool {
    pub fn new(params: BackendParams, placement: Placement) -> Self {
        let threads = params.threads.max(1);
        Self {
            graph: PartitionedGraph::new(params.node_capacity, &placement, params.search),
            placement,
            queues: vec![Vec::new(); threads],
            state: PoolState::Accepting,
        }
    }

    #[inline]
    pub fn graph(&self) -> &PartitionedGraph {
        &self.graph
    }

    /// Operations waiting for the next `start`.
    pub fn pending(&self) -> usize {
        self.queues.iter().map(Vec::len).sum()
    }

    fn enqueue(&mut self, thread_index: usize, op: EdgeOperation) -> Result<(), BackendError> {
        let pool_size = self.queues.len();
        let queue = self
            .queues
            .get_mut(thread_index)
            .ok_or(BackendError::ThreadIndex {
                thread_index,
                pool_size,
            })?;
        queue.push(op);
        Ok(())
    }
}

impl GraphBackend for WorkerPool {
    fn submit_add(
        &mut self,
        thread_index: usize,
        src: usize,
        dst: usize,
    ) -> Result<(), BackendError> {
        self.enqueue(thread_index, EdgeOperation::new(Operation::Add, src, dst))
    }

    fn submit_delete(
        &mut self,
        thread_index: usize,
        src: usize,
        dst: usize,
    ) -> Result<(), BackendError> {
        self.enqueue(thread_index, EdgeOperation::new(Operation::Delete, src, dst))
    }

    #[instrument(name = "pool_start", level = "debug", skip(self))]
    fn start(&mut self, thread_count: usize) -> Result<DrainStats, BackendError> {
        let pool_size = self.queues.len();
        if thread_count != pool_size {
            return Err(BackendError::ThreadCount {
                requested: thread_count,
                pool_size,
            });
        }

        let batches: Vec<Vec<EdgeOperation>> = self.queues.iter_mut().map(mem::take).collect();
        let graph = &self.graph;
        let placement = self.placement;

        let outcomes = thread::scope(|scope| {
            let handles: Vec<_> = batches
                .into_iter()
                .enumerate()
                .map(|(thread_index, batch)| {
                    let home = placement.home_domain(thread_index, thread_count);
                    thread::Builder::new()
                        .name(format!("pcsr-worker-{thread_index}"))
                        .spawn_scoped(scope, move || {
                            drain_queue(graph, &placement, home, thread_index, batch)
                        })
                })
                .collect();

            handles
                .into_iter()
                .enumerate()
                .map(|(thread_index, handle)| match handle {
                    Ok(handle) => handle
                        .join()
                        .map_err(|_| BackendError::WorkerPanic { thread_index }),
                    Err(source) => Err(BackendError::Spawn {
                        thread_index,
                        source,
                    }),
                })
                .collect::<Vec<_>>()
        });

        let mut totals = DrainStats::default();
        for outcome in outcomes {
            totals += outcome?;
        }
        self.state = PoolState::Drained;

        if totals.rejected > 0 {
            warn!(
                rejected = totals.rejected,
                node_capacity = graph.node_capacity(),
                "operations referenced nodes beyond capacity"
            );
        }
        info!(
            workers = thread_count,
            applied = totals.applied(),
            redundant = totals.redundant,
            remote = totals.remote,
            edges = graph.edge_count(),
            "workers drained"
        );
        Ok(totals)
    }

    fn stop(&mut self) -> Result<(), BackendError> {
        if self.state != PoolState::Drained {
            return Err(BackendError::NotStarted);
        }
        self.state = PoolState::Accepting;
        for queue in &mut self.queues {
            queue.shrink_to_fit();
        }
        debug!("worker pool stopped");
        Ok(())
    }

    fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }
}

fn drain_queue(
    graph: &PartitionedGraph,
    placement: &Placement,
    home: usize,
    thread_index: usize,
    batch: Vec<EdgeOperation>,
) -> DrainStats {
    let mut stats = DrainStats::default();
    for EdgeOperation { op, src, dst } in batch {
        let outcome = match op {
            Operation::Add => graph.insert_edge(src, dst),
            Operation::Delete => graph.remove_edge(src, dst),
            Operation::Read => continue,
        };
        match outcome {
            Ok(EdgeOutcome::Applied) if op == Operation::Add => stats.adds_applied += 1,
            Ok(EdgeOutcome::Applied) => stats.deletes_applied += 1,
            Ok(EdgeOutcome::Redundant) => stats.redundant += 1,
            Err(UpdateError::NodeOutOfRange { node, .. }) => {
                stats.rejected += 1;
                debug!(thread_index, node, "skipped operation beyond node capacity");
                continue;
            }
        }
        if placement.domain_aware && graph.domain_of(src) != home {
            stats.remote += 1;
        }
    }
    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SearchMode;

    fn pool(threads: usize, node_capacity: usize, placement: Placement) -> WorkerPool {
        WorkerPool::new(
            BackendParams {
                threads,
                search: SearchMode::LockFree,
                node_capacity,
                partitions_per_domain: placement.partitions_per_domain,
            },
            placement,
        )
    }

    #[test]
    fn same_thread_operations_apply_in_order() {
        let mut pool = pool(2, 8, Placement::flat(2));
        pool.submit_add(1, 3, 4).unwrap();
        pool.submit_delete(1, 3, 4).unwrap();
        pool.submit_add(1, 3, 4).unwrap();
        pool.submit_delete(0, 5, 6).unwrap();
        pool.submit_add(0, 5, 6).unwrap();

        let stats = pool.start(2).unwrap();
        pool.stop().unwrap();

        assert_eq!(stats.adds_applied, 3);
        assert_eq!(stats.deletes_applied, 1);
        assert_eq!(stats.redundant, 1);
        assert!(pool.graph().edge_exists(3, 4));
        assert!(pool.graph().edge_exists(5, 6));
        assert_eq!(pool.pending(), 0);
    }

    #[test]
    fn out_of_range_thread_index_is_rejected() {
        let mut pool = pool(2, 4, Placement::flat(1));
        assert!(matches!(
            pool.submit_add(2, 0, 1),
            Err(BackendError::ThreadIndex {
                thread_index: 2,
                pool_size: 2
            })
        ));
    }

    #[test]
    fn start_requires_matching_thread_count() {
        let mut pool = pool(4, 4, Placement::flat(1));
        assert!(matches!(
            pool.start(2),
            Err(BackendError::ThreadCount {
                requested: 2,
                pool_size: 4
            })
        ));
    }

    #[test]
    fn stop_is_valid_once_per_start() {
        let mut pool = pool(1, 4, Placement::flat(1));
        assert!(matches!(pool.stop(), Err(BackendError::NotStarted)));
        pool.start(1).unwrap();
        pool.stop().unwrap();
        assert!(matches!(pool.stop(), Err(BackendError::NotStarted)));
    }

    #[test]
    fn ids_beyond_capacity_are_counted_not_fatal() {
        let mut pool = pool(1, 4, Placement::flat(1));
        pool.submit_add(0, 1, 9).unwrap();
        pool.submit_add(0, 1, 2).unwrap();
        let stats = pool.start(1).unwrap();
        assert_eq!(stats.rejected, 1);
        assert_eq!(stats.adds_applied, 1);
        assert_eq!(stats.processed(), 2);
    }

    #[test]
    fn numa_placement_counts_remote_rows() {
        let mut pool = pool(2, 4, Placement::numa(2, 1));
        // worker 0 lives on domain 0 and rows 2..4 on domain 1
        pool.submit_add(0, 3, 0).unwrap();
        pool.submit_add(0, 0, 3).unwrap();
        pool.submit_add(1, 2, 1).unwrap();
        let stats = pool.start(2).unwrap();
        assert_eq!(stats.remote, 1);
        assert_eq!(stats.adds_applied, 3);
    }

    #[test]
    fn pool_can_run_consecutive_phases() {
        let mut pool = pool(3, 32, Placement::flat(4));
        for i in 0..30 {
            pool.submit_add(i % 3, i, (i + 1) % 32).unwrap();
        }
        pool.start(3).unwrap();
        pool.stop().unwrap();
        for i in 0..10 {
            pool.submit_delete(i % 3, i, i + 1).unwrap();
        }
        let stats = pool.start(3).unwrap();
        pool.stop().unwrap();
        assert_eq!(stats.deletes_applied, 10);
        assert_eq!(pool.edge_count(), 20);
    }
}
