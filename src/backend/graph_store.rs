use super::numa::Placement;
use crate::config::SearchMode;
use parking_lot::RwLock;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeOutcome {
    Applied,
    /// Add of an existing edge or delete of a missing one.
    Redundant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateError {
    NodeOutOfRange { node: usize, capacity: usize },
}

#[derive(Debug, Default)]
struct Rows {
    /// Sorted out-neighbours, one row per node of the partition.
    targets: Vec<Vec<usize>>,
    edge_count: usize,
}

#[derive(Debug)]
struct Partition {
    first_node: usize,
    domain: usize,
    rows: RwLock<Rows>,
}

/// Adjacency store split into contiguous node ranges, one lock per range.
///
/// With [`SearchMode::LockFree`] the slot search runs under a shared read lock, so
/// searches in one partition proceed in parallel; a mutation then takes the write lock
/// and repeats the search before touching the row.
///
/// Any interleaving of adds and deletes from different workers is safe: each mutation
/// takes its partition lock, so concurrent operations on the same edge serialize there
/// and the final state depends only on the order in which they acquired it.
pub struct PartitionedGraph {
    partitions: Vec<Partition>,
    nodes_per_partition: usize,
    node_capacity: usize,
    search: SearchMode,
}

impl fmt::Debug for PartitionedGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PartitionedGraph")
            .field("node_capacity", &self.node_capacity)
            .field("partitions", &self.partitions.len())
            .field("edge_count", &self.edge_count())
            .finish()
    }
}

impl PartitionedGraph {
    pub fn new(node_capacity: usize, placement: &Placement, search: SearchMode) -> Self {
        let partition_count = placement.partition_count().clamp(1, node_capacity.max(1));
        let nodes_per_partition = node_capacity.div_ceil(partition_count).max(1);

        let partitions = (0..partition_count)
            .map(|index| {
                let first_node = index * nodes_per_partition;
                let end = (first_node + nodes_per_partition).min(node_capacity);
                Partition {
                    first_node,
                    domain: placement.domain_of_partition(index),
                    rows: RwLock::new(Rows {
                        targets: vec![Vec::new(); end.saturating_sub(first_node)],
                        edge_count: 0,
                    }),
                }
            })
            .collect();

        Self {
            partitions,
            nodes_per_partition,
            node_capacity,
            search,
        }
    }

    #[inline]
    pub fn node_capacity(&self) -> usize {
        self.node_capacity
    }

    #[inline]
    pub fn partition_count(&self) -> usize {
        self.partitions.len()
    }

    #[inline]
    pub fn partition_of(&self, node: usize) -> usize {
        node / self.nodes_per_partition
    }

    /// NUMA domain holding the row of `node`.
    #[inline]
    pub fn domain_of(&self, node: usize) -> usize {
        self.partitions[self.partition_of(node)].domain
    }

    pub fn edge_count(&self) -> usize {
        self.partitions
            .iter()
            .map(|partition| partition.rows.read().edge_count)
            .sum()
    }

    pub fn edge_exists(&self, src: usize, dst: usize) -> bool {
        if src >= self.node_capacity {
            return false;
        }
        let partition = &self.partitions[self.partition_of(src)];
        let rows = partition.rows.read();
        rows.targets[src - partition.first_node]
            .binary_search(&dst)
            .is_ok()
    }

    pub fn insert_edge(&self, src: usize, dst: usize) -> Result<EdgeOutcome, UpdateError> {
        let (partition, row) = self.locate(src, dst)?;
        match self.search {
            SearchMode::Locked => {
                let mut guard = partition.rows.write();
                let rows = &mut *guard;
                match rows.targets[row].binary_search(&dst) {
                    Ok(_) => Ok(EdgeOutcome::Redundant),
                    Err(slot) => {
                        rows.targets[row].insert(slot, dst);
                        rows.edge_count += 1;
                        Ok(EdgeOutcome::Applied)
                    }
                }
            }
            SearchMode::LockFree => {
                let present = partition.rows.read().targets[row].binary_search(&dst).is_ok();
                if present {
                    return Ok(EdgeOutcome::Redundant);
                }
                // the row may have changed between the two locks
                let mut guard = partition.rows.write();
                let rows = &mut *guard;
                match rows.targets[row].binary_search(&dst) {
                    Ok(_) => Ok(EdgeOutcome::Redundant),
                    Err(slot) => {
                        rows.targets[row].insert(slot, dst);
                        rows.edge_count += 1;
                        Ok(EdgeOutcome::Applied)
                    }
                }
            }
        }
    }

    pub fn remove_edge(&self, src: usize, dst: usize) -> Result<EdgeOutcome, UpdateError> {
        let (partition, row) = self.locate(src, dst)?;
        match self.search {
            SearchMode::Locked => {
                let mut guard = partition.rows.write();
                let rows = &mut *guard;
                match rows.targets[row].binary_search(&dst) {
                    Ok(slot) => {
                        rows.targets[row].remove(slot);
                        rows.edge_count -= 1;
                        Ok(EdgeOutcome::Applied)
                    }
                    Err(_) => Ok(EdgeOutcome::Redundant),
                }
            }
            SearchMode::LockFree => {
                let present = partition.rows.read().targets[row].binary_search(&dst).is_ok();
                if !present {
                    return Ok(EdgeOutcome::Redundant);
                }
                let mut guard = partition.rows.write();
                let rows = &mut *guard;
                match rows.targets[row].binary_search(&dst) {
                    Ok(slot) => {
                        rows.targets[row].remove(slot);
                        rows.edge_count -= 1;
                        Ok(EdgeOutcome::Applied)
                    }
                    Err(_) => Ok(EdgeOutcome::Redundant),
                }
            }
        }
    }

    fn locate(&self, src: usize, dst: usize) -> Result<(&Partition, usize), UpdateError> {
        for node in [src, dst] {
            if node >= self.node_capacity {
                return Err(UpdateError::NodeOutOfRange {
                    node,
                    capacity: self.node_capacity,
                });
            }
        }
        let partition = &self.partitions[self.partition_of(src)];
        Ok((partition, src - partition.first_node))
    }

    /// Copy the current adjacency into compressed sparse rows.
    pub fn snapshot(&self) -> CsrSnapshot {
        let mut offsets = Vec::with_capacity(self.node_capacity + 1);
        let mut targets = Vec::new();
        offsets.push(0);
        for partition in &self.partitions {
            let rows = partition.rows.read();
            targets.reserve(rows.edge_count);
            for row in &rows.targets {
                targets.extend_from_slice(row);
                offsets.push(targets.len());
            }
        }
        debug_assert_eq!(offsets.len(), self.node_capacity + 1);
        CsrSnapshot { offsets, targets }
    }
}

/// Immutable compressed-sparse-row copy of a [`PartitionedGraph`].
///
/// - `offsets[n]..offsets[n + 1]` is the slice of `targets` holding the out-neighbours of `n`.
/// - Each neighbour slice is sorted ascending.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CsrSnapshot {
    offsets: Vec<usize>,
    targets: Vec<usize>,
}

impl CsrSnapshot {
    #[inline]
    pub fn node_count(&self) -> usize {
        self.offsets.len() - 1
    }

    #[inline]
    pub fn edge_count(&self) -> usize {
        self.targets.len()
    }

    #[inline]
    pub fn neighbors(&self, node: usize) -> &[usize] {
        &self.targets[self.offsets[node]..self.offsets[node + 1]]
    }

    pub fn edges(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        (0..self.node_count())
            .flat_map(move |node| self.neighbors(node).iter().map(move |&dst| (node, dst)))
    }
}
