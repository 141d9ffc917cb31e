use std::{fs, path::Path};
use tracing::debug;

const NODE_SYSFS: &str = "/sys/devices/system/node";

/// Count `nodeN` entries under sysfs; 1 when the topology is not exposed.
pub fn detect_domains() -> usize {
    count_domains(Path::new(NODE_SYSFS)).unwrap_or(1).max(1)
}

fn count_domains(root: &Path) -> Option<usize> {
    let entries = fs::read_dir(root).ok()?;
    let count = entries
        .filter_map(Result::ok)
        .filter(|entry| {
            entry
                .file_name()
                .to_str()
                .and_then(|name| name.strip_prefix("node"))
                .is_some_and(|id| !id.is_empty() && id.bytes().all(|b| b.is_ascii_digit()))
        })
        .count();
    debug!(domains = count, "detected numa topology");
    Some(count)
}

/// How partitions and workers map onto NUMA domains.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Placement {
    pub domains: usize,
    pub partitions_per_domain: usize,
    /// Whether workers are tied to a home domain.
    pub domain_aware: bool,
}

impl Placement {
    /// `partitions` partitions on a single domain.
    pub fn flat(partitions: usize) -> Self {
        Self {
            domains: 1,
            partitions_per_domain: partitions.max(1),
            domain_aware: false,
        }
    }

    pub fn numa(domains: usize, partitions_per_domain: usize) -> Self {
        Self {
            domains: domains.max(1),
            partitions_per_domain: partitions_per_domain.max(1),
            domain_aware: true,
        }
    }

    #[inline]
    pub fn partition_count(&self) -> usize {
        self.domains * self.partitions_per_domain
    }

    #[inline]
    pub fn domain_of_partition(&self, partition: usize) -> usize {
        (partition / self.partitions_per_domain).min(self.domains - 1)
    }

    /// Spread `threads` workers over the domains in contiguous blocks.
    #[inline]
    pub fn home_domain(&self, thread_index: usize, threads: usize) -> usize {
        if !self.domain_aware || threads == 0 {
            return 0;
        }
        (thread_index * self.domains / threads).min(self.domains - 1)
    }
}
