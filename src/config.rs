use crate::{error::ConfigError, operation_log::Operation};
use std::{fmt, path::PathBuf};
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendVariant {
    /// Single shared structure, no partitioning.
    Baseline,
    PartitionedParallel,
    PartitionedParallelNuma,
}

impl BackendVariant {
    pub const fn as_str(self) -> &'static str {
        match self {
            BackendVariant::Baseline => "ppcsr",
            BackendVariant::PartitionedParallel => "pppcsr",
            BackendVariant::PartitionedParallelNuma => "pppcsrnuma",
        }
    }
}

impl fmt::Display for BackendVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchMode {
    /// Hold the write lock while searching for the edge slot.
    Locked,
    /// Search under a shared read lock; take the write lock and search again to mutate.
    LockFree,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunConfig {
    pub threads: usize,
    /// Update records to execute; clamped to the update log once it is parsed.
    pub requested_size: usize,
    pub search: SearchMode,
    pub variant: BackendVariant,
    pub partitions_per_domain: usize,
    /// Operation for update lines without a marker.
    pub update_default: Operation,
    pub core_graph: PathBuf,
    pub update_file: PathBuf,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            threads: 8,
            requested_size: 1_000_000,
            search: SearchMode::Locked,
            variant: BackendVariant::PartitionedParallelNuma,
            partitions_per_domain: 1,
            update_default: Operation::Add,
            core_graph: PathBuf::new(),
            update_file: PathBuf::new(),
        }
    }
}

impl RunConfig {
    /// Resolve flags of the form `-name` / `-name=value`. The program name must not be included.
    pub fn from_args<I, S>(args: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut config = RunConfig::default();
        let mut core_graph = None;
        let mut update_file = None;

        for arg in args {
            let arg = arg.as_ref();
            let (name, value) = match arg.split_once('=') {
                Some((name, value)) => (name, Some(value)),
                None => (arg, None),
            };

            match (name, value) {
                ("-threads", Some(value)) => {
                    config.threads = positive("-threads", value)?;
                }
                ("-size", Some(value)) => {
                    config.requested_size = number("-size", value)?;
                }
                ("-partitions_per_domain", Some(value)) => {
                    config.partitions_per_domain = positive("-partitions_per_domain", value)?;
                }
                ("-core_graph", Some(value)) if !value.is_empty() => {
                    core_graph = Some(PathBuf::from(value));
                }
                ("-update_file", Some(value)) if !value.is_empty() => {
                    update_file = Some(PathBuf::from(value));
                }
                ("-lock_free", None) => config.search = SearchMode::LockFree,
                ("-insert", None) => config.update_default = Operation::Add,
                ("-delete", None) => config.update_default = Operation::Delete,
                ("-pppcsrnuma", None) => config.variant = BackendVariant::PartitionedParallelNuma,
                ("-pppcsr", None) => config.variant = BackendVariant::PartitionedParallel,
                ("-ppcsr", None) => config.variant = BackendVariant::Baseline,
                _ => warn!(argument = arg, "ignoring unrecognized argument"),
            }
        }

        config.core_graph = core_graph.ok_or(ConfigError::MissingCoreGraph)?;
        config.update_file = update_file.ok_or(ConfigError::MissingUpdateFile)?;
        Ok(config)
    }
}

fn number(flag: &'static str, value: &str) -> Result<usize, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|source| ConfigError::InvalidValue {
            flag,
            value: value.to_owned(),
            source,
        })
}

fn positive(flag: &'static str, value: &str) -> Result<usize, ConfigError> {
    match number(flag, value)? {
        0 => Err(ConfigError::Zero { flag }),
        n => Ok(n),
    }
}
