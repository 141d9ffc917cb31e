use std::{num::ParseIntError, path::PathBuf};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("edge file {path} could not be opened")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("edge file {path} could not be read at line {line}")]
    Read {
        path: PathBuf,
        line: usize,
        #[source]
        source: std::io::Error,
    },
    #[error("edge file {path} line {line}: malformed {field} field in {text:?}")]
    Malformed {
        path: PathBuf,
        line: usize,
        field: &'static str,
        text: String,
    },
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("core graph file not specified (use -core_graph=<path>)")]
    MissingCoreGraph,
    #[error("updates file not specified (use -update_file=<path>)")]
    MissingUpdateFile,
    #[error("flag {flag} has invalid value {value:?}")]
    InvalidValue {
        flag: &'static str,
        value: String,
        #[source]
        source: ParseIntError,
    },
    #[error("flag {flag} must be at least 1")]
    Zero { flag: &'static str },
}

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("thread index {thread_index} is outside the pool of {pool_size} workers")]
    ThreadIndex {
        thread_index: usize,
        pool_size: usize,
    },
    #[error("start requested {requested} workers but the pool was built for {pool_size}")]
    ThreadCount { requested: usize, pool_size: usize },
    #[error("stop called without a completed start")]
    NotStarted,
    #[error("worker {thread_index} could not be spawned")]
    Spawn {
        thread_index: usize,
        #[source]
        source: std::io::Error,
    },
    #[error("worker {thread_index} panicked while draining its queue")]
    WorkerPanic { thread_index: usize },
}

#[derive(Debug, Error)]
pub enum RunError {
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error("backend failed during {phase}")]
    Backend {
        phase: &'static str,
        #[source]
        source: BackendError,
    },
    #[error("cannot run {requested} while the orchestrator is {current}")]
    OutOfOrder {
        requested: &'static str,
        current: &'static str,
    },
}
