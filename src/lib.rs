pub mod backend;
pub mod config;
pub mod error;
pub mod operation_log;
pub mod orchestrator;
pub mod workload;
