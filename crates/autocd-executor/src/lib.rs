//! Script execution for autocd.
//!
//! [`ScriptExecutor`] runs named shell scripts from a directory with:
//! - a fixed pool of concurrency slots
//! - a per-run deadline
//! - live stdout/stderr capture
//! - targeted or bulk cancellation through a registry of live runs

mod process;
pub mod registry;
pub mod script;

pub use autocd_core::executor::{
    EnvVars, ExecutionResult, ExecutorConfig, LogLine, LogStream, RunInfo, RunOutcome,
    ScriptRunner, TIMEOUT_EXIT_CODE,
};
pub use registry::RunRegistry;
pub use script::ScriptExecutor;
