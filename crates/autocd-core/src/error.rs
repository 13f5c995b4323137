//! Error types for autocd.

use std::path::PathBuf;

use thiserror::Error;

use crate::RunId;

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid script name: {0:?}")]
    InvalidScriptName(String),

    #[error("script not found: {}", .0.display())]
    ScriptNotFound(PathBuf),

    #[error("failed to start script: {0}")]
    Spawn(String),

    #[error("failed to acquire output pipe: {0}")]
    Pipe(String),

    #[error("no running script for event: {0}")]
    NotRunning(String),

    #[error("no running script with id: {0}")]
    RunNotFound(RunId),

    #[error("executor is shut down")]
    ExecutorClosed,

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, Error>;
