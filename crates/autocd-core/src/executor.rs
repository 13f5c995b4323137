//! Script runner trait and execution types.
//!
//! A runner executes named scripts from a scripts directory under a
//! concurrency ceiling and a per-run timeout.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::classify::LineLevel;
use crate::{Error, Result, RunId};

/// Ordered `KEY=VALUE` environment entries. Later entries win on conflict.
pub type EnvVars = Vec<(String, String)>;

/// Exit code reported for a run killed by its deadline.
pub const TIMEOUT_EXIT_CODE: i32 = -1;

/// Configuration for a script runner.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutorConfig {
    /// Directory containing the scripts; also the working directory of each run.
    pub scripts_dir: PathBuf,
    /// Maximum wall-clock time of a single run.
    pub timeout: Duration,
    /// Maximum number of scripts running at once.
    pub max_concurrent: usize,
    /// Environment applied to every run, before the per-run environment.
    pub default_env: EnvVars,
    /// Interpreter used to run scripts.
    pub shell: PathBuf,
}

impl ExecutorConfig {
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5 * 60);
    pub const DEFAULT_MAX_CONCURRENT: usize = 5;
    pub const DEFAULT_SHELL: &'static str = "/bin/bash";

    pub fn new(scripts_dir: impl Into<PathBuf>) -> Self {
        Self {
            scripts_dir: scripts_dir.into(),
            timeout: Self::DEFAULT_TIMEOUT,
            max_concurrent: Self::DEFAULT_MAX_CONCURRENT,
            default_env: Vec::new(),
            shell: PathBuf::from(Self::DEFAULT_SHELL),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_concurrent(mut self, max_concurrent: usize) -> Self {
        self.max_concurrent = max_concurrent;
        self
    }

    pub fn with_default_env(mut self, env: EnvVars) -> Self {
        self.default_env = env;
        self
    }

    pub fn with_shell(mut self, shell: impl Into<PathBuf>) -> Self {
        self.shell = shell.into();
        self
    }

    /// Replace unset (zero) limits with their defaults.
    pub fn normalized(mut self) -> Self {
        if self.timeout.is_zero() {
            self.timeout = Self::DEFAULT_TIMEOUT;
        }
        if self.max_concurrent == 0 {
            self.max_concurrent = Self::DEFAULT_MAX_CONCURRENT;
        }
        if self.shell.as_os_str().is_empty() {
            self.shell = PathBuf::from(Self::DEFAULT_SHELL);
        }
        self
    }
}

/// Parse a `KEY=VALUE` pair. The value may itself contain `=`.
pub fn parse_env_pair(pair: &str) -> Result<(String, String)> {
    match pair.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(Error::InvalidInput(format!(
            "expected KEY=VALUE, got {:?}",
            pair
        ))),
    }
}

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    /// The script exited with status 0.
    Succeeded,
    /// The script exited with a non-zero status.
    Failed,
    /// The script was killed at its deadline.
    TimedOut,
    /// The script was killed by a stop request.
    Stopped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogStream {
    Stdout,
    Stderr,
}

impl std::fmt::Display for LogStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogStream::Stdout => write!(f, "stdout"),
            LogStream::Stderr => write!(f, "stderr"),
        }
    }
}

/// A line of script output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogLine {
    pub timestamp: DateTime<Utc>,
    pub stream: LogStream,
    pub level: LineLevel,
    pub content: String,
}

/// Result of a finished run.
///
/// Non-zero exits, timeouts and stops are reported here rather than as
/// errors; check [`ExecutionResult::is_success`] or `outcome`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub run_id: RunId,
    pub event: String,
    /// Captured non-blank lines of both streams, newline separated.
    pub output: String,
    pub exit_code: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub logs: Vec<LogLine>,
    pub outcome: RunOutcome,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl ExecutionResult {
    pub fn is_success(&self) -> bool {
        self.outcome == RunOutcome::Succeeded
    }
}

/// A live run as seen by operators.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunInfo {
    pub id: RunId,
    pub event: String,
    pub pid: Option<u32>,
    pub started_at: DateTime<Utc>,
}

/// Trait for script runners.
#[async_trait]
pub trait ScriptRunner: Send + Sync {
    /// Run the script named `event` with `env` layered over the default
    /// environment, waiting for a free slot first.
    async fn execute(&self, event: &str, env: EnvVars) -> Result<ExecutionResult>;

    /// Request termination of every live run of `event`.
    /// Returns how many runs were signalled.
    fn stop(&self, event: &str) -> Result<usize>;

    /// Request termination of a single run.
    fn stop_run(&self, id: RunId) -> Result<()>;

    /// Request termination of every live run. Returns how many were signalled.
    fn stop_all(&self) -> usize;

    /// Snapshot of live runs.
    fn running(&self) -> Vec<RunInfo>;
}
