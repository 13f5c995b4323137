//! Fire-and-forget script dispatch.
//!
//! The webhook handler answers before the script finishes, so each accepted
//! event becomes a detached task. The outcome is logged and, when a
//! completion channel is attached, forwarded to it.

use std::sync::Arc;

use autocd_core::executor::{EnvVars, ExecutionResult, ScriptRunner};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{Instrument, error, info, warn};

/// Outcome of a dispatched run.
#[derive(Debug)]
pub struct RunCompletion {
    pub script: String,
    pub result: autocd_core::Result<ExecutionResult>,
}

pub struct Dispatcher {
    runner: Arc<dyn ScriptRunner>,
    completions: Option<mpsc::UnboundedSender<RunCompletion>>,
}

impl Dispatcher {
    pub fn new(runner: Arc<dyn ScriptRunner>) -> Self {
        Self {
            runner,
            completions: None,
        }
    }

    pub fn with_completions(mut self, completions: mpsc::UnboundedSender<RunCompletion>) -> Self {
        self.completions = Some(completions);
        self
    }

    /// Run `script` in the background with `env`.
    pub fn dispatch(&self, script: &str, env: EnvVars) -> JoinHandle<()> {
        let runner = Arc::clone(&self.runner);
        let completions = self.completions.clone();
        let script = script.to_string();

        tokio::spawn(
            async move {
                let result = runner.execute(&script, env).await;
                report(&script, &result);

                if let Some(tx) = completions {
                    if tx.send(RunCompletion { script, result }).is_err() {
                        warn!("completion receiver dropped");
                    }
                }
            }
            .in_current_span(),
        )
    }
}

fn report(script: &str, result: &autocd_core::Result<ExecutionResult>) {
    match result {
        Ok(run) if run.is_success() => {
            info!(script, run_id = %run.run_id, "dispatched script succeeded");
        }
        Ok(run) => {
            warn!(
                script,
                run_id = %run.run_id,
                exit_code = run.exit_code,
                outcome = ?run.outcome,
                error = run.error.as_deref().unwrap_or_default(),
                "dispatched script did not succeed"
            );
        }
        Err(e) => {
            error!(script, error = %e, "failed to run dispatched script");
        }
    }
}
