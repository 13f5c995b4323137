//! Application state.

use std::sync::Arc;

use autocd_config::AppConfig;
use autocd_core::executor::ScriptRunner;
use tokio::sync::mpsc;

use crate::services::{Dispatcher, RunCompletion};

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub runner: Arc<dyn ScriptRunner>,
    pub dispatcher: Arc<Dispatcher>,
}

impl AppState {
    pub fn new(config: AppConfig, runner: Arc<dyn ScriptRunner>) -> Self {
        let dispatcher = Arc::new(Dispatcher::new(Arc::clone(&runner)));
        Self {
            config: Arc::new(config),
            runner,
            dispatcher,
        }
    }

    /// Forward every finished run to `completions`.
    pub fn with_completions(mut self, completions: mpsc::UnboundedSender<RunCompletion>) -> Self {
        self.dispatcher = Arc::new(
            Dispatcher::new(Arc::clone(&self.runner)).with_completions(completions),
        );
        self
    }
}
