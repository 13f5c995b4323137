//! Registry of live script runs.
//!
//! Runs are keyed by [`RunId`]; a secondary index maps event names to the ids
//! of their live runs, so concurrent runs of the same script stay
//! individually reachable.

use std::collections::HashMap;

use autocd_core::executor::RunInfo;
use autocd_core::{Error, Result, RunId};
use parking_lot::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::debug;

struct RunEntry {
    info: RunInfo,
    cancel: CancellationToken,
}

#[derive(Default)]
struct Inner {
    runs: HashMap<RunId, RunEntry>,
    by_event: HashMap<String, Vec<RunId>>,
}

/// Shared map of live runs.
#[derive(Default)]
pub struct RunRegistry {
    inner: RwLock<Inner>,
}

impl RunRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a live run. The returned guard removes it when dropped.
    pub(crate) fn register(&self, info: RunInfo, cancel: CancellationToken) -> Registration<'_> {
        let id = info.id;
        let mut inner = self.inner.write();
        inner
            .by_event
            .entry(info.event.clone())
            .or_default()
            .push(id);
        inner.runs.insert(id, RunEntry { info, cancel });
        Registration { registry: self, id }
    }

    fn remove(&self, id: RunId) {
        let mut inner = self.inner.write();
        let Some(entry) = inner.runs.remove(&id) else {
            return;
        };
        if let Some(ids) = inner.by_event.get_mut(&entry.info.event) {
            ids.retain(|other| *other != id);
            if ids.is_empty() {
                inner.by_event.remove(&entry.info.event);
            }
        }
        debug!(run_id = %id, event = %entry.info.event, "Run deregistered");
    }

    /// Signal every live run of `event` to terminate.
    pub fn stop_event(&self, event: &str) -> Result<usize> {
        let inner = self.inner.read();
        let ids = inner
            .by_event
            .get(event)
            .filter(|ids| !ids.is_empty())
            .ok_or_else(|| Error::NotRunning(event.to_string()))?;

        for id in ids {
            if let Some(entry) = inner.runs.get(id) {
                entry.cancel.cancel();
            }
        }
        Ok(ids.len())
    }

    /// Signal a single run to terminate.
    pub fn stop_run(&self, id: RunId) -> Result<()> {
        let inner = self.inner.read();
        let entry = inner.runs.get(&id).ok_or(Error::RunNotFound(id))?;
        entry.cancel.cancel();
        Ok(())
    }

    /// Signal every live run to terminate.
    pub fn stop_all(&self) -> usize {
        let tokens: Vec<CancellationToken> = self
            .inner
            .read()
            .runs
            .values()
            .map(|entry| entry.cancel.clone())
            .collect();

        for token in &tokens {
            token.cancel();
        }
        tokens.len()
    }

    pub fn snapshot(&self) -> Vec<RunInfo> {
        let inner = self.inner.read();
        let mut runs: Vec<RunInfo> = inner.runs.values().map(|e| e.info.clone()).collect();
        runs.sort_by_key(|info| info.id.as_uuid().to_owned());
        runs
    }

    pub fn is_running(&self, event: &str) -> bool {
        self.inner.read().by_event.contains_key(event)
    }

    pub fn len(&self) -> usize {
        self.inner.read().runs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Removes its run from the registry on drop.
pub(crate) struct Registration<'a> {
    registry: &'a RunRegistry,
    id: RunId,
}

impl Drop for Registration<'_> {
    fn drop(&mut self) {
        self.registry.remove(self.id);
    }
}
