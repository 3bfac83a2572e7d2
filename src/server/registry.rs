use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::sandbox::EnvHandle;
use crate::scaffold::{RunOutcome, RunStatus, StagingStore};

/// Server-side state of one run.
#[derive(Debug)]
pub struct RunEntry {
    pub id: String,
    pub description: String,
    pub store: StagingStore,
    pub cancel: CancellationToken,
    pub status: RunStatus,
    pub handle: Option<EnvHandle>,
    pub sandbox_id: Option<String>,
    pub url: Option<String>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl RunEntry {
    pub fn new(id: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            description: description.into(),
            store: StagingStore::new(),
            cancel: CancellationToken::new(),
            status: RunStatus::Idle,
            handle: None,
            sandbox_id: None,
            url: None,
            error: None,
            created_at: Utc::now(),
        }
    }
}

/// JSON view of a run.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub id: String,
    pub description: String,
    pub status: RunStatus,
    pub sandbox_id: Option<String>,
    pub url: Option<String>,
    pub files: Vec<String>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Live runs keyed by id.
#[derive(Debug, Clone, Default)]
pub struct RunRegistry {
    runs: Arc<Mutex<HashMap<String, RunEntry>>>,
}

impl RunRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, entry: RunEntry) {
        self.runs.lock().await.insert(entry.id.clone(), entry);
    }

    pub async fn contains(&self, id: &str) -> bool {
        self.runs.lock().await.contains_key(id)
    }

    pub async fn set_status(&self, id: &str, status: RunStatus) {
        if let Some(entry) = self.runs.lock().await.get_mut(id) {
            entry.status = status;
        }
    }

    pub async fn set_sandbox(&self, id: &str, sandbox_id: &str) {
        if let Some(entry) = self.runs.lock().await.get_mut(id) {
            entry.sandbox_id = Some(sandbox_id.to_string());
        }
    }

    /// Record a finished run. A run that went through teardown is dropped
    /// from the registry. Returns the live handle back when the run is no
    /// longer registered, so the caller can destroy it.
    pub async fn finish(&self, id: &str, outcome: RunOutcome) -> Option<EnvHandle> {
        let mut runs = self.runs.lock().await;
        if outcome.teardown.is_some() {
            if runs.remove(id).is_some() {
                tracing::debug!(run_id = %id, "Torn-down run discarded");
            }
            return outcome.handle;
        }
        let Some(entry) = runs.get_mut(id) else {
            return outcome.handle;
        };
        entry.status = outcome.report.status;
        entry.sandbox_id = outcome.report.sandbox_id;
        entry.url = outcome.report.url;
        entry.error = outcome.report.error;
        entry.handle = outcome.handle;
        None
    }

    pub async fn summary(&self, id: &str) -> Option<RunSummary> {
        let (summary, store) = {
            let runs = self.runs.lock().await;
            let entry = runs.get(id)?;
            (
                RunSummary {
                    id: entry.id.clone(),
                    description: entry.description.clone(),
                    status: entry.status,
                    sandbox_id: entry.sandbox_id.clone(),
                    url: entry.url.clone(),
                    files: Vec::new(),
                    error: entry.error.clone(),
                    created_at: entry.created_at,
                },
                entry.store.clone(),
            )
        };
        Some(RunSummary {
            files: store.paths().await,
            ..summary
        })
    }

    pub async fn list(&self) -> Vec<RunSummary> {
        let ids: Vec<String> = self.runs.lock().await.keys().cloned().collect();
        let mut out = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(summary) = self.summary(&id).await {
                out.push(summary);
            }
        }
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        out
    }

    /// Staging store and live handle of a run.
    pub async fn resources(&self, id: &str) -> Option<(StagingStore, Option<EnvHandle>)> {
        let runs = self.runs.lock().await;
        runs.get(id).map(|e| (e.store.clone(), e.handle.clone()))
    }

    pub async fn remove(&self, id: &str) -> Option<RunEntry> {
        self.runs.lock().await.remove(id)
    }

    /// Remove every run, for shutdown.
    pub async fn drain(&self) -> Vec<RunEntry> {
        self.runs.lock().await.drain().map(|(_, e)| e).collect()
    }
}
