use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use super::models::StagedFile;

#[derive(Debug, Default)]
struct Inner {
    order: Vec<String>,
    files: HashMap<String, StagedFile>,
}

impl Inner {
    fn entry(&mut self, path: &str) -> &mut StagedFile {
        if !self.files.contains_key(path) {
            self.order.push(path.to_string());
        }
        self.files
            .entry(path.to_string())
            .or_insert_with(|| StagedFile {
                path: path.to_string(),
                content: String::new(),
                complete: false,
            })
    }
}

/// In-memory path → content map for files generated so far.
///
/// Insertion order is kept so the flush writes files in the order they were
/// planned. Each write replaces the whole content of a path, so readers only
/// ever see a full snapshot of what has been generated up to that point.
#[derive(Debug, Clone, Default)]
pub struct StagingStore {
    inner: Arc<RwLock<Inner>>,
}

impl StagingStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open (or reset) an entry before generation starts.
    pub async fn begin(&self, path: &str) {
        let mut inner = self.inner.write().await;
        let file = inner.entry(path);
        file.content.clear();
        file.complete = false;
    }

    /// Replace the partial content of an in-flight entry.
    pub async fn update(&self, path: &str, content: &str) {
        let mut inner = self.inner.write().await;
        let file = inner.entry(path);
        file.content = content.to_string();
        file.complete = false;
    }

    /// Store final content and mark the entry complete.
    pub async fn complete(&self, path: &str, content: &str) {
        self.put(path, content).await;
    }

    /// Set a path's content as complete, used by the save/edit path too.
    pub async fn put(&self, path: &str, content: &str) {
        let mut inner = self.inner.write().await;
        let file = inner.entry(path);
        file.content = content.to_string();
        file.complete = true;
    }

    pub async fn get(&self, path: &str) -> Option<StagedFile> {
        self.inner.read().await.files.get(path).cloned()
    }

    /// Every entry, in insertion order.
    pub async fn snapshot(&self) -> Vec<StagedFile> {
        let inner = self.inner.read().await;
        inner
            .order
            .iter()
            .filter_map(|p| inner.files.get(p).cloned())
            .collect()
    }

    pub async fn paths(&self) -> Vec<String> {
        self.inner.read().await.order.clone()
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.order.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
