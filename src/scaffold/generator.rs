use std::sync::Arc;

use anyhow::{Context, Result};
use futures::{Stream, StreamExt};

use super::events::{EventSink, GenerationEvent};
use super::models::ProjectContext;
use super::prompts;
use super::staging::StagingStore;
use super::templates;
use crate::llm::TextGenerator;
use crate::util::strip_code_fences;

/// One step of a file's generation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileProgress {
    pub path: String,
    /// Everything generated so far; fence-stripped once `complete`
    pub content: String,
    pub complete: bool,
}

/// Streams a single file's content into the staging store and event sink.
#[derive(Clone)]
pub struct FileGenerator {
    generator: Arc<dyn TextGenerator>,
    store: StagingStore,
    events: EventSink,
}

impl FileGenerator {
    pub fn new(generator: Arc<dyn TextGenerator>, store: StagingStore, events: EventSink) -> Self {
        Self {
            generator,
            store,
            events,
        }
    }

    /// Generate `path`, yielding after every delta and once more, complete,
    /// at the end.
    ///
    /// Provisioned paths yield nothing and never reach the model. Any stream
    /// error ends the sequence with that error; there is no retry.
    pub fn generate<'a>(
        &'a self,
        ctx: &'a ProjectContext,
        path: &'a str,
    ) -> impl Stream<Item = Result<FileProgress>> + Send + 'a {
        async_stream::try_stream! {
            if templates::is_provisioned(path) {
                tracing::debug!(path, "Skipping provisioned file");
                self.events.emit(GenerationEvent::FileSkipped {
                    path: path.to_string(),
                    reason: "provided by the project template".to_string(),
                });
                return;
            }

            self.events.emit(GenerationEvent::FileStarted {
                path: path.to_string(),
            });
            self.store.begin(path).await;

            let prompt = prompts::file_prompt(ctx, path);
            let mut deltas = self
                .generator
                .generate_stream(&prompt)
                .await
                .with_context(|| format!("Failed to start generating {}", path))?;

            let mut buffer = String::new();
            while let Some(delta) = deltas.next().await {
                let delta = delta.with_context(|| format!("Generation of {} failed", path))?;
                if delta.is_empty() {
                    continue;
                }
                buffer.push_str(&delta);
                self.store.update(path, &buffer).await;
                self.events.emit(GenerationEvent::FileDelta {
                    path: path.to_string(),
                    delta,
                });
                yield FileProgress {
                    path: path.to_string(),
                    content: buffer.clone(),
                    complete: false,
                };
            }

            let content = strip_code_fences(&buffer);
            self.store.complete(path, &content).await;
            tracing::debug!(path, bytes = content.len(), "File generated");
            self.events.emit(GenerationEvent::FileCompleted {
                path: path.to_string(),
                content: content.clone(),
            });
            yield FileProgress {
                path: path.to_string(),
                content,
                complete: true,
            };
        }
    }

    /// Drive [`FileGenerator::generate`] to the end, returning the final
    /// content (`None` for skipped paths).
    pub async fn generate_to_end(&self, ctx: &ProjectContext, path: &str) -> Result<Option<String>> {
        let stream = self.generate(ctx, path);
        futures::pin_mut!(stream);
        let mut last = None;
        while let Some(progress) = stream.next().await {
            let progress = progress?;
            if progress.complete {
                last = Some(progress.content);
            }
        }
        Ok(last)
    }
}
