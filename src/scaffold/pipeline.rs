use std::future::Future;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::events::{EventSink, GenerationEvent};
use super::export::export_archive;
use super::failure::{self, Failure};
use super::generator::FileGenerator;
use super::models::{ProjectContext, RunReport, RunStatus};
use super::planner::{PlanSource, Planner};
use super::prober::{ProbeOutcome, ReadinessProber};
use super::provisioner::{ProvisionResult, Provisioner, ensure_active};
use super::staging::StagingStore;
use crate::config::ScaffoldConfig;
use crate::errors::ScaffoldError;
use crate::llm::{AnthropicGenerator, TextGenerator};
use crate::sandbox::{self, Backend, EndpointProbe, EnvHandle, ExecutionEnvironment, join_path};

/// What the teardown path found to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Teardown {
    /// No environment had been created
    NothingToDestroy,
    Destroyed,
    /// Destroy failed; logged and otherwise ignored
    Failed,
}

/// Result of one run.
#[derive(Debug)]
pub struct RunOutcome {
    pub report: RunReport,
    /// Live environment after a successful run; the caller owns its teardown
    pub handle: Option<EnvHandle>,
    /// Set when the run ended through the teardown path
    pub teardown: Option<Teardown>,
}

/// Provisioning task state as seen by the coordinator.
enum Provisioning {
    Running(JoinHandle<ProvisionResult>),
    Ready(EnvHandle),
    Failed(Option<EnvHandle>),
}

impl Provisioning {
    fn is_running(&self) -> bool {
        matches!(self, Self::Running(_))
    }

    /// Wait for the task and record its result. Cancel-safe: the state only
    /// changes once the task has finished.
    async fn join(&mut self) -> Result<()> {
        let Self::Running(task) = self else {
            return match self {
                Self::Failed(_) => Err(anyhow::anyhow!("Sandbox provisioning failed")),
                _ => Ok(()),
            };
        };

        let result = task.await.unwrap_or_else(|e| ProvisionResult {
            handle: None,
            outcome: Err(anyhow::anyhow!("Provisioning task aborted: {}", e)),
        });

        match (result.outcome, result.handle) {
            (Ok(()), Some(handle)) => {
                *self = Self::Ready(handle);
                Ok(())
            }
            (Ok(()), None) => {
                *self = Self::Failed(None);
                Err(anyhow::anyhow!("Provisioning finished without a sandbox"))
            }
            (Err(e), handle) => {
                *self = Self::Failed(handle);
                Err(e)
            }
        }
    }

    fn handle(&self) -> Option<&EnvHandle> {
        match self {
            Self::Ready(handle) | Self::Failed(Some(handle)) => Some(handle),
            _ => None,
        }
    }
}

/// Drives plan → generate → flush → bring-up for one description.
///
/// Provisioning runs as its own task from the start; planning and file
/// generation proceed meanwhile and only the flush waits for it.
pub struct Coordinator {
    generator: Arc<dyn TextGenerator>,
    env: Arc<dyn ExecutionEnvironment>,
    probe: Arc<dyn EndpointProbe>,
    config: ScaffoldConfig,
}

impl Coordinator {
    pub fn new(generator: Arc<dyn TextGenerator>, backend: Backend, config: ScaffoldConfig) -> Self {
        Self {
            generator,
            env: backend.environment,
            probe: backend.probe,
            config,
        }
    }

    /// Build the configured capabilities. Missing credentials fail here,
    /// before any work starts.
    pub fn from_config(config: ScaffoldConfig) -> Result<Self> {
        let generator = AnthropicGenerator::from_config(&config.llm)
            .map_err(ScaffoldError::from)
            .context("Cannot initialise the text generator")?;
        let backend = sandbox::from_config(&config.sandbox)
            .map_err(ScaffoldError::from)
            .context("Cannot initialise the sandbox backend")?;
        tracing::info!(
            model = generator.model(),
            backend = backend.environment.name(),
            "Coordinator ready"
        );
        Ok(Self::new(Arc::new(generator), backend, config))
    }

    pub fn config(&self) -> &ScaffoldConfig {
        &self.config
    }

    pub fn environment(&self) -> Arc<dyn ExecutionEnvironment> {
        self.env.clone()
    }

    pub fn generator(&self) -> Arc<dyn TextGenerator> {
        self.generator.clone()
    }

    /// Execute one run to its terminal event.
    ///
    /// Exactly one `Complete` or `Error` is emitted. On failure or
    /// cancellation the environment is torn down before returning; on
    /// success it is left running and returned in the outcome.
    pub async fn run(
        &self,
        run_id: &str,
        description: &str,
        store: StagingStore,
        events: EventSink,
        cancel: CancellationToken,
    ) -> RunOutcome {
        tracing::info!(run_id, "Starting generation run");
        let mut ctx = ProjectContext::new(description);
        let mut status = RunStatus::Idle;
        advance(&mut status, RunStatus::Generating, &events);

        let provision_cancel = cancel.child_token();
        let provisioner = Provisioner::new(
            self.env.clone(),
            self.config.sandbox.clone(),
            events.clone(),
        );
        let token = provision_cancel.clone();
        let task = tokio::spawn(async move { provisioner.provision(&token).await });
        let mut provisioning = Provisioning::Running(task);

        let result = self
            .drive(&mut ctx, &store, &events, &cancel, &mut provisioning, &mut status)
            .await;

        match result {
            Ok((handle, url)) => {
                advance(&mut status, RunStatus::Complete, &events);
                let files = store.paths().await;
                events.emit_terminal(GenerationEvent::Complete {
                    sandbox_id: handle.id().to_string(),
                    url: url.clone(),
                    files: files.clone(),
                });
                tracing::info!(run_id, sandbox_id = %handle, url = ?url, "Run complete");
                RunOutcome {
                    report: RunReport {
                        run_id: run_id.to_string(),
                        status,
                        sandbox_id: Some(handle.id().to_string()),
                        url,
                        files,
                        error: None,
                    },
                    handle: Some(handle),
                    teardown: None,
                }
            }
            Err(err) => {
                let Failure { kind, message } = failure::classify(&err);
                if matches!(err.downcast_ref::<ScaffoldError>(), Some(ScaffoldError::Cancelled)) {
                    tracing::info!(run_id, "Run cancelled");
                } else {
                    tracing::error!(run_id, kind = kind.as_str(), error = %format!("{:#}", err), "Run failed");
                }
                advance(&mut status, RunStatus::Error, &events);
                events.emit_terminal(GenerationEvent::Error {
                    message: message.clone(),
                    kind,
                });

                // Stop provisioning at its next step and collect the handle
                provision_cancel.cancel();
                if let Err(e) = provisioning.join().await {
                    tracing::debug!(error = %format!("{:#}", e), "Provisioning ended with error");
                }
                let sandbox_id = provisioning.handle().map(|h| h.id().to_string());
                let teardown = self.teardown(provisioning.handle()).await;

                RunOutcome {
                    report: RunReport {
                        run_id: run_id.to_string(),
                        status,
                        sandbox_id,
                        url: None,
                        files: store.paths().await,
                        error: Some(message),
                    },
                    handle: None,
                    teardown: Some(teardown),
                }
            }
        }
    }

    async fn drive(
        &self,
        ctx: &mut ProjectContext,
        store: &StagingStore,
        events: &EventSink,
        cancel: &CancellationToken,
        provisioning: &mut Provisioning,
        status: &mut RunStatus,
    ) -> Result<(EnvHandle, Option<String>)> {
        // Plan
        events.log("Planning project structure...");
        let planner = Planner::new(self.generator.as_ref(), self.config.plan.max_files);
        let plan = guarded(planner.plan(ctx), provisioning, cancel).await?;
        if plan.source == PlanSource::Fallback {
            events.emit(GenerationEvent::warning(
                "Could not parse the model's plan, using the default structure",
            ));
        }
        events.log(format!("Planned {} files", plan.files.len()));

        // Generate into staging while provisioning continues
        let files = ctx.files().to_vec();
        let file_generator = FileGenerator::new(self.generator.clone(), store.clone(), events.clone());
        for (index, path) in files.iter().enumerate() {
            tracing::debug!(path = %path, index, total = files.len(), "Generating file");
            guarded(file_generator.generate_to_end(ctx, path), provisioning, cancel).await?;
        }
        events.emit(GenerationEvent::success("All files generated"));

        // Wait for the environment
        if provisioning.is_running() {
            events.log("Waiting for sandbox setup to finish...");
        }
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ScaffoldError::Cancelled.into()),
            joined = provisioning.join() => joined?,
        }
        let handle = provisioning
            .handle()
            .cloned()
            .context("Provisioning finished without a sandbox")?;

        advance(status, RunStatus::Building, events);
        ensure_active(cancel)?;
        self.flush(store, &handle, events).await?;

        // Bring-up
        ensure_active(cancel)?;
        let prober = ReadinessProber::new(
            self.env.clone(),
            self.probe.clone(),
            self.config.readiness.clone(),
            events.clone(),
        );
        prober.start(&handle, &self.config.sandbox.workdir).await?;
        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ScaffoldError::Cancelled.into()),
            outcome = prober.wait_ready(&handle) => outcome?,
        };

        let url = match outcome {
            ProbeOutcome::Ready { url, .. } => Some(url),
            ProbeOutcome::Exhausted { attempts } => {
                tracing::warn!(sandbox_id = %handle, attempts, "Dev server never became ready");
                if let Some(tail) = prober.log_tail(&handle).await {
                    events.emit(GenerationEvent::warning(format!(
                        "Dev server output:\n{}",
                        tail.trim_end()
                    )));
                }
                None
            }
        };

        Ok((handle, url))
    }

    /// Write every staged file into the environment, in insertion order.
    ///
    /// Each write is a full overwrite, so flushing twice leaves the same
    /// state.
    pub async fn flush(
        &self,
        store: &StagingStore,
        handle: &EnvHandle,
        events: &EventSink,
    ) -> Result<usize> {
        let files = store.snapshot().await;
        events.log(format!("Writing {} files to sandbox...", files.len()));
        for file in &files {
            let target = join_path(&self.config.sandbox.workdir, &file.path);
            self.env
                .write_file(handle, &target, &file.content)
                .await
                .with_context(|| format!("Failed to write {}", file.path))?;
        }
        tracing::debug!(sandbox_id = %handle, count = files.len(), "Staging flushed");
        Ok(files.len())
    }

    /// Best-effort destroy. Errors are logged, never returned.
    pub async fn teardown(&self, handle: Option<&EnvHandle>) -> Teardown {
        let Some(handle) = handle else {
            tracing::debug!("No sandbox to tear down");
            return Teardown::NothingToDestroy;
        };
        match self.env.destroy(handle).await {
            Ok(()) => {
                tracing::info!(sandbox_id = %handle, "Sandbox destroyed");
                Teardown::Destroyed
            }
            Err(e) => {
                tracing::warn!(sandbox_id = %handle, error = %e, "Failed to destroy sandbox");
                Teardown::Failed
            }
        }
    }

    /// Replace one file's content in staging and, when live, in the
    /// environment.
    pub async fn save_file(
        &self,
        store: &StagingStore,
        handle: Option<&EnvHandle>,
        path: &str,
        content: &str,
    ) -> Result<()> {
        let path = path.trim_start_matches('/');
        if path.is_empty() || path.split('/').any(|seg| seg == "..") {
            anyhow::bail!("Invalid file path '{}'", path);
        }
        store.put(path, content).await;
        if let Some(handle) = handle {
            let target = join_path(&self.config.sandbox.workdir, path);
            self.env
                .write_file(handle, &target, content)
                .await
                .with_context(|| format!("Failed to save {}", path))?;
        }
        Ok(())
    }

    /// Archive the environment's working directory.
    pub async fn export(&self, handle: &EnvHandle) -> Result<Vec<u8>> {
        export_archive(self.env.as_ref(), handle, &self.config.sandbox.workdir).await
    }
}

/// Await `fut` unless the run is cancelled or provisioning fails first.
async fn guarded<T, F>(
    fut: F,
    provisioning: &mut Provisioning,
    cancel: &CancellationToken,
) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    tokio::pin!(fut);
    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ScaffoldError::Cancelled.into()),
            joined = provisioning.join(), if provisioning.is_running() => joined?,
            out = &mut fut => return out,
        }
    }
}

/// Move to `next` if legal and announce it.
fn advance(status: &mut RunStatus, next: RunStatus, events: &EventSink) {
    if !status.can_transition_to(next) {
        tracing::warn!(from = status.as_str(), to = next.as_str(), "Ignoring illegal status transition");
        return;
    }
    *status = next;
    events.status(next);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ReadinessSection, SandboxMode};
    use crate::errors::LlmError;
    use crate::llm::DeltaStream;
    use crate::sandbox::SimulatedEnvironment;
    use async_trait::async_trait;
    use futures::StreamExt;

    struct Canned;

    #[async_trait]
    impl TextGenerator for Canned {
        async fn generate_structured(&self, _prompt: &str) -> Result<String, LlmError> {
            Ok(r#"["app/layout.tsx", "app/page.tsx", "components/ui/button.tsx"]"#.into())
        }

        async fn generate_stream(&self, _prompt: &str) -> Result<DeltaStream, LlmError> {
            let deltas = vec![Ok("export default ".to_string()), Ok("function X() {}\n".to_string())];
            Ok(futures::stream::iter(deltas).boxed())
        }

        fn model(&self) -> &str {
            "canned"
        }
    }

    fn coordinator(env: Arc<SimulatedEnvironment>) -> Coordinator {
        let mut config = ScaffoldConfig::default();
        config.sandbox.mode = SandboxMode::Simulated;
        config.readiness = ReadinessSection {
            max_attempts: 3,
            delay_ms: 1,
            ..ReadinessSection::default()
        };
        let backend = Backend {
            environment: env.clone(),
            probe: env,
        };
        Coordinator::new(Arc::new(Canned), backend, config)
    }

    #[tokio::test]
    async fn test_successful_run_leaves_sandbox_alive() {
        let env = Arc::new(SimulatedEnvironment::new());
        let coordinator = coordinator(env.clone());
        let (events, mut rx) = EventSink::channel();

        let outcome = coordinator
            .run("run-1", "A landing page", StagingStore::new(), events, CancellationToken::new())
            .await;

        assert!(outcome.report.succeeded());
        assert!(outcome.teardown.is_none());
        let handle = outcome.handle.unwrap();
        assert!(env.is_alive(&handle));
        assert!(outcome.report.url.is_some());
        // The provisioned path is skipped, not staged
        assert_eq!(outcome.report.files, vec!["app/layout.tsx", "app/page.tsx"]);

        let files = env.files(&handle).unwrap();
        assert_eq!(
            files["/home/user/app/app/page.tsx"],
            "export default function X() {}\n"
        );

        let mut statuses = Vec::new();
        let mut last = None;
        while let Ok(event) = rx.try_recv() {
            if let GenerationEvent::Status { status } = &event {
                statuses.push(*status);
            }
            last = Some(event);
        }
        assert_eq!(
            statuses,
            vec![RunStatus::Generating, RunStatus::Building, RunStatus::Complete]
        );
        assert!(matches!(last, Some(GenerationEvent::Complete { .. })));
    }

    #[tokio::test]
    async fn test_cancelled_run_tears_down() {
        let env = Arc::new(SimulatedEnvironment::new());
        let coordinator = coordinator(env.clone());
        let (events, mut rx) = EventSink::channel();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let outcome = coordinator
            .run("run-2", "anything", StagingStore::new(), events, cancel)
            .await;

        assert_eq!(outcome.report.status, RunStatus::Error);
        assert!(outcome.teardown.is_some());
        assert!(outcome.handle.is_none());
        if let Some(id) = &outcome.report.sandbox_id {
            assert!(!env.is_alive(&EnvHandle::new(id.clone())));
        }

        let mut terminals = 0;
        while let Ok(event) = rx.try_recv() {
            if event.is_terminal() {
                terminals += 1;
            }
        }
        assert_eq!(terminals, 1);
    }

    #[tokio::test]
    async fn test_flush_twice_is_idempotent() {
        let env = Arc::new(SimulatedEnvironment::new());
        let coordinator = coordinator(env.clone());
        let handle = env.create(std::time::Duration::from_secs(60)).await.unwrap();
        let store = StagingStore::new();
        store.put("app/page.tsx", "page").await;
        store.put("lib/data.ts", "data").await;

        assert_eq!(coordinator.flush(&store, &handle, &EventSink::noop()).await.unwrap(), 2);
        let first = env.files(&handle).unwrap();
        coordinator.flush(&store, &handle, &EventSink::noop()).await.unwrap();
        assert_eq!(env.files(&handle).unwrap(), first);
        assert_eq!(first.len(), 2);
    }

    #[tokio::test]
    async fn test_save_file_updates_store_and_sandbox() {
        let env = Arc::new(SimulatedEnvironment::new());
        let coordinator = coordinator(env.clone());
        let handle = env.create(std::time::Duration::from_secs(60)).await.unwrap();
        let store = StagingStore::new();

        coordinator
            .save_file(&store, Some(&handle), "/app/page.tsx", "edited")
            .await
            .unwrap();
        assert_eq!(store.get("app/page.tsx").await.unwrap().content, "edited");
        assert_eq!(
            env.read_file(&handle, "/home/user/app/app/page.tsx").await.unwrap(),
            "edited"
        );
        assert!(coordinator
            .save_file(&store, None, "../escape", "x")
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_teardown_without_handle() {
        let env = Arc::new(SimulatedEnvironment::new());
        let coordinator = coordinator(env);
        assert_eq!(coordinator.teardown(None).await, Teardown::NothingToDestroy);
    }
}
