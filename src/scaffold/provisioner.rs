use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;

use super::events::{EventSink, GenerationEvent};
use super::templates::{self, SeedFile};
use crate::config::SandboxSection;
use crate::errors::ScaffoldError;
use crate::sandbox::{EnvHandle, ExecutionEnvironment, join_path, shell_quote};

/// Outcome of provisioning. The handle is kept even when a later step
/// failed so the caller can still tear the environment down.
#[derive(Debug)]
pub struct ProvisionResult {
    pub handle: Option<EnvHandle>,
    pub outcome: Result<()>,
}

impl ProvisionResult {
    pub fn is_ok(&self) -> bool {
        self.outcome.is_ok()
    }
}

/// Creates and prepares the environment a run installs into.
#[derive(Clone)]
pub struct Provisioner {
    env: Arc<dyn ExecutionEnvironment>,
    settings: SandboxSection,
    events: EventSink,
}

impl Provisioner {
    pub fn new(env: Arc<dyn ExecutionEnvironment>, settings: SandboxSection, events: EventSink) -> Self {
        Self {
            env,
            settings,
            events,
        }
    }

    /// Create, seed and install. Never returns early without recording the
    /// handle it obtained. `cancel` is checked between steps.
    pub async fn provision(&self, cancel: &CancellationToken) -> ProvisionResult {
        self.events.log("Creating sandbox environment...");
        let timeout = Duration::from_secs(self.settings.timeout_secs);
        let handle = match self
            .env
            .create(timeout)
            .await
            .context("Failed to create sandbox")
        {
            Ok(handle) => handle,
            Err(e) => {
                return ProvisionResult {
                    handle: None,
                    outcome: Err(e),
                };
            }
        };

        tracing::info!(sandbox_id = %handle, backend = self.env.name(), "Sandbox created");
        self.events.emit(GenerationEvent::SandboxCreated {
            sandbox_id: handle.id().to_string(),
        });

        let outcome = self.prepare(&handle, cancel).await;
        ProvisionResult {
            handle: Some(handle),
            outcome,
        }
    }

    async fn prepare(&self, handle: &EnvHandle, cancel: &CancellationToken) -> Result<()> {
        ensure_active(cancel)?;
        self.events.log("Writing project configuration...");
        self.seed(handle, templates::CONFIG_FILES).await?;

        ensure_active(cancel)?;
        self.events.log(format!(
            "Adding {} UI components...",
            templates::UI_COMPONENTS.len()
        ));
        self.seed(handle, templates::UI_COMPONENTS).await?;

        ensure_active(cancel)?;
        self.install(handle).await
    }

    /// Write seed files. Repeating this is a plain overwrite.
    pub async fn seed(&self, handle: &EnvHandle, files: &[SeedFile]) -> Result<()> {
        for file in files {
            let target = join_path(&self.settings.workdir, file.path);
            self.env
                .write_file(handle, &target, file.content)
                .await
                .with_context(|| format!("Failed to write {}", file.path))?;
        }
        Ok(())
    }

    async fn install(&self, handle: &EnvHandle) -> Result<()> {
        self.events.log("Installing dependencies (this may take a minute)...");
        let command = format!(
            "cd {} && npm install --no-audit --no-fund",
            shell_quote(&self.settings.workdir)
        );
        let output = self
            .env
            .run_command(
                handle,
                &command,
                Duration::from_secs(self.settings.install_timeout_secs),
            )
            .await
            .context("Failed to run npm install")?;

        if !output.success() {
            let stderr = crate::util::truncate_chars(output.stderr.trim(), 1000);
            tracing::warn!(exit_code = output.exit_code, %stderr, "Dependency install failed");
            return Err(ScaffoldError::InstallFailed {
                exit_code: output.exit_code,
                stderr,
            }
            .into());
        }

        self.events
            .emit(GenerationEvent::success("Dependencies installed"));
        Ok(())
    }
}

/// Fail with [`ScaffoldError::Cancelled`] once `cancel` has fired.
pub(super) fn ensure_active(cancel: &CancellationToken) -> Result<()> {
    if cancel.is_cancelled() {
        return Err(ScaffoldError::Cancelled.into());
    }
    Ok(())
}
