use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};

use super::events::{EventSink, GenerationEvent};
use crate::config::ReadinessSection;
use crate::sandbox::{EndpointProbe, EnvHandle, ExecutionEnvironment, shell_quote};

/// Where the dev server's output is captured inside the environment.
pub const DEV_SERVER_LOG: &str = "/tmp/dev-server.log";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    Ready { url: String, attempts: u32 },
    Exhausted { attempts: u32 },
}

/// Starts the dev server and waits for it to answer.
pub struct ReadinessProber {
    env: Arc<dyn ExecutionEnvironment>,
    probe: Arc<dyn EndpointProbe>,
    settings: ReadinessSection,
    events: EventSink,
}

impl ReadinessProber {
    pub fn new(
        env: Arc<dyn ExecutionEnvironment>,
        probe: Arc<dyn EndpointProbe>,
        settings: ReadinessSection,
        events: EventSink,
    ) -> Self {
        Self {
            env,
            probe,
            settings,
            events,
        }
    }

    /// Launch the dev server in the background. Its exit is never awaited.
    pub async fn start(&self, handle: &EnvHandle, workdir: &str) -> Result<()> {
        self.events.log("Starting development server...");
        let command = format!(
            "cd {} && nohup npm run dev > {} 2>&1 &",
            shell_quote(workdir),
            DEV_SERVER_LOG
        );
        let output = self
            .env
            .run_command(
                handle,
                &command,
                Duration::from_secs(self.settings.start_command_timeout_secs),
            )
            .await
            .context("Failed to start the development server")?;
        if !output.success() {
            tracing::warn!(exit_code = output.exit_code, stderr = %output.stderr, "Dev server launch returned non-zero");
        }
        Ok(())
    }

    /// Probe until ready or the attempt budget is spent.
    ///
    /// A failed probe is only logged. Sleeps between attempts, never after
    /// the last one, and stops at the first success.
    pub async fn wait_ready(&self, handle: &EnvHandle) -> Result<ProbeOutcome> {
        let max = self.settings.max_attempts;
        let url = self
            .env
            .network_endpoint(handle, self.settings.port)
            .await
            .context("Failed to resolve the preview endpoint")?;

        for attempt in 1..=max {
            if self.probe.is_ready(&url).await {
                tracing::info!(%url, attempt, "Dev server ready");
                self.events.emit(GenerationEvent::UrlReady { url: url.clone() });
                return Ok(ProbeOutcome::Ready {
                    url,
                    attempts: attempt,
                });
            }

            tracing::debug!(%url, attempt, max, "Dev server not ready");
            self.events
                .log(format!("Waiting for server... (attempt {}/{})", attempt, max));
            if attempt % 5 == 0 {
                self.log_processes(handle).await;
            }
            if attempt < max {
                tokio::time::sleep(self.settings.delay()).await;
            }
        }

        self.events.emit(GenerationEvent::warning(format!(
            "Server did not respond after {} attempts",
            max
        )));
        Ok(ProbeOutcome::Exhausted { attempts: max })
    }

    /// Best-effort process listing for diagnosis.
    async fn log_processes(&self, handle: &EnvHandle) {
        match self
            .env
            .run_command(handle, "ps aux | grep -v grep | grep -i node", Duration::from_secs(5))
            .await
        {
            Ok(output) if !output.stdout.trim().is_empty() => {
                tracing::debug!(processes = %output.stdout.trim(), "Node processes");
            }
            Ok(_) => tracing::debug!("No node processes running"),
            Err(e) => tracing::debug!(error = %e, "Process listing failed"),
        }
    }

    /// Tail of the captured dev-server output, if it can be read.
    pub async fn log_tail(&self, handle: &EnvHandle) -> Option<String> {
        let command = format!("tail -n 50 {}", DEV_SERVER_LOG);
        match self
            .env
            .run_command(handle, &command, Duration::from_secs(5))
            .await
        {
            Ok(output) if output.success() && !output.stdout.trim().is_empty() => {
                Some(output.stdout)
            }
            Ok(_) => None,
            Err(e) => {
                tracing::debug!(error = %e, "Could not read dev server log");
                None
            }
        }
    }
}
