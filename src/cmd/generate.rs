//! End-to-end generation from the terminal: `forge-scaffold generate`.

use std::path::PathBuf;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;

use forge_scaffold::config::{SandboxMode, ScaffoldConfig};
use forge_scaffold::scaffold::{Coordinator, EventSink, StagingStore};

use super::render::EventRenderer;

pub struct GenerateOptions {
    pub description: String,
    pub simulate: bool,
    pub json: bool,
    pub export: Option<PathBuf>,
    pub no_wait: bool,
}

pub async fn cmd_generate(mut config: ScaffoldConfig, opts: GenerateOptions) -> Result<()> {
    let description = opts.description.trim();
    if description.is_empty() {
        anyhow::bail!("Description must not be empty");
    }
    if opts.simulate {
        config.sandbox.mode = SandboxMode::Simulated;
    }

    let coordinator = Coordinator::from_config(config)?;
    let run_id = uuid::Uuid::new_v4().to_string();
    let (events, mut rx) = EventSink::channel();

    let json = opts.json;
    let renderer = tokio::spawn(async move {
        let mut renderer = EventRenderer::new(json);
        while let Some(event) = rx.recv().await {
            renderer.render(&event);
        }
    });

    // First Ctrl+C cancels the run
    let cancel = CancellationToken::new();
    let interrupt = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("Interrupted, cancelling run");
                cancel.cancel();
            }
        })
    };

    let outcome = coordinator
        .run(&run_id, description, StagingStore::new(), events, cancel)
        .await;
    interrupt.abort();
    renderer.await.context("Event renderer panicked")?;

    let Some(handle) = outcome.handle else {
        let message = outcome
            .report
            .error
            .unwrap_or_else(|| "Generation failed".to_string());
        anyhow::bail!(message);
    };

    if let Some(path) = &opts.export {
        let bytes = coordinator.export(&handle).await?;
        std::fs::write(path, &bytes)
            .with_context(|| format!("Failed to write archive to {}", path.display()))?;
        if !opts.json {
            println!("Exported {} bytes to {}", bytes.len(), path.display());
        }
    }

    if !opts.no_wait {
        if !opts.json {
            println!();
            println!("Sandbox is running. Press Ctrl+C to stop it.");
        }
        tokio::signal::ctrl_c()
            .await
            .context("Failed to listen for Ctrl+C")?;
    }

    coordinator.teardown(Some(&handle)).await;
    Ok(())
}
