//! HTTP server command: `forge-scaffold serve`.

use anyhow::Result;

use forge_scaffold::config::{SandboxMode, ScaffoldConfig};
use forge_scaffold::scaffold::Coordinator;
use forge_scaffold::server::{self, ServerConfig};

pub async fn cmd_serve(
    mut config: ScaffoldConfig,
    port: Option<u16>,
    dev: bool,
    open: bool,
    simulate: bool,
) -> Result<()> {
    if simulate {
        config.sandbox.mode = SandboxMode::Simulated;
    }

    let mut server_config = ServerConfig::from_section(&config.server);
    if let Some(port) = port {
        server_config.port = port;
    }
    server_config.dev_mode |= dev;
    // No browser inside containers in dev mode
    server_config.open_browser = open && !server_config.dev_mode;

    let coordinator = Coordinator::from_config(config)?;
    server::start_server(server_config, coordinator).await
}
