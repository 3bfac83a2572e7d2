use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use forge_scaffold::config::ScaffoldConfig;
use forge_scaffold::telemetry;

mod cmd;

#[derive(Parser)]
#[command(name = "forge-scaffold")]
#[command(version, about = "Generate and run a web project from a description")]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Directory holding .forge/scaffold.toml (defaults to the current directory)
    #[arg(long, global = true)]
    pub project_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Plan, generate and boot a project in a sandbox
    Generate {
        /// What to build, in plain words
        description: String,

        /// Use the in-process simulated sandbox
        #[arg(long)]
        simulate: bool,

        /// Print events as JSON lines
        #[arg(long)]
        json: bool,

        /// Write a .tar.gz of the finished project to this path
        #[arg(long)]
        export: Option<PathBuf>,

        /// Tear the sandbox down right away instead of waiting for Ctrl+C
        #[arg(long)]
        no_wait: bool,
    },
    /// Show the file plan for a description without generating anything
    Plan {
        description: String,

        /// Print the plan as JSON
        #[arg(long)]
        json: bool,
    },
    /// Serve the generation API over HTTP
    Serve {
        /// Port to serve on (overrides [server] port)
        #[arg(short, long)]
        port: Option<u16>,

        /// Enable dev mode (bind all interfaces, permissive CORS)
        #[arg(long)]
        dev: bool,

        /// Open a browser once the server is listening
        #[arg(long)]
        open: bool,

        /// Use the in-process simulated sandbox
        #[arg(long)]
        simulate: bool,
    },
    /// View or validate configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

#[derive(Subcommand, Clone)]
pub enum ConfigCommands {
    /// Show the effective configuration
    Show,
    /// Validate configuration and show any warnings
    Validate,
    /// Initialize a default scaffold.toml file
    Init,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let project_dir = match cli.project_dir.clone() {
        Some(dir) => dir,
        None => std::env::current_dir().context("Failed to get current directory")?,
    };

    if let Commands::Config { command } = &cli.command {
        return cmd::cmd_config(&project_dir, command.clone());
    }

    let config = ScaffoldConfig::resolve(&project_dir)?;
    let _log_guard = telemetry::init(&config.logging, cli.verbose)?;

    match cli.command {
        Commands::Generate {
            description,
            simulate,
            json,
            export,
            no_wait,
        } => {
            cmd::cmd_generate(
                config,
                cmd::GenerateOptions {
                    description,
                    simulate,
                    json,
                    export,
                    no_wait,
                },
            )
            .await?;
        }
        Commands::Plan { description, json } => {
            cmd::cmd_plan(&config, &description, json).await?;
        }
        Commands::Serve {
            port,
            dev,
            open,
            simulate,
        } => {
            cmd::cmd_serve(config, port, dev, open, simulate).await?;
        }
        Commands::Config { .. } => {}
    }

    Ok(())
}
