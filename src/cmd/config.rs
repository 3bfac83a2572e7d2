//! Configuration view and validation commands: `forge-scaffold config`.

use anyhow::{Context, Result};

use forge_scaffold::config::ScaffoldConfig;

use super::super::ConfigCommands;

pub fn cmd_config(project_dir: &std::path::Path, command: Option<ConfigCommands>) -> Result<()> {
    let config_path = ScaffoldConfig::path_for(project_dir);

    match command {
        None | Some(ConfigCommands::Show) => {
            println!();
            println!("Scaffold Configuration");
            println!("======================");
            println!();
            if config_path.exists() {
                println!("Config file: {}", config_path.display());
            } else {
                println!("No scaffold.toml found at {}", config_path.display());
                println!("Using defaults. Run 'forge-scaffold config init' to create one.");
            }
            println!();

            // Effective values include environment overrides
            let config = ScaffoldConfig::resolve(project_dir)?;
            let rendered =
                toml::to_string_pretty(&config).context("Failed to render configuration")?;
            println!("{}", rendered.trim_end());
            println!();

            for (label, var) in [
                ("LLM credential", &config.llm.api_key_env),
                ("Sandbox credential", &config.sandbox.api_key_env),
            ] {
                let state = if std::env::var(var).is_ok_and(|v| !v.trim().is_empty()) {
                    "set"
                } else {
                    "missing"
                };
                println!("{} ({}): {}", label, var, state);
            }
            println!();
        }
        Some(ConfigCommands::Validate) => {
            println!();
            println!("Validating configuration...");
            println!();

            let config = ScaffoldConfig::resolve(project_dir)?;
            let warnings = config.validate();
            if warnings.is_empty() {
                println!("Configuration is valid.");
            } else {
                println!("Configuration warnings:");
                for warning in warnings {
                    println!("  - {}", warning);
                }
            }
            println!();
        }
        Some(ConfigCommands::Init) => {
            if config_path.exists() {
                println!("scaffold.toml already exists at {}", config_path.display());
                println!("Delete it first if you want to recreate it.");
                return Ok(());
            }

            ScaffoldConfig::default().save(&config_path)?;

            println!("Created scaffold.toml at {}", config_path.display());
            println!();
            println!("You can now customize:");
            println!("  - [llm] model, api_key_env, max_tokens");
            println!("  - [sandbox] mode, api_url, template, workdir");
            println!("  - [readiness] port, max_attempts, delay_ms");
            println!();
        }
    }

    Ok(())
}
