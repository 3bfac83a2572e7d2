//! Plan-only command: `forge-scaffold plan`.

use anyhow::Result;
use console::style;

use forge_scaffold::config::ScaffoldConfig;
use forge_scaffold::llm::AnthropicGenerator;
use forge_scaffold::scaffold::ProjectContext;
use forge_scaffold::scaffold::planner::{PlanSource, Planner};

pub async fn cmd_plan(config: &ScaffoldConfig, description: &str, json: bool) -> Result<()> {
    let description = description.trim();
    if description.is_empty() {
        anyhow::bail!("Description must not be empty");
    }

    let generator = AnthropicGenerator::from_config(&config.llm)?;
    let planner = Planner::new(&generator, config.plan.max_files);
    let mut ctx = ProjectContext::new(description);
    let plan = planner.plan(&mut ctx).await?;

    if json {
        let source = match plan.source {
            PlanSource::Model => "model",
            PlanSource::Fallback => "fallback",
        };
        println!(
            "{}",
            serde_json::json!({"files": plan.files, "source": source})
        );
        return Ok(());
    }

    println!();
    println!("{} ({} files)", style("Planned structure").bold(), plan.files.len());
    if plan.source == PlanSource::Fallback {
        println!(
            "{}",
            style("The model's answer could not be used; showing the default structure.").yellow()
        );
    }
    println!();
    for path in &plan.files {
        println!("  {}", path);
    }
    println!();
    Ok(())
}
