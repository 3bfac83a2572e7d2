//! Terminal rendering of generation events.

use std::time::Duration;

use console::style;
use indicatif::{ProgressBar, ProgressStyle};

use forge_scaffold::scaffold::{GenerationEvent, LogLevel};

/// Renders a run's events either for humans or as JSON lines.
pub struct EventRenderer {
    json: bool,
    spinner: Option<ProgressBar>,
    bytes: usize,
}

impl EventRenderer {
    pub fn new(json: bool) -> Self {
        Self {
            json,
            spinner: None,
            bytes: 0,
        }
    }

    pub fn render(&mut self, event: &GenerationEvent) {
        if self.json {
            match serde_json::to_string(event) {
                Ok(line) => println!("{}", line),
                Err(e) => tracing::warn!(error = %e, "Failed to serialize event"),
            }
            return;
        }

        match event {
            GenerationEvent::Log { level, message } => {
                let prefix = match level {
                    LogLevel::Info => style("·").dim(),
                    LogLevel::Success => style("✓").green(),
                    LogLevel::Warning => style("!").yellow().bold(),
                    LogLevel::Error => style("✗").red().bold(),
                };
                self.line(format!("{} {}", prefix, message));
            }
            GenerationEvent::SandboxCreated { sandbox_id } => {
                self.line(format!("{} Sandbox {} created", style("✓").green(), style(sandbox_id).cyan()));
            }
            GenerationEvent::FileStarted { path } => {
                self.finish_spinner();
                let spinner = ProgressBar::new_spinner();
                spinner.set_style(
                    ProgressStyle::default_spinner()
                        .template("{spinner:.cyan} {msg}")
                        .unwrap_or_else(|_| ProgressStyle::default_spinner()),
                );
                spinner.set_message(format!("{} ...", path));
                spinner.enable_steady_tick(Duration::from_millis(100));
                self.spinner = Some(spinner);
                self.bytes = 0;
            }
            GenerationEvent::FileDelta { path, delta } => {
                self.bytes += delta.len();
                if let Some(spinner) = &self.spinner {
                    spinner.set_message(format!("{} {}", path, style(format!("{} bytes", self.bytes)).dim()));
                }
            }
            GenerationEvent::FileCompleted { path, content } => {
                self.finish_spinner();
                self.line(format!(
                    "{} {} {}",
                    style("✓").green(),
                    path,
                    style(format!("({} lines)", content.lines().count())).dim()
                ));
            }
            GenerationEvent::FileSkipped { path, reason } => {
                self.line(format!("{} {} {}", style("–").dim(), style(path).dim(), style(format!("({})", reason)).dim()));
            }
            GenerationEvent::Status { status } => {
                self.line(format!("{} {}", style("▶").cyan(), style(status.as_str()).cyan().bold()));
            }
            GenerationEvent::UrlReady { url } => {
                self.line(format!("{} Preview ready at {}", style("✓").green(), style(url).underlined()));
            }
            GenerationEvent::Complete { sandbox_id, url, files } => {
                self.finish_spinner();
                println!();
                println!("{}", style("Project ready").green().bold());
                println!("  Sandbox: {}", sandbox_id);
                match url {
                    Some(url) => println!("  URL:     {}", style(url).underlined()),
                    None => println!("  URL:     {}", style("dev server did not respond").yellow()),
                }
                println!("  Files:   {}", files.len());
            }
            GenerationEvent::Error { message, kind } => {
                self.finish_spinner();
                println!();
                println!("{} {}", style(format!("Error ({})", kind.as_str())).red().bold(), message);
            }
        }
    }

    fn line(&self, text: String) {
        match &self.spinner {
            Some(spinner) => spinner.println(text),
            None => println!("{}", text),
        }
    }

    fn finish_spinner(&mut self) {
        if let Some(spinner) = self.spinner.take() {
            spinner.finish_and_clear();
        }
    }
}

impl Drop for EventRenderer {
    fn drop(&mut self) {
        self.finish_spinner();
    }
}
