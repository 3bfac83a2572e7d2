//! Execution-environment capability.
//!
//! ```text
//!  Coordinator ──> ExecutionEnvironment ──┬── RemoteEnvironment    (hosted REST API)
//!       │                                 └── SimulatedEnvironment (in-memory)
//!       └──────> EndpointProbe ───────────┬── HttpProbe
//!                                         └── SimulatedEnvironment
//! ```
//!
//! Which pair backs a run is decided once, from `[sandbox] mode`, by
//! [`from_config`].

pub mod probe;
pub mod remote;
pub mod simulated;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::{SandboxMode, SandboxSection};
use crate::errors::EnvError;

pub use probe::HttpProbe;
pub use remote::RemoteEnvironment;
pub use simulated::SimulatedEnvironment;

/// Directories never listed for export.
pub const LIST_EXCLUDES: &[&str] = &["node_modules", ".next", ".git"];

/// Opaque reference to one live environment.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EnvHandle {
    id: String,
}

impl EnvHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }

    pub fn id(&self) -> &str {
        &self.id
    }
}

impl std::fmt::Display for EnvHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.id)
    }
}

/// Captured result of a command.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// A sandboxed process space the generated project is installed and run in.
#[async_trait]
pub trait ExecutionEnvironment: Send + Sync {
    /// Start a new environment that lives for at most `timeout`.
    async fn create(&self, timeout: Duration) -> Result<EnvHandle, EnvError>;

    /// Write (or overwrite) a file at an absolute path.
    async fn write_file(&self, handle: &EnvHandle, path: &str, content: &str)
    -> Result<(), EnvError>;

    async fn read_file(&self, handle: &EnvHandle, path: &str) -> Result<String, EnvError>;

    /// Raw file content, for files that may not be text.
    async fn read_file_bytes(&self, handle: &EnvHandle, path: &str) -> Result<Vec<u8>, EnvError> {
        self.read_file(handle, path).await.map(String::into_bytes)
    }

    /// Run a shell command and wait for it, up to `timeout`.
    async fn run_command(
        &self,
        handle: &EnvHandle,
        command: &str,
        timeout: Duration,
    ) -> Result<CommandOutput, EnvError>;

    /// Public address of a port inside the environment.
    async fn network_endpoint(&self, handle: &EnvHandle, port: u16) -> Result<String, EnvError>;

    async fn destroy(&self, handle: &EnvHandle) -> Result<(), EnvError>;

    /// Every regular file under `dir`, relative to it, skipping
    /// [`LIST_EXCLUDES`].
    async fn list_files(&self, handle: &EnvHandle, dir: &str) -> Result<Vec<String>, EnvError> {
        let prunes: Vec<String> = LIST_EXCLUDES
            .iter()
            .map(|d| format!("-path './{}' -prune", d))
            .collect();
        let command = format!(
            "cd {} && find . \\( {} \\) -o -type f -print",
            shell_quote(dir),
            prunes.join(" -o ")
        );
        let output = self
            .run_command(handle, &command, Duration::from_secs(60))
            .await?;
        if !output.success() {
            return Err(EnvError::Http {
                status: 500,
                body: format!("listing {} failed: {}", dir, output.stderr.trim()),
            });
        }
        Ok(parse_find_output(&output.stdout))
    }

    /// Backend name, for logs.
    fn name(&self) -> &'static str;
}

/// Readiness check for a network endpoint.
#[async_trait]
pub trait EndpointProbe: Send + Sync {
    /// True when the endpoint answered in a way that counts as up.
    async fn is_ready(&self, url: &str) -> bool;
}

/// Turn `find .` output into sorted relative paths.
pub fn parse_find_output(stdout: &str) -> Vec<String> {
    let mut files: Vec<String> = stdout
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(|l| l.strip_prefix("./").unwrap_or(l).to_string())
        .filter(|l| l != ".")
        .collect();
    files.sort();
    files
}

/// Single-quote a value for `sh`.
pub fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

/// Join the environment working directory with a project-relative path.
pub fn join_path(workdir: &str, path: &str) -> String {
    format!(
        "{}/{}",
        workdir.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

/// Environment and probe selected by configuration.
pub struct Backend {
    pub environment: Arc<dyn ExecutionEnvironment>,
    pub probe: Arc<dyn EndpointProbe>,
}

/// Build the configured backend. A missing remote credential is an error;
/// simulation is never picked implicitly.
pub fn from_config(section: &SandboxSection) -> Result<Backend, EnvError> {
    match section.mode {
        SandboxMode::Remote => {
            let env = RemoteEnvironment::from_config(section)?;
            Ok(Backend {
                environment: Arc::new(env),
                probe: Arc::new(HttpProbe::new()),
            })
        }
        SandboxMode::Simulated => {
            let env = Arc::new(SimulatedEnvironment::new());
            Ok(Backend {
                environment: env.clone(),
                probe: env,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_find_output() {
        let out = "./package.json\n./app/page.tsx\n.\n\n./lib/utils.ts\n";
        assert_eq!(
            parse_find_output(out),
            vec!["app/page.tsx", "lib/utils.ts", "package.json"]
        );
    }

    #[test]
    fn test_shell_quote_escapes_single_quotes() {
        assert_eq!(shell_quote("/home/user/app"), "'/home/user/app'");
        assert_eq!(shell_quote("it's"), r"'it'\''s'");
    }

    #[test]
    fn test_join_path() {
        assert_eq!(join_path("/home/user/app/", "/app/page.tsx"), "/home/user/app/app/page.tsx");
        assert_eq!(join_path("/srv", "a.ts"), "/srv/a.ts");
    }

    #[test]
    fn test_simulated_mode_needs_no_credential() {
        let section = SandboxSection {
            mode: SandboxMode::Simulated,
            ..SandboxSection::default()
        };
        let backend = from_config(&section).unwrap();
        assert_eq!(backend.environment.name(), "simulated");
    }
}
