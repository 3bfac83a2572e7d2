//! Unified configuration for forge-scaffold.
//!
//! Settings are read from `.forge/scaffold.toml`, then overridden by
//! environment variables, then by CLI flags (applied by the command layer).
//!
//! # Configuration File Format
//!
//! ```toml
//! [llm]
//! model = "claude-sonnet-4-5"
//! api_key_env = "ANTHROPIC_API_KEY"
//! max_tokens = 8192
//!
//! [sandbox]
//! mode = "remote"          # or "simulated"
//! api_url = "https://api.e2b.dev"
//! api_key_env = "E2B_API_KEY"
//! domain = "e2b.app"
//! timeout_secs = 1800
//! workdir = "/home/user/app"
//!
//! [readiness]
//! port = 3000
//! max_attempts = 30
//! delay_ms = 2000
//!
//! [plan]
//! max_files = 30
//!
//! [server]
//! port = 3142
//!
//! [logging]
//! json = false
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Name of the config file inside the `.forge` directory.
pub const CONFIG_FILE_NAME: &str = "scaffold.toml";

/// Which execution environment backs a run.
///
/// `Simulated` is only ever selected explicitly; a missing remote credential
/// is a fatal precondition error, never a silent downgrade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SandboxMode {
    /// Hosted sandbox reached over its REST API (default)
    #[default]
    Remote,
    /// In-process simulation, no network
    Simulated,
}

impl std::fmt::Display for SandboxMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SandboxMode::Remote => write!(f, "remote"),
            SandboxMode::Simulated => write!(f, "simulated"),
        }
    }
}

impl std::str::FromStr for SandboxMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "remote" => Ok(SandboxMode::Remote),
            "simulated" | "simulation" => Ok(SandboxMode::Simulated),
            _ => Err(crate::errors::ScaffoldError::Config(format!(
                "Invalid sandbox mode '{}'. Valid values: remote, simulated",
                s
            ))
            .into()),
        }
    }
}

/// Text-generation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmSection {
    /// Model identifier sent with every request
    #[serde(default = "default_model")]
    pub model: String,
    /// Environment variable holding the API key
    #[serde(default = "default_llm_api_key_env")]
    pub api_key_env: String,
    /// Override of the Messages API endpoint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    /// Whole-request timeout for a single generation call
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_model() -> String {
    "claude-sonnet-4-5".to_string()
}

fn default_llm_api_key_env() -> String {
    "ANTHROPIC_API_KEY".to_string()
}

fn default_max_tokens() -> u32 {
    8192
}

fn default_temperature() -> f32 {
    0.3
}

fn default_request_timeout_secs() -> u64 {
    300
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            model: default_model(),
            api_key_env: default_llm_api_key_env(),
            base_url: None,
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

/// Execution-environment settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SandboxSection {
    #[serde(default)]
    pub mode: SandboxMode,
    /// Base URL of the sandbox REST API
    #[serde(default = "default_sandbox_api_url")]
    pub api_url: String,
    /// Environment variable holding the sandbox API key
    #[serde(default = "default_sandbox_api_key_env")]
    pub api_key_env: String,
    /// Domain used to build public endpoints: `{port}-{id}.{domain}`
    #[serde(default = "default_sandbox_domain")]
    pub domain: String,
    /// Sandbox template (base image) to start from
    #[serde(default = "default_sandbox_template")]
    pub template: String,
    /// Lifetime budget of a sandbox
    #[serde(default = "default_sandbox_timeout_secs")]
    pub timeout_secs: u64,
    /// Project directory inside the sandbox
    #[serde(default = "default_workdir")]
    pub workdir: String,
    /// Time budget for the dependency install command
    #[serde(default = "default_install_timeout_secs")]
    pub install_timeout_secs: u64,
}

fn default_sandbox_api_url() -> String {
    "https://api.e2b.dev".to_string()
}

fn default_sandbox_api_key_env() -> String {
    "E2B_API_KEY".to_string()
}

fn default_sandbox_domain() -> String {
    "e2b.app".to_string()
}

fn default_sandbox_template() -> String {
    "base".to_string()
}

fn default_sandbox_timeout_secs() -> u64 {
    1800
}

fn default_workdir() -> String {
    "/home/user/app".to_string()
}

fn default_install_timeout_secs() -> u64 {
    300
}

impl Default for SandboxSection {
    fn default() -> Self {
        Self {
            mode: SandboxMode::default(),
            api_url: default_sandbox_api_url(),
            api_key_env: default_sandbox_api_key_env(),
            domain: default_sandbox_domain(),
            template: default_sandbox_template(),
            timeout_secs: default_sandbox_timeout_secs(),
            workdir: default_workdir(),
            install_timeout_secs: default_install_timeout_secs(),
        }
    }
}

/// Dev-server bring-up and readiness polling.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadinessSection {
    /// Port the generated application listens on
    #[serde(default = "default_app_port")]
    pub port: u16,
    /// Retry budget for readiness probes
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Delay between probes in milliseconds
    #[serde(default = "default_delay_ms")]
    pub delay_ms: u64,
    /// Timeout for the command that launches the dev server
    #[serde(default = "default_start_command_timeout_secs")]
    pub start_command_timeout_secs: u64,
}

fn default_app_port() -> u16 {
    3000
}

fn default_max_attempts() -> u32 {
    30
}

fn default_delay_ms() -> u64 {
    2000
}

fn default_start_command_timeout_secs() -> u64 {
    10
}

impl Default for ReadinessSection {
    fn default() -> Self {
        Self {
            port: default_app_port(),
            max_attempts: default_max_attempts(),
            delay_ms: default_delay_ms(),
            start_command_timeout_secs: default_start_command_timeout_secs(),
        }
    }
}

impl ReadinessSection {
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }
}

/// Plan generation limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanSection {
    /// Upper bound on the number of files in a plan
    #[serde(default = "default_max_files")]
    pub max_files: usize,
}

fn default_max_files() -> usize {
    30
}

impl Default for PlanSection {
    fn default() -> Self {
        Self {
            max_files: default_max_files(),
        }
    }
}

/// HTTP/SSE server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSection {
    #[serde(default = "default_server_port")]
    pub port: u16,
    /// Bind on all interfaces and allow any origin
    #[serde(default)]
    pub dev_mode: bool,
}

fn default_server_port() -> u16 {
    3142
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            port: default_server_port(),
            dev_mode: false,
        }
    }
}

/// Log output settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingSection {
    /// Emit JSON log lines instead of human-readable ones
    #[serde(default)]
    pub json: bool,
    /// Directory for a daily-rotated log file (disabled when unset)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dir: Option<PathBuf>,
}

/// The complete scaffold.toml configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScaffoldConfig {
    #[serde(default)]
    pub llm: LlmSection,
    #[serde(default)]
    pub sandbox: SandboxSection,
    #[serde(default)]
    pub readiness: ReadinessSection,
    #[serde(default)]
    pub plan: PlanSection,
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub logging: LoggingSection,
}

impl ScaffoldConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::parse(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse scaffold.toml")
    }

    /// Path of the config file for a project directory.
    pub fn path_for(project_dir: &Path) -> PathBuf {
        project_dir.join(".forge").join(CONFIG_FILE_NAME)
    }

    /// Load `.forge/scaffold.toml` from the project directory.
    /// Returns defaults if the file doesn't exist.
    pub fn load_or_default(project_dir: &Path) -> Result<Self> {
        let config_path = Self::path_for(project_dir);
        if config_path.exists() {
            Self::load(&config_path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load from disk and apply process environment overrides.
    pub fn resolve(project_dir: &Path) -> Result<Self> {
        let mut config = Self::load_or_default(project_dir)?;
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Apply environment overrides using the given lookup.
    ///
    /// Recognised variables: `SCAFFOLD_MODEL`, `SCAFFOLD_LLM_BASE_URL`,
    /// `SCAFFOLD_SANDBOX_MODE`, `SCAFFOLD_SANDBOX_API_URL`,
    /// `SCAFFOLD_SANDBOX_DOMAIN`, `SCAFFOLD_READINESS_ATTEMPTS`.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(model) = lookup("SCAFFOLD_MODEL") {
            self.llm.model = model;
        }
        if let Some(url) = lookup("SCAFFOLD_LLM_BASE_URL") {
            self.llm.base_url = Some(url);
        }
        if let Some(mode) = lookup("SCAFFOLD_SANDBOX_MODE") {
            self.sandbox.mode = mode.parse()?;
        }
        if let Some(url) = lookup("SCAFFOLD_SANDBOX_API_URL") {
            self.sandbox.api_url = url;
        }
        if let Some(domain) = lookup("SCAFFOLD_SANDBOX_DOMAIN") {
            self.sandbox.domain = domain;
        }
        if let Some(attempts) = lookup("SCAFFOLD_READINESS_ATTEMPTS") {
            self.readiness.max_attempts = attempts
                .parse()
                .with_context(|| format!("Invalid SCAFFOLD_READINESS_ATTEMPTS '{}'", attempts))?;
        }
        Ok(())
    }

    /// Save configuration to a TOML file, creating parent directories.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let content =
            toml::to_string_pretty(self).context("Failed to serialize scaffold.toml")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }

    /// Validate the configuration and return any warnings.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if self.readiness.max_attempts == 0 {
            warnings.push(
                "readiness.max_attempts is 0: the dev server will never be probed".to_string(),
            );
        }
        if self.plan.max_files == 0 {
            warnings.push("plan.max_files is 0: every plan will be empty".to_string());
        }
        if !self.sandbox.workdir.starts_with('/') {
            warnings.push(format!(
                "sandbox.workdir '{}' should be an absolute path",
                self.sandbox.workdir
            ));
        }
        if self.sandbox.mode == SandboxMode::Remote && self.sandbox.api_url.is_empty() {
            warnings.push("sandbox.api_url is empty in remote mode".to_string());
        }

        warnings
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::fs;

    #[test]
    fn test_defaults() {
        let config = ScaffoldConfig::default();
        assert_eq!(config.sandbox.mode, SandboxMode::Remote);
        assert_eq!(config.readiness.port, 3000);
        assert_eq!(config.readiness.max_attempts, 30);
        assert_eq!(config.readiness.delay(), Duration::from_secs(2));
        assert_eq!(config.plan.max_files, 30);
        assert_eq!(config.sandbox.workdir, "/home/user/app");
        assert_eq!(config.llm.api_key_env, "ANTHROPIC_API_KEY");
    }

    #[test]
    fn test_load_missing_file_returns_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = ScaffoldConfig::load_or_default(dir.path()).unwrap();
        assert_eq!(config.server.port, 3142);
        assert!(config.logging.dir.is_none());
    }

    #[test]
    fn test_load_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let forge_dir = dir.path().join(".forge");
        fs::create_dir_all(&forge_dir).unwrap();
        fs::write(
            forge_dir.join("scaffold.toml"),
            r#"
[sandbox]
mode = "simulated"
workdir = "/srv/app"

[readiness]
max_attempts = 5
"#,
        )
        .unwrap();

        let config = ScaffoldConfig::load_or_default(dir.path()).unwrap();
        assert_eq!(config.sandbox.mode, SandboxMode::Simulated);
        assert_eq!(config.sandbox.workdir, "/srv/app");
        assert_eq!(config.readiness.max_attempts, 5);
        assert_eq!(config.readiness.delay_ms, 2000); // default
        assert_eq!(config.llm.model, "claude-sonnet-4-5"); // default
    }

    #[test]
    fn test_load_invalid_toml() {
        let dir = tempfile::tempdir().unwrap();
        let forge_dir = dir.path().join(".forge");
        fs::create_dir_all(&forge_dir).unwrap();
        fs::write(forge_dir.join("scaffold.toml"), "not valid toml {{{{").unwrap();

        assert!(ScaffoldConfig::load_or_default(dir.path()).is_err());
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("SCAFFOLD_MODEL", "claude-haiku-4-5"),
            ("SCAFFOLD_SANDBOX_MODE", "simulated"),
            ("SCAFFOLD_READINESS_ATTEMPTS", "7"),
        ]);
        let mut config = ScaffoldConfig::default();
        config
            .apply_env(|key| env.get(key).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.llm.model, "claude-haiku-4-5");
        assert_eq!(config.sandbox.mode, SandboxMode::Simulated);
        assert_eq!(config.readiness.max_attempts, 7);
    }

    #[test]
    fn test_env_override_invalid_mode() {
        let mut config = ScaffoldConfig::default();
        let result = config.apply_env(|key| {
            (key == "SCAFFOLD_SANDBOX_MODE").then(|| "docker".to_string())
        });
        assert!(result.is_err());
    }

    #[test]
    fn test_save_and_reload_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = ScaffoldConfig::path_for(dir.path());
        let mut config = ScaffoldConfig::default();
        config.readiness.port = 5173;
        config.save(&path).unwrap();

        let loaded = ScaffoldConfig::load(&path).unwrap();
        assert_eq!(loaded.readiness.port, 5173);
    }

    #[test]
    fn test_sandbox_mode_parse() {
        assert_eq!("Remote".parse::<SandboxMode>().unwrap(), SandboxMode::Remote);
        assert_eq!(
            "simulated".parse::<SandboxMode>().unwrap(),
            SandboxMode::Simulated
        );
        assert!("local".parse::<SandboxMode>().is_err());
        assert_eq!(SandboxMode::Simulated.to_string(), "simulated");
    }

    #[test]
    fn test_validate_warnings() {
        let mut config = ScaffoldConfig::default();
        assert!(config.validate().is_empty());

        config.readiness.max_attempts = 0;
        config.sandbox.workdir = "app".to_string();
        let warnings = config.validate();
        assert_eq!(warnings.len(), 2);
        assert!(warnings.iter().any(|w| w.contains("max_attempts")));
        assert!(warnings.iter().any(|w| w.contains("absolute")));
    }
}
