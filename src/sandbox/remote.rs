use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use super::{CommandOutput, EnvHandle, ExecutionEnvironment};
use crate::config::SandboxSection;
use crate::errors::EnvError;

/// Extra time granted to the HTTP call on top of the command's own budget.
const COMMAND_GRACE: Duration = Duration::from_secs(10);

#[derive(Debug, Deserialize)]
struct CreateResponse {
    #[serde(alias = "sandboxId", alias = "id")]
    sandbox_id: String,
}

#[derive(Debug, Deserialize)]
struct CommandResponse {
    #[serde(default)]
    stdout: String,
    #[serde(default)]
    stderr: String,
    #[serde(alias = "exitCode", default)]
    exit_code: i32,
}

/// Hosted sandbox reached over its REST API.
#[derive(Debug, Clone)]
pub struct RemoteEnvironment {
    client: reqwest::Client,
    api_url: String,
    api_key: String,
    domain: String,
    template: String,
}

impl RemoteEnvironment {
    pub fn from_config(section: &SandboxSection) -> Result<Self, EnvError> {
        Self::from_config_with(section, |key| std::env::var(key).ok())
    }

    pub fn from_config_with<F>(section: &SandboxSection, lookup: F) -> Result<Self, EnvError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let api_key = lookup(&section.api_key_env)
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| EnvError::MissingCredential {
                env_var: section.api_key_env.clone(),
            })?;

        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(30))
            .build()
            .map_err(EnvError::Transport)?;

        Ok(Self {
            client,
            api_url: section.api_url.trim_end_matches('/').to_string(),
            api_key,
            domain: section.domain.clone(),
            template: section.template.clone(),
        })
    }

    fn url(&self, suffix: &str) -> String {
        format!("{}{}", self.api_url, suffix)
    }

    /// Send a request and map non-success statuses to [`EnvError`].
    async fn execute(
        &self,
        request: reqwest::RequestBuilder,
        sandbox_id: Option<&str>,
    ) -> Result<reqwest::Response, EnvError> {
        let response = request
            .header("X-API-Key", &self.api_key)
            .send()
            .await
            .map_err(EnvError::Transport)?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        match (status.as_u16(), sandbox_id) {
            (404, Some(id)) if !body.to_lowercase().contains("file") => {
                Err(EnvError::NotFound { id: id.to_string() })
            }
            (code, _) => Err(EnvError::Http {
                status: code,
                body: crate::util::truncate_chars(&body, 500),
            }),
        }
    }
}

#[async_trait]
impl ExecutionEnvironment for RemoteEnvironment {
    async fn create(&self, timeout: Duration) -> Result<EnvHandle, EnvError> {
        let request = self.client.post(self.url("/sandboxes")).json(&json!({
            "template": self.template,
            "timeout": timeout.as_secs(),
        }));
        let created: CreateResponse = self
            .execute(request, None)
            .await?
            .json()
            .await
            .map_err(EnvError::Transport)?;

        tracing::debug!(sandbox_id = %created.sandbox_id, "Remote sandbox created");
        Ok(EnvHandle::new(created.sandbox_id))
    }

    async fn write_file(
        &self,
        handle: &EnvHandle,
        path: &str,
        content: &str,
    ) -> Result<(), EnvError> {
        let request = self
            .client
            .post(self.url(&format!("/sandboxes/{}/files", handle.id())))
            .json(&json!({ "path": path, "content": content }));
        self.execute(request, Some(handle.id())).await?;
        Ok(())
    }

    async fn read_file(&self, handle: &EnvHandle, path: &str) -> Result<String, EnvError> {
        let request = self
            .client
            .get(self.url(&format!("/sandboxes/{}/files", handle.id())))
            .query(&[("path", path)]);
        match self.execute(request, Some(handle.id())).await {
            Ok(response) => response.text().await.map_err(EnvError::Transport),
            Err(EnvError::Http { status: 404, .. }) => Err(EnvError::FileNotFound {
                path: path.to_string(),
            }),
            Err(e) => Err(e),
        }
    }

    async fn read_file_bytes(&self, handle: &EnvHandle, path: &str) -> Result<Vec<u8>, EnvError> {
        let request = self
            .client
            .get(self.url(&format!("/sandboxes/{}/files", handle.id())))
            .query(&[("path", path)]);
        match self.execute(request, Some(handle.id())).await {
            Ok(response) => response
                .bytes()
                .await
                .map(|b| b.to_vec())
                .map_err(EnvError::Transport),
            Err(EnvError::Http { status: 404, .. }) => Err(EnvError::FileNotFound {
                path: path.to_string(),
            }),
            Err(e) => Err(e),
        }
    }

    async fn run_command(
        &self,
        handle: &EnvHandle,
        command: &str,
        timeout: Duration,
    ) -> Result<CommandOutput, EnvError> {
        let request = self
            .client
            .post(self.url(&format!("/sandboxes/{}/commands", handle.id())))
            .timeout(timeout + COMMAND_GRACE)
            .json(&json!({ "cmd": command, "timeout": timeout.as_secs() }));

        let response = match self.execute(request, Some(handle.id())).await {
            Ok(r) => r,
            Err(EnvError::Transport(e)) if e.is_timeout() => {
                return Err(EnvError::CommandTimeout {
                    command: command.to_string(),
                    secs: timeout.as_secs(),
                });
            }
            Err(e) => return Err(e),
        };
        let output: CommandResponse = response.json().await.map_err(EnvError::Transport)?;

        Ok(CommandOutput {
            stdout: output.stdout,
            stderr: output.stderr,
            exit_code: output.exit_code,
        })
    }

    async fn network_endpoint(&self, handle: &EnvHandle, port: u16) -> Result<String, EnvError> {
        Ok(endpoint_url(port, handle.id(), &self.domain))
    }

    async fn destroy(&self, handle: &EnvHandle) -> Result<(), EnvError> {
        let request = self
            .client
            .delete(self.url(&format!("/sandboxes/{}", handle.id())));
        match self.execute(request, Some(handle.id())).await {
            // Already gone counts as destroyed
            Ok(_) | Err(EnvError::NotFound { .. }) => Ok(()),
            Err(e) => Err(e),
        }
    }

    fn name(&self) -> &'static str {
        "remote"
    }
}

/// `https://{port}-{id}.{domain}`
pub fn endpoint_url(port: u16, sandbox_id: &str, domain: &str) -> String {
    format!("https://{}-{}.{}", port, sandbox_id, domain)
}
