use std::collections::{BTreeMap, HashMap};
use std::sync::{LazyLock, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;

use super::{CommandOutput, EndpointProbe, EnvHandle, ExecutionEnvironment};
use crate::errors::EnvError;

const SIM_DOMAIN: &str = "sim.localhost";
const DEV_LOG: &str = "/tmp/dev-server.log";

#[derive(Debug, Default)]
struct SimSandbox {
    files: BTreeMap<String, String>,
    installed: bool,
    dev_server: bool,
    probes: u32,
}

#[derive(Debug, Default)]
struct SimState {
    sandboxes: HashMap<String, SimSandbox>,
    next_id: u64,
}

/// In-process stand-in for a remote sandbox.
///
/// Files live in memory per handle. A handful of shell commands are
/// understood: dependency install, background dev-server start, `ps`,
/// `cat`/`tail` and `find`. The endpoint reports ready on the
/// `ready_after`-th probe once the dev server has been started.
#[derive(Debug)]
pub struct SimulatedEnvironment {
    state: Mutex<SimState>,
    ready_after: u32,
}

impl SimulatedEnvironment {
    pub fn new() -> Self {
        Self::with_ready_after(1)
    }

    /// Report ready only from the `n`-th probe on (`0` never does).
    pub fn with_ready_after(n: u32) -> Self {
        Self {
            state: Mutex::new(SimState::default()),
            ready_after: n,
        }
    }

    /// Whether the handle still refers to a live sandbox.
    pub fn is_alive(&self, handle: &EnvHandle) -> bool {
        self.lock().sandboxes.contains_key(handle.id())
    }

    /// Copy of a sandbox's files, keyed by absolute path.
    pub fn files(&self, handle: &EnvHandle) -> Option<BTreeMap<String, String>> {
        self.lock()
            .sandboxes
            .get(handle.id())
            .map(|s| s.files.clone())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, SimState> {
        // A poisoned lock only means a panicking test; the data is still usable
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn with_sandbox<T>(
        &self,
        handle: &EnvHandle,
        f: impl FnOnce(&mut SimSandbox) -> Result<T, EnvError>,
    ) -> Result<T, EnvError> {
        let mut state = self.lock();
        let sandbox = state
            .sandboxes
            .get_mut(handle.id())
            .ok_or_else(|| EnvError::NotFound {
                id: handle.id().to_string(),
            })?;
        f(sandbox)
    }
}

impl Default for SimulatedEnvironment {
    fn default() -> Self {
        Self::new()
    }
}

fn ok(stdout: impl Into<String>) -> CommandOutput {
    CommandOutput {
        stdout: stdout.into(),
        stderr: String::new(),
        exit_code: 0,
    }
}

fn fail(code: i32, stderr: impl Into<String>) -> CommandOutput {
    CommandOutput {
        stdout: String::new(),
        stderr: stderr.into(),
        exit_code: code,
    }
}

// Leading `cd <dir> &&` with the directory bare, single- or double-quoted
static CD_PREFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?s)^\s*cd\s+(?:'([^']*)'|"([^"]*)"|(\S+))\s*&&\s*(.*)$"#).unwrap()
});

/// Directory named by a leading `cd <dir> &&`, if any.
fn cd_prefix(command: &str) -> (Option<String>, &str) {
    let Some(caps) = CD_PREFIX.captures(command) else {
        return (None, command.trim());
    };
    let dir = caps
        .get(1)
        .or_else(|| caps.get(2))
        .or_else(|| caps.get(3))
        .map(|m| m.as_str().to_string());
    let tail = caps.get(4).map_or("", |m| m.as_str().trim());
    (dir, tail)
}

fn interpret(sandbox: &mut SimSandbox, command: &str) -> CommandOutput {
    let (dir, command) = cd_prefix(command);

    if command.contains("npm install") {
        if !sandbox.files.keys().any(|p| p.ends_with("/package.json")) {
            return fail(254, "npm ERR! enoent Could not read package.json");
        }
        sandbox.installed = true;
        return ok("added 312 packages in 14s\n");
    }

    if command.contains("npm run dev") {
        sandbox.dev_server = true;
        sandbox.files.insert(
            DEV_LOG.to_string(),
            "> next dev -H 0.0.0.0 -p 3000\n  ▲ Next.js 14.1.0\n  - Local: http://localhost:3000\n ✓ Ready\n"
                .to_string(),
        );
        return ok("");
    }

    if command.starts_with("ps") {
        let mut out = String::from("PID   COMMAND\n1     /bin/sh\n");
        if sandbox.dev_server {
            out.push_str("42    node next dev -H 0.0.0.0 -p 3000\n");
        }
        return ok(out);
    }

    if let Some(target) = command
        .strip_prefix("cat ")
        .or_else(|| command.strip_prefix("tail -n 50 "))
    {
        let path = target
            .split_whitespace()
            .next()
            .unwrap_or_default()
            .trim_matches('\'');
        return match sandbox.files.get(path) {
            Some(content) => ok(content.clone()),
            None => fail(1, format!("cat: {}: No such file or directory", path)),
        };
    }

    if command.starts_with("find .") {
        let Some(dir) = dir else {
            return fail(1, "find: relative listing needs a directory");
        };
        let prefix = format!("{}/", dir.trim_end_matches('/'));
        let listing: Vec<String> = sandbox
            .files
            .keys()
            .filter_map(|p| p.strip_prefix(&prefix))
            .filter(|rel| {
                !super::LIST_EXCLUDES
                    .iter()
                    .any(|ex| rel.starts_with(&format!("{}/", ex)))
            })
            .map(|rel| format!("./{}\n", rel))
            .collect();
        return ok(listing.concat());
    }

    fail(127, format!("sh: {}: command not found", command))
}

#[async_trait]
impl ExecutionEnvironment for SimulatedEnvironment {
    async fn create(&self, timeout: Duration) -> Result<EnvHandle, EnvError> {
        let mut state = self.lock();
        state.next_id += 1;
        let id = format!("sim-{:04}", state.next_id);
        state.sandboxes.insert(id.clone(), SimSandbox::default());
        tracing::debug!(sandbox_id = %id, timeout_secs = timeout.as_secs(), "Simulated sandbox created");
        Ok(EnvHandle::new(id))
    }

    async fn write_file(
        &self,
        handle: &EnvHandle,
        path: &str,
        content: &str,
    ) -> Result<(), EnvError> {
        self.with_sandbox(handle, |s| {
            s.files.insert(path.to_string(), content.to_string());
            Ok(())
        })
    }

    async fn read_file(&self, handle: &EnvHandle, path: &str) -> Result<String, EnvError> {
        self.with_sandbox(handle, |s| {
            s.files
                .get(path)
                .cloned()
                .ok_or_else(|| EnvError::FileNotFound {
                    path: path.to_string(),
                })
        })
    }

    async fn run_command(
        &self,
        handle: &EnvHandle,
        command: &str,
        _timeout: Duration,
    ) -> Result<CommandOutput, EnvError> {
        self.with_sandbox(handle, |s| Ok(interpret(s, command)))
    }

    async fn network_endpoint(&self, handle: &EnvHandle, port: u16) -> Result<String, EnvError> {
        self.with_sandbox(handle, |_| Ok(()))?;
        Ok(super::remote::endpoint_url(port, handle.id(), SIM_DOMAIN))
    }

    async fn destroy(&self, handle: &EnvHandle) -> Result<(), EnvError> {
        self.lock().sandboxes.remove(handle.id());
        Ok(())
    }

    fn name(&self) -> &'static str {
        "simulated"
    }
}

#[async_trait]
impl EndpointProbe for SimulatedEnvironment {
    async fn is_ready(&self, url: &str) -> bool {
        let mut state = self.lock();
        let Some(sandbox) = state
            .sandboxes
            .iter_mut()
            .find(|(id, _)| url.contains(&format!("-{}.{}", id, SIM_DOMAIN)))
            .map(|(_, s)| s)
        else {
            return false;
        };
        if !sandbox.dev_server {
            return false;
        }
        sandbox.probes += 1;
        self.ready_after > 0 && sandbox.probes >= self.ready_after
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const T: Duration = Duration::from_secs(5);

    #[tokio::test]
    async fn test_file_roundtrip_and_overwrite() {
        let env = SimulatedEnvironment::new();
        let h = env.create(T).await.unwrap();
        env.write_file(&h, "/app/a.ts", "one").await.unwrap();
        env.write_file(&h, "/app/a.ts", "two").await.unwrap();
        assert_eq!(env.read_file(&h, "/app/a.ts").await.unwrap(), "two");
        assert!(matches!(
            env.read_file(&h, "/app/missing").await,
            Err(EnvError::FileNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_destroyed_sandbox_is_not_found() {
        let env = SimulatedEnvironment::new();
        let h = env.create(T).await.unwrap();
        assert!(env.is_alive(&h));
        env.destroy(&h).await.unwrap();
        assert!(!env.is_alive(&h));
        assert!(matches!(
            env.write_file(&h, "/x", "y").await,
            Err(EnvError::NotFound { .. })
        ));
        // Destroying twice is fine
        env.destroy(&h).await.unwrap();
    }

    #[tokio::test]
    async fn test_install_requires_manifest() {
        let env = SimulatedEnvironment::new();
        let h = env.create(T).await.unwrap();
        let out = env.run_command(&h, "cd /app && npm install", T).await.unwrap();
        assert!(!out.success());

        env.write_file(&h, "/app/package.json", "{}").await.unwrap();
        let out = env.run_command(&h, "cd /app && npm install", T).await.unwrap();
        assert!(out.success());
    }

    #[tokio::test]
    async fn test_list_files_via_default_find() {
        let env = SimulatedEnvironment::new();
        let h = env.create(T).await.unwrap();
        env.write_file(&h, "/app/app/page.tsx", "p").await.unwrap();
        env.write_file(&h, "/app/package.json", "{}").await.unwrap();
        env.write_file(&h, "/app/node_modules/next/index.js", "").await.unwrap();
        env.write_file(&h, "/other/file", "").await.unwrap();

        let files = env.list_files(&h, "/app").await.unwrap();
        assert_eq!(files, vec!["app/page.tsx", "package.json"]);
    }

    #[tokio::test]
    async fn test_probe_ready_after_dev_server_start() {
        let env = SimulatedEnvironment::with_ready_after(2);
        let h = env.create(T).await.unwrap();
        let url = env.network_endpoint(&h, 3000).await.unwrap();

        assert!(!env.is_ready(&url).await); // not started yet
        env.run_command(&h, "cd /app && nohup npm run dev > /tmp/dev-server.log 2>&1 &", T)
            .await
            .unwrap();
        assert!(!env.is_ready(&url).await);
        assert!(env.is_ready(&url).await);

        let log = env.run_command(&h, "tail -n 50 /tmp/dev-server.log", T).await.unwrap();
        assert!(log.stdout.contains("Ready"));
        let ps = env.run_command(&h, "ps aux", T).await.unwrap();
        assert!(ps.stdout.contains("next dev"));
    }

    #[test]
    fn test_cd_prefix_forms() {
        assert_eq!(
            cd_prefix("cd '/home/user/app' && npm install --no-audit"),
            (Some("/home/user/app".to_string()), "npm install --no-audit")
        );
        assert_eq!(
            cd_prefix("cd /app&&ps aux"),
            (Some("/app".to_string()), "ps aux")
        );
        assert_eq!(cd_prefix("  ps aux "), (None, "ps aux"));
    }

    #[tokio::test]
    async fn test_unknown_command() {
        let env = SimulatedEnvironment::new();
        let h = env.create(T).await.unwrap();
        let out = env.run_command(&h, "rustc --version", T).await.unwrap();
        assert_eq!(out.exit_code, 127);
    }
}
