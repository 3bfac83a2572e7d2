//! Test doubles shared by the integration tests.
#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use tokio::sync::Notify;
use tokio::sync::mpsc::UnboundedReceiver;

use forge_scaffold::config::{ReadinessSection, SandboxMode, ScaffoldConfig};
use forge_scaffold::errors::{EnvError, LlmError};
use forge_scaffold::llm::{DeltaStream, TextGenerator};
use forge_scaffold::sandbox::{
    Backend, CommandOutput, EndpointProbe, EnvHandle, ExecutionEnvironment, SimulatedEnvironment,
};
use forge_scaffold::scaffold::{Coordinator, GenerationEvent};

/// Text generator answering from a script.
pub struct ScriptedGenerator {
    plan: Result<String, String>,
    chunks: Vec<String>,
    /// Fail every file stream with this message
    stream_error: Option<String>,
    /// Signalled on each stream call; the stream then never yields
    stall: Option<Arc<Notify>>,
    pub structured_calls: AtomicUsize,
    pub stream_calls: AtomicUsize,
}

impl ScriptedGenerator {
    /// Plans with `plan` and streams the same small component for every file.
    pub fn new(plan: impl Into<String>) -> Self {
        Self {
            plan: Ok(plan.into()),
            chunks: vec![
                "```tsx\n".to_string(),
                "export default function Section() {\n".to_string(),
                "  return <section />\n}\n".to_string(),
                "```".to_string(),
            ],
            stream_error: None,
            stall: None,
            structured_calls: AtomicUsize::new(0),
            stream_calls: AtomicUsize::new(0),
        }
    }

    /// Planning call fails with an opaque message.
    pub fn failing_plan(message: impl Into<String>) -> Self {
        Self {
            plan: Err(message.into()),
            ..Self::new("[]")
        }
    }

    pub fn with_stream_error(mut self, message: impl Into<String>) -> Self {
        self.stream_error = Some(message.into());
        self
    }

    /// File streams announce themselves on `started` and then hang.
    pub fn with_stalled_streams(mut self, started: Arc<Notify>) -> Self {
        self.stall = Some(started);
        self
    }

    pub fn stream_count(&self) -> usize {
        self.stream_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TextGenerator for ScriptedGenerator {
    async fn generate_structured(&self, _prompt: &str) -> Result<String, LlmError> {
        self.structured_calls.fetch_add(1, Ordering::SeqCst);
        self.plan.clone().map_err(LlmError::Stream)
    }

    async fn generate_stream(&self, _prompt: &str) -> Result<DeltaStream, LlmError> {
        self.stream_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(message) = &self.stream_error {
            return Err(LlmError::Stream(message.clone()));
        }
        if let Some(started) = &self.stall {
            started.notify_one();
            return Ok(futures::stream::pending().boxed());
        }
        let chunks: Vec<Result<String, LlmError>> = self.chunks.iter().cloned().map(Ok).collect();
        Ok(futures::stream::iter(chunks).boxed())
    }

    fn model(&self) -> &str {
        "scripted"
    }
}

/// Simulated environment with failure injection and call counters.
pub struct InstrumentedEnvironment {
    pub inner: SimulatedEnvironment,
    /// `create` fails with an HTTP 400 carrying this body
    pub create_error: Option<String>,
    /// `npm install` exits non-zero
    pub fail_install: bool,
    /// `create` waits for this before answering
    pub create_gate: Option<Arc<Notify>>,
    pub creates: AtomicUsize,
    pub destroys: AtomicUsize,
    pub probes: AtomicUsize,
}

impl InstrumentedEnvironment {
    pub fn new() -> Self {
        Self::wrapping(SimulatedEnvironment::new())
    }

    pub fn wrapping(inner: SimulatedEnvironment) -> Self {
        Self {
            inner,
            create_error: None,
            fail_install: false,
            create_gate: None,
            creates: AtomicUsize::new(0),
            destroys: AtomicUsize::new(0),
            probes: AtomicUsize::new(0),
        }
    }

    pub fn destroy_count(&self) -> usize {
        self.destroys.load(Ordering::SeqCst)
    }

    pub fn create_count(&self) -> usize {
        self.creates.load(Ordering::SeqCst)
    }

    pub fn probe_count(&self) -> usize {
        self.probes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ExecutionEnvironment for InstrumentedEnvironment {
    async fn create(&self, timeout: Duration) -> Result<EnvHandle, EnvError> {
        self.creates.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.create_gate {
            gate.notified().await;
        }
        if let Some(body) = &self.create_error {
            return Err(EnvError::Http {
                status: 400,
                body: body.clone(),
            });
        }
        self.inner.create(timeout).await
    }

    async fn write_file(&self, handle: &EnvHandle, path: &str, content: &str) -> Result<(), EnvError> {
        self.inner.write_file(handle, path, content).await
    }

    async fn read_file(&self, handle: &EnvHandle, path: &str) -> Result<String, EnvError> {
        self.inner.read_file(handle, path).await
    }

    async fn run_command(
        &self,
        handle: &EnvHandle,
        command: &str,
        timeout: Duration,
    ) -> Result<CommandOutput, EnvError> {
        if self.fail_install && command.contains("npm install") {
            return Ok(CommandOutput {
                stdout: String::new(),
                stderr: "npm ERR! code ERESOLVE".to_string(),
                exit_code: 1,
            });
        }
        self.inner.run_command(handle, command, timeout).await
    }

    async fn network_endpoint(&self, handle: &EnvHandle, port: u16) -> Result<String, EnvError> {
        self.inner.network_endpoint(handle, port).await
    }

    async fn destroy(&self, handle: &EnvHandle) -> Result<(), EnvError> {
        self.destroys.fetch_add(1, Ordering::SeqCst);
        self.inner.destroy(handle).await
    }

    fn name(&self) -> &'static str {
        "instrumented"
    }
}

#[async_trait]
impl EndpointProbe for InstrumentedEnvironment {
    async fn is_ready(&self, url: &str) -> bool {
        self.probes.fetch_add(1, Ordering::SeqCst);
        self.inner.is_ready(url).await
    }
}

/// Config with a fast readiness loop.
pub fn fast_config(max_attempts: u32) -> ScaffoldConfig {
    let mut config = ScaffoldConfig::default();
    config.sandbox.mode = SandboxMode::Simulated;
    config.readiness = ReadinessSection {
        max_attempts,
        delay_ms: 1,
        ..ReadinessSection::default()
    };
    config
}

pub fn coordinator(
    generator: Arc<ScriptedGenerator>,
    env: Arc<InstrumentedEnvironment>,
    config: ScaffoldConfig,
) -> Coordinator {
    let backend = Backend {
        environment: env.clone(),
        probe: env,
    };
    Coordinator::new(generator, backend, config)
}

/// Everything emitted so far.
pub fn drain(rx: &mut UnboundedReceiver<GenerationEvent>) -> Vec<GenerationEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

pub fn terminal_events(events: &[GenerationEvent]) -> Vec<&GenerationEvent> {
    events.iter().filter(|e| e.is_terminal()).collect()
}
