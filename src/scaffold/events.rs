use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use super::failure::FailureKind;
use super::models::RunStatus;

/// Severity of a lifecycle log line shown to the user.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    Info,
    Success,
    Warning,
    Error,
}

// ── Event types ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "data")]
pub enum GenerationEvent {
    Log {
        level: LogLevel,
        message: String,
    },
    SandboxCreated {
        sandbox_id: String,
    },
    FileStarted {
        path: String,
    },
    FileDelta {
        path: String,
        delta: String,
    },
    FileCompleted {
        path: String,
        content: String,
    },
    FileSkipped {
        path: String,
        reason: String,
    },
    Status {
        status: RunStatus,
    },
    UrlReady {
        url: String,
    },
    Complete {
        sandbox_id: String,
        url: Option<String>,
        files: Vec<String>,
    },
    Error {
        message: String,
        kind: FailureKind,
    },
}

impl GenerationEvent {
    pub fn info(message: impl Into<String>) -> Self {
        Self::Log {
            level: LogLevel::Info,
            message: message.into(),
        }
    }

    pub fn success(message: impl Into<String>) -> Self {
        Self::Log {
            level: LogLevel::Success,
            message: message.into(),
        }
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self::Log {
            level: LogLevel::Warning,
            message: message.into(),
        }
    }

    /// Variant tag, used as the SSE event name.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Log { .. } => "log",
            Self::SandboxCreated { .. } => "sandbox_created",
            Self::FileStarted { .. } => "file_started",
            Self::FileDelta { .. } => "file_delta",
            Self::FileCompleted { .. } => "file_completed",
            Self::FileSkipped { .. } => "file_skipped",
            Self::Status { .. } => "status",
            Self::UrlReady { .. } => "url_ready",
            Self::Complete { .. } => "complete",
            Self::Error { .. } => "error",
        }
    }

    /// `Complete` and `Error` end a run.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete { .. } | Self::Error { .. })
    }
}

// ── Sink ─────────────────────────────────────────────────────────────

type EmitFn = dyn Fn(GenerationEvent) + Send + Sync;

/// The injectable "emit one event" callback handed to every stage.
///
/// Cloning shares the terminal guard: once any clone has emitted `Complete`
/// or `Error`, every later event from any clone is dropped.
#[derive(Clone)]
pub struct EventSink {
    emit: Arc<EmitFn>,
    terminated: Arc<AtomicBool>,
}

impl std::fmt::Debug for EventSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventSink")
            .field("terminated", &self.is_terminated())
            .finish()
    }
}

impl EventSink {
    pub fn from_fn<F>(f: F) -> Self
    where
        F: Fn(GenerationEvent) + Send + Sync + 'static,
    {
        Self {
            emit: Arc::new(f),
            terminated: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Sink backed by an unbounded channel. A closed receiver is ignored.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<GenerationEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let sink = Self::from_fn(move |event| {
            let _ = tx.send(event);
        });
        (sink, rx)
    }

    /// Sink that discards everything.
    pub fn noop() -> Self {
        Self::from_fn(|_| {})
    }

    /// Emit a non-terminal event. Terminal events must go through
    /// [`EventSink::emit_terminal`].
    pub fn emit(&self, event: GenerationEvent) {
        if event.is_terminal() {
            self.emit_terminal(event);
            return;
        }
        if self.is_terminated() {
            tracing::debug!(kind = event.kind(), "Dropping event after terminal");
            return;
        }
        (self.emit)(event);
    }

    /// Emit the run's terminal event. Returns false if one was already sent.
    pub fn emit_terminal(&self, event: GenerationEvent) -> bool {
        if self.terminated.swap(true, Ordering::SeqCst) {
            tracing::warn!(kind = event.kind(), "Second terminal event suppressed");
            return false;
        }
        (self.emit)(event);
        true
    }

    pub fn is_terminated(&self) -> bool {
        self.terminated.load(Ordering::SeqCst)
    }

    pub fn log(&self, message: impl Into<String>) {
        self.emit(GenerationEvent::info(message));
    }

    pub fn status(&self, status: RunStatus) {
        self.emit(GenerationEvent::Status { status });
    }
}
