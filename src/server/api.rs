use std::sync::Arc;

use axum::{
    Json, Router,
    body::Body,
    extract::{Path, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use super::registry::{RunEntry, RunRegistry, RunSummary};
use super::sse;
use crate::errors::{EnvError, ScaffoldError};
use crate::sandbox::join_path;
use crate::scaffold::{Coordinator, EventSink, GenerationEvent};

// ── State ─────────────────────────────────────────────────────────────

/// Shared application state.
pub struct AppState {
    pub coordinator: Arc<Coordinator>,
    pub registry: RunRegistry,
    /// Parent of every run's cancel token, cancelled on shutdown
    pub shutdown: CancellationToken,
    /// Run tasks, awaited on shutdown before environments are released
    pub tasks: TaskTracker,
}

impl AppState {
    pub fn new(coordinator: Arc<Coordinator>) -> Self {
        Self {
            coordinator,
            registry: RunRegistry::new(),
            shutdown: CancellationToken::new(),
            tasks: TaskTracker::new(),
        }
    }
}

pub type SharedState = Arc<AppState>;

// ── Request / response types ──────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct GenerateRequest {
    pub description: String,
}

#[derive(Debug, Serialize)]
pub struct FileEntry {
    pub path: String,
    pub complete: bool,
    pub bytes: usize,
}

// ── Error type ────────────────────────────────────────────────────────

#[derive(Debug)]
pub enum ApiError {
    NotFound(String),
    BadRequest(String),
    Conflict(String),
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };
        (status, Json(serde_json::json!({"error": message}))).into_response()
    }
}

fn run_not_found(id: &str) -> ApiError {
    ApiError::NotFound(ScaffoldError::RunNotFound { id: id.to_string() }.to_string())
}

// ── Router ────────────────────────────────────────────────────────────

pub fn api_router() -> Router<SharedState> {
    Router::new()
        .route("/api/generate", post(generate))
        .route("/api/runs", get(list_runs))
        .route("/api/runs/{id}", get(get_run).delete(delete_run))
        .route("/api/runs/{id}/files", get(list_files))
        .route(
            "/api/runs/{id}/files/{*path}",
            get(read_file).put(save_file),
        )
        .route("/api/runs/{id}/export", get(export_run))
        .route("/health", get(health_check))
}

// ── Handlers ──────────────────────────────────────────────────────────

async fn health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({"status": "ok"}))
}

/// Start a run and stream its events. The run id is returned in the
/// `x-run-id` header so follow-up requests can address the run.
async fn generate(
    State(state): State<SharedState>,
    Json(req): Json<GenerateRequest>,
) -> Result<Response, ApiError> {
    let description = req.description.trim().to_string();
    if description.is_empty() {
        return Err(ApiError::BadRequest("Description must not be empty".into()));
    }

    if state.shutdown.is_cancelled() {
        return Err(ApiError::Conflict("Server is shutting down".into()));
    }

    let run_id = uuid::Uuid::new_v4().to_string();
    let mut entry = RunEntry::new(&run_id, &description);
    entry.cancel = state.shutdown.child_token();
    let store = entry.store.clone();
    let cancel = entry.cancel.clone();
    state.registry.insert(entry).await;

    let (events, mut rx) = EventSink::channel();
    let (tx, client_rx) = mpsc::unbounded_channel();

    // Mirror lifecycle events into the registry before the client sees them
    let registry = state.registry.clone();
    let id = run_id.clone();
    state.tasks.spawn(async move {
        while let Some(event) = rx.recv().await {
            match &event {
                GenerationEvent::Status { status } => registry.set_status(&id, *status).await,
                GenerationEvent::SandboxCreated { sandbox_id } => {
                    registry.set_sandbox(&id, sandbox_id).await
                }
                _ => {}
            }
            // Receiver gone means the client left; the run is being cancelled
            let _ = tx.send(event);
        }
    });

    let coordinator = state.coordinator.clone();
    let registry = state.registry.clone();
    let id = run_id.clone();
    let run_cancel = cancel.clone();
    state.tasks.spawn(async move {
        let outcome = coordinator
            .run(&id, &description, store, events, run_cancel)
            .await;
        if let Some(orphan) = registry.finish(&id, outcome).await {
            // Run was deleted while finishing
            coordinator.teardown(Some(&orphan)).await;
        }
    });

    tracing::info!(run_id = %run_id, "Run accepted");
    let stream = sse::event_stream(client_rx, cancel.drop_guard());
    Ok(([("x-run-id", run_id)], sse::into_sse(stream)).into_response())
}

async fn list_runs(State(state): State<SharedState>) -> Json<Vec<RunSummary>> {
    Json(state.registry.list().await)
}

async fn get_run(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<Json<RunSummary>, ApiError> {
    state
        .registry
        .summary(&id)
        .await
        .map(Json)
        .ok_or_else(|| run_not_found(&id))
}

async fn list_files(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<Json<Vec<FileEntry>>, ApiError> {
    let (store, _) = state
        .registry
        .resources(&id)
        .await
        .ok_or_else(|| run_not_found(&id))?;
    let files = store
        .snapshot()
        .await
        .into_iter()
        .map(|f| FileEntry {
            bytes: f.content.len(),
            path: f.path,
            complete: f.complete,
        })
        .collect();
    Ok(Json(files))
}

/// Serve a file from staging, falling back to the live environment for
/// files that were seeded rather than generated.
async fn read_file(
    State(state): State<SharedState>,
    Path((id, path)): Path<(String, String)>,
) -> Result<Response, ApiError> {
    let (store, handle) = state
        .registry
        .resources(&id)
        .await
        .ok_or_else(|| run_not_found(&id))?;
    let path = path.trim_start_matches('/');

    let content = match store.get(path).await {
        Some(file) => file.content,
        None => {
            let handle = handle
                .ok_or_else(|| ApiError::NotFound(format!("File {} not found", path)))?;
            let target = join_path(&state.coordinator.config().sandbox.workdir, path);
            state
                .coordinator
                .environment()
                .read_file(&handle, &target)
                .await
                .map_err(|e| match e {
                    EnvError::FileNotFound { .. } => {
                        ApiError::NotFound(format!("File {} not found", path))
                    }
                    EnvError::NotFound { .. } => {
                        ApiError::Conflict("Sandbox is no longer available".into())
                    }
                    other => ApiError::Internal(other.to_string()),
                })?
        }
    };

    let mime = mime_guess::from_path(path).first_or_text_plain();
    Ok(([(header::CONTENT_TYPE, mime.as_ref().to_string())], content).into_response())
}

async fn save_file(
    State(state): State<SharedState>,
    Path((id, path)): Path<(String, String)>,
    body: String,
) -> Result<StatusCode, ApiError> {
    let (store, handle) = state
        .registry
        .resources(&id)
        .await
        .ok_or_else(|| run_not_found(&id))?;
    if path.split('/').any(|seg| seg == "..") {
        return Err(ApiError::BadRequest(format!("Invalid file path '{}'", path)));
    }
    state
        .coordinator
        .save_file(&store, handle.as_ref(), &path, &body)
        .await
        .map_err(|e| ApiError::Internal(format!("{:#}", e)))?;
    Ok(StatusCode::NO_CONTENT)
}

async fn export_run(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let (_, handle) = state
        .registry
        .resources(&id)
        .await
        .ok_or_else(|| run_not_found(&id))?;
    let handle =
        handle.ok_or_else(|| ApiError::Conflict("Run has no live sandbox to export".into()))?;

    let bytes = state
        .coordinator
        .export(&handle)
        .await
        .map_err(|e| ApiError::Internal(format!("Export failed: {:#}", e)))?;

    let short: String = id.chars().take(8).collect();
    let disposition = format!("attachment; filename=\"project-{}.tar.gz\"", short);
    Ok((
        [
            (header::CONTENT_TYPE, "application/gzip".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        Body::from(bytes),
    )
        .into_response())
}

/// Cancel a run if it is still going and destroy its environment.
async fn delete_run(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let entry = state
        .registry
        .remove(&id)
        .await
        .ok_or_else(|| run_not_found(&id))?;
    entry.cancel.cancel();
    state.coordinator.teardown(entry.handle.as_ref()).await;
    tracing::info!(run_id = %id, "Run deleted");
    Ok(StatusCode::NO_CONTENT)
}
