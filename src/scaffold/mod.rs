//! Project scaffolding pipeline.
//!
//! ## Overview
//!
//! A run turns a free-text description into a running web project: the
//! model plans the file list, each file is streamed into an in-memory
//! staging store, and a sandbox is provisioned concurrently. Once both are
//! done the staged files are flushed into the sandbox, the dev server is
//! started and polled until it answers.
//!
//! ## Module Map
//!
//! ```text
//!                    ┌──────────────────────────────────────────────┐
//!  description ────> │  pipeline.rs  (Coordinator)                  │
//!                    │     │                     │                  │
//!                    │     │ spawn               │ await plan       │
//!                    │     v                     v                  │
//!                    │  provisioner.rs       planner.rs             │
//!                    │  (create, seed,       (JSON plan / fallback) │
//!                    │   npm install)            │                  │
//!                    │     │                     v                  │
//!                    │     │                 generator.rs ──> staging.rs
//!                    │     │                 (delta stream)         │
//!                    │     └──────── join ───────┘                  │
//!                    │                 │ flush                      │
//!                    │                 v                            │
//!                    │             prober.rs  (dev server + retry)  │
//!                    └─────────────────┬────────────────────────────┘
//!                                      │ GenerationEvent (events.rs)
//!                                      v
//!                            CLI renderer / SSE transport
//! ```
//!
//! ## Supporting Modules
//!
//! | Module      | Responsibility                                         |
//! |-------------|--------------------------------------------------------|
//! | `models`    | `ProjectContext`, `StagedFile`, `RunStatus`, `RunReport` |
//! | `events`    | `GenerationEvent` enum + `EventSink` terminal guard    |
//! | `templates` | Seeded config files and UI component catalog           |
//! | `prompts`   | Planning and per-file prompt texts                     |
//! | `failure`   | Error → user-facing category and message               |
//! | `export`    | `.tar.gz` of the sandbox working directory             |

pub mod events;
pub mod export;
pub mod failure;
pub mod generator;
pub mod models;
pub mod pipeline;
pub mod planner;
pub mod prober;
pub mod prompts;
pub mod provisioner;
pub mod staging;
pub mod templates;

pub use events::{EventSink, GenerationEvent, LogLevel};
pub use failure::{Failure, FailureKind, classify};
pub use models::{ProjectContext, RunReport, RunStatus, StagedFile};
pub use pipeline::{Coordinator, RunOutcome, Teardown};
pub use staging::StagingStore;
