//! Typed error hierarchy for forge-scaffold.
//!
//! Three top-level enums cover the three seams:
//! - `LlmError`: text-generation capability failures
//! - `EnvError`: execution-environment capability failures
//! - `ScaffoldError`: pipeline-level failures surfaced to callers
//!
//! Upstream errors carry an optional [`FailureKind`] hint derived from
//! structured transport data (HTTP status) so that
//! [`crate::scaffold::failure::classify`] only falls back to message
//! matching for opaque errors.

use thiserror::Error;

use crate::scaffold::failure::FailureKind;

/// Map an HTTP status code onto a failure category, if it has one.
pub fn kind_for_status(status: u16) -> Option<FailureKind> {
    match status {
        401 | 403 => Some(FailureKind::Authentication),
        408 | 504 => Some(FailureKind::Timeout),
        429 => Some(FailureKind::Quota),
        _ => None,
    }
}

/// Errors from the text-generation capability.
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("Missing API credential: environment variable '{env_var}' is not set")]
    MissingCredential { env_var: String },

    #[error("LLM API returned HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("LLM request failed: {0}")]
    Transport(#[source] reqwest::Error),

    #[error("LLM stream error: {0}")]
    Stream(String),

    #[error("Failed to parse LLM response: {0}")]
    Parse(String),
}

impl LlmError {
    /// Structured failure category, when the transport supplied one.
    pub fn failure_kind(&self) -> Option<FailureKind> {
        match self {
            LlmError::MissingCredential { .. } => Some(FailureKind::Authentication),
            LlmError::Http { status, .. } => kind_for_status(*status),
            LlmError::Transport(e) if e.is_timeout() => Some(FailureKind::Timeout),
            _ => None,
        }
    }
}

/// Errors from the execution-environment capability.
#[derive(Debug, Error)]
pub enum EnvError {
    #[error("Missing sandbox credential: environment variable '{env_var}' is not set")]
    MissingCredential { env_var: String },

    #[error("Sandbox API returned HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("Sandbox request failed: {0}")]
    Transport(#[source] reqwest::Error),

    #[error("Sandbox {id} not found")]
    NotFound { id: String },

    #[error("File not found in sandbox: {path}")]
    FileNotFound { path: String },

    #[error("Command timed out after {secs}s: {command}")]
    CommandTimeout { command: String, secs: u64 },
}

impl EnvError {
    /// Structured failure category, when the transport supplied one.
    pub fn failure_kind(&self) -> Option<FailureKind> {
        match self {
            EnvError::MissingCredential { .. } => Some(FailureKind::Authentication),
            EnvError::Http { status: 404, .. } | EnvError::NotFound { .. } => {
                Some(FailureKind::Expired)
            }
            EnvError::Http { status, .. } => kind_for_status(*status),
            EnvError::Transport(e) if e.is_timeout() => Some(FailureKind::Timeout),
            EnvError::CommandTimeout { .. } => Some(FailureKind::Timeout),
            _ => None,
        }
    }
}

/// Errors from the pipeline and its outer surfaces.
#[derive(Debug, Error)]
pub enum ScaffoldError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Llm(#[from] LlmError),

    #[error(transparent)]
    Environment(#[from] EnvError),

    #[error("Dependency install failed with exit code {exit_code}: {stderr}")]
    InstallFailed { exit_code: i32, stderr: String },

    #[error("Run {id} not found")]
    RunNotFound { id: String },

    #[error("Generation was cancelled")]
    Cancelled,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_credential_names_the_variable() {
        let err = LlmError::MissingCredential {
            env_var: "ANTHROPIC_API_KEY".to_string(),
        };
        assert!(err.to_string().contains("ANTHROPIC_API_KEY"));
        assert_eq!(err.failure_kind(), Some(FailureKind::Authentication));
    }

    #[test]
    fn http_status_maps_to_failure_kind() {
        let quota = LlmError::Http {
            status: 429,
            body: "slow down".into(),
        };
        assert_eq!(quota.failure_kind(), Some(FailureKind::Quota));

        let server = LlmError::Http {
            status: 500,
            body: "boom".into(),
        };
        assert_eq!(server.failure_kind(), None);
    }

    #[test]
    fn sandbox_404_is_expired() {
        let err = EnvError::Http {
            status: 404,
            body: "sandbox not found".into(),
        };
        assert_eq!(err.failure_kind(), Some(FailureKind::Expired));
        let err = EnvError::NotFound { id: "sbx-1".into() };
        assert_eq!(err.failure_kind(), Some(FailureKind::Expired));
    }

    #[test]
    fn command_timeout_is_timeout() {
        let err = EnvError::CommandTimeout {
            command: "npm install".into(),
            secs: 300,
        };
        assert_eq!(err.failure_kind(), Some(FailureKind::Timeout));
        assert!(err.to_string().contains("npm install"));
    }

    #[test]
    fn scaffold_error_converts_from_upstream() {
        let env_err = EnvError::NotFound { id: "abc".into() };
        let err: ScaffoldError = env_err.into();
        assert!(matches!(
            err,
            ScaffoldError::Environment(EnvError::NotFound { .. })
        ));
    }

    #[test]
    fn all_error_types_implement_std_error_trait() {
        fn assert_std_error<E: std::error::Error>(_: &E) {}
        assert_std_error(&LlmError::Stream("x".into()));
        assert_std_error(&EnvError::NotFound { id: "x".into() });
        assert_std_error(&ScaffoldError::Cancelled);
    }
}
