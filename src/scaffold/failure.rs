//! Translation of run failures into user-facing messages.
//!
//! [`classify`] is the only place that decides what a failed run tells the
//! user. Structured hints from [`LlmError`]/[`EnvError`] take precedence;
//! errors from opaque transports fall back to substring matching over the
//! whole error chain.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::errors::{EnvError, LlmError, ScaffoldError};

/// User-facing failure category.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Sandbox expired or could not be found
    Expired,
    Timeout,
    Authentication,
    Quota,
    /// Anything else; the raw message is shown
    Other,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Expired => "expired",
            Self::Timeout => "timeout",
            Self::Authentication => "authentication",
            Self::Quota => "quota",
            Self::Other => "other",
        }
    }

    /// Friendly text for a category. `None` for `Other`.
    pub fn user_message(&self) -> Option<&'static str> {
        match self {
            Self::Expired => Some(
                "The sandbox environment has expired or could not be found. Please start a new generation.",
            ),
            Self::Timeout => Some(
                "The operation timed out. Please try again, possibly with a simpler description.",
            ),
            Self::Authentication => Some("Authentication failed. Please check your API keys."),
            Self::Quota => Some("Service quota exceeded. Please wait a moment and try again."),
            Self::Other => None,
        }
    }
}

/// A classified failure: category plus the message to show.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Failure {
    pub kind: FailureKind,
    pub message: String,
}

/// Classify an error raised anywhere in a run.
pub fn classify(err: &anyhow::Error) -> Failure {
    let raw = format!("{:#}", err);
    let kind = structured_kind(err).unwrap_or_else(|| kind_from_message(&raw));
    let message = kind
        .user_message()
        .map(str::to_string)
        .unwrap_or(raw);
    Failure { kind, message }
}

fn structured_kind(err: &anyhow::Error) -> Option<FailureKind> {
    for cause in err.chain() {
        if let Some(e) = cause.downcast_ref::<LlmError>() {
            return e.failure_kind();
        }
        if let Some(e) = cause.downcast_ref::<EnvError>() {
            return e.failure_kind();
        }
        if let Some(e) = cause.downcast_ref::<ScaffoldError>() {
            match e {
                ScaffoldError::Llm(inner) => return inner.failure_kind(),
                ScaffoldError::Environment(inner) => return inner.failure_kind(),
                _ => {}
            }
        }
    }
    None
}

/// An HTTP status code quoted in a message, e.g. "HTTP 429" or "status: 401".
static HTTP_STATUS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?:http|status|status code|code)[\s:=]*(\d{3})\b").unwrap()
});

fn quoted_status(msg: &str) -> Option<u16> {
    HTTP_STATUS
        .captures(msg)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// Substring heuristics for errors with no structured hint.
pub fn kind_from_message(message: &str) -> FailureKind {
    let msg = message.to_lowercase();
    let any = |needles: &[&str]| needles.iter().any(|n| msg.contains(n));
    let status = quoted_status(&msg);

    if status == Some(429) || any(&["quota", "rate limit", "rate_limit", "too many requests"]) {
        FailureKind::Quota
    } else if matches!(status, Some(401 | 403))
        || any(&[
            "unauthorized",
            "authentication",
            "invalid api key",
            "invalid x-api-key",
            "api key",
        ])
    {
        FailureKind::Authentication
    } else if any(&["timed out", "timeout", "deadline exceeded"]) {
        FailureKind::Timeout
    } else if any(&["sandbox not found", "not found", "expired", "no longer running"]) {
        FailureKind::Expired
    } else {
        FailureKind::Other
    }
}
