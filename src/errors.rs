// src/errors.rs

//! Crate-wide error type and result alias.
//!
//! Policy denial is deliberately absent: an artifact excluded by the rule
//! tables is a normal planning outcome, not a failure.

use std::time::Duration;

use thiserror::Error;

use crate::types::ArtifactBuildState;

#[derive(Error, Debug)]
pub enum RebuildError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Malformed inbound payload. Dropped, never retried.
    #[error("Malformed message on topic '{topic}': {reason}")]
    Parse { topic: String, reason: String },

    /// A required upstream condition does not hold yet; the whole plan is
    /// abandoned and a later event retries it.
    #[error("Precondition unmet: {0}")]
    PreconditionUnmet(String),

    #[error("{service} request failed: {message}")]
    ExternalService { service: String, message: String },

    #[error("Invalid state transition for build {build}: {from} -> {to}")]
    InvalidStateTransition {
        build: u64,
        from: ArtifactBuildState,
        to: ArtifactBuildState,
    },

    #[error("Plan invariant violated: {0}")]
    PlanInvariant(String),

    #[error("Cycle detected in artifact dependencies: {0}")]
    DependencyCycle(String),

    /// The compose job did not reach a terminal state in time. It may still
    /// finish later, so this is kept apart from `ComposeFailed`.
    #[error("Compose {compose_url} did not finish within {waited:?}")]
    PollTimeout { compose_url: String, waited: Duration },

    #[error("Compose {compose_url} failed")]
    ComposeFailed { compose_url: String },

    #[error("Compose {compose_id} reported unknown state code {code}")]
    ComposeProtocol { compose_id: u64, code: i64 },

    #[error("Operation cancelled by shutdown")]
    Cancelled,

    #[error("Unknown event: {0}")]
    UnknownEvent(String),

    #[error("Unknown build: {0}")]
    UnknownBuild(u64),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl RebuildError {
    /// Convenience constructor for failures reported by an external system.
    pub fn external(service: &str, message: impl Into<String>) -> Self {
        RebuildError::ExternalService {
            service: service.to_string(),
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, RebuildError>;
