// src/compose/mod.rs

//! Package-repository composes used as rebuild input.
//!
//! [`ComposeState`] mirrors the compose service's numeric status codes;
//! [`poller::ComposePoller`] drives one compose to a terminal state.

pub mod poller;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::{RebuildError, Result};

pub use poller::ComposePoller;

/// Lifecycle of one compose job.
///
/// `Requested` is local only: it is the state between submission and the
/// first status fetch and has no wire code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComposeState {
    Requested,
    Waiting,
    Generating,
    Done,
    Failed,
}

impl ComposeState {
    /// Map a wire status code. Anything outside `0, 1, 2, 4` means the
    /// service contract changed and is reported as a protocol error.
    pub fn from_code(compose_id: u64, code: i64) -> Result<Self> {
        match code {
            0 => Ok(ComposeState::Waiting),
            1 => Ok(ComposeState::Generating),
            2 => Ok(ComposeState::Done),
            4 => Ok(ComposeState::Failed),
            code => Err(RebuildError::ComposeProtocol { compose_id, code }),
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, ComposeState::Done | ComposeState::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ComposeState::Requested => "requested",
            ComposeState::Waiting => "wait",
            ComposeState::Generating => "generating",
            ComposeState::Done => "done",
            ComposeState::Failed => "failed",
        }
    }
}

impl fmt::Display for ComposeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ComposeState {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "requested" => Ok(ComposeState::Requested),
            "wait" | "waiting" => Ok(ComposeState::Waiting),
            "generating" => Ok(ComposeState::Generating),
            "done" => Ok(ComposeState::Done),
            "failed" => Ok(ComposeState::Failed),
            other => Err(format!("unknown compose state: {other}")),
        }
    }
}

/// Compose job status as returned by the compose service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComposeStatus {
    pub id: u64,
    /// Raw wire code, see [`ComposeState::from_code`].
    pub state: i64,
    #[serde(default)]
    pub result_repo: Option<String>,
}
