use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Kind of artifact a rebuild is planned for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactType {
    Rpm,
    Module,
    Image,
}

impl ArtifactType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ArtifactType::Rpm => "rpm",
            ArtifactType::Module => "module",
            ArtifactType::Image => "image",
        }
    }
}

impl fmt::Display for ArtifactType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ArtifactType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "rpm" => Ok(ArtifactType::Rpm),
            "module" => Ok(ArtifactType::Module),
            "image" => Ok(ArtifactType::Image),
            other => Err(format!(
                "invalid artifact type: {other} (expected \"rpm\", \"module\" or \"image\")"
            )),
        }
    }
}

/// Lifecycle of one planned rebuild.
///
/// ```text
/// PLANNED -> BUILDING -> DONE
///    |           |
///    +--------> FAILED
/// ```
///
/// `DONE` and `FAILED` are terminal. A failed artifact is re-planned as a new
/// build record, never by reviving the old one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ArtifactBuildState {
    Planned,
    Building,
    Done,
    Failed,
}

impl ArtifactBuildState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ArtifactBuildState::Done | ArtifactBuildState::Failed)
    }

    /// Whether `self -> next` is an edge of the build state machine.
    pub fn can_transition_to(&self, next: ArtifactBuildState) -> bool {
        use ArtifactBuildState::*;
        matches!(
            (self, next),
            (Planned, Building) | (Planned, Failed) | (Building, Done) | (Building, Failed)
        )
    }
}

impl fmt::Display for ArtifactBuildState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ArtifactBuildState::Planned => "PLANNED",
            ArtifactBuildState::Building => "BUILDING",
            ArtifactBuildState::Done => "DONE",
            ArtifactBuildState::Failed => "FAILED",
        };
        f.write_str(s)
    }
}

/// Where build records are kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreMode {
    /// JSON snapshot on disk, rewritten after every committed change.
    File,
    /// In memory only (lost on restart).
    Memory,
}

impl Default for StoreMode {
    fn default() -> Self {
        StoreMode::Memory
    }
}

/// Parse a duration string like `"500ms"`, `"3s"`, `"5m"` or `"1h"`.
pub fn parse_duration(s: &str) -> Result<Duration, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("empty duration string".to_string());
    }

    let idx = s
        .chars()
        .position(|c| !c.is_ascii_digit())
        .ok_or_else(|| "duration missing unit suffix".to_string())?;

    let (num_part, unit_part) = s.split_at(idx);
    let value: u64 = num_part
        .parse()
        .map_err(|e| format!("invalid duration number '{}': {}", num_part, e))?;
    let unit = unit_part.trim().to_lowercase();

    match unit.as_str() {
        "ms" => Ok(Duration::from_millis(value)),
        "s" => Ok(Duration::from_secs(value)),
        "m" => Ok(Duration::from_secs(value * 60)),
        "h" => Ok(Duration::from_secs(value * 60 * 60)),
        _ => Err(format!(
            "unsupported duration unit '{}'; expected ms, s, m, or h",
            unit
        )),
    }
}
