// src/store/mod.rs

//! Persistence of events and artifact builds.
//!
//! [`ledger::BuildLedger`] holds the records and enforces every invariant.
//! The two backends only decide where the ledger lives:
//! - [`MemoryBuildStore`]: in process.
//! - [`FileBuildStore`]: JSON snapshot, replaced atomically on each commit.

pub mod file;
pub mod ledger;
pub mod memory;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::Result;
use crate::events::Event;
use crate::types::{ArtifactBuildState, ArtifactType};

pub use file::FileBuildStore;
pub use ledger::BuildLedger;
pub use memory::MemoryBuildStore;

/// One planned, running or finished rebuild of one artifact.
///
/// Rows are append-only history: a failed artifact is re-planned as a new
/// row, never by reviving the old one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactBuild {
    pub id: u64,
    pub name: String,
    #[serde(rename = "type")]
    pub artifact_type: ArtifactType,
    pub state: ArtifactBuildState,
    #[serde(default)]
    pub state_reason: Option<String>,
    /// Message id of the event whose plan contains this build.
    pub event_id: String,
    /// Build in the same plan, in an earlier batch.
    pub depends_on: Option<u64>,
    pub batch: usize,
    /// Handler-specific context (repository, commit, parent, compose...).
    pub build_args: Value,
    /// Set once the rebuild job is actually submitted.
    pub external_build_id: Option<u64>,
    pub time_submitted: DateTime<Utc>,
    #[serde(default)]
    pub time_completed: Option<DateTime<Utc>>,
}

impl ArtifactBuild {
    pub fn build_arg(&self, key: &str) -> Option<&Value> {
        self.build_args.get(key)
    }
}

/// Input for [`BuildStore::record_build`].
#[derive(Debug, Clone, PartialEq)]
pub struct NewBuild {
    pub name: String,
    pub artifact_type: ArtifactType,
    pub batch: usize,
    pub depends_on: Option<u64>,
    /// `PLANNED`, or `BUILDING` for a job that was submitted already.
    pub state: ArtifactBuildState,
    pub external_build_id: Option<u64>,
    pub build_args: Value,
}

impl NewBuild {
    pub fn planned(name: impl Into<String>, artifact_type: ArtifactType) -> Self {
        Self {
            name: name.into(),
            artifact_type,
            batch: 0,
            depends_on: None,
            state: ArtifactBuildState::Planned,
            external_build_id: None,
            build_args: Value::Object(Default::default()),
        }
    }

    pub fn in_batch(mut self, batch: usize, depends_on: Option<u64>) -> Self {
        self.batch = batch;
        self.depends_on = depends_on;
        self
    }

    pub fn submitted(mut self, external_build_id: u64) -> Self {
        self.state = ArtifactBuildState::Building;
        self.external_build_id = Some(external_build_id);
        self
    }

    pub fn with_args(mut self, build_args: Value) -> Self {
        self.build_args = build_args;
        self
    }
}

/// One member of a plan passed to [`BuildStore::record_plan`].
///
/// `parent` names an earlier member of the same plan.
#[derive(Debug, Clone, PartialEq)]
pub struct PlannedBuild {
    pub name: String,
    pub artifact_type: ArtifactType,
    pub batch: usize,
    pub parent: Option<String>,
    pub build_args: Value,
}

/// An event as stored, with its lookup key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredEvent {
    pub event: Event,
    pub search_key: String,
    pub time_received: DateTime<Utc>,
}

/// Query for [`BuildStore::find_builds`]. Unset fields match anything.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BuildFilter {
    pub artifact_type: Option<ArtifactType>,
    pub state: Option<ArtifactBuildState>,
    pub external_build_id: Option<u64>,
    pub build_arg: Option<(String, Value)>,
}

impl BuildFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn artifact_type(mut self, ty: ArtifactType) -> Self {
        self.artifact_type = Some(ty);
        self
    }

    pub fn state(mut self, state: ArtifactBuildState) -> Self {
        self.state = Some(state);
        self
    }

    pub fn external_build_id(mut self, id: u64) -> Self {
        self.external_build_id = Some(id);
        self
    }

    pub fn build_arg(mut self, key: &str, value: Value) -> Self {
        self.build_arg = Some((key.to_string(), value));
        self
    }

    pub fn matches(&self, build: &ArtifactBuild) -> bool {
        self.artifact_type.is_none_or(|t| t == build.artifact_type)
            && self.state.is_none_or(|s| s == build.state)
            && self
                .external_build_id
                .is_none_or(|id| build.external_build_id == Some(id))
            && self
                .build_arg
                .as_ref()
                .is_none_or(|(k, v)| build.build_arg(k) == Some(v))
    }
}

/// Storage for events and builds.
///
/// Every mutating call is all-or-nothing: on error nothing is written.
pub trait BuildStore: Send + Sync {
    /// Returns `false` if an event with the same message id was already
    /// recorded (re-delivery).
    fn record_event(&self, event: &Event) -> Result<bool>;

    fn event(&self, msg_id: &str) -> Result<Option<Event>>;

    fn events_by_search_key(&self, search_key: &str) -> Result<Vec<Event>>;

    /// Set the event's `released` flag. `false` if it was already set.
    fn mark_released(&self, msg_id: &str) -> Result<bool>;

    fn record_build(&self, event_id: &str, build: NewBuild) -> Result<ArtifactBuild>;

    /// Persist a whole plan in one unit. All members start `PLANNED`.
    fn record_plan(&self, event_id: &str, plan: Vec<PlannedBuild>) -> Result<Vec<ArtifactBuild>>;

    fn advance(
        &self,
        build_id: u64,
        to: ArtifactBuildState,
        reason: Option<String>,
    ) -> Result<ArtifactBuild>;

    /// `PLANNED -> BUILDING`, recording the external job id.
    fn mark_submitted(&self, build_id: u64, external_build_id: u64) -> Result<ArtifactBuild>;

    /// Set one key of `build_args`. Only allowed while `PLANNED`.
    fn set_build_arg(&self, build_id: u64, key: &str, value: Value) -> Result<ArtifactBuild>;

    fn build(&self, build_id: u64) -> Result<Option<ArtifactBuild>>;

    /// Builds of one plan, ordered by batch then id.
    fn builds_for_event(&self, event_id: &str) -> Result<Vec<ArtifactBuild>>;

    fn find_builds(&self, filter: &BuildFilter) -> Result<Vec<ArtifactBuild>>;
}

/// Access to a ledger; the shared [`BuildStore`] implementation is written
/// against this.
pub trait LedgerAccess: Send + Sync {
    fn read<R>(&self, f: impl FnOnce(&BuildLedger) -> R) -> R;

    /// Apply `f` and make the result durable. Nothing is kept if `f` or the
    /// write fails.
    fn commit<R>(&self, f: impl FnOnce(&mut BuildLedger) -> Result<R>) -> Result<R>;
}

impl<S: LedgerAccess> BuildStore for S {
    fn record_event(&self, event: &Event) -> Result<bool> {
        self.commit(|l| Ok(l.record_event(event)))
    }

    fn event(&self, msg_id: &str) -> Result<Option<Event>> {
        Ok(self.read(|l| l.event(msg_id).cloned()))
    }

    fn events_by_search_key(&self, search_key: &str) -> Result<Vec<Event>> {
        Ok(self.read(|l| l.events_by_search_key(search_key)))
    }

    fn mark_released(&self, msg_id: &str) -> Result<bool> {
        self.commit(|l| l.mark_released(msg_id))
    }

    fn record_build(&self, event_id: &str, build: NewBuild) -> Result<ArtifactBuild> {
        self.commit(|l| l.record_build(event_id, build))
    }

    fn record_plan(&self, event_id: &str, plan: Vec<PlannedBuild>) -> Result<Vec<ArtifactBuild>> {
        self.commit(|l| l.record_plan(event_id, plan))
    }

    fn advance(
        &self,
        build_id: u64,
        to: ArtifactBuildState,
        reason: Option<String>,
    ) -> Result<ArtifactBuild> {
        self.commit(|l| l.advance(build_id, to, reason))
    }

    fn mark_submitted(&self, build_id: u64, external_build_id: u64) -> Result<ArtifactBuild> {
        self.commit(|l| l.mark_submitted(build_id, external_build_id))
    }

    fn set_build_arg(&self, build_id: u64, key: &str, value: Value) -> Result<ArtifactBuild> {
        self.commit(|l| l.set_build_arg(build_id, key, value))
    }

    fn build(&self, build_id: u64) -> Result<Option<ArtifactBuild>> {
        Ok(self.read(|l| l.build(build_id).cloned()))
    }

    fn builds_for_event(&self, event_id: &str) -> Result<Vec<ArtifactBuild>> {
        Ok(self.read(|l| l.builds_for_event(event_id)))
    }

    fn find_builds(&self, filter: &BuildFilter) -> Result<Vec<ArtifactBuild>> {
        Ok(self.read(|l| l.find_builds(filter)))
    }
}
