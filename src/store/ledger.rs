// src/store/ledger.rs

//! The record set behind every store backend.

use std::collections::BTreeMap;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::errors::{RebuildError, Result};
use crate::events::Event;
use crate::store::{ArtifactBuild, BuildFilter, NewBuild, PlannedBuild, StoredEvent};
use crate::types::ArtifactBuildState;

/// Events and builds, plus the rules for changing them.
///
/// Every method validates completely before touching any record, so a
/// failed call leaves the ledger unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BuildLedger {
    events: Vec<StoredEvent>,
    builds: Vec<ArtifactBuild>,
    #[serde(default)]
    last_build_id: u64,
}

impl BuildLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_event(&mut self, event: &Event) -> bool {
        if self.stored_event(event.msg_id()).is_some() {
            debug!(event_id = event.msg_id(), "event already recorded; ignoring re-delivery");
            return false;
        }
        self.events.push(StoredEvent {
            event: event.clone(),
            search_key: event.search_key(),
            time_received: Utc::now(),
        });
        true
    }

    pub fn event(&self, msg_id: &str) -> Option<&Event> {
        self.stored_event(msg_id).map(|s| &s.event)
    }

    pub fn events_by_search_key(&self, search_key: &str) -> Vec<Event> {
        self.events
            .iter()
            .filter(|s| s.search_key == search_key)
            .map(|s| s.event.clone())
            .collect()
    }

    pub fn mark_released(&mut self, msg_id: &str) -> Result<bool> {
        let stored = self
            .events
            .iter_mut()
            .find(|s| s.event.msg_id() == msg_id)
            .ok_or_else(|| RebuildError::UnknownEvent(msg_id.to_string()))?;
        let changed = stored.event.mark_released();
        if changed {
            info!(event_id = msg_id, "event marked as released");
        }
        Ok(changed)
    }

    pub fn record_build(&mut self, event_id: &str, new: NewBuild) -> Result<ArtifactBuild> {
        self.require_event(event_id)?;

        match new.state {
            ArtifactBuildState::Planned => {}
            ArtifactBuildState::Building if new.external_build_id.is_some() => {}
            state => {
                return Err(RebuildError::PlanInvariant(format!(
                    "build '{}' cannot start in state {state}",
                    new.name
                )));
            }
        }

        if let Some(parent_id) = new.depends_on {
            let parent = self.require_build(parent_id)?;
            check_dependency(&new.name, new.batch, event_id, parent)?;
        }

        let build = self.make_build(event_id, new);
        debug!(build = build.id, name = %build.name, event_id, "build recorded");
        self.builds.push(build.clone());
        Ok(build)
    }

    pub fn record_plan(&mut self, event_id: &str, plan: Vec<PlannedBuild>) -> Result<Vec<ArtifactBuild>> {
        self.require_event(event_id)?;
        if self.builds.iter().any(|b| b.event_id == event_id) {
            return Err(RebuildError::PlanInvariant(format!(
                "a plan was already recorded for event {event_id}"
            )));
        }

        // Resolve every parent reference before assigning anything.
        let mut index: BTreeMap<&str, (usize, usize)> = BTreeMap::new();
        let mut parents = Vec::with_capacity(plan.len());
        for (pos, member) in plan.iter().enumerate() {
            let parent = match member.parent.as_deref() {
                None => None,
                Some(parent) => {
                    let &(parent_pos, parent_batch) = index.get(parent).ok_or_else(|| {
                        RebuildError::PlanInvariant(format!(
                            "'{}' depends on '{parent}', which is not earlier in the plan",
                            member.name
                        ))
                    })?;
                    if parent_batch >= member.batch {
                        return Err(RebuildError::PlanInvariant(format!(
                            "'{}' (batch {}) depends on '{parent}' (batch {parent_batch})",
                            member.name, member.batch
                        )));
                    }
                    Some(parent_pos)
                }
            };
            if index.insert(member.name.as_str(), (pos, member.batch)).is_some() {
                return Err(RebuildError::PlanInvariant(format!(
                    "'{}' appears twice in the plan",
                    member.name
                )));
            }
            parents.push(parent);
        }

        let first_id = self.last_build_id + 1;
        let mut recorded = Vec::with_capacity(plan.len());
        for (member, parent) in plan.into_iter().zip(parents) {
            let new = NewBuild {
                name: member.name,
                artifact_type: member.artifact_type,
                batch: member.batch,
                depends_on: parent.map(|pos| first_id + pos as u64),
                state: ArtifactBuildState::Planned,
                external_build_id: None,
                build_args: member.build_args,
            };
            recorded.push(self.make_build(event_id, new));
        }

        self.builds.extend(recorded.iter().cloned());
        info!(event_id, builds = recorded.len(), "plan recorded");
        Ok(recorded)
    }

    pub fn advance(
        &mut self,
        build_id: u64,
        to: ArtifactBuildState,
        reason: Option<String>,
    ) -> Result<ArtifactBuild> {
        let build = self.require_build_mut(build_id)?;
        let from = build.state;
        if !from.can_transition_to(to) {
            warn!(build = build_id, %from, %to, "rejecting invalid state transition");
            return Err(RebuildError::InvalidStateTransition {
                build: build_id,
                from,
                to,
            });
        }

        build.state = to;
        build.state_reason = reason;
        if to.is_terminal() {
            build.time_completed = Some(Utc::now());
        }
        info!(build = build_id, name = %build.name, %from, %to, "build state changed");
        Ok(build.clone())
    }

    pub fn mark_submitted(&mut self, build_id: u64, external_build_id: u64) -> Result<ArtifactBuild> {
        let state = self.require_build(build_id)?.state;
        if !state.can_transition_to(ArtifactBuildState::Building) {
            return Err(RebuildError::InvalidStateTransition {
                build: build_id,
                from: state,
                to: ArtifactBuildState::Building,
            });
        }
        let build = self.require_build_mut(build_id)?;
        build.external_build_id = Some(external_build_id);
        build.state = ArtifactBuildState::Building;
        build.state_reason = Some(format!("submitted as {external_build_id}"));
        info!(build = build_id, external_build_id, "build submitted");
        Ok(build.clone())
    }

    pub fn set_build_arg(&mut self, build_id: u64, key: &str, value: Value) -> Result<ArtifactBuild> {
        let build = self.require_build_mut(build_id)?;
        if build.state != ArtifactBuildState::Planned {
            return Err(RebuildError::PlanInvariant(format!(
                "build {build_id} is {} and its arguments are frozen",
                build.state
            )));
        }
        if !build.build_args.is_object() {
            build.build_args = Value::Object(Default::default());
        }
        if let Value::Object(args) = &mut build.build_args {
            args.insert(key.to_string(), value);
        }
        Ok(build.clone())
    }

    pub fn build(&self, build_id: u64) -> Option<&ArtifactBuild> {
        self.builds.iter().find(|b| b.id == build_id)
    }

    pub fn builds_for_event(&self, event_id: &str) -> Vec<ArtifactBuild> {
        let mut builds: Vec<ArtifactBuild> = self
            .builds
            .iter()
            .filter(|b| b.event_id == event_id)
            .cloned()
            .collect();
        builds.sort_by_key(|b| (b.batch, b.id));
        builds
    }

    pub fn find_builds(&self, filter: &BuildFilter) -> Vec<ArtifactBuild> {
        self.builds
            .iter()
            .filter(|b| filter.matches(b))
            .cloned()
            .collect()
    }

    fn stored_event(&self, msg_id: &str) -> Option<&StoredEvent> {
        self.events.iter().find(|s| s.event.msg_id() == msg_id)
    }

    fn require_event(&self, msg_id: &str) -> Result<()> {
        self.stored_event(msg_id)
            .map(|_| ())
            .ok_or_else(|| RebuildError::UnknownEvent(msg_id.to_string()))
    }

    fn require_build(&self, build_id: u64) -> Result<&ArtifactBuild> {
        self.build(build_id).ok_or(RebuildError::UnknownBuild(build_id))
    }

    fn require_build_mut(&mut self, build_id: u64) -> Result<&mut ArtifactBuild> {
        self.builds
            .iter_mut()
            .find(|b| b.id == build_id)
            .ok_or(RebuildError::UnknownBuild(build_id))
    }

    fn make_build(&mut self, event_id: &str, new: NewBuild) -> ArtifactBuild {
        self.last_build_id += 1;
        ArtifactBuild {
            id: self.last_build_id,
            name: new.name,
            artifact_type: new.artifact_type,
            state: new.state,
            state_reason: None,
            event_id: event_id.to_string(),
            depends_on: new.depends_on,
            batch: new.batch,
            build_args: new.build_args,
            external_build_id: new.external_build_id,
            time_submitted: Utc::now(),
            time_completed: None,
        }
    }
}

fn check_dependency(name: &str, batch: usize, event_id: &str, parent: &ArtifactBuild) -> Result<()> {
    if parent.event_id != event_id {
        return Err(RebuildError::PlanInvariant(format!(
            "'{name}' depends on build {} from another plan ({})",
            parent.id, parent.event_id
        )));
    }
    if parent.batch >= batch {
        return Err(RebuildError::PlanInvariant(format!(
            "'{name}' (batch {batch}) depends on build {} (batch {})",
            parent.id, parent.batch
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventKind;
    use crate::types::ArtifactType;
    use serde_json::json;

    fn ledger_with_event(msg_id: &str) -> BuildLedger {
        let mut ledger = BuildLedger::new();
        ledger.record_event(&Event::new(msg_id, EventKind::RpmSigned { nvr: "bash-4.4-1.fc30".into() }));
        ledger
    }

    fn member(name: &str, batch: usize, parent: Option<&str>) -> PlannedBuild {
        PlannedBuild {
            name: name.into(),
            artifact_type: ArtifactType::Image,
            batch,
            parent: parent.map(str::to_string),
            build_args: json!({}),
        }
    }

    #[test]
    fn duplicate_event_is_not_recorded_twice() {
        let mut ledger = ledger_with_event("m1");
        assert!(!ledger.record_event(&Event::new("m1", EventKind::RpmSigned { nvr: "x".into() })));
        assert_eq!(ledger.events_by_search_key("bash-4.4-1.fc30").len(), 1);
    }

    #[test]
    fn plan_links_parents_by_id() {
        let mut ledger = ledger_with_event("m1");
        let builds = ledger
            .record_plan("m1", vec![member("X", 0, None), member("Y", 1, Some("X"))])
            .unwrap();
        assert_eq!(builds[1].depends_on, Some(builds[0].id));
        assert!(builds.iter().all(|b| b.state == ArtifactBuildState::Planned));
    }

    #[test]
    fn invalid_plan_writes_nothing() {
        let mut ledger = ledger_with_event("m1");
        let before = ledger.clone();

        let same_batch = ledger.record_plan("m1", vec![member("X", 0, None), member("Y", 0, Some("X"))]);
        assert!(matches!(same_batch, Err(RebuildError::PlanInvariant(_))));

        let forward_ref = ledger.record_plan("m1", vec![member("Y", 1, Some("X")), member("X", 0, None)]);
        assert!(matches!(forward_ref, Err(RebuildError::PlanInvariant(_))));

        assert_eq!(ledger, before);
    }

    #[test]
    fn dependency_must_be_same_plan_and_earlier_batch() {
        let mut ledger = ledger_with_event("m1");
        ledger.record_event(&Event::new("m2", EventKind::RpmSigned { nvr: "y".into() }));

        let x = ledger.record_build("m1", NewBuild::planned("X", ArtifactType::Image)).unwrap();
        let other_plan = ledger.record_build(
            "m2",
            NewBuild::planned("Y", ArtifactType::Image).in_batch(1, Some(x.id)),
        );
        assert!(matches!(other_plan, Err(RebuildError::PlanInvariant(_))));

        let same_batch = ledger.record_build(
            "m1",
            NewBuild::planned("Y", ArtifactType::Image).in_batch(0, Some(x.id)),
        );
        assert!(matches!(same_batch, Err(RebuildError::PlanInvariant(_))));

        let ok = ledger
            .record_build("m1", NewBuild::planned("Y", ArtifactType::Image).in_batch(1, Some(x.id)))
            .unwrap();
        assert_eq!(ok.depends_on, Some(x.id));
    }

    #[test]
    fn state_machine_rejects_illegal_edges() {
        let mut ledger = ledger_with_event("m1");
        let b = ledger.record_build("m1", NewBuild::planned("X", ArtifactType::Image)).unwrap();

        assert!(matches!(
            ledger.advance(b.id, ArtifactBuildState::Done, None),
            Err(RebuildError::InvalidStateTransition { .. })
        ));
        ledger.mark_submitted(b.id, 77).unwrap();
        let done = ledger.advance(b.id, ArtifactBuildState::Done, None).unwrap();
        assert!(done.time_completed.is_some());
        assert!(matches!(
            ledger.advance(b.id, ArtifactBuildState::Building, None),
            Err(RebuildError::InvalidStateTransition { .. })
        ));
    }

    #[test]
    fn build_args_freeze_after_planning() {
        let mut ledger = ledger_with_event("m1");
        let b = ledger.record_build("m1", NewBuild::planned("X", ArtifactType::Image)).unwrap();
        ledger.set_build_arg(b.id, "compose_id", json!(3)).unwrap();
        ledger.advance(b.id, ArtifactBuildState::Failed, Some("compose failed".into())).unwrap();
        assert!(ledger.set_build_arg(b.id, "x", json!(1)).is_err());
        assert_eq!(ledger.build(b.id).unwrap().build_arg("compose_id"), Some(&json!(3)));
    }

    #[test]
    fn terminal_initial_state_is_rejected() {
        let mut ledger = ledger_with_event("m1");
        let mut new = NewBuild::planned("X", ArtifactType::Image);
        new.state = ArtifactBuildState::Done;
        assert!(ledger.record_build("m1", new).is_err());
    }
}
