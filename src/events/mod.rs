// src/events/mod.rs

//! Typed upstream events.
//!
//! - [`parser`] holds the `EventParser` trait and the `ParserRegistry` that
//!   classifies raw `(topic, payload)` pairs.
//! - [`parsers`] contains the built-in parsers.

pub mod parser;
pub mod parsers;

use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

use crate::compose::ComposeState;
use crate::rules::Attributes;

pub use parser::{EventParser, ParserRegistry};

/// A release vehicle: a tracked bundle of fixes shipped together.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Advisory {
    pub id: u64,
    pub name: String,
    pub state: String,
    #[serde(default)]
    pub severity: Option<String>,
    #[serde(default)]
    pub has_hightouch_bugs: bool,
}

impl Advisory {
    /// Lifecycle state meaning the advisory has shipped.
    pub const SHIPPED_LIVE: &'static str = "SHIPPED_LIVE";

    pub fn is_shipped(&self) -> bool {
        self.state == Self::SHIPPED_LIVE
    }

    /// Attributes rules are evaluated against when gating on an advisory.
    pub fn attributes(&self) -> Attributes {
        let mut attrs = Attributes::new();
        attrs.insert("advisory_id".into(), self.id.to_string().into());
        attrs.insert("advisory_name".into(), self.name.clone().into());
        attrs.insert("advisory_state".into(), self.state.clone().into());
        attrs.insert("has_hightouch_bugs".into(), self.has_hightouch_bugs.into());
        if let Some(severity) = &self.severity {
            attrs.insert("severity".into(), severity.clone().into());
        }
        attrs
    }
}

/// Module build states as reported by the module build service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModuleState {
    Init,
    Wait,
    Build,
    Done,
    Failed,
    Ready,
}

impl FromStr for ModuleState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "init" => Ok(ModuleState::Init),
            "wait" => Ok(ModuleState::Wait),
            "build" => Ok(ModuleState::Build),
            "done" => Ok(ModuleState::Done),
            "failed" => Ok(ModuleState::Failed),
            "ready" => Ok(ModuleState::Ready),
            other => Err(format!("unknown module state: {other}")),
        }
    }
}

/// Variant-specific payload of an [`Event`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EventKind {
    ModuleBuilt {
        build_id: u64,
        state: ModuleState,
        name: String,
        stream: String,
    },
    ModuleMetadataUpdated {
        scm_url: String,
        branch: String,
    },
    DockerfileChanged {
        repo_url: String,
        namespace: String,
        repo: String,
        branch: String,
        rev: String,
    },
    RpmSpecUpdated {
        rpm: String,
        branch: String,
        rev: String,
    },
    RpmSigned {
        nvr: String,
    },
    AdvisoryStateChanged {
        advisory: Advisory,
    },
    /// Emitted internally once every build of an advisory is signed.
    AdvisoryRpmsSigned {
        advisory: Advisory,
    },
    ComposeStateChanged {
        compose_id: u64,
        state: ComposeState,
    },
}

impl EventKind {
    /// Stable discriminant name, also used in logs and persisted records.
    pub fn name(&self) -> &'static str {
        match self {
            EventKind::ModuleBuilt { .. } => "module_built",
            EventKind::ModuleMetadataUpdated { .. } => "module_metadata_updated",
            EventKind::DockerfileChanged { .. } => "dockerfile_changed",
            EventKind::RpmSpecUpdated { .. } => "rpm_spec_updated",
            EventKind::RpmSigned { .. } => "rpm_signed",
            EventKind::AdvisoryStateChanged { .. } => "advisory_state_changed",
            EventKind::AdvisoryRpmsSigned { .. } => "advisory_rpms_signed",
            EventKind::ComposeStateChanged { .. } => "compose_state_changed",
        }
    }

    /// Identifier later events use to find this one (an NVR, an advisory
    /// name, a module name...).
    pub fn search_key(&self) -> String {
        match self {
            EventKind::ModuleBuilt { name, stream, .. } => format!("{name}:{stream}"),
            EventKind::ModuleMetadataUpdated { scm_url, .. } => scm_url.clone(),
            EventKind::DockerfileChanged { repo_url, rev, .. } => format!("{repo_url}#{rev}"),
            EventKind::RpmSpecUpdated { rpm, rev, .. } => format!("{rpm}#{rev}"),
            EventKind::RpmSigned { nvr } => nvr.clone(),
            EventKind::AdvisoryStateChanged { advisory }
            | EventKind::AdvisoryRpmsSigned { advisory } => advisory.name.clone(),
            EventKind::ComposeStateChanged { compose_id, .. } => compose_id.to_string(),
        }
    }
}

/// Immutable record of something that happened upstream.
///
/// The only mutable part is `released`, which flips once when the change
/// behind the event has shipped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    msg_id: String,
    #[serde(flatten)]
    kind: EventKind,
    #[serde(default)]
    released: bool,
}

static LOCAL_IDS: AtomicU64 = AtomicU64::new(1);

impl Event {
    pub fn new(msg_id: impl Into<String>, kind: EventKind) -> Self {
        Self {
            msg_id: msg_id.into(),
            kind,
            released: false,
        }
    }

    /// Identifier for messages that arrive without one, and for synthetic
    /// follow-up events. Unique within this process only.
    pub fn local_msg_id() -> String {
        let n = LOCAL_IDS.fetch_add(1, Ordering::Relaxed);
        format!("local-{}-{n}", chrono::Utc::now().format("%Y%m%d%H%M%S"))
    }

    pub fn msg_id(&self) -> &str {
        &self.msg_id
    }

    pub fn kind(&self) -> &EventKind {
        &self.kind
    }

    pub fn released(&self) -> bool {
        self.released
    }

    /// Set the `released` flag. Returns `false` if it was already set.
    pub fn mark_released(&mut self) -> bool {
        if self.released {
            return false;
        }
        self.released = true;
        true
    }

    pub fn search_key(&self) -> String {
        self.kind.search_key()
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.kind.name(), self.msg_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn released_flag_flips_once() {
        let mut event = Event::new("m1", EventKind::RpmSigned { nvr: "bash-4.4-1.fc30".into() });
        assert!(!event.released());
        assert!(event.mark_released());
        assert!(!event.mark_released());
        assert!(event.released());
    }

    #[test]
    fn event_serializes_flat_with_kind_tag() {
        let event = Event::new("m1", EventKind::RpmSigned { nvr: "bash-4.4-1.fc30".into() });
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "msg_id": "m1",
                "kind": "rpm_signed",
                "nvr": "bash-4.4-1.fc30",
                "released": false
            })
        );
        let back: Event = serde_json::from_value(json).unwrap();
        assert_eq!(back, event);
    }

    #[test]
    fn local_ids_are_unique() {
        assert_ne!(Event::local_msg_id(), Event::local_msg_id());
    }

    #[test]
    fn advisory_attributes_feed_rules() {
        let adv = Advisory {
            id: 1,
            name: "RHSA-2020-0001".into(),
            state: "SHIPPED_LIVE".into(),
            severity: Some("critical".into()),
            has_hightouch_bugs: false,
        };
        let attrs = adv.attributes();
        assert_eq!(attrs["advisory_name"], "RHSA-2020-0001".into());
        assert_eq!(attrs["has_hightouch_bugs"], false.into());
        assert!(adv.is_shipped());
    }
}
