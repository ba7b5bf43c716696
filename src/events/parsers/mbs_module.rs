// src/events/parsers/mbs_module.rs

use serde_json::Value;

use crate::errors::{RebuildError, Result};
use crate::events::parser::{msg_id_of, require_str, require_u64, str_field};
use crate::events::{Event, EventKind, EventParser, ModuleState};

/// Module build state changes from the module build service.
#[derive(Debug, Clone, Copy, Default)]
pub struct MbsModuleParser;

impl EventParser for MbsModuleParser {
    fn name(&self) -> &'static str {
        "mbs_module"
    }

    fn topic_suffixes(&self) -> &'static [&'static str] {
        &["mbs.module.state.change"]
    }

    fn parse(&self, topic: &str, payload: &Value) -> Result<Option<Event>> {
        if payload.get("msg").is_none() {
            return Ok(None);
        }

        let build_id = require_u64(topic, payload, &["msg", "id"])?;
        let state_name = require_str(topic, payload, &["msg", "state_name"])?;
        let state = state_name
            .parse::<ModuleState>()
            .map_err(|reason| RebuildError::Parse {
                topic: topic.to_string(),
                reason,
            })?;

        let kind = EventKind::ModuleBuilt {
            build_id,
            state,
            name: str_field(payload, &["msg", "name"]).unwrap_or_default(),
            stream: str_field(payload, &["msg", "stream"]).unwrap_or_default(),
        };
        Ok(Some(Event::new(msg_id_of(payload), kind)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const TOPIC: &str = "org.fedoraproject.prod.mbs.module.state.change";

    #[test]
    fn parses_module_state_change() {
        let payload = json!({
            "msg_id": "m1",
            "msg": { "id": 42, "state_name": "ready", "name": "testmodule", "stream": "master" }
        });
        let event = MbsModuleParser.parse(TOPIC, &payload).unwrap().unwrap();
        assert_eq!(
            event.kind(),
            &EventKind::ModuleBuilt {
                build_id: 42,
                state: ModuleState::Ready,
                name: "testmodule".into(),
                stream: "master".into(),
            }
        );
        assert_eq!(event.search_key(), "testmodule:master");
    }

    #[test]
    fn unknown_state_is_malformed() {
        let payload = json!({ "msg": { "id": 1, "state_name": "exploded" } });
        assert!(matches!(
            MbsModuleParser.parse(TOPIC, &payload),
            Err(RebuildError::Parse { .. })
        ));
    }
}
