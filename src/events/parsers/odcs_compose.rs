// src/events/parsers/odcs_compose.rs

use serde_json::Value;

use crate::compose::ComposeState;
use crate::errors::{RebuildError, Result};
use crate::events::parser::{msg_id_of, require_str, require_u64};
use crate::events::{Event, EventKind, EventParser};

/// Compose state changes announced by the compose service.
#[derive(Debug, Clone, Copy, Default)]
pub struct OdcsComposeParser;

impl EventParser for OdcsComposeParser {
    fn name(&self) -> &'static str {
        "odcs_compose"
    }

    fn topic_suffixes(&self) -> &'static [&'static str] {
        &["odcs.compose.state-changed"]
    }

    fn parse(&self, topic: &str, payload: &Value) -> Result<Option<Event>> {
        if payload.get("msg").is_none() {
            return Ok(None);
        }

        let compose_id = require_u64(topic, payload, &["msg", "compose", "id"])?;
        let state = require_str(topic, payload, &["msg", "compose", "state_name"])?
            .parse::<ComposeState>()
            .map_err(|reason| RebuildError::Parse {
                topic: topic.to_string(),
                reason,
            })?;

        Ok(Some(Event::new(
            msg_id_of(payload),
            EventKind::ComposeStateChanged { compose_id, state },
        )))
    }
}
