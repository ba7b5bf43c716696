// src/events/parsers/errata_status.rs

use serde_json::Value;

use crate::errors::Result;
use crate::events::parser::{field, msg_id_of, require_str, require_u64, str_field};
use crate::events::{Advisory, Event, EventKind, EventParser};

/// Advisory state changes from the release tracker.
#[derive(Debug, Clone, Copy, Default)]
pub struct ErrataStatusParser;

impl EventParser for ErrataStatusParser {
    fn name(&self) -> &'static str {
        "errata_status"
    }

    fn topic_suffixes(&self) -> &'static [&'static str] {
        &["errata.activity.status"]
    }

    fn parse(&self, topic: &str, payload: &Value) -> Result<Option<Event>> {
        if payload.get("msg").is_none() {
            return Ok(None);
        }

        let advisory = Advisory {
            id: require_u64(topic, payload, &["msg", "errata_id"])?,
            name: require_str(topic, payload, &["msg", "fulladvisory"])?,
            state: require_str(topic, payload, &["msg", "to"])?,
            severity: str_field(payload, &["msg", "severity"]),
            has_hightouch_bugs: field(payload, &["msg", "has_hightouch_bugs"])
                .and_then(Value::as_bool)
                .unwrap_or(false),
        };

        Ok(Some(Event::new(
            msg_id_of(payload),
            EventKind::AdvisoryStateChanged { advisory },
        )))
    }
}
