// src/events/parsers/brew_sign_rpm.rs

use serde_json::Value;

use crate::errors::Result;
use crate::events::parser::{missing, msg_id_of, str_field};
use crate::events::{Event, EventKind, EventParser};

/// An RPM build was signed in the build system.
#[derive(Debug, Clone, Copy, Default)]
pub struct BrewSignRpmParser;

impl EventParser for BrewSignRpmParser {
    fn name(&self) -> &'static str {
        "brew_sign_rpm"
    }

    fn topic_suffixes(&self) -> &'static [&'static str] {
        &["brew.sign.rpm"]
    }

    fn parse(&self, topic: &str, payload: &Value) -> Result<Option<Event>> {
        if payload.get("msg").is_none() {
            return Ok(None);
        }

        let nvr = match str_field(payload, &["msg", "build", "nvr"]) {
            Some(nvr) => nvr,
            None => {
                let part = |key: &str| str_field(payload, &["msg", "build", key]);
                match (part("name"), part("version"), part("release")) {
                    (Some(n), Some(v), Some(r)) => format!("{n}-{v}-{r}"),
                    _ => return Err(missing(topic, &["msg", "build", "nvr"])),
                }
            }
        };

        Ok(Some(Event::new(msg_id_of(payload), EventKind::RpmSigned { nvr })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const TOPIC: &str = "com.redhat.prod.brew.sign.rpm";

    #[test]
    fn nvr_is_read_directly_or_assembled() {
        let direct = json!({ "msg": { "build": { "nvr": "bash-4.4-1.fc30" } } });
        let parts = json!({ "msg": { "build": { "name": "bash", "version": "4.4", "release": "1.fc30" } } });

        for payload in [direct, parts] {
            let event = BrewSignRpmParser.parse(TOPIC, &payload).unwrap().unwrap();
            assert_eq!(event.search_key(), "bash-4.4-1.fc30");
        }
    }

    #[test]
    fn build_without_nvr_is_malformed() {
        let payload = json!({ "msg": { "build": { "name": "bash" } } });
        assert!(BrewSignRpmParser.parse(TOPIC, &payload).is_err());
    }
}
