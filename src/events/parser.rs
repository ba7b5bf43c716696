// src/events/parser.rs

//! Parser trait and the registry that turns raw messages into events.

use serde_json::Value;
use tracing::{debug, warn};

use crate::errors::{RebuildError, Result};
use crate::events::Event;

/// Classifier for one family of inbound messages.
pub trait EventParser: Send + Sync {
    /// Registration key; re-registering a parser with the same name
    /// replaces the previous one.
    fn name(&self) -> &'static str;

    /// Topic suffixes this parser understands (e.g. `"git.receive"`).
    fn topic_suffixes(&self) -> &'static [&'static str];

    fn can_parse(&self, topic: &str, _payload: &Value) -> bool {
        self.topic_suffixes().iter().any(|s| topic.ends_with(s))
    }

    /// `Ok(None)` means the message is irrelevant, `Err(Parse)` that it is
    /// malformed. Neither stops classification.
    fn parse(&self, topic: &str, payload: &Value) -> Result<Option<Event>>;
}

/// Ordered set of parsers plus the topic prefixes they are subscribed under.
///
/// Built once at startup and shared read-only afterwards.
pub struct ParserRegistry {
    topic_prefixes: Vec<String>,
    parsers: Vec<Box<dyn EventParser>>,
}

impl std::fmt::Debug for ParserRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParserRegistry")
            .field("topic_prefixes", &self.topic_prefixes)
            .field("parsers", &self.names())
            .finish()
    }
}

impl ParserRegistry {
    pub fn new(topic_prefixes: Vec<String>) -> Self {
        Self {
            topic_prefixes,
            parsers: Vec::new(),
        }
    }

    /// Add a parser. A parser with the same name is replaced in place, so
    /// registration order is kept.
    pub fn register(&mut self, parser: Box<dyn EventParser>) {
        match self.parsers.iter().position(|p| p.name() == parser.name()) {
            Some(idx) => {
                debug!(parser = parser.name(), "replacing registered parser");
                self.parsers[idx] = parser;
            }
            None => {
                debug!(parser = parser.name(), "registering parser");
                self.parsers.push(parser);
            }
        }
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.parsers.iter().map(|p| p.name()).collect()
    }

    /// Subscription set: every `prefix.suffix` combination, without duplicates.
    pub fn topics(&self) -> Vec<String> {
        let mut topics = Vec::new();
        for prefix in &self.topic_prefixes {
            let prefix = prefix.trim_end_matches('.');
            for parser in &self.parsers {
                for suffix in parser.topic_suffixes() {
                    let topic = format!("{prefix}.{suffix}");
                    if !topics.contains(&topic) {
                        topics.push(topic);
                    }
                }
            }
        }
        topics
    }

    /// Convert a raw message into the first event any parser produces.
    pub fn classify(&self, topic: &str, payload: &Value) -> Option<Event> {
        for parser in &self.parsers {
            if !parser.can_parse(topic, payload) {
                continue;
            }
            match parser.parse(topic, payload) {
                Ok(Some(event)) => {
                    debug!(parser = parser.name(), topic, %event, "message classified");
                    return Some(event);
                }
                Ok(None) => {}
                Err(err) => {
                    warn!(parser = parser.name(), topic, error = %err, "dropping malformed message");
                }
            }
        }

        debug!(topic, "no parser produced an event; dropping message");
        None
    }
}

// Payload access helpers shared by the built-in parsers.

pub(crate) fn field<'a>(payload: &'a Value, path: &[&str]) -> Option<&'a Value> {
    path.iter().try_fold(payload, |v, key| v.get(*key))
}

pub(crate) fn str_field(payload: &Value, path: &[&str]) -> Option<String> {
    field(payload, path).and_then(Value::as_str).map(str::to_string)
}

pub(crate) fn require_str(topic: &str, payload: &Value, path: &[&str]) -> Result<String> {
    str_field(payload, path).ok_or_else(|| missing(topic, path))
}

pub(crate) fn require_u64(topic: &str, payload: &Value, path: &[&str]) -> Result<u64> {
    field(payload, path)
        .and_then(Value::as_u64)
        .ok_or_else(|| missing(topic, path))
}

pub(crate) fn missing(topic: &str, path: &[&str]) -> RebuildError {
    RebuildError::Parse {
        topic: topic.to_string(),
        reason: format!("missing or invalid field '{}'", path.join(".")),
    }
}

/// The message id from the envelope, or a process-local one.
pub(crate) fn msg_id_of(payload: &Value) -> String {
    str_field(payload, &["msg_id"]).unwrap_or_else(Event::local_msg_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventKind;
    use serde_json::json;

    struct Fixed {
        name: &'static str,
        suffixes: &'static [&'static str],
        result: fn() -> Result<Option<Event>>,
    }

    impl EventParser for Fixed {
        fn name(&self) -> &'static str {
            self.name
        }
        fn topic_suffixes(&self) -> &'static [&'static str] {
            self.suffixes
        }
        fn parse(&self, _topic: &str, _payload: &Value) -> Result<Option<Event>> {
            (self.result)()
        }
    }

    fn signed() -> Result<Option<Event>> {
        Ok(Some(Event::new("m", EventKind::RpmSigned { nvr: "a-1-1".into() })))
    }

    fn nothing() -> Result<Option<Event>> {
        Ok(None)
    }

    fn broken() -> Result<Option<Event>> {
        Err(missing("t", &["msg"]))
    }

    #[test]
    fn topics_cross_prefixes_and_suffixes() {
        let mut reg = ParserRegistry::new(vec!["org.a.prod".into(), "org.a.stg.".into()]);
        reg.register(Box::new(Fixed { name: "x", suffixes: &["git.receive"], result: nothing }));
        reg.register(Box::new(Fixed { name: "y", suffixes: &["brew.sign.rpm"], result: nothing }));

        assert_eq!(
            reg.topics(),
            vec![
                "org.a.prod.git.receive",
                "org.a.prod.brew.sign.rpm",
                "org.a.stg.git.receive",
                "org.a.stg.brew.sign.rpm",
            ]
        );
    }

    #[test]
    fn re_registration_overwrites_in_place() {
        let mut reg = ParserRegistry::new(vec!["p".into()]);
        reg.register(Box::new(Fixed { name: "x", suffixes: &["a"], result: nothing }));
        reg.register(Box::new(Fixed { name: "y", suffixes: &["b"], result: nothing }));
        reg.register(Box::new(Fixed { name: "x", suffixes: &["c"], result: nothing }));

        assert_eq!(reg.names(), vec!["x", "y"]);
        assert_eq!(reg.topics(), vec!["p.c", "p.b"]);
    }

    #[test]
    fn classification_continues_past_none_and_errors() {
        let mut reg = ParserRegistry::new(vec!["p".into()]);
        reg.register(Box::new(Fixed { name: "bad", suffixes: &["t"], result: broken }));
        reg.register(Box::new(Fixed { name: "none", suffixes: &["t"], result: nothing }));
        reg.register(Box::new(Fixed { name: "good", suffixes: &["t"], result: signed }));

        let event = reg.classify("p.t", &json!({})).unwrap();
        assert_eq!(event.kind().name(), "rpm_signed");
    }

    #[test]
    fn unmatched_topic_yields_none() {
        let mut reg = ParserRegistry::new(vec!["p".into()]);
        reg.register(Box::new(Fixed { name: "good", suffixes: &["t"], result: signed }));
        assert!(reg.classify("p.other", &json!({})).is_none());
    }
}
