// src/transport/mod.rs

//! Newline-delimited JSON message input.
//!
//! Each non-empty line is one message:
//!
//! ```text
//! {"topic": "org.fedoraproject.prod.brew.sign.rpm", "body": {"msg_id": "...", "msg": {...}}}
//! ```
//!
//! Lines starting with `#` are comments. A line that is not valid JSON of
//! that shape is logged and skipped.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::engine::ConsumerEvent;
use crate::errors::Result;

/// One raw message as delivered by the bus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InboundMessage {
    pub topic: String,
    #[serde(default)]
    pub body: Value,
}

impl InboundMessage {
    pub fn new(topic: impl Into<String>, body: Value) -> Self {
        Self {
            topic: topic.into(),
            body,
        }
    }
}

/// Parse one input line. `Ok(None)` for blank lines and comments.
pub fn parse_line(line: &str) -> Result<Option<InboundMessage>> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }
    Ok(Some(serde_json::from_str(line)?))
}

/// Read messages from `reader` and forward them to the runtime channel.
///
/// Sends [`ConsumerEvent::InputClosed`] at end of input. Returns the number
/// of messages forwarded.
pub async fn forward_messages<R>(reader: R, tx: mpsc::Sender<ConsumerEvent>) -> Result<usize>
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(reader).lines();
    let mut line_no = 0usize;
    let mut forwarded = 0usize;

    while let Some(line) = lines.next_line().await? {
        line_no += 1;
        let msg = match parse_line(&line) {
            Ok(Some(msg)) => msg,
            Ok(None) => continue,
            Err(err) => {
                warn!(line = line_no, error = %err, "skipping malformed message line");
                continue;
            }
        };

        debug!(line = line_no, topic = %msg.topic, "forwarding message");
        if tx.send(ConsumerEvent::Message(msg)).await.is_err() {
            debug!("consumer gone; stop reading messages");
            return Ok(forwarded);
        }
        forwarded += 1;
    }

    info!(forwarded, "end of message input");
    // The runtime may already have stopped.
    let _ = tx.send(ConsumerEvent::InputClosed).await;
    Ok(forwarded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn blank_and_comment_lines_are_skipped() {
        assert_eq!(parse_line("   ").unwrap(), None);
        assert_eq!(parse_line("# replayed 2020-01-01").unwrap(), None);
    }

    #[test]
    fn body_defaults_to_null() {
        let msg = parse_line(r#"{"topic": "a.b"}"#).unwrap().unwrap();
        assert_eq!(msg, InboundMessage::new("a.b", Value::Null));
    }

    #[tokio::test]
    async fn malformed_lines_do_not_stop_the_reader() {
        let input = concat!(
            "{\"topic\": \"p.brew.sign.rpm\", \"body\": {\"msg_id\": \"1\"}}\n",
            "not json\n",
            "\n",
            "{\"topic\": \"p.git.receive\", \"body\": {}}\n",
        );
        let (tx, mut rx) = mpsc::channel(8);

        let forwarded = forward_messages(input.as_bytes(), tx).await.unwrap();
        assert_eq!(forwarded, 2);

        let mut topics = Vec::new();
        while let Some(event) = rx.recv().await {
            match event {
                ConsumerEvent::Message(msg) => topics.push(msg.topic),
                ConsumerEvent::InputClosed => break,
                ConsumerEvent::ShutdownRequested => panic!("unexpected shutdown"),
            }
        }
        assert_eq!(topics, vec!["p.brew.sign.rpm", "p.git.receive"]);

        let first = parse_line(input.lines().next().unwrap()).unwrap().unwrap();
        assert_eq!(first.body, json!({"msg_id": "1"}));
    }
}
