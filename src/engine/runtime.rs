// src/engine/runtime.rs

use std::fmt;

use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::errors::Result;

use super::ConsumerEvent;
use super::core::{Consumer, ConsumerStats};

/// Feeds `ConsumerEvent`s from the channel into the [`Consumer`], one at a
/// time, until input ends or shutdown is requested.
pub struct Runtime {
    consumer: Consumer,
    event_rx: mpsc::Receiver<ConsumerEvent>,
}

impl fmt::Debug for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("consumer", &self.consumer)
            .finish_non_exhaustive()
    }
}

impl Runtime {
    pub fn new(consumer: Consumer, event_rx: mpsc::Receiver<ConsumerEvent>) -> Self {
        Self { consumer, event_rx }
    }

    /// Main event loop. Returns the final counters.
    ///
    /// A consumer-level error (the store failing) ends the loop and is
    /// returned; restarting is left to whatever supervises the process.
    pub async fn run(mut self) -> Result<ConsumerStats> {
        info!(
            parsers = ?self.consumer.parsers().names(),
            handlers = ?self.consumer.handlers().names(),
            "rebuildd consumer started"
        );

        loop {
            let event = match self.event_rx.recv().await {
                Some(e) => e,
                None => {
                    info!("consumer event channel closed; exiting");
                    break;
                }
            };

            match event {
                ConsumerEvent::Message(msg) => {
                    debug!(topic = %msg.topic, "consumer received message");
                    self.consumer.consume(&msg.topic, &msg.body).await?;
                }
                ConsumerEvent::InputClosed => {
                    info!("message input closed; stopping consumer");
                    break;
                }
                ConsumerEvent::ShutdownRequested => {
                    info!("shutdown requested; stopping consumer");
                    break;
                }
            }
        }

        let stats = self.consumer.stats();
        info!(
            received_total = stats.received_total,
            received_passed = stats.received_passed,
            received_ignored = stats.received_ignored,
            handled_total = stats.handled_total,
            handler_failures = stats.handler_failures,
            follow_ups = stats.follow_ups,
            "consumer exiting"
        );
        Ok(stats)
    }
}
