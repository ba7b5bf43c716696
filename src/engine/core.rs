// src/engine/core.rs

//! The consumer: single entry point for raw messages.
//!
//! Processing of one message:
//! 1. classify it through the parser registry (unmatched messages are
//!    dropped and counted as ignored)
//! 2. put the event on the work queue
//! 3. drain the queue: record each event (re-deliveries are skipped),
//!    dispatch it, and append any follow-up events to the back of the queue
//!
//! Follow-ups are queued rather than dispatched inline, so a chain of
//! reactions never grows the stack and the queue is empty again before the
//! next inbound message is looked at.

use std::collections::VecDeque;
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info};

use crate::engine::dispatch::dispatch;
use crate::errors::Result;
use crate::events::{Event, ParserRegistry};
use crate::handlers::HandlerRegistry;
use crate::store::BuildStore;

/// Consumer counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ConsumerStats {
    /// Raw messages handed to the consumer.
    pub received_total: u64,
    /// Raw messages a parser turned into an event.
    pub received_passed: u64,
    /// Raw messages no parser recognised.
    pub received_ignored: u64,
    /// Handler invocations.
    pub handled_total: u64,
    /// Handler invocations that returned an error.
    pub handler_failures: u64,
    /// Events produced by handlers and queued for dispatch.
    pub follow_ups: u64,
}

pub struct Consumer {
    parsers: ParserRegistry,
    handlers: HandlerRegistry,
    store: Arc<dyn BuildStore>,
    queue: VecDeque<Event>,
    stats: ConsumerStats,
}

impl std::fmt::Debug for Consumer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Consumer")
            .field("parsers", &self.parsers)
            .field("handlers", &self.handlers)
            .field("queued", &self.queue.len())
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

impl Consumer {
    pub fn new(
        parsers: ParserRegistry,
        handlers: HandlerRegistry,
        store: Arc<dyn BuildStore>,
    ) -> Self {
        Self {
            parsers,
            handlers,
            store,
            queue: VecDeque::new(),
            stats: ConsumerStats::default(),
        }
    }

    pub fn parsers(&self) -> &ParserRegistry {
        &self.parsers
    }

    pub fn handlers(&self) -> &HandlerRegistry {
        &self.handlers
    }

    pub fn store(&self) -> &Arc<dyn BuildStore> {
        &self.store
    }

    pub fn stats(&self) -> ConsumerStats {
        self.stats
    }

    /// Classify a raw message and process it with everything it leads to.
    ///
    /// Errors are consumer-level (the store could not record an event);
    /// handler failures are counted and logged, never returned.
    pub async fn consume(&mut self, topic: &str, payload: &Value) -> Result<()> {
        self.stats.received_total += 1;

        let Some(event) = self.parsers.classify(topic, payload) else {
            self.stats.received_ignored += 1;
            return Ok(());
        };

        self.stats.received_passed += 1;
        self.queue.push_back(event);
        self.drain().await
    }

    /// Process an already classified event, bypassing the parsers.
    pub async fn consume_event(&mut self, event: Event) -> Result<()> {
        self.queue.push_back(event);
        self.drain().await
    }

    async fn drain(&mut self) -> Result<()> {
        while let Some(event) = self.queue.pop_front() {
            if !self.store.record_event(&event)? {
                info!(event_id = event.msg_id(), %event, "event already recorded; skipping re-delivery");
                continue;
            }
            debug!(event_id = event.msg_id(), %event, "dispatching event");

            let outcome = dispatch(&self.handlers, &event).await;
            self.stats.handled_total += outcome.handled;
            self.stats.handler_failures += outcome.failed;
            self.stats.follow_ups += outcome.follow_ups.len() as u64;
            self.queue.extend(outcome.follow_ups);
        }
        Ok(())
    }
}
