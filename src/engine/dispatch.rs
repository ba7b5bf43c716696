// src/engine/dispatch.rs

//! Fan one event out to every handler that accepts it.

use tracing::{debug, error, info};

use crate::errors::RebuildError;
use crate::events::Event;
use crate::handlers::HandlerRegistry;

/// Result of dispatching a single event.
#[derive(Debug, Default)]
pub struct DispatchOutcome {
    /// Handlers that were invoked.
    pub handled: u64,
    /// Invoked handlers that returned an error.
    pub failed: u64,
    /// Events returned by handlers, in handler order.
    pub follow_ups: Vec<Event>,
}

/// Invoke every matching handler, in registry order.
///
/// A failing handler is logged with the event id and its name; the remaining
/// handlers still run.
pub async fn dispatch(handlers: &HandlerRegistry, event: &Event) -> DispatchOutcome {
    let mut outcome = DispatchOutcome::default();

    for handler in handlers.matching(event) {
        outcome.handled += 1;
        match handler.handle(event).await {
            Ok(mut produced) => {
                if !produced.is_empty() {
                    debug!(
                        event_id = event.msg_id(),
                        handler = handler.name(),
                        count = produced.len(),
                        "handler produced follow-up events"
                    );
                }
                outcome.follow_ups.append(&mut produced);
            }
            Err(RebuildError::Cancelled) => {
                outcome.failed += 1;
                info!(
                    event_id = event.msg_id(),
                    handler = handler.name(),
                    "handler cancelled by shutdown"
                );
            }
            Err(err) => {
                outcome.failed += 1;
                error!(
                    event_id = event.msg_id(),
                    event_kind = event.kind().name(),
                    handler = handler.name(),
                    error = %err,
                    "handler failed"
                );
            }
        }
    }

    if outcome.handled == 0 {
        debug!(event_id = event.msg_id(), %event, "no handler accepts event");
    }
    outcome
}
