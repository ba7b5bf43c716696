// src/engine/mod.rs

//! Message consumption engine for rebuildd.
//!
//! This module ties together:
//! - the parser registry (raw message -> typed event)
//! - the handler registry (event -> reactions, possibly follow-up events)
//! - the main runtime loop that reacts to:
//!   - inbound transport messages
//!   - end of input
//!   - shutdown signals
//!
//! The consumer, which owns the work queue and the counters, lives in
//! [`core`]; per-event handler fan-out is in [`dispatch`]; the async shell
//! reading from the channel is [`runtime`].

use crate::transport::InboundMessage;

/// Events flowing into the runtime from the transport and signal handlers.
#[derive(Debug, Clone)]
pub enum ConsumerEvent {
    /// A raw message read from the transport.
    Message(InboundMessage),
    /// The transport has no more messages.
    InputClosed,
    /// Graceful shutdown requested (e.g. Ctrl-C).
    ShutdownRequested,
}

pub mod core;
pub mod dispatch;
pub mod runtime;

pub use self::core::{Consumer, ConsumerStats};
pub use dispatch::{DispatchOutcome, dispatch};
pub use runtime::Runtime;
