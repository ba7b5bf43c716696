// src/handlers/mod.rs

//! Reactions to events.
//!
//! A [`Handler`] says whether it cares about an event and reacts to it,
//! possibly returning follow-up events. The [`HandlerRegistry`] keeps them in
//! configured dispatch order; the consumer invokes every matching handler.

pub mod advisory;
pub mod compose;
pub mod images;
pub mod modules;

use std::sync::Arc;

use futures::future::BoxFuture;
use tokio::sync::watch;
use tracing::debug;

use crate::compose::ComposePoller;
use crate::errors::{RebuildError, Result};
use crate::events::Event;
use crate::graph::DependencyGraphBuilder;
use crate::rules::RuleMatcher;
use crate::services::Services;
use crate::store::BuildStore;

pub use advisory::UpdateDbOnAdvisoryChange;
pub use compose::UpdateDbOnComposeFail;
pub use images::{RebuildImagesOnAdvisorySigned, RebuildImagesOnRpmSigned};
pub use modules::{RebuildModules, UpdateDbOnModuleBuild};

pub trait Handler: Send + Sync {
    /// Registration key, also used as the handler key in rule tables.
    fn name(&self) -> &'static str;

    fn can_handle(&self, event: &Event) -> bool;

    /// React to `event`. Returned events are queued for dispatch.
    fn handle<'a>(&'a self, event: &'a Event) -> BoxFuture<'a, Result<Vec<Event>>>;
}

/// What handlers share: storage, rules, discovery and external services.
#[derive(Clone)]
pub struct HandlerContext {
    pub store: Arc<dyn BuildStore>,
    pub rules: Arc<RuleMatcher>,
    pub graph: DependencyGraphBuilder,
    pub poller: ComposePoller,
    pub services: Services,
    /// Base URL module SCM URLs are derived from.
    pub git_base_url: String,
    /// Flips to `true` on process shutdown.
    pub shutdown: watch::Receiver<bool>,
}

impl std::fmt::Debug for HandlerContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerContext")
            .field("git_base_url", &self.git_base_url)
            .field("poller", &self.poller)
            .finish_non_exhaustive()
    }
}

/// Handlers in dispatch order.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: Vec<Box<dyn Handler>>,
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("handlers", &self.names())
            .finish()
    }
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a handler. A handler with the same name is replaced in place.
    pub fn register(&mut self, handler: Box<dyn Handler>) {
        match self.handlers.iter().position(|h| h.name() == handler.name()) {
            Some(idx) => self.handlers[idx] = handler,
            None => self.handlers.push(handler),
        }
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.handlers.iter().map(|h| h.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Every handler willing to take `event`, in dispatch order.
    pub fn matching<'a>(&'a self, event: &'a Event) -> impl Iterator<Item = &'a dyn Handler> + 'a {
        self.handlers
            .iter()
            .map(|h| h.as_ref())
            .filter(move |h| {
                let yes = h.can_handle(event);
                if yes {
                    debug!(handler = h.name(), %event, "handler accepts event");
                }
                yes
            })
    }
}

type HandlerCtor = fn(&HandlerContext) -> Box<dyn Handler>;

const BUILTIN_HANDLERS: &[(&str, HandlerCtor)] = &[
    (UpdateDbOnAdvisoryChange::NAME, update_db_on_advisory_change),
    (RebuildImagesOnRpmSigned::NAME, rebuild_images_on_rpm_signed),
    (RebuildImagesOnAdvisorySigned::NAME, rebuild_images_on_advisory_signed),
    (UpdateDbOnModuleBuild::NAME, update_db_on_module_build),
    (RebuildModules::NAME, rebuild_modules),
    (UpdateDbOnComposeFail::NAME, update_db_on_compose_fail),
];

fn update_db_on_advisory_change(ctx: &HandlerContext) -> Box<dyn Handler> {
    Box::new(UpdateDbOnAdvisoryChange::new(ctx.clone()))
}

fn rebuild_images_on_rpm_signed(ctx: &HandlerContext) -> Box<dyn Handler> {
    Box::new(RebuildImagesOnRpmSigned::new(ctx.clone()))
}

fn rebuild_images_on_advisory_signed(ctx: &HandlerContext) -> Box<dyn Handler> {
    Box::new(RebuildImagesOnAdvisorySigned::new(ctx.clone()))
}

fn update_db_on_module_build(ctx: &HandlerContext) -> Box<dyn Handler> {
    Box::new(UpdateDbOnModuleBuild::new(ctx.clone()))
}

fn rebuild_modules(ctx: &HandlerContext) -> Box<dyn Handler> {
    Box::new(RebuildModules::new(ctx.clone()))
}

fn update_db_on_compose_fail(ctx: &HandlerContext) -> Box<dyn Handler> {
    Box::new(UpdateDbOnComposeFail::new(ctx.clone()))
}

/// Every built-in handler key, in default dispatch order.
pub fn builtin_handler_keys() -> Vec<&'static str> {
    BUILTIN_HANDLERS.iter().map(|(key, _)| *key).collect()
}

/// Build a registry from configured handler keys.
pub fn build_handlers(keys: &[String], ctx: &HandlerContext) -> Result<HandlerRegistry> {
    let mut registry = HandlerRegistry::new();
    for key in keys {
        let ctor = BUILTIN_HANDLERS
            .iter()
            .find(|(k, _)| *k == key.as_str())
            .map(|(_, ctor)| ctor)
            .ok_or_else(|| RebuildError::ConfigError(format!("unknown handler '{key}'")))?;
        registry.register(ctor(ctx));
    }
    Ok(registry)
}
