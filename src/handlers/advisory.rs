// src/handlers/advisory.rs

use futures::future::BoxFuture;
use tracing::{debug, info};

use crate::errors::Result;
use crate::events::{Advisory, Event, EventKind};
use crate::handlers::{Handler, HandlerContext};
use crate::types::ArtifactType;

/// Track advisory lifecycle.
///
/// - `SHIPPED_LIVE`: events about the advisory's builds are marked released.
/// - otherwise: once the advisory is allowed and fully signed, emit
///   `AdvisoryRpmsSigned` so image handlers can plan from it.
#[derive(Debug, Clone)]
pub struct UpdateDbOnAdvisoryChange {
    ctx: HandlerContext,
}

impl UpdateDbOnAdvisoryChange {
    pub const NAME: &'static str = "update_db_on_advisory_change";

    pub fn new(ctx: HandlerContext) -> Self {
        Self { ctx }
    }

    async fn mark_released(&self, advisory: &Advisory) -> Result<()> {
        let nvrs = self
            .ctx
            .services
            .release_tracker
            .builds_in_advisory(advisory.id)
            .await?;

        let mut released = 0usize;
        for nvr in &nvrs {
            for event in self.ctx.store.events_by_search_key(nvr)? {
                if self.ctx.store.mark_released(event.msg_id())? {
                    released += 1;
                }
            }
        }
        info!(advisory = %advisory.name, builds = nvrs.len(), released, "advisory shipped");
        Ok(())
    }

    async fn signed_follow_up(&self, advisory: &Advisory) -> Result<Vec<Event>> {
        if !self
            .ctx
            .rules
            .is_allowed(Self::NAME, ArtifactType::Image, &advisory.attributes())
        {
            return Ok(Vec::new());
        }

        let signed = self
            .ctx
            .services
            .release_tracker
            .builds_signed(advisory.id)
            .await?;
        if !signed {
            debug!(advisory = %advisory.name, "advisory not fully signed yet");
            return Ok(Vec::new());
        }

        info!(advisory = %advisory.name, "all builds of advisory are signed");
        Ok(vec![Event::new(
            Event::local_msg_id(),
            EventKind::AdvisoryRpmsSigned {
                advisory: advisory.clone(),
            },
        )])
    }
}

impl Handler for UpdateDbOnAdvisoryChange {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn can_handle(&self, event: &Event) -> bool {
        matches!(event.kind(), EventKind::AdvisoryStateChanged { .. })
    }

    fn handle<'a>(&'a self, event: &'a Event) -> BoxFuture<'a, Result<Vec<Event>>> {
        Box::pin(async move {
            let EventKind::AdvisoryStateChanged { advisory } = event.kind() else {
                return Ok(Vec::new());
            };
            if advisory.is_shipped() {
                self.mark_released(advisory).await?;
                Ok(Vec::new())
            } else {
                self.signed_follow_up(advisory).await
            }
        })
    }
}
