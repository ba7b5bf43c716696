// src/handlers/compose.rs

use futures::future::BoxFuture;
use serde_json::json;
use tracing::info;

use crate::compose::ComposeState;
use crate::errors::Result;
use crate::events::{Event, EventKind};
use crate::handlers::{Handler, HandlerContext};
use crate::store::BuildFilter;
use crate::types::ArtifactBuildState;

/// Fail planned builds whose input compose failed after we stopped waiting.
#[derive(Debug, Clone)]
pub struct UpdateDbOnComposeFail {
    ctx: HandlerContext,
}

impl UpdateDbOnComposeFail {
    pub const NAME: &'static str = "update_db_on_compose_fail";

    pub fn new(ctx: HandlerContext) -> Self {
        Self { ctx }
    }
}

impl Handler for UpdateDbOnComposeFail {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn can_handle(&self, event: &Event) -> bool {
        matches!(
            event.kind(),
            EventKind::ComposeStateChanged { state: ComposeState::Failed, .. }
        )
    }

    fn handle<'a>(&'a self, event: &'a Event) -> BoxFuture<'a, Result<Vec<Event>>> {
        Box::pin(async move {
            let EventKind::ComposeStateChanged { compose_id, .. } = event.kind() else {
                return Ok(Vec::new());
            };

            let filter = BuildFilter::new()
                .state(ArtifactBuildState::Planned)
                .build_arg("compose_id", json!(compose_id));
            let builds = self.ctx.store.find_builds(&filter)?;

            let reason = format!(
                "compose {} failed",
                self.ctx.services.compose.compose_url(*compose_id)
            );
            for build in &builds {
                self.ctx
                    .store
                    .advance(build.id, ArtifactBuildState::Failed, Some(reason.clone()))?;
            }
            info!(compose_id, failed = builds.len(), "planned builds failed with their compose");
            Ok(Vec::new())
        })
    }
}
