// src/handlers/images.rs

//! Container image rebuild planning.

use futures::future::BoxFuture;
use serde_json::json;
use tracing::{error, info, warn};

use crate::errors::{RebuildError, Result};
use crate::events::{Event, EventKind};
use crate::graph::BatchPlan;
use crate::handlers::{Handler, HandlerContext};
use crate::services::ImageRecord;
use crate::store::{ArtifactBuild, PlannedBuild};
use crate::types::{ArtifactBuildState, ArtifactType};

/// Rebuild images that contain a freshly signed RPM.
///
/// The plan is recorded first; then a compose with the new packages is
/// prepared as rebuild input.
#[derive(Debug, Clone)]
pub struct RebuildImagesOnRpmSigned {
    ctx: HandlerContext,
}

impl RebuildImagesOnRpmSigned {
    pub const NAME: &'static str = "rebuild_images_on_rpm_signed";

    pub fn new(ctx: HandlerContext) -> Self {
        Self { ctx }
    }

    async fn rebuild(&self, event: &Event, nvr: &str) -> Result<Vec<Event>> {
        let plan = self.ctx.graph.images_for_signed_rpm(Self::NAME, nvr).await?;
        if plan.is_empty() {
            info!(nvr, "no images to rebuild");
            return Ok(Vec::new());
        }

        let builds = record_image_plan(&self.ctx, event, &plan)?;
        self.prepare_compose(nvr, &builds).await?;
        Ok(Vec::new())
    }

    async fn prepare_compose(&self, nvr: &str, builds: &[ArtifactBuild]) -> Result<()> {
        let build_system = &self.ctx.services.build_system;
        let Some(tag) = build_system.compose_source_tag(nvr).await? else {
            error!(nvr, "build is not the latest build in its candidate tag; plan left unprepared");
            return Ok(());
        };
        let packages = build_system.rpm_names(nvr).await?;

        let ticket = self.ctx.poller.submit(&tag, &packages).await?;
        for build in builds {
            self.ctx
                .store
                .set_build_arg(build.id, "compose_id", json!(ticket.compose_id))?;
        }

        match self.ctx.poller.wait(&ticket, self.ctx.shutdown.clone()).await {
            Ok(repo) => {
                info!(compose_id = ticket.compose_id, %repo, "rebuild input repository ready");
                for build in builds {
                    self.ctx.store.set_build_arg(build.id, "compose_repo", json!(repo))?;
                }
                Ok(())
            }
            Err(RebuildError::ComposeFailed { compose_url }) => {
                let reason = format!("compose {compose_url} failed");
                for build in builds {
                    self.ctx
                        .store
                        .advance(build.id, ArtifactBuildState::Failed, Some(reason.clone()))?;
                }
                Ok(())
            }
            Err(err @ RebuildError::PollTimeout { .. }) => {
                // The compose may still finish; a compose-state event settles it.
                warn!(compose_id = ticket.compose_id, error = %err, "builds stay planned");
                Ok(())
            }
            Err(RebuildError::Cancelled) => {
                info!(compose_id = ticket.compose_id, "shutdown while waiting for compose");
                Ok(())
            }
            Err(err) => Err(err),
        }
    }
}

impl Handler for RebuildImagesOnRpmSigned {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn can_handle(&self, event: &Event) -> bool {
        matches!(event.kind(), EventKind::RpmSigned { .. })
    }

    fn handle<'a>(&'a self, event: &'a Event) -> BoxFuture<'a, Result<Vec<Event>>> {
        Box::pin(async move {
            match event.kind() {
                EventKind::RpmSigned { nvr } => self.rebuild(event, nvr).await,
                _ => Ok(Vec::new()),
            }
        })
    }
}

/// Plan image rebuilds once every build of an advisory is signed.
#[derive(Debug, Clone)]
pub struct RebuildImagesOnAdvisorySigned {
    ctx: HandlerContext,
}

impl RebuildImagesOnAdvisorySigned {
    pub const NAME: &'static str = "rebuild_images_on_advisory_signed";

    pub fn new(ctx: HandlerContext) -> Self {
        Self { ctx }
    }
}

impl Handler for RebuildImagesOnAdvisorySigned {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn can_handle(&self, event: &Event) -> bool {
        matches!(event.kind(), EventKind::AdvisoryRpmsSigned { .. })
    }

    fn handle<'a>(&'a self, event: &'a Event) -> BoxFuture<'a, Result<Vec<Event>>> {
        Box::pin(async move {
            let EventKind::AdvisoryRpmsSigned { advisory } = event.kind() else {
                return Ok(Vec::new());
            };
            let plan = self.ctx.graph.images_for_advisory(Self::NAME, advisory).await?;
            if !plan.is_empty() {
                record_image_plan(&self.ctx, event, &plan)?;
            }
            Ok(Vec::new())
        })
    }
}

/// Persist an image plan, all builds `PLANNED`.
fn record_image_plan(
    ctx: &HandlerContext,
    event: &Event,
    plan: &BatchPlan<ImageRecord>,
) -> Result<Vec<ArtifactBuild>> {
    let members = plan
        .iter()
        .map(|artifact| PlannedBuild {
            name: artifact.name.clone(),
            artifact_type: ArtifactType::Image,
            batch: artifact.batch,
            parent: artifact.depends_on.clone(),
            build_args: json!({
                "repository": artifact.item.repository,
                "commit": artifact.item.commit,
                "parent": artifact.item.parent,
            }),
        })
        .collect();
    ctx.store.record_plan(event.msg_id(), members)
}
