// src/handlers/modules.rs

//! Module rebuilds: planning, submission and completion tracking.

use futures::future::BoxFuture;
use serde_json::{Value, json};
use tracing::{info, warn};

use crate::errors::{RebuildError, Result};
use crate::events::{Event, EventKind, ModuleState};
use crate::graph::BatchPlan;
use crate::handlers::{Handler, HandlerContext};
use crate::rules::Attributes;
use crate::services::ModuleRecord;
use crate::store::{ArtifactBuild, BuildFilter, NewBuild, PlannedBuild};
use crate::types::{ArtifactBuildState, ArtifactType};

/// Rebuild modules affected by a module build, an RPM spec file change or a module
/// metadata push.
///
/// Batch 0 is submitted right away; later batches are submitted by
/// [`UpdateDbOnModuleBuild`] as their parents finish.
#[derive(Debug, Clone)]
pub struct RebuildModules {
    ctx: HandlerContext,
}

impl RebuildModules {
    pub const NAME: &'static str = "rebuild_modules";

    pub fn new(ctx: HandlerContext) -> Self {
        Self { ctx }
    }

    async fn on_module_ready(&self, event: &Event, build_id: u64, name: &str, stream: &str) -> Result<()> {
        // Our own rebuilds continue their plan through the completion handler.
        let ours = BuildFilter::new()
            .artifact_type(ArtifactType::Module)
            .external_build_id(build_id);
        if !self.ctx.store.find_builds(&ours)?.is_empty() {
            info!(build_id, "module build belongs to an existing plan");
            return Ok(());
        }

        let plan = self
            .ctx
            .graph
            .modules_for_built_module(Self::NAME, name, stream)
            .await?;
        self.record_and_submit(event, plan).await
    }

    async fn on_spec_updated(&self, event: &Event, rpm: &str, branch: &str) -> Result<()> {
        let plan = self.ctx.graph.modules_for_rpm(Self::NAME, rpm, branch).await?;
        self.record_and_submit(event, plan).await
    }

    async fn on_metadata_updated(&self, event: &Event, scm_url: &str, branch: &str) -> Result<()> {
        let name = module_name_from_scm_url(scm_url);
        let mut attrs = Attributes::new();
        attrs.insert("name".into(), name.clone().into());
        attrs.insert("branch".into(), branch.into());
        if !self.ctx.rules.is_allowed(Self::NAME, ArtifactType::Module, &attrs) {
            return Ok(());
        }

        let build = self.ctx.store.record_build(
            event.msg_id(),
            NewBuild::planned(name, ArtifactType::Module)
                .with_args(json!({ "scm_url": scm_url, "branch": branch })),
        )?;
        submit_all(&self.ctx, std::slice::from_ref(&build)).await
    }

    async fn record_and_submit(&self, event: &Event, plan: BatchPlan<ModuleRecord>) -> Result<()> {
        if plan.is_empty() {
            return Ok(());
        }

        let mut members = Vec::with_capacity(plan.len());
        for artifact in plan.iter() {
            let module = &artifact.item;
            let branch = module.branch.clone().unwrap_or_else(|| module.stream.clone());
            let repo_url = format!("{}/modules/{}.git", self.ctx.git_base_url, module.name);
            let commit = self
                .ctx
                .services
                .source_control
                .latest_commit(&repo_url, &branch)
                .await?;
            members.push(PlannedBuild {
                name: artifact.name.clone(),
                artifact_type: ArtifactType::Module,
                batch: artifact.batch,
                parent: artifact.depends_on.clone(),
                build_args: json!({
                    "scm_url": format!("{repo_url}?#{commit}"),
                    "branch": branch,
                }),
            });
        }

        let builds = self.ctx.store.record_plan(event.msg_id(), members)?;
        let first_batch: Vec<ArtifactBuild> = builds.into_iter().filter(|b| b.batch == 0).collect();
        submit_all(&self.ctx, &first_batch).await
    }
}

impl Handler for RebuildModules {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn can_handle(&self, event: &Event) -> bool {
        matches!(
            event.kind(),
            EventKind::ModuleBuilt { state: ModuleState::Ready, .. }
                | EventKind::RpmSpecUpdated { .. }
                | EventKind::ModuleMetadataUpdated { .. }
        )
    }

    fn handle<'a>(&'a self, event: &'a Event) -> BoxFuture<'a, Result<Vec<Event>>> {
        Box::pin(async move {
            match event.kind() {
                EventKind::ModuleBuilt { build_id, name, stream, .. } => {
                    self.on_module_ready(event, *build_id, name, stream).await?
                }
                EventKind::RpmSpecUpdated { rpm, branch, .. } => {
                    self.on_spec_updated(event, rpm, branch).await?
                }
                EventKind::ModuleMetadataUpdated { scm_url, branch } => {
                    self.on_metadata_updated(event, scm_url, branch).await?
                }
                _ => {}
            }
            Ok(Vec::new())
        })
    }
}

/// Settle module builds we submitted when the build service reports them.
#[derive(Debug, Clone)]
pub struct UpdateDbOnModuleBuild {
    ctx: HandlerContext,
}

impl UpdateDbOnModuleBuild {
    pub const NAME: &'static str = "update_db_on_module_build";

    pub fn new(ctx: HandlerContext) -> Self {
        Self { ctx }
    }

    async fn settle(&self, build_id: u64, state: ModuleState) -> Result<()> {
        let running = BuildFilter::new()
            .artifact_type(ArtifactType::Module)
            .state(ArtifactBuildState::Building)
            .external_build_id(build_id);

        for build in self.ctx.store.find_builds(&running)? {
            let children = planned_children(&self.ctx, &build)?;
            if state == ModuleState::Ready {
                self.ctx.store.advance(build.id, ArtifactBuildState::Done, None)?;
                submit_all(&self.ctx, &children).await?;
            } else {
                let reason = format!("module build {build_id} failed");
                self.ctx
                    .store
                    .advance(build.id, ArtifactBuildState::Failed, Some(reason))?;
                fail_descendants(&self.ctx, &children)?;
            }
        }
        Ok(())
    }
}

impl Handler for UpdateDbOnModuleBuild {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn can_handle(&self, event: &Event) -> bool {
        matches!(
            event.kind(),
            EventKind::ModuleBuilt {
                state: ModuleState::Ready | ModuleState::Failed,
                ..
            }
        )
    }

    fn handle<'a>(&'a self, event: &'a Event) -> BoxFuture<'a, Result<Vec<Event>>> {
        Box::pin(async move {
            if let EventKind::ModuleBuilt { build_id, state, .. } = event.kind() {
                self.settle(*build_id, *state).await?;
            }
            Ok(Vec::new())
        })
    }
}

/// Submit every build in `builds`.
///
/// A build the service refuses goes to FAILED and takes its planned
/// descendants with it; the rest are still submitted. The first submission
/// error is returned once all builds have been tried.
async fn submit_all(ctx: &HandlerContext, builds: &[ArtifactBuild]) -> Result<()> {
    let mut first_err = None;
    for build in builds {
        if let Err(err) = submit(ctx, build).await {
            warn!(build = build.id, name = %build.name, error = %err, "module rebuild submission failed");
            ctx.store.advance(
                build.id,
                ArtifactBuildState::Failed,
                Some(format!("submission failed: {err}")),
            )?;
            fail_descendants(ctx, &planned_children(ctx, build)?)?;
            first_err.get_or_insert(err);
        }
    }
    match first_err {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

fn planned_children(ctx: &HandlerContext, parent: &ArtifactBuild) -> Result<Vec<ArtifactBuild>> {
    Ok(ctx
        .store
        .builds_for_event(&parent.event_id)?
        .into_iter()
        .filter(|b| b.depends_on == Some(parent.id) && b.state == ArtifactBuildState::Planned)
        .collect())
}

fn fail_descendants(ctx: &HandlerContext, children: &[ArtifactBuild]) -> Result<()> {
    let mut pending: Vec<ArtifactBuild> = children.to_vec();
    while let Some(child) = pending.pop() {
        let reason = format!("dependency {} failed", child.depends_on.unwrap_or_default());
        ctx.store
            .advance(child.id, ArtifactBuildState::Failed, Some(reason))?;
        pending.extend(planned_children(ctx, &child)?);
    }
    Ok(())
}

async fn submit(ctx: &HandlerContext, build: &ArtifactBuild) -> Result<()> {
    let scm_url = string_arg(build, "scm_url")?;
    let branch = string_arg(build, "branch")?;
    let external_id = ctx.services.module_builds.submit(&scm_url, &branch).await?;
    ctx.store.mark_submitted(build.id, external_id)?;
    info!(build = build.id, name = %build.name, external_id, "module rebuild submitted");
    Ok(())
}

fn string_arg(build: &ArtifactBuild, key: &str) -> Result<String> {
    build
        .build_arg(key)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| {
            warn!(build = build.id, key, "build is missing a submission argument");
            RebuildError::PlanInvariant(format!("build {} has no '{key}' argument", build.id))
        })
}

/// `git://host/modules/foo.git?#abc` -> `foo`.
fn module_name_from_scm_url(scm_url: &str) -> String {
    let path = scm_url.split(['?', '#']).next().unwrap_or(scm_url);
    let last = path.trim_end_matches('/').rsplit('/').next().unwrap_or(path);
    last.trim_end_matches(".git").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn module_name_is_last_path_segment() {
        assert_eq!(
            module_name_from_scm_url("git://pkgs.fedoraproject.org/modules/testmodule.git?#abc123"),
            "testmodule"
        );
        assert_eq!(module_name_from_scm_url("https://src/modules/foo"), "foo");
    }
}
