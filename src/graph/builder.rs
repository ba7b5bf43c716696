// src/graph/builder.rs

//! Discovery of the artifacts affected by a change.

use std::collections::BTreeSet;
use std::sync::Arc;

use futures::future::try_join_all;
use tracing::{debug, info};

use crate::errors::{RebuildError, Result};
use crate::events::Advisory;
use crate::graph::batching::{BatchPlan, PlanNode, batch_nodes};
use crate::rules::{Attributes, RuleMatcher};
use crate::services::{ImageRecord, ModuleRecord, Services};
use crate::types::ArtifactType;

/// Queries the external inventories and orders what they return.
///
/// Every method applies the rule tables for the calling handler, so denied
/// advisories never contribute content and denied artifacts never appear in
/// the plan.
#[derive(Debug, Clone)]
pub struct DependencyGraphBuilder {
    services: Services,
    rules: Arc<RuleMatcher>,
}

impl DependencyGraphBuilder {
    pub fn new(services: Services, rules: Arc<RuleMatcher>) -> Self {
        Self { services, rules }
    }

    pub fn rules(&self) -> &RuleMatcher {
        &self.rules
    }

    /// Images to rebuild because the RPM build `nvr` was signed.
    ///
    /// Empty unless every eligible advisory carrying the build is fully
    /// signed.
    pub async fn images_for_signed_rpm(
        &self,
        handler: &str,
        nvr: &str,
    ) -> Result<BatchPlan<ImageRecord>> {
        let advisories = self
            .services
            .release_tracker
            .advisories_for_build(nvr)
            .await?;
        let advisories = self.eligible_advisories(handler, advisories);
        if advisories.is_empty() {
            info!(handler, nvr, "no eligible advisories carry this build");
            return Ok(BatchPlan::empty());
        }

        if let Err(err) = self.ensure_all_signed(&advisories).await {
            return abandon_plan(err, nvr);
        }

        let srpm = self.services.build_system.srpm_name(nvr).await?;
        self.images_for(handler, &advisories, &[srpm]).await
    }

    /// Images to rebuild for every build attached to `advisory`.
    pub async fn images_for_advisory(
        &self,
        handler: &str,
        advisory: &Advisory,
    ) -> Result<BatchPlan<ImageRecord>> {
        let advisories = self.eligible_advisories(handler, vec![advisory.clone()]);
        if advisories.is_empty() {
            return Ok(BatchPlan::empty());
        }
        if let Err(err) = self.ensure_all_signed(&advisories).await {
            return abandon_plan(err, &advisory.name);
        }

        let nvrs = self
            .services
            .release_tracker
            .builds_in_advisory(advisory.id)
            .await?;
        let srpms: BTreeSet<String> = try_join_all(
            nvrs.iter()
                .map(|nvr| self.services.build_system.srpm_name(nvr)),
        )
        .await?
        .into_iter()
        .collect();
        let srpms: Vec<String> = srpms.into_iter().collect();

        self.images_for(handler, &advisories, &srpms).await
    }

    /// Latest releases of modules that build-require `name:stream`, directly
    /// or through another dependent, and still do so in their newest release.
    ///
    /// Dependents of dependents are followed until no new module turns up, so
    /// the whole chain lands in one plan with each module batched after the
    /// module it builds on.
    pub async fn modules_for_built_module(
        &self,
        handler: &str,
        name: &str,
        stream: &str,
    ) -> Result<BatchPlan<ModuleRecord>> {
        let root = format!("{name}:{stream}");
        let mut seen: BTreeSet<String> = BTreeSet::from([root.clone()]);
        let mut frontier = vec![(name.to_string(), stream.to_string())];
        let mut latest: Vec<ModuleRecord> = Vec::new();

        while !frontier.is_empty() {
            let found = try_join_all(
                frontier
                    .iter()
                    .map(|(n, s)| self.services.modules.modules_depending_on(n, s)),
            )
            .await?;
            let built: BTreeSet<String> =
                frontier.iter().map(|(n, s)| format!("{n}:{s}")).collect();

            let keys: BTreeSet<(String, String)> = found
                .into_iter()
                .flatten()
                .filter(|m| !seen.contains(&m.key()))
                .map(|m| (m.name, m.stream))
                .collect();
            let releases = try_join_all(
                keys.iter()
                    .map(|(n, s)| self.services.modules.module_releases(n, s)),
            )
            .await?;

            frontier = Vec::new();
            for module in releases.into_iter().filter_map(|r| r.into_iter().next()) {
                if !module.build_deps.iter().any(|d| built.contains(d)) {
                    debug!(module = %module.key(), "latest release no longer depends on the rebuilt module");
                    continue;
                }
                if seen.insert(module.key()) {
                    frontier.push((module.name.clone(), module.stream.clone()));
                    latest.push(module);
                }
            }
        }

        self.plan_modules(handler, latest)
    }

    /// Latest modules that include the package `rpm` built from `branch`.
    pub async fn modules_for_rpm(
        &self,
        handler: &str,
        rpm: &str,
        branch: &str,
    ) -> Result<BatchPlan<ModuleRecord>> {
        let modules = self
            .services
            .modules
            .latest_modules_with_rpm(rpm, branch)
            .await?;
        self.plan_modules(handler, modules)
    }

    fn eligible_advisories(&self, handler: &str, advisories: Vec<Advisory>) -> Vec<Advisory> {
        let mut eligible: Vec<Advisory> = advisories
            .into_iter()
            .filter(|a| {
                self.rules
                    .is_allowed(handler, ArtifactType::Image, &a.attributes())
            })
            .collect();
        eligible.sort_by_key(|a| a.id);
        eligible.dedup_by_key(|a| a.id);
        eligible
    }

    async fn ensure_all_signed(&self, advisories: &[Advisory]) -> Result<()> {
        let signed = try_join_all(
            advisories
                .iter()
                .map(|a| self.services.release_tracker.builds_signed(a.id)),
        )
        .await?;

        let unsigned: Vec<&str> = advisories
            .iter()
            .zip(signed)
            .filter(|(_, ok)| !ok)
            .map(|(a, _)| a.name.as_str())
            .collect();
        if unsigned.is_empty() {
            Ok(())
        } else {
            Err(RebuildError::PreconditionUnmet(format!(
                "not all builds are signed in {}",
                unsigned.join(", ")
            )))
        }
    }

    async fn images_for(
        &self,
        handler: &str,
        advisories: &[Advisory],
        srpms: &[String],
    ) -> Result<BatchPlan<ImageRecord>> {
        let repo_ids: BTreeSet<String> = try_join_all(
            advisories
                .iter()
                .map(|a| self.services.release_tracker.content_repo_ids(a.id)),
        )
        .await?
        .into_iter()
        .flatten()
        .collect();
        let repo_ids: Vec<String> = repo_ids.into_iter().collect();

        let mut content_sets = self
            .services
            .content_sets
            .content_sets_for_repos(&repo_ids)
            .await?;
        content_sets.sort();
        content_sets.dedup();
        info!(?content_sets, "changes will end up within content sets");
        if content_sets.is_empty() {
            return Ok(BatchPlan::empty());
        }

        let found = try_join_all(
            srpms
                .iter()
                .map(|srpm| self.services.images.images_containing(srpm, &content_sets)),
        )
        .await?;

        let nodes: Vec<PlanNode<ImageRecord>> = found
            .into_iter()
            .flatten()
            .map(|img| PlanNode::new(img.nvr.clone(), img.parent.clone(), img))
            .collect();

        // Image rules may also refer to the advisory that carries the change.
        let context = advisories
            .first()
            .map(Advisory::attributes)
            .unwrap_or_default();
        let plan = batch_nodes(nodes, |n| {
            let mut attrs = context.clone();
            attrs.extend(image_attributes(&n.item));
            self.rules.is_allowed(handler, ArtifactType::Image, &attrs)
        })?;
        log_plan(handler, &plan);
        Ok(plan)
    }

    fn plan_modules(
        &self,
        handler: &str,
        modules: Vec<ModuleRecord>,
    ) -> Result<BatchPlan<ModuleRecord>> {
        let keys: BTreeSet<String> = modules.iter().map(ModuleRecord::key).collect();
        let nodes: Vec<PlanNode<ModuleRecord>> = modules
            .into_iter()
            .map(|m| {
                let mut deps: Vec<&String> = m.build_deps.iter().collect();
                deps.sort();
                let parent = deps.into_iter().find(|d| keys.contains(*d)).cloned();
                PlanNode::new(m.key(), parent, m)
            })
            .collect();

        let plan = batch_nodes(nodes, |n| {
            self.rules
                .is_allowed(handler, ArtifactType::Module, &module_attributes(&n.item))
        })?;
        log_plan(handler, &plan);
        Ok(plan)
    }
}

fn abandon_plan<T>(err: RebuildError, subject: &str) -> Result<BatchPlan<T>> {
    match err {
        RebuildError::PreconditionUnmet(reason) => {
            info!(subject, %reason, "precondition unmet; not planning any rebuild yet");
            Ok(BatchPlan::empty())
        }
        other => Err(other),
    }
}

/// Attributes image rules are evaluated against.
pub fn image_attributes(image: &ImageRecord) -> Attributes {
    let mut attrs = Attributes::new();
    attrs.insert("image_nvr".into(), image.nvr.clone().into());
    attrs.insert("repository".into(), image.repository.clone().into());
    attrs.insert("is_base_image".into(), image.parent.is_none().into());
    if let Some(parent) = &image.parent {
        attrs.insert("parent".into(), parent.clone().into());
    }
    attrs
}

/// Attributes module rules are evaluated against.
pub fn module_attributes(module: &ModuleRecord) -> Attributes {
    let mut attrs = Attributes::new();
    attrs.insert("name".into(), module.name.clone().into());
    attrs.insert("stream".into(), module.stream.clone().into());
    if let Some(branch) = &module.branch {
        attrs.insert("branch".into(), branch.clone().into());
    }
    attrs
}

fn log_plan<T>(handler: &str, plan: &BatchPlan<T>) {
    if plan.is_empty() {
        info!(handler, "nothing to rebuild");
        return;
    }
    info!(handler, batches = plan.batches().len(), artifacts = plan.len(), "rebuild plan");
    for (i, batch) in plan.batches().iter().enumerate() {
        for artifact in batch {
            match &artifact.depends_on {
                Some(parent) => info!(batch = i, artifact = %artifact.name, based_on = %parent, "planned"),
                None => info!(batch = i, artifact = %artifact.name, "planned (base)"),
            }
        }
    }
}
