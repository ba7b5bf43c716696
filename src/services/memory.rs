// src/services/memory.rs

//! In-memory implementation of every external service.
//!
//! The state is loaded from a JSON snapshot (`--inventory`), so a recorded
//! message stream can be replayed without network access. Compose jobs
//! follow scripted status-code sequences.

use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::compose::ComposeStatus;
use crate::errors::{RebuildError, Result};
use crate::events::Advisory;
use crate::services::{
    BuildSystem, ComposeService, ContentSetResolver, ImageInventory, ImageRecord,
    ModuleBuildService, ModuleInventory, ModuleRecord, ReleaseTracker, SourceControl,
};

/// An advisory together with what the release tracker knows about it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdvisoryRecord {
    #[serde(flatten)]
    pub advisory: Advisory,
    /// NVRs attached to the advisory.
    #[serde(default)]
    pub builds: Vec<String>,
    #[serde(default)]
    pub all_signed: bool,
    #[serde(default)]
    pub repo_ids: Vec<String>,
}

/// A package build known to the build system.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageBuild {
    pub nvr: String,
    pub srpm: String,
    #[serde(default)]
    pub rpms: Vec<String>,
    /// Candidate tag in which this build is the latest, if any.
    #[serde(default)]
    pub candidate_tag: Option<String>,
}

/// Scripted compose behaviour.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComposeSettings {
    #[serde(default = "default_compose_server")]
    pub server_url: String,
    /// One status-code sequence per submitted compose, consumed in order.
    /// Composes submitted after the scripts run out finish immediately.
    #[serde(default)]
    pub scripts: Vec<Vec<i64>>,
}

fn default_compose_server() -> String {
    "https://odcs.localhost".to_string()
}

impl Default for ComposeSettings {
    fn default() -> Self {
        Self {
            server_url: default_compose_server(),
            scripts: Vec::new(),
        }
    }
}

/// Everything [`MemoryServices`] serves, as read from JSON.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventorySnapshot {
    #[serde(default)]
    pub advisories: Vec<AdvisoryRecord>,
    /// Repository id -> content sets.
    #[serde(default)]
    pub content_sets: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub images: Vec<ImageRecord>,
    #[serde(default)]
    pub builds: Vec<PackageBuild>,
    #[serde(default)]
    pub modules: Vec<ModuleRecord>,
    /// `"{repo_url}#{branch}"` -> head commit.
    #[serde(default)]
    pub commits: BTreeMap<String, String>,
    #[serde(default)]
    pub compose: ComposeSettings,
    /// Module repositories whose build submissions the build service refuses.
    #[serde(default)]
    pub rejected_module_repos: BTreeSet<String>,
}

impl InventorySnapshot {
    pub fn from_json_path(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&contents)?)
    }
}

#[derive(Debug)]
struct ComposeJob {
    codes: VecDeque<i64>,
    result_repo: String,
}

#[derive(Debug, Default)]
struct MutableState {
    scripts: VecDeque<Vec<i64>>,
    composes: HashMap<u64, ComposeJob>,
    requested_composes: Vec<(String, Vec<String>)>,
    next_compose_id: u64,
    submitted_modules: Vec<(String, String)>,
    next_module_build_id: u64,
}

#[derive(Debug)]
pub struct MemoryServices {
    snapshot: InventorySnapshot,
    state: Mutex<MutableState>,
}

impl MemoryServices {
    pub fn new(snapshot: InventorySnapshot) -> Self {
        let state = MutableState {
            scripts: snapshot.compose.scripts.iter().cloned().collect(),
            next_compose_id: 1,
            next_module_build_id: 1,
            ..MutableState::default()
        };
        Self {
            snapshot,
            state: Mutex::new(state),
        }
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(Self::new(serde_json::from_str(json)?))
    }

    pub fn from_json_path(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self::new(InventorySnapshot::from_json_path(path)?))
    }

    pub fn snapshot(&self) -> &InventorySnapshot {
        &self.snapshot
    }

    /// `(source, packages)` of every compose requested so far.
    pub fn requested_composes(&self) -> Vec<(String, Vec<String>)> {
        self.state().requested_composes.clone()
    }

    /// `(scm_url, branch)` of every module build submitted so far.
    pub fn submitted_module_builds(&self) -> Vec<(String, String)> {
        self.state().submitted_modules.clone()
    }

    fn state(&self) -> MutexGuard<'_, MutableState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn advisory(&self, advisory_id: u64) -> Result<&AdvisoryRecord> {
        self.snapshot
            .advisories
            .iter()
            .find(|a| a.advisory.id == advisory_id)
            .ok_or_else(|| {
                RebuildError::external("release-tracker", format!("unknown advisory {advisory_id}"))
            })
    }

    fn package_build(&self, nvr: &str) -> Result<&PackageBuild> {
        self.snapshot
            .builds
            .iter()
            .find(|b| b.nvr == nvr)
            .ok_or_else(|| RebuildError::external("build-system", format!("unknown build {nvr}")))
    }
}

impl ReleaseTracker for MemoryServices {
    fn advisories_for_build<'a>(&'a self, nvr: &'a str) -> BoxFuture<'a, Result<Vec<Advisory>>> {
        Box::pin(async move {
            Ok(self
                .snapshot
                .advisories
                .iter()
                .filter(|a| a.builds.iter().any(|b| b == nvr))
                .map(|a| a.advisory.clone())
                .collect())
        })
    }

    fn builds_signed(&self, advisory_id: u64) -> BoxFuture<'_, Result<bool>> {
        Box::pin(async move { Ok(self.advisory(advisory_id)?.all_signed) })
    }

    fn content_repo_ids(&self, advisory_id: u64) -> BoxFuture<'_, Result<Vec<String>>> {
        Box::pin(async move { Ok(self.advisory(advisory_id)?.repo_ids.clone()) })
    }

    fn builds_in_advisory(&self, advisory_id: u64) -> BoxFuture<'_, Result<Vec<String>>> {
        Box::pin(async move { Ok(self.advisory(advisory_id)?.builds.clone()) })
    }
}

impl ContentSetResolver for MemoryServices {
    fn content_sets_for_repos<'a>(
        &'a self,
        repo_ids: &'a [String],
    ) -> BoxFuture<'a, Result<Vec<String>>> {
        Box::pin(async move {
            let sets: BTreeSet<String> = repo_ids
                .iter()
                .filter_map(|id| self.snapshot.content_sets.get(id))
                .flatten()
                .cloned()
                .collect();
            Ok(sets.into_iter().collect())
        })
    }
}

impl ImageInventory for MemoryServices {
    fn images_containing<'a>(
        &'a self,
        srpm: &'a str,
        content_sets: &'a [String],
    ) -> BoxFuture<'a, Result<Vec<ImageRecord>>> {
        Box::pin(async move {
            let mut found: BTreeSet<&str> = self
                .snapshot
                .images
                .iter()
                .filter(|img| img.srpms.iter().any(|s| s == srpm))
                .filter(|img| img.content_sets.iter().any(|cs| content_sets.contains(cs)))
                .map(|img| img.nvr.as_str())
                .collect();

            // Images layered on an affected image embed the package too.
            loop {
                let before = found.len();
                for img in &self.snapshot.images {
                    if let Some(parent) = img.parent.as_deref() {
                        if found.contains(parent) {
                            found.insert(img.nvr.as_str());
                        }
                    }
                }
                if found.len() == before {
                    break;
                }
            }

            let mut images: Vec<ImageRecord> = self
                .snapshot
                .images
                .iter()
                .filter(|img| found.contains(img.nvr.as_str()))
                .cloned()
                .collect();
            images.sort_by(|a, b| a.nvr.cmp(&b.nvr));
            Ok(images)
        })
    }
}

impl BuildSystem for MemoryServices {
    fn srpm_name<'a>(&'a self, nvr: &'a str) -> BoxFuture<'a, Result<String>> {
        Box::pin(async move { Ok(self.package_build(nvr)?.srpm.clone()) })
    }

    fn rpm_names<'a>(&'a self, nvr: &'a str) -> BoxFuture<'a, Result<Vec<String>>> {
        Box::pin(async move {
            let names: BTreeSet<String> = self.package_build(nvr)?.rpms.iter().cloned().collect();
            Ok(names.into_iter().collect())
        })
    }

    fn compose_source_tag<'a>(&'a self, nvr: &'a str) -> BoxFuture<'a, Result<Option<String>>> {
        Box::pin(async move { Ok(self.package_build(nvr)?.candidate_tag.clone()) })
    }
}

impl ComposeService for MemoryServices {
    fn new_compose<'a>(
        &'a self,
        source: &'a str,
        packages: &'a [String],
    ) -> BoxFuture<'a, Result<u64>> {
        Box::pin(async move {
            let server = self.snapshot.compose.server_url.trim_end_matches('/');
            let mut state = self.state();
            let id = state.next_compose_id;
            state.next_compose_id += 1;

            let codes = state.scripts.pop_front().unwrap_or_else(|| vec![2]);
            state.composes.insert(
                id,
                ComposeJob {
                    codes: codes.into_iter().collect(),
                    result_repo: format!("{server}/composes/odcs-{id}/compose/Temporary/odcs-{id}.repo"),
                },
            );
            state
                .requested_composes
                .push((source.to_string(), packages.to_vec()));

            debug!(compose_id = id, source, ?packages, "compose requested");
            Ok(id)
        })
    }

    fn get_compose(&self, compose_id: u64) -> BoxFuture<'_, Result<ComposeStatus>> {
        Box::pin(async move {
            let mut state = self.state();
            let job = state.composes.get_mut(&compose_id).ok_or_else(|| {
                RebuildError::external("compose", format!("unknown compose {compose_id}"))
            })?;

            // The last scripted code repeats forever.
            let code = if job.codes.len() > 1 {
                job.codes.pop_front()
            } else {
                job.codes.front().copied()
            }
            .unwrap_or(2);

            Ok(ComposeStatus {
                id: compose_id,
                state: code,
                result_repo: (code == 2).then(|| job.result_repo.clone()),
            })
        })
    }

    fn compose_url(&self, compose_id: u64) -> String {
        format!(
            "{}/odcs/1/composes/{compose_id}",
            self.snapshot.compose.server_url.trim_end_matches('/')
        )
    }
}

impl ModuleInventory for MemoryServices {
    fn modules_depending_on<'a>(
        &'a self,
        name: &'a str,
        stream: &'a str,
    ) -> BoxFuture<'a, Result<Vec<ModuleRecord>>> {
        Box::pin(async move {
            let key = format!("{name}:{stream}");
            let mut deps: Vec<ModuleRecord> = self
                .snapshot
                .modules
                .iter()
                .filter(|m| m.build_deps.contains(&key))
                .cloned()
                .collect();
            deps.sort_by(|a, b| a.key().cmp(&b.key()).then(b.version.cmp(&a.version)));
            Ok(deps)
        })
    }

    fn module_releases<'a>(
        &'a self,
        name: &'a str,
        stream: &'a str,
    ) -> BoxFuture<'a, Result<Vec<ModuleRecord>>> {
        Box::pin(async move {
            let mut releases: Vec<ModuleRecord> = self
                .snapshot
                .modules
                .iter()
                .filter(|m| m.name == name && m.stream == stream)
                .cloned()
                .collect();
            releases.sort_by(|a, b| b.version.cmp(&a.version));
            Ok(releases)
        })
    }

    fn latest_modules_with_rpm<'a>(
        &'a self,
        rpm: &'a str,
        branch: &'a str,
    ) -> BoxFuture<'a, Result<Vec<ModuleRecord>>> {
        Box::pin(async move {
            let mut latest: BTreeMap<String, &ModuleRecord> = BTreeMap::new();
            for module in &self.snapshot.modules {
                let entry = latest.entry(module.key()).or_insert(module);
                if module.version > entry.version {
                    *entry = module;
                }
            }
            Ok(latest
                .into_values()
                .filter(|m| m.rpms.iter().any(|r| r == rpm))
                .filter(|m| m.branch.as_deref().unwrap_or(&m.stream) == branch)
                .cloned()
                .collect())
        })
    }
}

impl SourceControl for MemoryServices {
    fn latest_commit<'a>(
        &'a self,
        repo_url: &'a str,
        branch: &'a str,
    ) -> BoxFuture<'a, Result<String>> {
        Box::pin(async move {
            self.snapshot
                .commits
                .get(&format!("{repo_url}#{branch}"))
                .cloned()
                .ok_or_else(|| {
                    RebuildError::external(
                        "source-control",
                        format!("no commit known for {repo_url} branch {branch}"),
                    )
                })
        })
    }
}

impl ModuleBuildService for MemoryServices {
    fn submit<'a>(&'a self, scm_url: &'a str, branch: &'a str) -> BoxFuture<'a, Result<u64>> {
        Box::pin(async move {
            let repo = scm_url.split("?#").next().unwrap_or(scm_url);
            if self.snapshot.rejected_module_repos.contains(repo) {
                return Err(RebuildError::external(
                    "module-build-service",
                    format!("submission of {scm_url} rejected"),
                ));
            }
            let mut state = self.state();
            let id = state.next_module_build_id;
            state.next_module_build_id += 1;
            state
                .submitted_modules
                .push((scm_url.to_string(), branch.to_string()));
            debug!(module_build_id = id, scm_url, branch, "module build submitted");
            Ok(id)
        })
    }
}
