// src/services/mod.rs

//! Interfaces to the external systems the orchestrator consults.
//!
//! Only payload shapes matter here; real network clients live outside this
//! crate. [`memory::MemoryServices`] implements every trait from a JSON
//! snapshot and backs tests and offline replay.

pub mod memory;

use std::sync::Arc;

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};

use crate::compose::ComposeStatus;
use crate::errors::Result;
use crate::events::Advisory;

pub use memory::MemoryServices;

/// A container image known to the image inventory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageRecord {
    /// Build NVR of the image, unique within the inventory.
    pub nvr: String,
    pub repository: String,
    pub commit: String,
    /// NVR of the image this one is layered on.
    #[serde(default)]
    pub parent: Option<String>,
    /// Content sets the image pulls packages from.
    #[serde(default)]
    pub content_sets: Vec<String>,
    /// Source package names of the RPMs installed in the image.
    #[serde(default)]
    pub srpms: Vec<String>,
}

/// One built module release.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleRecord {
    pub name: String,
    pub stream: String,
    pub version: u64,
    /// Name of the dist-git branch the module is built from.
    #[serde(default)]
    pub branch: Option<String>,
    /// `name:stream` of modules this one build-requires.
    #[serde(default)]
    pub build_deps: Vec<String>,
    /// Source package names included in the module.
    #[serde(default)]
    pub rpms: Vec<String>,
}

impl ModuleRecord {
    pub fn key(&self) -> String {
        format!("{}:{}", self.name, self.stream)
    }
}

/// Advisory tracking: which advisories carry a build, and their readiness.
pub trait ReleaseTracker: Send + Sync {
    fn advisories_for_build<'a>(&'a self, nvr: &'a str) -> BoxFuture<'a, Result<Vec<Advisory>>>;

    /// Whether every build attached to the advisory is signed.
    fn builds_signed(&self, advisory_id: u64) -> BoxFuture<'_, Result<bool>>;

    /// Repository ids the advisory's content will be pushed to.
    fn content_repo_ids(&self, advisory_id: u64) -> BoxFuture<'_, Result<Vec<String>>>;

    /// NVRs of the builds attached to the advisory.
    fn builds_in_advisory(&self, advisory_id: u64) -> BoxFuture<'_, Result<Vec<String>>>;
}

/// Maps repository ids to content sets.
pub trait ContentSetResolver: Send + Sync {
    fn content_sets_for_repos<'a>(
        &'a self,
        repo_ids: &'a [String],
    ) -> BoxFuture<'a, Result<Vec<String>>>;
}

pub trait ImageInventory: Send + Sync {
    /// Images that install a package built from `srpm` out of any of
    /// `content_sets`, plus every image layered on such an image.
    fn images_containing<'a>(
        &'a self,
        srpm: &'a str,
        content_sets: &'a [String],
    ) -> BoxFuture<'a, Result<Vec<ImageRecord>>>;
}

pub trait BuildSystem: Send + Sync {
    fn srpm_name<'a>(&'a self, nvr: &'a str) -> BoxFuture<'a, Result<String>>;

    /// Binary package names produced by the build.
    fn rpm_names<'a>(&'a self, nvr: &'a str) -> BoxFuture<'a, Result<Vec<String>>>;

    /// The candidate tag to compose from, if `nvr` is the latest build of
    /// its package there.
    fn compose_source_tag<'a>(&'a self, nvr: &'a str) -> BoxFuture<'a, Result<Option<String>>>;
}

pub trait ComposeService: Send + Sync {
    fn new_compose<'a>(
        &'a self,
        source: &'a str,
        packages: &'a [String],
    ) -> BoxFuture<'a, Result<u64>>;

    fn get_compose(&self, compose_id: u64) -> BoxFuture<'_, Result<ComposeStatus>>;

    /// Operator-facing URL of a compose job.
    fn compose_url(&self, compose_id: u64) -> String;
}

pub trait ModuleInventory: Send + Sync {
    /// Modules whose build dependencies include `name:stream`.
    fn modules_depending_on<'a>(
        &'a self,
        name: &'a str,
        stream: &'a str,
    ) -> BoxFuture<'a, Result<Vec<ModuleRecord>>>;

    /// All releases of `name:stream`, newest first.
    fn module_releases<'a>(
        &'a self,
        name: &'a str,
        stream: &'a str,
    ) -> BoxFuture<'a, Result<Vec<ModuleRecord>>>;

    /// Latest release of each module that includes `rpm` and is built from
    /// `branch`.
    fn latest_modules_with_rpm<'a>(
        &'a self,
        rpm: &'a str,
        branch: &'a str,
    ) -> BoxFuture<'a, Result<Vec<ModuleRecord>>>;
}

pub trait SourceControl: Send + Sync {
    fn latest_commit<'a>(&'a self, repo_url: &'a str, branch: &'a str)
    -> BoxFuture<'a, Result<String>>;
}

pub trait ModuleBuildService: Send + Sync {
    /// Submit a module build from `scm_url`; returns the external build id.
    fn submit<'a>(&'a self, scm_url: &'a str, branch: &'a str) -> BoxFuture<'a, Result<u64>>;
}

/// Every external collaborator, shared by handlers.
#[derive(Clone)]
pub struct Services {
    pub release_tracker: Arc<dyn ReleaseTracker>,
    pub content_sets: Arc<dyn ContentSetResolver>,
    pub images: Arc<dyn ImageInventory>,
    pub build_system: Arc<dyn BuildSystem>,
    pub compose: Arc<dyn ComposeService>,
    pub modules: Arc<dyn ModuleInventory>,
    pub source_control: Arc<dyn SourceControl>,
    pub module_builds: Arc<dyn ModuleBuildService>,
}

impl Services {
    /// Serve every interface from one in-memory snapshot.
    pub fn from_memory(memory: Arc<MemoryServices>) -> Self {
        Self {
            release_tracker: memory.clone(),
            content_sets: memory.clone(),
            images: memory.clone(),
            build_system: memory.clone(),
            compose: memory.clone(),
            modules: memory.clone(),
            source_control: memory.clone(),
            module_builds: memory,
        }
    }
}

impl std::fmt::Debug for Services {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Services").finish_non_exhaustive()
    }
}
