#![allow(dead_code)]

use std::collections::BTreeMap;

use rebuildd::config::{ConfigFile, RawConfigFile};
use rebuildd::events::Advisory;
use rebuildd::rules::Rule;
use rebuildd::services::memory::{AdvisoryRecord, InventorySnapshot, PackageBuild};
use rebuildd::services::{ImageRecord, ModuleRecord};

/// Builder for `ConfigFile` to simplify test setup.
///
/// Starts from the defaults with a fast compose poll (`10ms` / `1s`).
pub struct ConfigFileBuilder {
    config: RawConfigFile,
}

impl ConfigFileBuilder {
    pub fn new() -> Self {
        let mut config = RawConfigFile::default();
        config.compose.poll_interval = "10ms".to_string();
        config.compose.timeout = "1s".to_string();
        Self { config }
    }

    pub fn with_handlers(mut self, keys: &[&str]) -> Self {
        self.config.handlers = keys.iter().map(|k| k.to_string()).collect();
        self
    }

    pub fn with_parsers(mut self, keys: &[&str]) -> Self {
        self.config.parsers = keys.iter().map(|k| k.to_string()).collect();
        self
    }

    pub fn with_topic_prefix(mut self, prefix: &str) -> Self {
        self.config.messaging.topic_prefixes = vec![prefix.to_string()];
        self
    }

    pub fn with_git_base_url(mut self, url: &str) -> Self {
        self.config.source.git_base_url = url.to_string();
        self
    }

    pub fn with_compose_timing(mut self, poll_interval: &str, timeout: &str) -> Self {
        self.config.compose.poll_interval = poll_interval.to_string();
        self.config.compose.timeout = timeout.to_string();
        self
    }

    pub fn whitelist(mut self, handler: &str, artifact_type: &str, rule: Rule) -> Self {
        insert_rule(&mut self.config.whitelist, handler, artifact_type, rule);
        self
    }

    pub fn blacklist(mut self, handler: &str, artifact_type: &str, rule: Rule) -> Self {
        insert_rule(&mut self.config.blacklist, handler, artifact_type, rule);
        self
    }

    pub fn raw(self) -> RawConfigFile {
        self.config
    }

    pub fn build(self) -> ConfigFile {
        ConfigFile::try_from(self.config).expect("Failed to build valid config from builder")
    }
}

impl Default for ConfigFileBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn insert_rule(
    table: &mut BTreeMap<String, BTreeMap<String, Rule>>,
    handler: &str,
    artifact_type: &str,
    rule: Rule,
) {
    table
        .entry(handler.to_string())
        .or_default()
        .insert(artifact_type.to_string(), rule);
}

/// Builder for the in-memory inventory snapshot.
#[derive(Default)]
pub struct InventoryBuilder {
    snapshot: InventorySnapshot,
}

impl InventoryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Advisory in state `state` carrying `builds`, populating `repo_ids`.
    pub fn advisory(
        mut self,
        id: u64,
        name: &str,
        state: &str,
        builds: &[&str],
        all_signed: bool,
        repo_ids: &[&str],
    ) -> Self {
        self.snapshot.advisories.push(AdvisoryRecord {
            advisory: Advisory {
                id,
                name: name.to_string(),
                state: state.to_string(),
                severity: None,
                has_hightouch_bugs: false,
            },
            builds: strings(builds),
            all_signed,
            repo_ids: strings(repo_ids),
        });
        self
    }

    pub fn content_sets(mut self, repo_id: &str, sets: &[&str]) -> Self {
        self.snapshot
            .content_sets
            .insert(repo_id.to_string(), strings(sets));
        self
    }

    pub fn image(mut self, record: ImageRecord) -> Self {
        self.snapshot.images.push(record);
        self
    }

    /// Package build `nvr` of source package `srpm`.
    pub fn package(mut self, nvr: &str, srpm: &str, rpms: &[&str], candidate_tag: Option<&str>) -> Self {
        self.snapshot.builds.push(PackageBuild {
            nvr: nvr.to_string(),
            srpm: srpm.to_string(),
            rpms: strings(rpms),
            candidate_tag: candidate_tag.map(str::to_string),
        });
        self
    }

    pub fn module(mut self, record: ModuleRecord) -> Self {
        self.snapshot.modules.push(record);
        self
    }

    pub fn commit(mut self, repo_url: &str, branch: &str, commit: &str) -> Self {
        self.snapshot
            .commits
            .insert(format!("{repo_url}#{branch}"), commit.to_string());
        self
    }

    /// Make the module build service refuse builds from `repo_url`.
    pub fn reject_module_builds(mut self, repo_url: &str) -> Self {
        self.snapshot.rejected_module_repos.insert(repo_url.to_string());
        self
    }

    /// Status codes the next submitted compose reports, one per poll.
    pub fn compose_script(mut self, codes: &[i64]) -> Self {
        self.snapshot.compose.scripts.push(codes.to_vec());
        self
    }

    pub fn build(self) -> InventorySnapshot {
        self.snapshot
    }
}

/// Image `nvr` layered on `parent`, pulling `srpms` from `content_sets`.
pub fn image(nvr: &str, parent: Option<&str>, content_sets: &[&str], srpms: &[&str]) -> ImageRecord {
    ImageRecord {
        nvr: nvr.to_string(),
        repository: format!("containers/{}", nvr.split('-').next().unwrap_or(nvr)),
        commit: format!("{nvr}-commit"),
        parent: parent.map(str::to_string),
        content_sets: strings(content_sets),
        srpms: strings(srpms),
    }
}

/// Module release `name:stream` version `version`, built from its stream
/// branch.
pub fn module(name: &str, stream: &str, version: u64, build_deps: &[&str], rpms: &[&str]) -> ModuleRecord {
    ModuleRecord {
        name: name.to_string(),
        stream: stream.to_string(),
        version,
        branch: None,
        build_deps: strings(build_deps),
        rpms: strings(rpms),
    }
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}
