// src/config/model.rs

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::events::parsers::builtin_parser_keys;
use crate::handlers::builtin_handler_keys;
use crate::rules::{Rule, RuleMatcher, RuleTable};
use crate::types::StoreMode;

/// Rule tables as written in TOML: `handler -> artifact type -> rule`.
///
/// Artifact type keys are checked during validation.
pub type RawRuleTable = BTreeMap<String, BTreeMap<String, Rule>>;

/// Top-level configuration as read from a TOML file.
///
/// ```toml
/// parsers = ["brew_sign_rpm", "errata_status"]
/// handlers = ["update_db_on_advisory_change", "rebuild_images_on_advisory_signed"]
///
/// [messaging]
/// topic_prefixes = ["org.fedoraproject.prod"]
///
/// [compose]
/// server_url = "https://odcs.fedoraproject.org"
/// poll_interval = "30s"
/// timeout = "1h"
///
/// [store]
/// mode = "file"
/// path = "/var/lib/rebuildd/ledger.json"
///
/// [whitelist.global.image]
/// advisory_name = "RHSA-.*"
/// ```
///
/// All sections are optional and have reasonable defaults.
#[derive(Debug, Clone, Deserialize)]
pub struct RawConfigFile {
    #[serde(default)]
    pub messaging: MessagingSection,

    /// Parser registration keys, in registration order.
    #[serde(default = "default_parsers")]
    pub parsers: Vec<String>,

    /// Handler registration keys, in dispatch order.
    #[serde(default = "default_handlers")]
    pub handlers: Vec<String>,

    #[serde(default)]
    pub source: SourceSection,

    #[serde(default)]
    pub compose: ComposeSection,

    #[serde(default)]
    pub store: StoreSection,

    #[serde(default)]
    pub whitelist: RawRuleTable,

    #[serde(default)]
    pub blacklist: RawRuleTable,
}

fn default_parsers() -> Vec<String> {
    builtin_parser_keys().into_iter().map(str::to_string).collect()
}

fn default_handlers() -> Vec<String> {
    builtin_handler_keys().into_iter().map(str::to_string).collect()
}

impl Default for RawConfigFile {
    fn default() -> Self {
        Self {
            messaging: MessagingSection::default(),
            parsers: default_parsers(),
            handlers: default_handlers(),
            source: SourceSection::default(),
            compose: ComposeSection::default(),
            store: StoreSection::default(),
            whitelist: RawRuleTable::new(),
            blacklist: RawRuleTable::new(),
        }
    }
}

/// `[messaging]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct MessagingSection {
    /// Prefixes every parser topic suffix is subscribed under.
    #[serde(default = "default_topic_prefixes")]
    pub topic_prefixes: Vec<String>,

    /// Capacity of the channel between the transport and the consumer.
    #[serde(default = "default_queue_length")]
    pub queue_length: usize,
}

fn default_topic_prefixes() -> Vec<String> {
    vec!["org.fedoraproject.prod".to_string()]
}

fn default_queue_length() -> usize {
    64
}

impl Default for MessagingSection {
    fn default() -> Self {
        Self {
            topic_prefixes: default_topic_prefixes(),
            queue_length: default_queue_length(),
        }
    }
}

/// `[source]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct SourceSection {
    /// Module SCM URLs are `{git_base_url}/modules/{name}.git?#{commit}`.
    #[serde(default = "default_git_base_url")]
    pub git_base_url: String,
}

fn default_git_base_url() -> String {
    "git://pkgs.fedoraproject.org".to_string()
}

impl Default for SourceSection {
    fn default() -> Self {
        Self {
            git_base_url: default_git_base_url(),
        }
    }
}

/// `[compose]` section, durations as strings (`"500ms"`, `"30s"`, `"1h"`).
#[derive(Debug, Clone, Deserialize)]
pub struct ComposeSection {
    #[serde(default = "default_compose_server")]
    pub server_url: String,

    #[serde(default = "default_poll_interval")]
    pub poll_interval: String,

    /// Overall deadline for one compose to reach a terminal state.
    #[serde(default = "default_compose_timeout")]
    pub timeout: String,
}

fn default_compose_server() -> String {
    "https://odcs.fedoraproject.org".to_string()
}

fn default_poll_interval() -> String {
    "30s".to_string()
}

fn default_compose_timeout() -> String {
    "1h".to_string()
}

impl Default for ComposeSection {
    fn default() -> Self {
        Self {
            server_url: default_compose_server(),
            poll_interval: default_poll_interval(),
            timeout: default_compose_timeout(),
        }
    }
}

/// `[store]` section.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StoreSection {
    #[serde(default)]
    pub mode: StoreMode,

    /// Ledger file; required when `mode = "file"`.
    #[serde(default)]
    pub path: Option<PathBuf>,
}

/// Validated compose settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComposeConfig {
    pub server_url: String,
    pub poll_interval: Duration,
    pub timeout: Duration,
}

/// Validated configuration.
///
/// Obtained through `ConfigFile::try_from(RawConfigFile)`; fields are public
/// for reading, but the only constructor is crate-private.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub messaging: MessagingSection,
    pub parsers: Vec<String>,
    pub handlers: Vec<String>,
    pub source: SourceSection,
    pub compose: ComposeConfig,
    pub store: StoreSection,
    pub whitelist: RuleTable,
    pub blacklist: RuleTable,
}

impl ConfigFile {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new_unchecked(
        messaging: MessagingSection,
        parsers: Vec<String>,
        handlers: Vec<String>,
        source: SourceSection,
        compose: ComposeConfig,
        store: StoreSection,
        whitelist: RuleTable,
        blacklist: RuleTable,
    ) -> Self {
        Self {
            messaging,
            parsers,
            handlers,
            source,
            compose,
            store,
            whitelist,
            blacklist,
        }
    }

    pub fn rule_matcher(&self) -> RuleMatcher {
        RuleMatcher::new(self.whitelist.clone(), self.blacklist.clone())
    }
}
