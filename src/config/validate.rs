// src/config/validate.rs

use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use crate::config::model::{ComposeConfig, ConfigFile, RawConfigFile, RawRuleTable};
use crate::errors::{RebuildError, Result};
use crate::events::parsers::builtin_parser_keys;
use crate::handlers::builtin_handler_keys;
use crate::rules::{GLOBAL_RULES, RuleTable};
use crate::types::{ArtifactType, StoreMode, parse_duration};

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = RebuildError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        validate_messaging(&raw)?;
        validate_keys("parsers", &raw.parsers, &builtin_parser_keys())?;
        validate_keys("handlers", &raw.handlers, &builtin_handler_keys())?;
        validate_store(&raw)?;
        let compose = validate_compose(&raw)?;
        let whitelist = convert_rule_table("whitelist", raw.whitelist)?;
        let blacklist = convert_rule_table("blacklist", raw.blacklist)?;

        let mut source = raw.source;
        let trimmed = source.git_base_url.trim().trim_end_matches('/').to_string();
        if trimmed.is_empty() {
            return Err(RebuildError::ConfigError(
                "[source].git_base_url must not be empty".to_string(),
            ));
        }
        source.git_base_url = trimmed;

        Ok(ConfigFile::new_unchecked(
            raw.messaging,
            raw.parsers,
            raw.handlers,
            source,
            compose,
            raw.store,
            whitelist,
            blacklist,
        ))
    }
}

fn validate_messaging(cfg: &RawConfigFile) -> Result<()> {
    let prefixes = &cfg.messaging.topic_prefixes;
    if prefixes.is_empty() {
        return Err(RebuildError::ConfigError(
            "[messaging].topic_prefixes must list at least one prefix".to_string(),
        ));
    }
    if prefixes.iter().any(|p| p.trim().trim_end_matches('.').is_empty()) {
        return Err(RebuildError::ConfigError(
            "[messaging].topic_prefixes must not contain empty prefixes".to_string(),
        ));
    }
    if cfg.messaging.queue_length == 0 {
        return Err(RebuildError::ConfigError(
            "[messaging].queue_length must be >= 1 (got 0)".to_string(),
        ));
    }
    Ok(())
}

fn validate_keys(section: &str, keys: &[String], known: &[&str]) -> Result<()> {
    if keys.is_empty() {
        return Err(RebuildError::ConfigError(format!(
            "`{section}` must list at least one key"
        )));
    }

    let mut seen = BTreeSet::new();
    for key in keys {
        if !known.contains(&key.as_str()) {
            return Err(RebuildError::ConfigError(format!(
                "unknown key '{key}' in `{section}` (known: {})",
                known.join(", ")
            )));
        }
        if !seen.insert(key.as_str()) {
            return Err(RebuildError::ConfigError(format!(
                "key '{key}' is listed twice in `{section}`"
            )));
        }
    }
    Ok(())
}

fn validate_store(cfg: &RawConfigFile) -> Result<()> {
    if cfg.store.mode == StoreMode::File && cfg.store.path.is_none() {
        return Err(RebuildError::ConfigError(
            "[store].path is required when [store].mode = \"file\"".to_string(),
        ));
    }
    Ok(())
}

fn validate_compose(cfg: &RawConfigFile) -> Result<ComposeConfig> {
    let section = &cfg.compose;
    let poll_interval = duration_field("poll_interval", &section.poll_interval)?;
    let timeout = duration_field("timeout", &section.timeout)?;

    if poll_interval == Duration::ZERO {
        return Err(RebuildError::ConfigError(
            "[compose].poll_interval must be greater than zero".to_string(),
        ));
    }
    if timeout < poll_interval {
        return Err(RebuildError::ConfigError(format!(
            "[compose].timeout ({}) must not be shorter than poll_interval ({})",
            section.timeout, section.poll_interval
        )));
    }
    if section.server_url.trim().is_empty() {
        return Err(RebuildError::ConfigError(
            "[compose].server_url must not be empty".to_string(),
        ));
    }

    Ok(ComposeConfig {
        server_url: section.server_url.trim().trim_end_matches('/').to_string(),
        poll_interval,
        timeout,
    })
}

fn duration_field(name: &str, value: &str) -> Result<Duration> {
    parse_duration(value)
        .map_err(|e| RebuildError::ConfigError(format!("[compose].{name}: {e}")))
}

/// Check handler and artifact-type keys and build the typed table.
///
/// Handler keys must be a built-in handler or `"global"`.
fn convert_rule_table(section: &str, raw: RawRuleTable) -> Result<RuleTable> {
    let handlers = builtin_handler_keys();
    let mut table = RuleTable::new();

    for (handler, by_type) in raw {
        if handler != GLOBAL_RULES && !handlers.contains(&handler.as_str()) {
            return Err(RebuildError::ConfigError(format!(
                "[{section}.{handler}]: unknown handler (expected \"{GLOBAL_RULES}\" or one of: {})",
                handlers.join(", ")
            )));
        }

        let mut rules = BTreeMap::new();
        for (ty, rule) in by_type {
            let artifact_type: ArtifactType = ty
                .parse()
                .map_err(|e| RebuildError::ConfigError(format!("[{section}.{handler}.{ty}]: {e}")))?;
            rules.insert(artifact_type, rule);
        }
        table.insert(handler, rules);
    }
    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::parse_and_validate;
    use crate::rules::Attributes;

    fn config_error(src: &str) -> String {
        match parse_and_validate(src) {
            Err(RebuildError::ConfigError(msg)) => msg,
            other => panic!("expected config error, got {other:?}"),
        }
    }

    #[test]
    fn empty_file_gets_defaults() {
        let cfg = parse_and_validate("").unwrap();
        assert_eq!(cfg.messaging.topic_prefixes, vec!["org.fedoraproject.prod"]);
        assert_eq!(cfg.parsers.len(), builtin_parser_keys().len());
        assert_eq!(cfg.handlers, builtin_handler_keys());
        assert_eq!(cfg.compose.poll_interval, Duration::from_secs(30));
        assert_eq!(cfg.compose.timeout, Duration::from_secs(3600));
        assert_eq!(cfg.store.mode, StoreMode::Memory);
        assert!(cfg.whitelist.is_empty());
    }

    #[test]
    fn unknown_handler_key_is_rejected() {
        let msg = config_error("handlers = [\"rebuild_everything\"]\n");
        assert!(msg.contains("rebuild_everything"));
    }

    #[test]
    fn duplicate_parser_key_is_rejected() {
        let msg = config_error("parsers = [\"git_receive\", \"git_receive\"]\n");
        assert!(msg.contains("twice"));
    }

    #[test]
    fn timeout_shorter_than_interval_is_rejected() {
        let msg = config_error("[compose]\npoll_interval = \"10s\"\ntimeout = \"5s\"\n");
        assert!(msg.contains("timeout"));
    }

    #[test]
    fn file_store_requires_path() {
        let msg = config_error("[store]\nmode = \"file\"\n");
        assert!(msg.contains("[store].path"));
    }

    #[test]
    fn zero_queue_length_is_rejected() {
        let msg = config_error("[messaging]\nqueue_length = 0\n");
        assert!(msg.contains("queue_length"));
    }

    #[test]
    fn rule_tables_are_typed() {
        let cfg = parse_and_validate(
            r#"
[whitelist.global.image]
advisory_name = "RHSA-.*"

[blacklist.rebuild_modules.module]
name = ["platform", "host"]
"#,
        )
        .unwrap();

        assert!(cfg.whitelist[GLOBAL_RULES].contains_key(&ArtifactType::Image));
        assert!(cfg.blacklist["rebuild_modules"].contains_key(&ArtifactType::Module));

        let matcher = cfg.rule_matcher();
        let mut attrs = Attributes::new();
        attrs.insert("name".into(), "platform".into());
        assert!(!matcher.is_allowed("rebuild_modules", ArtifactType::Module, &attrs));
    }

    #[test]
    fn rule_for_unknown_artifact_type_is_rejected() {
        let msg = config_error("[whitelist.global.container]\nname = \"x\"\n");
        assert!(msg.contains("container"));
    }

    #[test]
    fn rule_for_unknown_handler_is_rejected() {
        let msg = config_error("[whitelist.rebuild_typo.image]\nname = \"x\"\n");
        assert!(msg.contains("rebuild_typo"));
    }

    #[test]
    fn invalid_rule_regex_fails_to_load() {
        let err = parse_and_validate("[whitelist.global.image]\nadvisory_name = \"RHSA-(\"\n")
            .unwrap_err();
        assert!(matches!(err, RebuildError::TomlError(_)));
    }

    #[test]
    fn git_base_url_is_normalised() {
        let cfg = parse_and_validate("[source]\ngit_base_url = \"git://pkgs.example.com/\"\n").unwrap();
        assert_eq!(cfg.source.git_base_url, "git://pkgs.example.com");
    }
}
