// src/events/parsers/mod.rs

//! Built-in parsers and the startup registration table.

mod brew_sign_rpm;
mod errata_status;
mod git_receive;
mod mbs_module;
mod odcs_compose;

pub use brew_sign_rpm::BrewSignRpmParser;
pub use errata_status::ErrataStatusParser;
pub use git_receive::GitReceiveParser;
pub use mbs_module::MbsModuleParser;
pub use odcs_compose::OdcsComposeParser;

use crate::errors::{RebuildError, Result};
use crate::events::{EventParser, ParserRegistry};

/// Values parsers need from configuration.
#[derive(Debug, Clone, Default)]
pub struct ParserSettings {
    /// Base URL of the dist-git server, without trailing slash.
    pub git_base_url: String,
}

type ParserCtor = fn(&ParserSettings) -> Box<dyn EventParser>;

/// Registration key -> constructor. Order here is the default order.
const BUILTIN_PARSERS: &[(&str, ParserCtor)] = &[
    ("git_receive", git_receive),
    ("mbs_module", mbs_module),
    ("brew_sign_rpm", brew_sign_rpm),
    ("errata_status", errata_status),
    ("odcs_compose", odcs_compose),
];

fn git_receive(settings: &ParserSettings) -> Box<dyn EventParser> {
    Box::new(GitReceiveParser::new(&settings.git_base_url))
}

fn mbs_module(_: &ParserSettings) -> Box<dyn EventParser> {
    Box::new(MbsModuleParser)
}

fn brew_sign_rpm(_: &ParserSettings) -> Box<dyn EventParser> {
    Box::new(BrewSignRpmParser)
}

fn errata_status(_: &ParserSettings) -> Box<dyn EventParser> {
    Box::new(ErrataStatusParser)
}

fn odcs_compose(_: &ParserSettings) -> Box<dyn EventParser> {
    Box::new(OdcsComposeParser)
}

/// Every built-in parser key, in default registration order.
pub fn builtin_parser_keys() -> Vec<&'static str> {
    BUILTIN_PARSERS.iter().map(|(key, _)| *key).collect()
}

/// Build a registry from configured parser keys.
///
/// Unknown keys are a configuration error.
pub fn build_registry(
    topic_prefixes: Vec<String>,
    keys: &[String],
    settings: &ParserSettings,
) -> Result<ParserRegistry> {
    let mut registry = ParserRegistry::new(topic_prefixes);
    for key in keys {
        let ctor = BUILTIN_PARSERS
            .iter()
            .find(|(k, _)| *k == key.as_str())
            .map(|(_, ctor)| ctor)
            .ok_or_else(|| RebuildError::ConfigError(format!("unknown parser '{key}'")))?;
        registry.register(ctor(settings));
    }
    Ok(registry)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_from_keys_keeps_order() {
        let keys = vec!["brew_sign_rpm".to_string(), "git_receive".to_string()];
        let reg = build_registry(vec!["org.fedoraproject.prod".into()], &keys, &ParserSettings::default())
            .unwrap();
        assert_eq!(
            reg.topics(),
            vec!["org.fedoraproject.prod.brew.sign.rpm", "org.fedoraproject.prod.git.receive"]
        );
    }

    #[test]
    fn unknown_key_is_rejected() {
        let err = build_registry(vec![], &["nope".to_string()], &ParserSettings::default()).unwrap_err();
        assert!(matches!(err, RebuildError::ConfigError(msg) if msg.contains("nope")));
    }
}
