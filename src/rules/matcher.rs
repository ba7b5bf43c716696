// src/rules/matcher.rs

//! Rule evaluation and whitelist/blacklist gating.

use std::collections::BTreeMap;

use tracing::{debug, info};

use crate::rules::model::{AttrValue, Attributes, Rule, RuleValue};
use crate::types::ArtifactType;

/// Handler key whose rules apply to every handler without its own entry.
pub const GLOBAL_RULES: &str = "global";

/// `handler name (or "global") -> artifact type -> rule`.
pub type RuleTable = BTreeMap<String, BTreeMap<ArtifactType, Rule>>;

/// Evaluate `rule` against `attrs`.
///
/// An empty `All` is true, an empty `Any` is false, and a leaf that names an
/// attribute missing from `attrs` is false.
pub fn matches(rule: &Rule, attrs: &Attributes) -> bool {
    match rule {
        Rule::All(children) => children.iter().all(|child| matches(child, attrs)),
        Rule::Any(children) => children.iter().any(|child| matches(child, attrs)),
        Rule::Leaf(expected) => expected
            .iter()
            .all(|(attr, value)| leaf_matches(attrs.get(attr), value)),
    }
}

fn leaf_matches(actual: Option<&AttrValue>, expected: &RuleValue) -> bool {
    match (actual, expected) {
        (None, _) => false,
        (Some(AttrValue::Flag(a)), RuleValue::Flag(e)) => a == e,
        (Some(AttrValue::Text(a)), RuleValue::Pattern(p)) => p.is_match(a),
        (Some(AttrValue::Text(a)), RuleValue::OneOf(ps)) => ps.iter().any(|p| p.is_match(a)),
        _ => false,
    }
}

/// Whitelist/blacklist tables consulted before any artifact is planned.
#[derive(Debug, Clone, Default)]
pub struct RuleMatcher {
    whitelist: RuleTable,
    blacklist: RuleTable,
}

impl RuleMatcher {
    pub fn new(whitelist: RuleTable, blacklist: RuleTable) -> Self {
        Self {
            whitelist,
            blacklist,
        }
    }

    pub fn whitelist(&self) -> &RuleTable {
        &self.whitelist
    }

    pub fn blacklist(&self) -> &RuleTable {
        &self.blacklist
    }

    /// Whether `handler` may rebuild an artifact of type `ty` with `attrs`.
    ///
    /// Allowed iff (no whitelist rule, or the whitelist rule matches) and no
    /// blacklist rule matches. The handler's own entry wins over `"global"`.
    pub fn is_allowed(&self, handler: &str, ty: ArtifactType, attrs: &Attributes) -> bool {
        let whitelisted = match lookup(&self.whitelist, handler, ty) {
            Some(rule) => matches(rule, attrs),
            None => true,
        };
        let blacklisted = match lookup(&self.blacklist, handler, ty) {
            Some(rule) => matches(rule, attrs),
            None => false,
        };

        let allowed = whitelisted && !blacklisted;
        if allowed {
            debug!(handler, artifact_type = %ty, ?attrs, "artifact allowed by rules");
        } else {
            info!(
                handler,
                artifact_type = %ty,
                whitelisted,
                blacklisted,
                ?attrs,
                "artifact denied by rules"
            );
        }
        allowed
    }
}

fn lookup<'a>(table: &'a RuleTable, handler: &str, ty: ArtifactType) -> Option<&'a Rule> {
    table
        .get(handler)
        .and_then(|by_type| by_type.get(&ty))
        .or_else(|| table.get(GLOBAL_RULES).and_then(|by_type| by_type.get(&ty)))
}
