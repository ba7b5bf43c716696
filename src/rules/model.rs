// src/rules/model.rs

//! Rule trees and the attribute values they are evaluated against.
//!
//! In TOML a rule is either a leaf table of `attribute = value` pairs or a
//! combinator table holding exactly one of `all = [...]` / `any = [...]`:
//!
//! ```toml
//! [whitelist.global.image]
//! all = [
//!     { advisory_name = "RHSA-.*", advisory_state = "SHIPPED_LIVE" },
//!     { any = [ { has_hightouch_bugs = true }, { severity = ["critical", "important"] } ] },
//! ]
//! ```

use std::collections::BTreeMap;
use std::fmt;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Value of one artifact attribute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttrValue {
    Flag(bool),
    Text(String),
}

impl From<&str> for AttrValue {
    fn from(s: &str) -> Self {
        AttrValue::Text(s.to_string())
    }
}

impl From<String> for AttrValue {
    fn from(s: String) -> Self {
        AttrValue::Text(s)
    }
}

impl From<bool> for AttrValue {
    fn from(b: bool) -> Self {
        AttrValue::Flag(b)
    }
}

/// Attribute map an artifact is judged by. Absent keys never match.
pub type Attributes = BTreeMap<String, AttrValue>;

/// Regular expression matched against the whole attribute value.
#[derive(Clone)]
pub struct Pattern {
    source: String,
    regex: Regex,
}

impl Pattern {
    pub fn new(source: &str) -> Result<Self, regex::Error> {
        let regex = Regex::new(&format!("^(?:{source})$"))?;
        Ok(Self {
            source: source.to_string(),
            regex,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    pub fn is_match(&self, value: &str) -> bool {
        self.regex.is_match(value)
    }
}

impl fmt::Debug for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Pattern({:?})", self.source)
    }
}

impl PartialEq for Pattern {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
    }
}

/// Expected value of a leaf attribute.
#[derive(Debug, Clone, PartialEq)]
pub enum RuleValue {
    /// Strict boolean equality.
    Flag(bool),
    /// Full-match regular expression.
    Pattern(Pattern),
    /// Matches when any alternative matches.
    OneOf(Vec<Pattern>),
}

impl RuleValue {
    pub fn pattern(source: &str) -> Result<Self, regex::Error> {
        Ok(RuleValue::Pattern(Pattern::new(source)?))
    }

    pub fn one_of<'a>(sources: impl IntoIterator<Item = &'a str>) -> Result<Self, regex::Error> {
        let patterns = sources
            .into_iter()
            .map(Pattern::new)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(RuleValue::OneOf(patterns))
    }
}

/// Predicate tree gating rebuild eligibility.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawRule", into = "RawRule")]
pub enum Rule {
    /// Every listed attribute must match its expected value.
    Leaf(BTreeMap<String, RuleValue>),
    All(Vec<Rule>),
    Any(Vec<Rule>),
}

impl Rule {
    pub fn leaf(attr: &str, value: RuleValue) -> Self {
        let mut map = BTreeMap::new();
        map.insert(attr.to_string(), value);
        Rule::Leaf(map)
    }

    pub fn all(children: Vec<Rule>) -> Self {
        Rule::All(children)
    }

    pub fn any(children: Vec<Rule>) -> Self {
        Rule::Any(children)
    }
}

// Serialized shapes. Kept private: callers only see `Rule`.

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum RawRule {
    Combinator(RawCombinator),
    Leaf(BTreeMap<String, RawValue>),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawCombinator {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    all: Option<Vec<RawRule>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    any: Option<Vec<RawRule>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum RawValue {
    Flag(bool),
    Text(String),
    List(Vec<String>),
}

impl TryFrom<RawRule> for Rule {
    type Error = String;

    fn try_from(raw: RawRule) -> Result<Self, Self::Error> {
        match raw {
            RawRule::Combinator(RawCombinator { all: Some(_), any: Some(_) }) => Err(
                "a rule table may contain either `all` or `any`, not both".to_string(),
            ),
            RawRule::Combinator(RawCombinator { all: Some(children), any: None }) => {
                Ok(Rule::All(convert_children(children)?))
            }
            RawRule::Combinator(RawCombinator { all: None, any: Some(children) }) => {
                Ok(Rule::Any(convert_children(children)?))
            }
            RawRule::Combinator(RawCombinator { all: None, any: None }) => {
                Ok(Rule::Leaf(BTreeMap::new()))
            }
            RawRule::Leaf(map) => {
                let mut leaf = BTreeMap::new();
                for (attr, value) in map {
                    let compiled = match value {
                        RawValue::Flag(b) => RuleValue::Flag(b),
                        RawValue::Text(s) => RuleValue::pattern(&s)
                            .map_err(|e| format!("invalid pattern for '{attr}': {e}"))?,
                        RawValue::List(items) => RuleValue::one_of(items.iter().map(String::as_str))
                            .map_err(|e| format!("invalid pattern for '{attr}': {e}"))?,
                    };
                    leaf.insert(attr, compiled);
                }
                Ok(Rule::Leaf(leaf))
            }
        }
    }
}

fn convert_children(children: Vec<RawRule>) -> Result<Vec<Rule>, String> {
    children.into_iter().map(Rule::try_from).collect()
}

impl From<Rule> for RawRule {
    fn from(rule: Rule) -> Self {
        match rule {
            Rule::All(children) => RawRule::Combinator(RawCombinator {
                all: Some(children.into_iter().map(RawRule::from).collect()),
                any: None,
            }),
            Rule::Any(children) => RawRule::Combinator(RawCombinator {
                all: None,
                any: Some(children.into_iter().map(RawRule::from).collect()),
            }),
            Rule::Leaf(map) => RawRule::Leaf(
                map.into_iter()
                    .map(|(attr, value)| {
                        let raw = match value {
                            RuleValue::Flag(b) => RawValue::Flag(b),
                            RuleValue::Pattern(p) => RawValue::Text(p.source),
                            RuleValue::OneOf(ps) => {
                                RawValue::List(ps.into_iter().map(|p| p.source).collect())
                            }
                        };
                        (attr, raw)
                    })
                    .collect(),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Deserialize)]
    struct Wrapper {
        rule: Rule,
    }

    fn parse(toml_src: &str) -> Result<Rule, toml::de::Error> {
        toml::from_str::<Wrapper>(toml_src).map(|w| w.rule)
    }

    #[test]
    fn leaf_table_parses_all_value_shapes() {
        let rule = parse(
            r#"
[rule]
advisory_name = "RHSA-.*"
has_hightouch_bugs = true
severity = ["critical", "important"]
"#,
        )
        .unwrap();

        match rule {
            Rule::Leaf(map) => {
                assert_eq!(map.len(), 3);
                assert_eq!(map["has_hightouch_bugs"], RuleValue::Flag(true));
                assert!(matches!(map["severity"], RuleValue::OneOf(ref v) if v.len() == 2));
            }
            other => panic!("expected leaf, got {other:?}"),
        }
    }

    #[test]
    fn nested_combinators_parse() {
        let rule = parse(
            r#"
[rule]
all = [
    { advisory_name = "RHSA-.*" },
    { any = [ { has_hightouch_bugs = true }, { severity = ["critical"] } ] },
]
"#,
        )
        .unwrap();

        match rule {
            Rule::All(children) => {
                assert_eq!(children.len(), 2);
                assert!(matches!(children[1], Rule::Any(ref c) if c.len() == 2));
            }
            other => panic!("expected all, got {other:?}"),
        }
    }

    #[test]
    fn both_combinators_in_one_table_is_rejected() {
        let err = parse("[rule]\nall = []\nany = []\n").unwrap_err();
        assert!(err.to_string().contains("either `all` or `any`"));
    }

    #[test]
    fn invalid_regex_is_rejected() {
        assert!(parse("[rule]\nadvisory_name = \"RHSA-(\"\n").is_err());
    }

    #[test]
    fn rule_serializes_back_to_same_shape() {
        let rule = Rule::all(vec![
            Rule::leaf("advisory_name", RuleValue::pattern("RHSA-.*").unwrap()),
            Rule::any(vec![Rule::leaf("has_hightouch_bugs", RuleValue::Flag(true))]),
        ]);
        let json = serde_json::to_value(&rule).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "all": [
                    { "advisory_name": "RHSA-.*" },
                    { "any": [ { "has_hightouch_bugs": true } ] }
                ]
            })
        );
        let back: Rule = serde_json::from_value(json).unwrap();
        assert_eq!(back, rule);
    }
}
