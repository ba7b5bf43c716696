// src/rules/mod.rs

//! Rebuild eligibility rules.
//!
//! - [`model`] defines the rule tree and how it maps to the config format.
//! - [`matcher`] evaluates rules and combines the whitelist/blacklist tables.

pub mod matcher;
pub mod model;

pub use matcher::{GLOBAL_RULES, RuleMatcher, RuleTable, matches};
pub use model::{AttrValue, Attributes, Pattern, Rule, RuleValue};
