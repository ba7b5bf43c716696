// src/config/mod.rs

//! Configuration loading and validation for rebuildd.
//!
//! Responsibilities:
//! - Define the TOML-backed data model (`model.rs`).
//! - Load a config file from disk (`loader.rs`).
//! - Validate it into a [`ConfigFile`] (`validate.rs`): registration keys,
//!   durations, store settings and rule tables.

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{DEFAULT_CONFIG_PATH, load_and_validate, load_from_path, parse_and_validate};
pub use model::{
    ComposeConfig, ComposeSection, ConfigFile, MessagingSection, RawConfigFile, RawRuleTable,
    SourceSection, StoreSection,
};
