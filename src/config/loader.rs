// src/config/loader.rs

//! Reading `Rebuildd.toml`.
//!
//! Rule regexes are compiled while the TOML is deserialised, so a bad
//! pattern surfaces as a `TomlError` pointing at the offending line. Every
//! other check runs in `ConfigFile::try_from`.

use std::path::Path;

use tracing::debug;

use crate::config::model::{ConfigFile, RawConfigFile};
use crate::errors::Result;

/// Config file read when `--config` is not given.
pub const DEFAULT_CONFIG_PATH: &str = "Rebuildd.toml";

/// Deserialise without semantic validation.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<RawConfigFile> {
    let path = path.as_ref();
    debug!(path = %path.display(), "reading config");
    Ok(toml::from_str(&std::fs::read_to_string(path)?)?)
}

/// Read, apply defaults and validate.
pub fn load_and_validate(path: impl AsRef<Path>) -> Result<ConfigFile> {
    ConfigFile::try_from(load_from_path(path)?)
}

/// [`load_and_validate`] for TOML already in memory.
pub fn parse_and_validate(contents: &str) -> Result<ConfigFile> {
    ConfigFile::try_from(toml::from_str::<RawConfigFile>(contents)?)
}
