//! The immutable result of locating (or installing) a binary.
//!
//! Grounded on `pydantic_pkgr/binprovider.py`'s `ShallowBinary` model.

use crate::semver::SemVer;
use crate::validators::{is_executable, is_script};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Sentinel for a SHA-256 that was never computed. Never cached as a real
/// value; a provider that only knows "installed, but sha unknown" must
/// distinguish this from a genuinely missing binary.
pub const UNKNOWN_SHA256: &str = "unknown";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShallowBinary {
    pub name: String,
    #[serde(default)]
    pub description: String,

    #[serde(rename = "binproviders")]
    pub binproviders_supported: Vec<String>,

    #[serde(default)]
    pub overrides: std::collections::HashMap<String, std::collections::HashMap<String, String>>,

    #[serde(rename = "binprovider")]
    pub loaded_binprovider: Option<String>,

    #[serde(rename = "abspath")]
    pub loaded_abspath: Option<PathBuf>,

    #[serde(rename = "version")]
    pub loaded_version: Option<SemVer>,

    #[serde(rename = "sha256")]
    pub loaded_sha256: Option<String>,
}

impl ShallowBinary {
    pub fn new(name: impl Into<String>, binproviders_supported: Vec<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            binproviders_supported,
            overrides: Default::default(),
            loaded_binprovider: None,
            loaded_abspath: None,
            loaded_version: None,
            loaded_sha256: None,
        }
    }

    pub fn bin_filename(&self) -> Option<String> {
        self.loaded_abspath
            .as_ref()
            .and_then(|path| path.file_name())
            .map(|name| name.to_string_lossy().to_string())
    }

    pub fn bin_dir(&self) -> Option<PathBuf> {
        self.loaded_abspath
            .as_ref()
            .and_then(|path| path.parent())
            .map(Path::to_path_buf)
    }

    /// The symlink-resolved form of `loaded_abspath`, if it resolves.
    pub fn loaded_respath(&self) -> Option<PathBuf> {
        self.loaded_abspath
            .as_ref()
            .and_then(|path| std::fs::canonicalize(path).ok())
    }

    pub fn is_executable(&self) -> bool {
        self.loaded_abspath
            .as_deref()
            .map(is_executable)
            .unwrap_or(false)
    }

    pub fn is_script(&self) -> bool {
        self.loaded_abspath
            .as_deref()
            .map(is_script)
            .unwrap_or(false)
    }

    /// A binary is valid once it has a name, an abspath, a version, and is
    /// either directly executable or a recognized script.
    pub fn is_valid(&self) -> bool {
        !self.name.is_empty()
            && self.loaded_abspath.is_some()
            && self.loaded_version.is_some()
            && (self.is_executable() || self.is_script())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_binary_is_invalid() {
        let binary = ShallowBinary::new("wget", vec!["env".into()]);
        assert!(!binary.is_valid());
    }

    #[test]
    fn bin_filename_and_dir_derive_from_abspath() {
        let mut binary = ShallowBinary::new("wget", vec!["env".into()]);
        binary.loaded_abspath = Some(PathBuf::from("/usr/bin/wget"));
        assert_eq!(binary.bin_filename().as_deref(), Some("wget"));
        assert_eq!(binary.bin_dir(), Some(PathBuf::from("/usr/bin")));
    }
}
