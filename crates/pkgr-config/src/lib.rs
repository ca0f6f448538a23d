//! Layered configuration: built-in defaults -> optional TOML file ->
//! environment variables, using `figment` (the same layering tool the
//! teacher workspace carries for its own config crate).

use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

fn default_version_timeout_secs() -> u64 {
    10
}

fn default_install_timeout_secs() -> u64 {
    120
}

fn default_cache_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("pkgr")
}

/// Per-provider overrides a config file or environment may supply.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProviderOverrideConfig {
    pub euid: Option<u32>,
    pub pip_venv: Option<PathBuf>,
    pub npm_prefix: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PkgrConfig {
    #[serde(default)]
    pub dry_run: bool,

    #[serde(default)]
    pub quiet: bool,

    #[serde(default = "default_version_timeout_secs")]
    pub version_timeout_secs: u64,

    #[serde(default = "default_install_timeout_secs")]
    pub install_timeout_secs: u64,

    #[serde(default = "default_cache_dir")]
    pub cache_dir: PathBuf,

    #[serde(default)]
    pub apt: ProviderOverrideConfig,
    #[serde(default)]
    pub brew: ProviderOverrideConfig,
    #[serde(default)]
    pub pip: ProviderOverrideConfig,
    #[serde(default)]
    pub npm: ProviderOverrideConfig,
}

impl Default for PkgrConfig {
    fn default() -> Self {
        Self {
            dry_run: false,
            quiet: false,
            version_timeout_secs: default_version_timeout_secs(),
            install_timeout_secs: default_install_timeout_secs(),
            cache_dir: default_cache_dir(),
            apt: Default::default(),
            brew: Default::default(),
            pip: Default::default(),
            npm: Default::default(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Figment(#[from] figment::Error),
}

impl PkgrConfig {
    /// Layer built-in defaults, then an optional `pkgr.toml` at `config_path`
    /// (skipped silently if absent), then `PKGR_*` environment variables.
    pub fn load(config_path: Option<&std::path::Path>) -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));
        if let Some(path) = config_path {
            if path.is_file() {
                figment = figment.merge(Toml::file(path));
            }
        }
        figment = figment.merge(Env::prefixed("PKGR_"));
        Ok(figment.extract()?)
    }

    pub fn version_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.version_timeout_secs)
    }

    pub fn install_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.install_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_load_without_a_file() {
        let config = PkgrConfig::load(None).unwrap();
        assert_eq!(config.version_timeout_secs, 10);
        assert_eq!(config.install_timeout_secs, 120);
        assert!(!config.dry_run);
    }

    #[test]
    fn toml_file_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pkgr.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "dry_run = true\nversion_timeout_secs = 3").unwrap();

        let config = PkgrConfig::load(Some(&path)).unwrap();
        assert!(config.dry_run);
        assert_eq!(config.version_timeout_secs, 3);
    }

    #[test]
    #[serial_test::serial]
    fn env_overrides_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pkgr.toml");
        std::fs::write(&path, "version_timeout_secs = 3\n").unwrap();

        // SAFETY: test-local, not run in parallel with other env mutation.
        unsafe { std::env::set_var("PKGR_VERSION_TIMEOUT_SECS", "7") };
        let config = PkgrConfig::load(Some(&path)).unwrap();
        unsafe { std::env::remove_var("PKGR_VERSION_TIMEOUT_SECS") };

        assert_eq!(config.version_timeout_secs, 7);
    }
}
