//! The `env` provider: read-only discovery of whatever is already on
//! `$PATH`. Never installs anything.
//!
//! Grounded on `pydantic_pkgr/binprovider.py`'s `EnvProvider`.

use pkgr_core::provider::ProviderConfig;
use pkgr_core::{PkgrError, PkgrResult, Provider};

pub struct EnvProvider {
    config: ProviderConfig,
    path: String,
}

impl EnvProvider {
    pub fn new() -> Self {
        let path = std::env::var("PATH").unwrap_or_else(|_| "/bin:/usr/bin".to_string());
        // Add the running process's own directory, so a provider can
        // discover and report on its own executable (the self-discovery
        // scenario).
        let own_dir = std::env::current_exe()
            .ok()
            .and_then(|exe| exe.parent().map(|p| p.to_path_buf()));

        let path = match own_dir {
            Some(dir) => format!("{}:{}", dir.display(), path),
            None => path,
        };

        Self {
            config: ProviderConfig::new("env"),
            path,
        }
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.config.dry_run = dry_run;
        self
    }

    pub fn with_quiet(mut self, quiet: bool) -> Self {
        self.config.quiet = quiet;
        self
    }
}

impl Default for EnvProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl Provider for EnvProvider {
    fn config(&self) -> &ProviderConfig {
        &self.config
    }

    fn path(&self) -> String {
        self.path.clone()
    }

    /// `env` is read-only: it never spawns a subprocess or mutates the
    /// filesystem to "install" anything.
    fn run_install(&self, name: &str, _packages: &[String]) -> PkgrResult<()> {
        Err(PkgrError::InstallFailed {
            provider: self.name().to_string(),
            name: name.to_string(),
            reason: "the env provider is read-only and cannot install binaries".to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bash_is_discoverable_on_a_posix_host() {
        if !cfg!(unix) {
            return;
        }
        let provider = EnvProvider::new();
        let Ok(Some(binary)) = provider.load("bash") else {
            return; // no bash on this host; nothing to assert
        };
        assert!(binary.loaded_abspath.is_some());
    }

    #[test]
    fn missing_binary_returns_none_without_panicking() {
        let provider = EnvProvider::new();
        assert!(provider.load("definitely-not-a-real-binary-xyz").unwrap().is_none());
    }

    #[test]
    fn install_always_fails_without_spawning() {
        let provider = EnvProvider::new();
        assert!(provider.install("anything").is_err());
    }

    #[test]
    fn self_discovery_finds_the_running_process() {
        let provider = EnvProvider::new();
        let exe = std::env::current_exe().unwrap();
        let name = exe.file_name().unwrap().to_string_lossy().to_string();
        // The provider's synthesized PATH includes the running binary's own
        // directory, so it should resolve its own executable by basename.
        let found = provider.get_abspath(&name).unwrap();
        assert!(found.is_some());
    }
}
