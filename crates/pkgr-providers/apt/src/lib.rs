//! The `apt` provider: Debian/Ubuntu system packages.
//!
//! Grounded on `pydantic_pkgr/binprovider_apt.py`: PATH is extended with
//! every `/bin`-suffixed directory `dpkg -L bash` reports, installs always
//! run as `euid=0`, and install preference is pyinfra -> ansible -> raw
//! `apt-get` shell-out, with a 24h throttle on `apt-get update`.

use once_cell::sync::Lazy;
use pkgr_core::exec::{exec, Euid, ExecOptions};
use pkgr_core::provider::{ProviderConfig, Throttle};
use pkgr_core::{PkgrError, PkgrResult, Provider};
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

static UPDATE_THROTTLE: Lazy<Throttle> = Lazy::new(|| Throttle::new(Duration::from_secs(60 * 60 * 24)));

pub struct AptProvider {
    config: ProviderConfig,
    path: Mutex<Option<String>>,
}

impl AptProvider {
    pub fn new() -> Self {
        let mut config = ProviderConfig::new("apt");
        config.installer_bin = which::which("apt-get").ok();
        config.euid = Euid {
            uid: Some(0),
            gid: Some(0),
        };
        Self {
            config,
            path: Mutex::new(None),
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

    /// `dpkg -L bash`, filtered to `/bin`-suffixed entries, prepended to
    /// the base `PATH`. Cached for the provider's lifetime after first call.
    fn synthesized_path(&self) -> String {
        let base = std::env::var("PATH").unwrap_or_else(|_| "/usr/bin:/bin".to_string());

        let mut cached = self.path.lock().unwrap();
        if let Some(path) = cached.as_ref() {
            return path.clone();
        }

        let Some(installer_bin) = self.config.installer_bin.as_ref() else {
            *cached = Some(base.clone());
            return base;
        };
        if which::which("dpkg").is_err() {
            *cached = Some(base.clone());
            return base;
        }

        let opts = ExecOptions {
            cwd: Path::new("/"),
            euid: self.config.euid,
            timeout: self.config.version_timeout,
            dry_run: false,
            quiet: true,
        };
        let Ok(result) = exec(installer_bin, &["-L", "bash"], &opts) else {
            *cached = Some(base.clone());
            return base;
        };

        let mut path = base.clone();
        for dir in result.stdout.lines().filter(|line| line.ends_with("/bin")) {
            if !path.split(':').any(|seg| seg == dir) {
                path = format!("{dir}:{path}");
            }
        }
        *cached = Some(path.clone());
        path
    }
}

impl Default for AptProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl Provider for AptProvider {
    fn config(&self) -> &ProviderConfig {
        &self.config
    }

    fn path(&self) -> String {
        self.synthesized_path()
    }

    fn run_install(&self, name: &str, packages: &[String]) -> PkgrResult<()> {
        let Some(installer_bin) = self.config.installer_bin.as_ref() else {
            return Err(PkgrError::InstallFailed {
                provider: self.name().to_string(),
                name: name.to_string(),
                reason: "apt-get is not available on this host".to_string(),
            });
        };
        if which::which("dpkg").is_err() {
            return Err(PkgrError::InstallFailed {
                provider: self.name().to_string(),
                name: name.to_string(),
                reason: "dpkg is not available on this host".to_string(),
            });
        }

        if pkgr_provider_pyinfra::is_available() {
            return pkgr_provider_pyinfra::pyinfra_package_install(
                packages,
                pkgr_provider_pyinfra::InstallerModule::Apt,
            )
            .map(|_| ());
        }
        if pkgr_provider_ansible::is_available() {
            return pkgr_provider_ansible::ansible_package_install(
                packages,
                pkgr_provider_ansible::InstallerModule::BuiltinApt,
            )
            .map(|_| ());
        }

        if UPDATE_THROTTLE.should_run() {
            let opts = ExecOptions {
                cwd: Path::new("/"),
                euid: self.config.euid,
                timeout: self.config.install_timeout,
                dry_run: self.config.dry_run,
                quiet: self.config.quiet,
            };
            let _ = exec(installer_bin, &["update", "-qq"], &opts);
        }

        let mut argv = vec!["install", "-y", "-qq", "--no-install-recommends"];
        argv.extend(packages.iter().map(String::as_str));
        let opts = ExecOptions {
            cwd: Path::new("/"),
            euid: self.config.euid,
            timeout: self.config.install_timeout,
            dry_run: self.config.dry_run,
            quiet: self.config.quiet,
        };
        let result = exec(installer_bin, &argv, &opts)?;
        if result.returncode != 0 {
            return Err(PkgrError::InstallFailed {
                provider: self.name().to_string(),
                name: name.to_string(),
                reason: format!("apt-get exited {}: {}", result.returncode, result.stderr),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn euid_is_hardcoded_to_root() {
        let provider = AptProvider::new();
        assert_eq!(provider.config().euid.uid, Some(0));
    }

    #[test]
    fn path_falls_back_to_env_path_without_dpkg() {
        let provider = AptProvider::new();
        // Just assert it doesn't panic and returns something non-empty.
        assert!(!provider.path().is_empty());
    }
}
