//! The `brew` provider: Homebrew on macOS and Linuxbrew.
//!
//! Grounded on `pydantic_pkgr/binprovider_brew.py`: OS/arch default bin
//! dirs first, `brew --prefix` as a slow fallback; abspath additionally
//! probes `opt/<name>/bin` and Cellar paths; version falls back to
//! `brew info --quiet`; install prefers pyinfra, then ansible, then a raw
//! `brew install` shell-out.

use pkgr_core::exec::{exec, ExecOptions};
use pkgr_core::provider::ProviderConfig;
use pkgr_core::validators::bin_abspath;
use pkgr_core::{PkgrError, PkgrResult, Provider, SemVer};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

const DEFAULT_LINUX_DIR: &str = "/home/linuxbrew/.linuxbrew/bin";

fn default_macos_dir() -> &'static str {
    if cfg!(target_arch = "aarch64") {
        "/opt/homebrew/bin"
    } else {
        "/usr/local/bin"
    }
}

pub struct BrewProvider {
    config: ProviderConfig,
    path: Mutex<Option<String>>,
}

impl BrewProvider {
    pub fn new() -> Self {
        let mut config = ProviderConfig::new("brew");
        config.installer_bin = which::which("brew").ok();
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

    fn synthesized_path(&self) -> String {
        let mut cached = self.path.lock().unwrap();
        if let Some(path) = cached.as_ref() {
            return path.clone();
        }

        let Some(installer_bin) = self.config.installer_bin.clone() else {
            *cached = Some(String::new());
            return String::new();
        };

        let mut candidates = Vec::new();
        if cfg!(target_os = "macos") && Path::new(default_macos_dir()).is_dir() {
            candidates.push(default_macos_dir().to_string());
        }
        if !cfg!(target_os = "macos") && Path::new(DEFAULT_LINUX_DIR).is_dir() {
            candidates.push(DEFAULT_LINUX_DIR.to_string());
        }

        if candidates.is_empty() {
            let opts = ExecOptions {
                cwd: Path::new("/"),
                euid: self.config.euid,
                timeout: self.config.version_timeout,
                dry_run: false,
                quiet: true,
            };
            if let Ok(result) = exec(&installer_bin, &["--prefix"], &opts) {
                candidates.push(format!("{}/bin", result.stdout.trim()));
            }
        }

        let path = candidates.join(":");
        *cached = Some(path.clone());
        path
    }

    fn brew_info(&self, package: &str) -> Option<String> {
        let installer_bin = self.config.installer_bin.as_ref()?;
        let opts = ExecOptions {
            cwd: Path::new("/"),
            euid: self.config.euid,
            timeout: std::time::Duration::from_secs(5),
            dry_run: false,
            quiet: true,
        };
        exec(installer_bin, &["info", "--quiet", package], &opts)
            .ok()
            .map(|result| result.stdout.trim().to_string())
    }

    fn cellar_abspath(&self, name: &str, packages: &[String]) -> Option<PathBuf> {
        for package in packages {
            let Some(info) = self.brew_info(package) else {
                continue;
            };
            let cellar_line = info.lines().find(|line| line.contains("/Cellar/"))?;
            let cellar_path = cellar_line.rsplit_once(" (").map(|(p, _)| p).unwrap_or(cellar_line);
            if let Some(found) = bin_abspath(name, &format!("{cellar_path}/bin")) {
                return Some(found);
            }
        }
        None
    }
}

impl Default for BrewProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl Provider for BrewProvider {
    fn config(&self) -> &ProviderConfig {
        &self.config
    }

    fn path(&self) -> String {
        self.synthesized_path()
    }

    fn get_abspath_opts(&self, name: &str, nocache: bool) -> PkgrResult<Option<PathBuf>> {
        let path = self.synthesized_path();
        if path.is_empty() {
            return Ok(None);
        }

        // Not all brew-installed binaries are symlinked into the default
        // bin dir (e.g. curl, to avoid clobbering the system binary), so
        // also probe the namespaced `opt/<name>/bin` dir.
        let extra_path = path.replace("/bin", &format!("/opt/{name}/bin"));
        let combined = format!("{path}:{extra_path}");
        if let Some(found) = bin_abspath(name, &combined) {
            let _ = nocache;
            return Ok(Some(found));
        }

        let packages = self.get_packages(name)?;
        Ok(self.cellar_abspath(name, &packages))
    }

    fn get_version_opts(
        &self,
        name: &str,
        abspath: Option<&Path>,
        nocache: bool,
    ) -> PkgrResult<Option<SemVer>> {
        // Try the default `--version`/`-version`/`-v` probes first, then
        // fall back to `brew info --quiet` if none produced a version.
        let config = self.config();
        let abspath_owned = match abspath {
            Some(p) => Some(p.to_path_buf()),
            None => self.get_abspath(name)?,
        };

        if let Some(path) = abspath_owned.as_deref() {
            for probe in [["--version"].as_slice(), &["-version"], &["-v"]] {
                let opts = ExecOptions {
                    cwd: Path::new("/"),
                    euid: config.euid,
                    timeout: config.version_timeout,
                    dry_run: config.dry_run,
                    quiet: true,
                };
                if let Ok(result) = exec(path, probe, &opts) {
                    if let Some(version) = SemVer::parse(&result.stdout) {
                        return Ok(Some(version));
                    }
                }
            }
        }

        let _ = nocache;
        let packages = self.get_packages(name)?;
        let Some(package) = packages.last() else {
            return Ok(None);
        };
        Ok(self.brew_info(package).and_then(SemVer::parse))
    }

    fn run_install(&self, name: &str, packages: &[String]) -> PkgrResult<()> {
        let Some(installer_bin) = self.config.installer_bin.clone() else {
            return Err(PkgrError::InstallFailed {
                provider: self.name().to_string(),
                name: name.to_string(),
                reason: "brew is not available on this host".to_string(),
            });
        };

        if pkgr_provider_pyinfra::is_available() {
            return pkgr_provider_pyinfra::pyinfra_package_install(
                packages,
                pkgr_provider_pyinfra::InstallerModule::Brew,
            )
            .map(|_| ());
        }
        if pkgr_provider_ansible::is_available() {
            return pkgr_provider_ansible::ansible_package_install(
                packages,
                pkgr_provider_ansible::InstallerModule::HomebrewGeneral,
            )
            .map(|_| ());
        }

        let opts = ExecOptions {
            cwd: Path::new("/"),
            euid: self.config.euid,
            timeout: self.config.install_timeout,
            dry_run: self.config.dry_run,
            quiet: self.config.quiet,
        };
        let _ = exec(&installer_bin, &["update"], &opts);

        let mut argv = vec!["install"];
        argv.extend(packages.iter().map(String::as_str));
        let result = exec(&installer_bin, &argv, &opts)?;
        if result.returncode != 0 {
            return Err(PkgrError::InstallFailed {
                provider: self.name().to_string(),
                name: name.to_string(),
                reason: format!("brew exited {}: {}", result.returncode, result.stderr),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_macos_dir_picks_arch_appropriate_path() {
        let dir = default_macos_dir();
        assert!(dir == "/opt/homebrew/bin" || dir == "/usr/local/bin");
    }

    #[test]
    fn path_is_empty_without_brew_installed() {
        let provider = BrewProvider::new();
        if provider.config().installer_bin.is_none() {
            assert!(provider.path().is_empty());
        }
    }
}
