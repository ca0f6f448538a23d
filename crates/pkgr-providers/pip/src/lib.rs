//! The `pip` provider: Python packages from PyPI.
//!
//! Grounded on `pydantic_pkgr/binprovider_pip.py`: `PATH` starts at the
//! interpreter's `sysconfig` scripts dir and is extended with every
//! site-packages dir's sibling `bin/`; install runs `pip install` with a
//! pinned cache dir. The source queries `sysconfig`/`site` in-process
//! (it *is* the Python process); this port has no embedded interpreter; it
//! shells out to `python3 -c ...` to ask the same questions of whichever
//! interpreter owns the resolved `pip`.
//!
//! `pip_venv` is this port's own addition (tracked in `PkgrConfig`): when
//! set, `setup` creates the venv on first use and every lookup is scoped
//! to its `bin/` instead of the ambient interpreter.

use pkgr_core::exec::{exec, ExecOptions};
use pkgr_core::provider::ProviderConfig;
use pkgr_core::{PkgrError, PkgrResult, Provider};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

const SITE_PATHS_SCRIPT: &str = "import sysconfig, site, json; print(json.dumps({'scripts': sysconfig.get_path('scripts'), 'site_packages': site.getsitepackages() if hasattr(site, 'getsitepackages') else [], 'user_site_packages': site.getusersitepackages()}))";

pub struct PipProvider {
    config: ProviderConfig,
    pip_venv: Option<PathBuf>,
    path: Mutex<Option<String>>,
}

impl PipProvider {
    pub fn new() -> Self {
        let mut config = ProviderConfig::new("pip");
        config.installer_bin = which::which("pip").or_else(|_| which::which("pip3")).ok();
        Self {
            config,
            pip_venv: None,
            path: Mutex::new(None),
        }
    }

    pub fn with_venv(mut self, venv: PathBuf) -> Self {
        self.pip_venv = Some(venv);
        self
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.config.dry_run = dry_run;
        self
    }

    pub fn with_quiet(mut self, quiet: bool) -> Self {
        self.config.quiet = quiet;
        self
    }

    fn venv_bin_dir(&self) -> Option<PathBuf> {
        self.pip_venv.as_ref().map(|venv| venv.join("bin"))
    }

    fn venv_pip(&self) -> Option<PathBuf> {
        self.venv_bin_dir().map(|dir| dir.join("pip"))
    }

    fn effective_installer_bin(&self) -> Option<PathBuf> {
        self.venv_pip().filter(|p| p.is_file()).or_else(|| self.config.installer_bin.clone())
    }

    /// Ask the interpreter behind the resolved `pip` for its scripts dir and
    /// site-packages dirs, deriving each site-packages dir's sibling `bin/`.
    /// Best-effort: any failure just yields an empty extension list.
    fn query_interpreter_paths(&self) -> Vec<String> {
        let Ok(python3) = which::which("python3") else {
            return Vec::new();
        };
        let opts = ExecOptions {
            cwd: Path::new("/"),
            euid: self.config.euid,
            timeout: self.config.version_timeout,
            dry_run: false,
            quiet: true,
        };
        let Ok(result) = exec(&python3, &["-c", SITE_PATHS_SCRIPT], &opts) else {
            return Vec::new();
        };
        site_paths::parse(&result.stdout).bin_dirs()
    }

    fn synthesized_path(&self) -> String {
        let mut cached = self.path.lock().unwrap();
        if let Some(path) = cached.as_ref() {
            return path.clone();
        }

        if let Some(venv_bin) = self.venv_bin_dir() {
            let path = venv_bin.to_string_lossy().to_string();
            *cached = Some(path.clone());
            return path;
        }

        let base = std::env::var("PATH").unwrap_or_else(|_| "/usr/bin:/bin".to_string());
        let mut dirs: Vec<String> = base.split(':').map(str::to_string).collect();
        for dir in self.query_interpreter_paths() {
            if !dirs.iter().any(|d| d == &dir) {
                dirs.push(dir);
            }
        }
        let path = dirs.join(":");
        *cached = Some(path.clone());
        path
    }
}

impl Default for PipProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl Provider for PipProvider {
    fn config(&self) -> &ProviderConfig {
        &self.config
    }

    fn path(&self) -> String {
        self.synthesized_path()
    }

    fn setup(&self) -> PkgrResult<()> {
        let Some(venv) = self.pip_venv.as_ref() else {
            return Ok(());
        };
        if venv.is_dir() {
            return Ok(());
        }
        let Ok(python3) = which::which("python3") else {
            return Err(PkgrError::InstallFailed {
                provider: self.name().to_string(),
                name: "pip_venv".to_string(),
                reason: "python3 not found in $PATH, cannot create venv".to_string(),
            });
        };
        let opts = ExecOptions {
            cwd: Path::new("/"),
            euid: self.config.euid,
            timeout: self.config.install_timeout,
            dry_run: self.config.dry_run,
            quiet: self.config.quiet,
        };
        let venv_str = venv.to_string_lossy().to_string();
        let result = exec(&python3, &["-m", "venv", &venv_str], &opts)?;
        if result.returncode != 0 {
            return Err(PkgrError::InstallFailed {
                provider: self.name().to_string(),
                name: "pip_venv".to_string(),
                reason: format!("venv creation exited {}: {}", result.returncode, result.stderr),
            });
        }
        Ok(())
    }

    fn run_install(&self, name: &str, packages: &[String]) -> PkgrResult<()> {
        let Some(installer_bin) = self.effective_installer_bin() else {
            return Err(PkgrError::InstallFailed {
                provider: self.name().to_string(),
                name: name.to_string(),
                reason: "pip is not available on this host".to_string(),
            });
        };

        let cache_dir = std::env::temp_dir().join("pkgr-pip-cache");
        let cache_arg = format!("--cache-dir={}", cache_dir.display());

        let mut argv = vec!["install", "--no-input", "--disable-pip-version-check", &cache_arg];
        argv.extend(packages.iter().map(String::as_str));

        let opts = ExecOptions {
            cwd: Path::new("/"),
            euid: self.config.euid,
            timeout: self.config.install_timeout,
            dry_run: self.config.dry_run,
            quiet: self.config.quiet,
        };
        let result = exec(&installer_bin, &argv, &opts)?;
        if result.returncode != 0 {
            return Err(PkgrError::InstallFailed {
                provider: self.name().to_string(),
                name: name.to_string(),
                reason: format!("pip exited {}: {}", result.returncode, result.stderr),
            });
        }
        Ok(())
    }
}

/// Reads the one JSON shape this provider emits to itself:
/// `{"scripts": str, "site_packages": [str], "user_site_packages": str}`.
mod site_paths {
    use serde::Deserialize;

    #[derive(Debug, Default, Deserialize)]
    pub struct SitePaths {
        scripts: Option<String>,
        #[serde(default)]
        site_packages: Vec<String>,
        user_site_packages: Option<String>,
    }

    impl SitePaths {
        pub fn bin_dirs(&self) -> Vec<String> {
            let mut dirs = Vec::new();
            if let Some(scripts) = &self.scripts {
                dirs.push(scripts.clone());
            }
            for site_packages in &self.site_packages {
                if let Some(bin) = sibling_bin_dir(site_packages) {
                    dirs.push(bin);
                }
            }
            if let Some(user) = &self.user_site_packages {
                if let Some(bin) = sibling_bin_dir(user) {
                    dirs.push(bin);
                }
            }
            dirs
        }
    }

    /// `.../lib/pythonX.Y/site-packages` -> `.../bin`, three levels up.
    fn sibling_bin_dir(site_packages: &str) -> Option<String> {
        let path = std::path::Path::new(site_packages);
        let bin = path.parent()?.parent()?.parent()?.join("bin");
        Some(bin.to_string_lossy().to_string())
    }

    pub fn parse(raw: &str) -> SitePaths {
        serde_json::from_str(raw.trim()).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sibling_bin_dir_derives_three_levels_up() {
        let dirs = site_paths::parse(
            r#"{"scripts": "/usr/bin", "site_packages": ["/opt/py/lib/python3.11/site-packages"], "user_site_packages": "/home/me/.local/lib/python3.11/site-packages"}"#,
        )
        .bin_dirs();
        assert!(dirs.contains(&"/usr/bin".to_string()));
        assert!(dirs.contains(&"/opt/py/bin".to_string()));
        assert!(dirs.contains(&"/home/me/.local/bin".to_string()));
    }

    #[test]
    fn malformed_json_yields_no_dirs() {
        assert!(site_paths::parse("not json").bin_dirs().is_empty());
    }

    #[test]
    fn venv_bin_dir_is_scoped_to_venv() {
        let provider = PipProvider::new().with_venv(PathBuf::from("/tmp/my-venv"));
        assert_eq!(provider.path(), "/tmp/my-venv/bin");
    }

    #[test]
    fn without_venv_installer_bin_falls_back_to_ambient_pip() {
        let provider = PipProvider::new();
        assert!(provider.pip_venv.is_none());
    }
}
