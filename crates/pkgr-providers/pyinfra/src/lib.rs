//! The `pyinfra` orchestration provider.
//!
//! Grounded on `pydantic_pkgr/binprovider_pyinfra.py`. The original shells
//! out to the `pyinfra` Python API directly (`add_op`/`run_ops` against an
//! in-process `@local` inventory); this port instead generates a minimal
//! single-host deploy script and invokes the `pyinfra` CLI against it —
//! the same "emit a tiny playbook, delegate to an OS-appropriate installer
//! module" shape, expressed as a subprocess boundary rather than a Python
//! import, per the redesign notes on dotted-import/reflection mechanisms.

use pkgr_core::provider::ProviderConfig;
use pkgr_core::{PkgrError, PkgrResult, Provider};
use std::io::Write;

/// Which pyinfra operations module installs packages on this host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallerModule {
    Auto,
    Brew,
    Apt,
    Server,
}

impl InstallerModule {
    fn resolve_auto() -> Self {
        if cfg!(target_os = "macos") {
            Self::Brew
        } else {
            Self::Server
        }
    }

    fn dotted_path(self) -> &'static str {
        match self {
            Self::Auto => InstallerModule::resolve_auto().dotted_path(),
            Self::Brew => "operations.brew.packages",
            Self::Apt => "operations.apt.packages",
            Self::Server => "operations.server.packages",
        }
    }
}

pub fn is_available() -> bool {
    which::which("pyinfra").is_ok()
}

/// Generate a single-host (`@local`) deploy script that installs `packages`
/// via `installer_module`, then run it through the `pyinfra` CLI.
pub fn pyinfra_package_install(
    packages: &[String],
    installer_module: InstallerModule,
) -> PkgrResult<String> {
    if !is_available() {
        return Err(PkgrError::InstallFailed {
            provider: "pyinfra".to_string(),
            name: packages.join(","),
            reason: "pyinfra is not installed (pip install pyinfra)".to_string(),
        });
    }

    let module = installer_module.dotted_path();
    let package_list = packages
        .iter()
        .map(|p| format!("\"{p}\""))
        .collect::<Vec<_>>()
        .join(", ");

    let deploy_script = format!(
        "from pyinfra import operations\n\n{module}(\n    name=\"Install system packages: {}\",\n    packages=[{package_list}],\n)\n",
        packages.join(","),
    );

    let dir = tempfile::tempdir().map_err(PkgrError::Io)?;
    let deploy_path = dir.path().join("deploy.py");
    let mut file = std::fs::File::create(&deploy_path).map_err(PkgrError::Io)?;
    file.write_all(deploy_script.as_bytes()).map_err(PkgrError::Io)?;

    let output = std::process::Command::new("pyinfra")
        .arg("@local")
        .arg(&deploy_path)
        .output()
        .map_err(PkgrError::Io)?;

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let summary = format!(
        "Installing {} using pyinfra {module} {}:\n{stdout}\n{stderr}",
        packages.join(","),
        if output.status.success() { "succeeded" } else { "failed" }
    );

    if output.status.success() {
        return Ok(summary);
    }

    if stderr.contains("Permission denied") {
        return Err(PkgrError::PermissionDenied {
            provider: "pyinfra".to_string(),
            name: packages.join(","),
        });
    }
    Err(PkgrError::InstallFailed {
        provider: "pyinfra".to_string(),
        name: packages.join(","),
        reason: summary,
    })
}

pub struct PyinfraProvider {
    config: ProviderConfig,
    path: String,
    installer_module: InstallerModule,
}

impl PyinfraProvider {
    pub fn new() -> Self {
        let base_path = std::env::var("PATH")
            .unwrap_or_else(|_| "/usr/local/sbin:/usr/local/bin:/usr/sbin:/usr/bin:/sbin:/bin".to_string());
        let path = match which::which("pyinfra").ok().and_then(|p| p.parent().map(|d| d.to_path_buf())) {
            Some(dir) if !base_path.split(':').any(|seg| seg == dir.to_string_lossy()) => {
                format!("{}:{}", dir.display(), base_path)
            }
            _ => base_path,
        };

        Self {
            config: ProviderConfig::new("pyinfra"),
            path,
            installer_module: InstallerModule::Auto,
        }
    }

    pub fn with_installer_module(mut self, module: InstallerModule) -> Self {
        self.installer_module = module;
        self
    }
}

impl Default for PyinfraProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl Provider for PyinfraProvider {
    fn config(&self) -> &ProviderConfig {
        &self.config
    }

    fn path(&self) -> String {
        self.path.clone()
    }

    fn run_install(&self, _name: &str, packages: &[String]) -> PkgrResult<()> {
        pyinfra_package_install(packages, self.installer_module).map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auto_resolves_to_a_concrete_module() {
        let resolved = InstallerModule::Auto.dotted_path();
        assert!(resolved == "operations.brew.packages" || resolved == "operations.server.packages");
    }

    #[test]
    fn install_without_pyinfra_reports_unavailable() {
        if is_available() {
            return;
        }
        let result = pyinfra_package_install(&["ffmpeg".to_string()], InstallerModule::Auto);
        assert!(result.is_err());
    }
}
