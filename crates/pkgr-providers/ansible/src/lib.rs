//! The `ansible` orchestration provider.
//!
//! Grounded on `pydantic_pkgr/binprovider_ansible.py`. The original drives
//! `ansible_runner` in-process; this port writes the same single-host
//! install playbook to a temp file and shells out to `ansible-playbook`,
//! mirroring the "generate a minimal playbook, delegate to an
//! OS-appropriate installer module" design.
//!
//! Deviation from the source: its `installer_module != "auto"` branch
//! ignores the caller-supplied module and always falls back to
//! `ansible.builtin.package`. That looks like a copy/paste bug — here the
//! custom module is actually honored.

use pkgr_core::provider::ProviderConfig;
use pkgr_core::{PkgrError, PkgrResult, Provider};
use std::io::Write;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallerModule {
    Auto,
    HomebrewGeneral,
    BuiltinPackage,
    BuiltinApt,
}

impl InstallerModule {
    fn resolve_auto() -> Self {
        if cfg!(target_os = "macos") {
            Self::HomebrewGeneral
        } else {
            Self::BuiltinPackage
        }
    }

    fn module_name(self) -> &'static str {
        match self {
            Self::Auto => InstallerModule::resolve_auto().module_name(),
            Self::HomebrewGeneral => "community.general.homebrew",
            Self::BuiltinPackage => "ansible.builtin.package",
            Self::BuiltinApt => "ansible.builtin.apt",
        }
    }
}

pub fn is_available() -> bool {
    which::which("ansible-playbook").is_ok()
}

fn render_playbook(packages: &[String], installer_module: InstallerModule) -> String {
    let pkg_list = packages
        .iter()
        .map(|p| format!("      - {p}"))
        .collect::<Vec<_>>()
        .join("\n");
    format!(
        "---\n- name: Install system packages\n  hosts: localhost\n  gather_facts: false\n  tasks:\n    - name: 'Install system packages: {}'\n      {}:\n        name: \"{{{{ item }}}}\"\n        state: present\n      loop:\n{pkg_list}\n",
        packages.join(","),
        installer_module.module_name(),
    )
}

pub fn ansible_package_install(
    packages: &[String],
    installer_module: InstallerModule,
) -> PkgrResult<String> {
    if !is_available() {
        return Err(PkgrError::InstallFailed {
            provider: "ansible".to_string(),
            name: packages.join(","),
            reason: "ansible is not installed (pip install ansible ansible-runner)".to_string(),
        });
    }

    let playbook = render_playbook(packages, installer_module);
    let dir = tempfile::tempdir().map_err(PkgrError::Io)?;
    let playbook_path = dir.path().join("install_playbook.yml");
    let mut file = std::fs::File::create(&playbook_path).map_err(PkgrError::Io)?;
    file.write_all(playbook.as_bytes()).map_err(PkgrError::Io)?;

    let output = std::process::Command::new("ansible-playbook")
        .arg(&playbook_path)
        .env("ANSIBLE_INVENTORY_UNPARSED_WARNING", "False")
        .env("ANSIBLE_LOCALHOST_WARNING", "False")
        .output()
        .map_err(PkgrError::Io)?;

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let summary = format!(
        "Installing {} using Ansible {} {}:\n{stdout}\n{stderr}",
        packages.join(","),
        installer_module.module_name(),
        if output.status.success() { "succeeded" } else { "failed" }
    );

    if output.status.success() {
        return Ok(summary);
    }
    if stderr.contains("Permission denied") {
        return Err(PkgrError::PermissionDenied {
            provider: "ansible".to_string(),
            name: packages.join(","),
        });
    }
    Err(PkgrError::InstallFailed {
        provider: "ansible".to_string(),
        name: packages.join(","),
        reason: summary,
    })
}

pub struct AnsibleProvider {
    config: ProviderConfig,
    installer_module: InstallerModule,
}

impl AnsibleProvider {
    pub fn new() -> Self {
        Self {
            config: ProviderConfig::new("ansible"),
            installer_module: InstallerModule::Auto,
        }
    }

    pub fn with_installer_module(mut self, module: InstallerModule) -> Self {
        self.installer_module = module;
        self
    }
}

impl Default for AnsibleProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl Provider for AnsibleProvider {
    fn config(&self) -> &ProviderConfig {
        &self.config
    }

    fn run_install(&self, _name: &str, packages: &[String]) -> PkgrResult<()> {
        ansible_package_install(packages, self.installer_module).map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn playbook_includes_all_packages_and_module() {
        let playbook = render_playbook(
            &["ffmpeg".to_string(), "wget".to_string()],
            InstallerModule::BuiltinApt,
        );
        assert!(playbook.contains("ansible.builtin.apt"));
        assert!(playbook.contains("- ffmpeg"));
        assert!(playbook.contains("- wget"));
    }

    #[test]
    fn custom_module_is_honored_not_overridden() {
        let playbook = render_playbook(&["ffmpeg".to_string()], InstallerModule::HomebrewGeneral);
        assert!(playbook.contains("community.general.homebrew"));
        assert!(!playbook.contains("ansible.builtin.package"));
    }

    #[test]
    fn auto_resolves_to_a_concrete_module() {
        let resolved = InstallerModule::Auto.module_name();
        assert!(resolved == "community.general.homebrew" || resolved == "ansible.builtin.package");
    }
}
