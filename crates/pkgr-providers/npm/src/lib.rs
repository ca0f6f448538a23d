//! The `npm` provider: Node packages, installed globally or into a
//! caller-supplied prefix.
//!
//! Grounded on `pydantic_pkgr/binprovider_npm.py`: `PATH` is either
//! restricted to `npm_prefix/node_modules/.bin` (when a prefix is set) or
//! built by walking up from `npm prefix` toward `$HOME` looking for a
//! `node_modules/.bin`, plus the global prefix's `bin/`; abspath/version
//! fall back to `npm show --json` / `npm list --json` when the plain
//! `PATH` search and version probes come up empty; the effective euid
//! drops to the prefix dir's (or `npm` binary's) owner.
//!
//! `npm list --depth=0` is read, not `npm info` — `npm info` reports the
//! latest published version, not what's actually installed.

use pkgr_core::exec::{current_euid, exec, owner_euid, ExecOptions};
use pkgr_core::provider::ProviderConfig;
use pkgr_core::validators::bin_abspath;
use pkgr_core::{PkgrError, PkgrResult, Provider, SemVer};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

const NPM_INSTALL_ARGS: &[&str] = &["--force", "--no-audit", "--no-fund", "--loglevel=error"];
const MAX_WALK_HOPS: usize = 6;

pub struct NpmProvider {
    config: ProviderConfig,
    npm_prefix: Option<PathBuf>,
    cache_dir: PathBuf,
    path: Mutex<Option<String>>,
    local_prefix: Mutex<Option<String>>,
}

impl NpmProvider {
    pub fn new() -> Self {
        let mut config = ProviderConfig::new("npm");
        config.installer_bin = which::which("npm").ok();
        config.euid = Self::detect_euid(&config, None);
        Self {
            config,
            npm_prefix: None,
            cache_dir: std::env::temp_dir().join("npm-cache"),
            path: Mutex::new(None),
            local_prefix: Mutex::new(None),
        }
    }

    pub fn with_prefix(mut self, prefix: PathBuf) -> Self {
        self.config.euid = Self::detect_euid(&self.config, Some(&prefix));
        self.npm_prefix = Some(prefix);
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

    fn detect_euid(config: &ProviderConfig, prefix: Option<&Path>) -> pkgr_core::Euid {
        if let Some(prefix) = prefix {
            if prefix.is_dir() {
                if let Some(euid) = owner_euid(prefix) {
                    return euid;
                }
            }
        }
        if let Some(installer_bin) = config.installer_bin.as_ref() {
            if let Some(euid) = owner_euid(installer_bin) {
                return euid;
            }
        }
        current_euid()
    }

    /// Whether this instance is usable: `npm` must be on `$PATH`, and if a
    /// prefix is configured its `node_modules/.bin` must already exist.
    pub fn is_valid(&self) -> bool {
        if let Some(prefix) = &self.npm_prefix {
            let bin_dir = prefix.join("node_modules").join(".bin");
            if !bin_dir.is_dir() {
                return false;
            }
        }
        self.config.installer_bin.is_some()
    }

    fn exec_opts(&self, timeout: std::time::Duration) -> ExecOptions<'static> {
        ExecOptions {
            cwd: Path::new("/"),
            euid: self.config.euid,
            timeout,
            dry_run: false,
            quiet: true,
        }
    }

    fn npm_local_prefix(&self) -> Option<String> {
        let mut cached = self.local_prefix.lock().unwrap();
        if let Some(prefix) = cached.as_ref() {
            return Some(prefix.clone());
        }
        let installer_bin = self.config.installer_bin.as_ref()?;
        let opts = self.exec_opts(self.config.version_timeout);
        let result = exec(installer_bin, &["prefix"], &opts).ok()?;
        let prefix = result.stdout.trim().to_string();
        *cached = Some(prefix.clone());
        Some(prefix)
    }

    fn npm_global_bin_dir(&self) -> Option<String> {
        let installer_bin = self.config.installer_bin.as_ref()?;
        let opts = self.exec_opts(self.config.version_timeout);
        let result = exec(installer_bin, &["prefix", "-g"], &opts).ok()?;
        Some(format!("{}/bin", result.stdout.trim()))
    }

    /// Walk up from `start` toward `/` or `$HOME`, at most `MAX_WALK_HOPS`
    /// hops, looking for a `node_modules/.bin` dir.
    fn walk_up_for_bin_dir(start: &Path) -> Option<String> {
        let home = dirs::home_dir();
        let mut dir = start.to_path_buf();
        for _ in 0..MAX_WALK_HOPS {
            let candidate = dir.join("node_modules").join(".bin");
            if candidate.is_dir() {
                return Some(candidate.to_string_lossy().to_string());
            }
            if dir == Path::new("/") || home.as_deref() == Some(dir.as_path()) {
                break;
            }
            let Some(parent) = dir.parent() else {
                break;
            };
            dir = parent.to_path_buf();
        }
        None
    }

    fn synthesized_path(&self) -> String {
        let mut cached = self.path.lock().unwrap();
        if let Some(path) = cached.as_ref() {
            return path.clone();
        }

        let base = std::env::var("PATH").unwrap_or_else(|_| "/usr/bin:/bin".to_string());
        let mut dirs: Vec<String> = Vec::new();

        if let Some(prefix) = &self.npm_prefix {
            // Restricted to the configured prefix only, per the source's
            // "restrict PATH to only use npm prefix" rule.
            dirs.push(prefix.join("node_modules").join(".bin").to_string_lossy().to_string());
        } else if self.config.installer_bin.is_some() {
            if let Some(local_prefix) = self.npm_local_prefix() {
                if let Some(found) = Self::walk_up_for_bin_dir(Path::new(&local_prefix)) {
                    dirs.push(found);
                }
            }
            if let Some(global_bin) = self.npm_global_bin_dir() {
                dirs.push(global_bin);
            }
            for dir in base.split(':') {
                dirs.push(dir.to_string());
            }
        } else {
            dirs.extend(base.split(':').map(str::to_string));
        }

        let mut deduped = Vec::new();
        for dir in dirs {
            if !deduped.iter().any(|d: &String| d == &dir) {
                deduped.push(dir);
            }
        }
        let path = deduped.join(":");
        *cached = Some(path.clone());
        path
    }

    fn npm_show_bin_names(&self, package: &str) -> Vec<String> {
        let Some(installer_bin) = self.config.installer_bin.as_ref() else {
            return Vec::new();
        };
        let opts = self.exec_opts(self.config.version_timeout);
        let Ok(result) = exec(installer_bin, &["show", "--json", package], &opts) else {
            return Vec::new();
        };
        extract_bin_names(&result.stdout)
    }

    fn npm_list_version(&self, package: &str) -> Option<SemVer> {
        let installer_bin = self.config.installer_bin.as_ref()?;
        let prefix_arg = match &self.npm_prefix {
            Some(prefix) => format!("--prefix={}", prefix.display()),
            None => "--global".to_string(),
        };
        let opts = self.exec_opts(self.config.version_timeout);
        let result = exec(installer_bin, &["list", &prefix_arg, "--depth=0", "--json", package], &opts).ok()?;
        let version_str = extract_dependency_version(&result.stdout, package)?;
        SemVer::parse(&version_str)
    }
}

impl Default for NpmProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl Provider for NpmProvider {
    fn config(&self) -> &ProviderConfig {
        &self.config
    }

    fn path(&self) -> String {
        self.synthesized_path()
    }

    fn setup(&self) -> PkgrResult<()> {
        std::fs::create_dir_all(&self.cache_dir)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let _ = std::fs::set_permissions(&self.cache_dir, std::fs::Permissions::from_mode(0o777));
        }
        if let Some(prefix) = &self.npm_prefix {
            std::fs::create_dir_all(prefix.join("node_modules").join(".bin"))?;
        }
        Ok(())
    }

    fn get_abspath_opts(&self, name: &str, nocache: bool) -> PkgrResult<Option<PathBuf>> {
        if let Some(found) = bin_abspath(name, &self.path()) {
            let _ = nocache;
            return Ok(Some(found));
        }

        let packages = self.get_packages(name)?;
        let Some(main_package) = packages.first() else {
            return Ok(None);
        };
        for alt_name in self.npm_show_bin_names(main_package) {
            if let Some(found) = bin_abspath(&alt_name, &self.path()) {
                return Ok(Some(found));
            }
        }
        Ok(None)
    }

    fn get_version_opts(
        &self,
        name: &str,
        abspath: Option<&Path>,
        nocache: bool,
    ) -> PkgrResult<Option<SemVer>> {
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
        let Some(main_package) = packages.first() else {
            return Ok(None);
        };
        let package = strip_version_spec(main_package);
        Ok(self.npm_list_version(&package))
    }

    fn run_install(&self, name: &str, packages: &[String]) -> PkgrResult<()> {
        self.setup()?;
        let Some(installer_bin) = self.config.installer_bin.clone() else {
            return Err(PkgrError::InstallFailed {
                provider: self.name().to_string(),
                name: name.to_string(),
                reason: "npm is not available on this host".to_string(),
            });
        };

        let cache_arg = format!("--cache={}", self.cache_dir.display());
        let prefix_arg = match &self.npm_prefix {
            Some(prefix) => format!("--prefix={}", prefix.display()),
            None => "--global".to_string(),
        };

        let mut argv: Vec<&str> = vec!["install"];
        argv.extend(NPM_INSTALL_ARGS.iter().copied());
        argv.push(&cache_arg);
        argv.push(&prefix_arg);
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
                reason: format!("npm exited {}: {}", result.returncode, result.stderr),
            });
        }
        Ok(())
    }
}

/// `"@postlight/parser@^1.2.3"` -> `"@postlight/parser"`, `"wget@1"` -> `"wget"`.
fn strip_version_spec(package: &str) -> String {
    if let Some(rest) = package.strip_prefix('@') {
        format!("@{}", rest.split('@').next().unwrap_or(rest))
    } else {
        package.split('@').next().unwrap_or(package).to_string()
    }
}

/// The key names of the `"bin"` object in an `npm show --json` blob.
fn extract_bin_names(json: &str) -> Vec<String> {
    let Ok(value) = serde_json::from_str::<serde_json::Value>(json) else {
        return Vec::new();
    };
    value
        .get("bin")
        .and_then(serde_json::Value::as_object)
        .map(|bin| bin.keys().cloned().collect())
        .unwrap_or_default()
}

/// `"version"` out of `{"dependencies": {"<package>": {"version": "x.y.z", ...}}}`,
/// as printed by `npm list --json`.
fn extract_dependency_version(json: &str, package: &str) -> Option<String> {
    let value = serde_json::from_str::<serde_json::Value>(json).ok()?;
    value
        .get("dependencies")?
        .get(package)?
        .get("version")?
        .as_str()
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_scoped_version_spec() {
        assert_eq!(strip_version_spec("@postlight/parser@^1.2.3"), "@postlight/parser");
        assert_eq!(strip_version_spec("wget@1"), "wget");
        assert_eq!(strip_version_spec("ffmpeg"), "ffmpeg");
    }

    #[test]
    fn extracts_bin_object_keys() {
        // `npm show --json` is pretty-printed, multi-line output; the parser
        // must not assume the object fits on one line.
        let json = "{\n  \"version\": \"2.2.3\",\n  \"bin\": {\n    \"mercury-parser\": \"cli.js\",\n    \"postlight-parser\": \"cli.js\"\n  }\n}";
        let mut keys = extract_bin_names(json);
        keys.sort();
        assert_eq!(keys, vec!["mercury-parser", "postlight-parser"]);
    }

    #[test]
    fn extracts_nested_dependency_version() {
        let json = "{\n  \"name\": \"lib\",\n  \"dependencies\": {\n    \"@postlight/parser\": {\n      \"version\": \"2.2.3\",\n      \"overridden\": false\n    }\n  }\n}";
        let version = extract_dependency_version(json, "@postlight/parser").unwrap();
        assert_eq!(version, "2.2.3");
    }

    #[test]
    fn prefix_restricts_path_to_its_own_bin_dir() {
        let provider = NpmProvider::new().with_prefix(PathBuf::from("/tmp/my-prefix"));
        assert_eq!(provider.path(), "/tmp/my-prefix/node_modules/.bin");
    }

    #[test]
    fn without_prefix_is_invalid_unless_npm_is_on_path() {
        let provider = NpmProvider::new();
        assert_eq!(provider.is_valid(), provider.config().installer_bin.is_some());
    }
}
