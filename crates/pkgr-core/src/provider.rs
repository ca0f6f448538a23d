//! The `Provider` contract: handler dispatch, PATH discovery, caching, and
//! the default abspath/version/packages/install logic every concrete
//! package-manager bridge builds on.
//!
//! Grounded on `pydantic_pkgr/binprovider.py`'s `BinProvider` base class.

use crate::cache::ResultCache;
use crate::error::{PkgrError, PkgrResult};
use crate::exec::{exec, Euid, ExecOptions, ExecResult};
use crate::handler::{resolve_handler, HandlerKind, HandlerOverrides, HandlerRegistry};
use crate::semver::SemVer;
use crate::shallow_binary::{ShallowBinary, UNKNOWN_SHA256};
use crate::validators::bin_abspath;
use sha2::{Digest, Sha256};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;
use tracing::debug;

/// Version probe argument lists tried in order, per the default version
/// handler: `--version`, then `-version`, then `-v`.
const VERSION_PROBES: &[&[&str]] = &[&["--version"], &["-version"], &["-v"]];

/// Shared, read-only policy a provider is configured with. Concrete
/// providers embed this and answer the few methods below that vary
/// per backend (PATH synthesis, install handler, euid selection).
pub struct ProviderConfig {
    pub name: String,
    pub installer_bin: Option<PathBuf>,
    pub euid: Euid,
    pub overrides: HandlerOverrides,
    pub dry_run: bool,
    pub quiet: bool,
    pub version_timeout: Duration,
    pub install_timeout: Duration,
    pub cache: Mutex<ResultCache>,
}

impl ProviderConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            installer_bin: None,
            euid: Euid::default(),
            overrides: HandlerOverrides::default(),
            dry_run: false,
            quiet: false,
            version_timeout: Duration::from_secs(10),
            install_timeout: Duration::from_secs(120),
            cache: Mutex::new(ResultCache::new()),
        }
    }
}

/// A package-manager bridge: given a binary name, find it on the host or
/// install it. Every method has a workable default; concrete providers
/// override only what their backend needs (PATH synthesis and install are
/// almost always overridden, abspath/version/packages rarely are).
pub trait Provider: Send + Sync {
    fn config(&self) -> &ProviderConfig;

    fn name(&self) -> &str {
        &self.config().name
    }

    /// The colon-joined search path this provider resolves binaries
    /// against. Concrete providers synthesize this from their backend
    /// (site-packages, `npm prefix`, Cellar dirs, ...).
    fn path(&self) -> String {
        std::env::var("PATH").unwrap_or_else(|_| "/bin:/usr/bin".to_string())
    }

    /// Handler registry for resolving `Dotted` overrides. Default: empty.
    fn registry(&self) -> HandlerRegistry {
        HandlerRegistry::new()
    }

    /// Provider-specific install implementation. Default: unsupported.
    fn run_install(&self, name: &str, packages: &[String]) -> PkgrResult<()> {
        let _ = packages;
        Err(PkgrError::InstallFailed {
            provider: self.name().to_string(),
            name: name.to_string(),
            reason: "this provider has no install handler".to_string(),
        })
    }

    /// One-time provider-specific preparation before an install (create a
    /// venv, an npm prefix dir, chmod a cache dir, ...). Default: no-op.
    fn setup(&self) -> PkgrResult<()> {
        Ok(())
    }

    /// Per-binary handler overrides this provider exposes for `name`,
    /// pulled by the `Binary` aggregate and merged under this provider's
    /// name. Default: none.
    fn handlers_for(&self, _name: &str) -> HandlerOverrides {
        HandlerOverrides::default()
    }

    fn get_abspath(&self, name: &str) -> PkgrResult<Option<PathBuf>> {
        self.get_abspath_opts(name, false)
    }

    fn get_abspath_opts(&self, name: &str, nocache: bool) -> PkgrResult<Option<PathBuf>> {
        let config = self.config();
        if !nocache {
            let cache = config.cache.lock().unwrap();
            if let Some(cached) = cache.get(HandlerKind::Abspath, name) {
                return Ok(Some(PathBuf::from(cached)));
            }
        }

        let overrides = resolve_handler(&config.overrides, name, HandlerKind::Abspath);
        let resolved = if let Some(handler_ref) = overrides {
            handler_ref.resolve(name, &self.registry())?
        } else {
            match bin_abspath(name, &self.path()) {
                Some(path) => path.to_string_lossy().to_string(),
                None => return Ok(None),
            }
        };

        let path = PathBuf::from(&resolved);
        let mut cache = config.cache.lock().unwrap();
        cache.put(HandlerKind::Abspath, name, resolved, None);
        Ok(Some(path))
    }

    fn get_version(&self, name: &str) -> PkgrResult<Option<SemVer>> {
        self.get_version_opts(name, None, false)
    }

    fn get_version_opts(
        &self,
        name: &str,
        abspath: Option<&Path>,
        nocache: bool,
    ) -> PkgrResult<Option<SemVer>> {
        const UNKNOWN_VERSION: &str = "999.999.999";
        let config = self.config();
        if !nocache {
            let cache = config.cache.lock().unwrap();
            if let Some(cached) = cache.get(HandlerKind::Version, name) {
                return Ok(SemVer::parse(cached));
            }
        }

        if let Some(handler_ref) = resolve_handler(&config.overrides, name, HandlerKind::Version) {
            let resolved = handler_ref.resolve(name, &self.registry())?;
            let mut cache = config.cache.lock().unwrap();
            cache.put(HandlerKind::Version, name, resolved.clone(), Some(UNKNOWN_VERSION));
            return Ok(SemVer::parse(resolved));
        }

        let abspath = match abspath {
            Some(path) => Some(path.to_path_buf()),
            None => self.get_abspath(name)?,
        };
        let Some(abspath) = abspath else {
            return Ok(None);
        };

        let mut last_nonempty_output: Option<String> = None;
        for probe in VERSION_PROBES {
            let opts = ExecOptions {
                cwd: Path::new("/"),
                euid: config.euid,
                timeout: config.version_timeout,
                dry_run: config.dry_run,
                quiet: true,
            };
            let Ok(ExecResult { stdout, .. }) = exec(&abspath, probe, &opts) else {
                continue;
            };
            if stdout.trim().is_empty() {
                continue;
            }
            if let Some(version) = SemVer::parse(&stdout) {
                let mut cache = config.cache.lock().unwrap();
                cache.put(
                    HandlerKind::Version,
                    name,
                    version.to_string(),
                    Some(UNKNOWN_VERSION),
                );
                return Ok(Some(version));
            }
            last_nonempty_output = Some(stdout);
        }

        if let Some(output) = last_nonempty_output {
            return Err(PkgrError::VersionUnparseable {
                provider: self.name().to_string(),
                name: name.to_string(),
                output,
            });
        }
        Ok(None)
    }

    /// Hashes the resolved binary in 4 KiB chunks. Not handler-dispatched
    /// (sha256 is a derived property, not one of the four override kinds);
    /// always recomputed from the current `abspath`.
    fn get_sha256(&self, name: &str) -> PkgrResult<Option<String>> {
        let Some(abspath) = self.get_abspath(name)? else {
            return Ok(None);
        };
        let sha = hash_file_sha256(&abspath)?;
        Ok(Some(sha))
    }

    fn get_packages(&self, name: &str) -> PkgrResult<Vec<String>> {
        let config = self.config();
        if let Some(handler_ref) = resolve_handler(&config.overrides, name, HandlerKind::Packages) {
            let resolved = handler_ref.resolve(name, &self.registry())?;
            return Ok(resolved.split(',').map(str::to_string).collect());
        }
        Ok(vec![name.to_string()])
    }

    fn load(&self, name: &str) -> PkgrResult<Option<ShallowBinary>> {
        let Some(abspath) = self.get_abspath(name)? else {
            return Ok(None);
        };
        let version = self.get_version(name)?;
        let sha256 = self.get_sha256(name)?;

        let mut binary = ShallowBinary::new(name, vec![self.name().to_string()]);
        binary.loaded_binprovider = Some(self.name().to_string());
        binary.loaded_abspath = Some(abspath);
        binary.loaded_version = version;
        binary.loaded_sha256 = sha256.filter(|sha| sha != UNKNOWN_SHA256);
        Ok(Some(binary))
    }

    fn install(&self, name: &str) -> PkgrResult<Option<ShallowBinary>> {
        self.setup()?;
        let packages = self.get_packages(name)?;

        if let Some(handler_ref) = resolve_handler(&self.config().overrides, name, HandlerKind::Install) {
            handler_ref.resolve(name, &self.registry())?;
        } else {
            self.run_install(name, &packages)?;
        }

        if self.config().dry_run {
            let mut binary = ShallowBinary::new(name, vec![self.name().to_string()]);
            binary.loaded_binprovider = Some(self.name().to_string());
            return Ok(Some(binary));
        }

        let abspath = self.get_abspath_opts(name, true)?;
        let version = self.get_version_opts(name, abspath.as_deref(), true)?;
        let sha256 = self.get_sha256(name)?;

        if abspath.is_none() || version.is_none() {
            if !self.config().quiet {
                return Err(PkgrError::InstallFailed {
                    provider: self.name().to_string(),
                    name: name.to_string(),
                    reason: "install completed but the binary could not be located afterward"
                        .to_string(),
                });
            }
            return Ok(None);
        }

        let mut binary = ShallowBinary::new(name, vec![self.name().to_string()]);
        binary.loaded_binprovider = Some(self.name().to_string());
        binary.loaded_abspath = abspath;
        binary.loaded_version = version;
        binary.loaded_sha256 = sha256.filter(|sha| sha != UNKNOWN_SHA256);
        Ok(Some(binary))
    }

    fn load_or_install(&self, name: &str) -> PkgrResult<Option<ShallowBinary>> {
        if let Some(binary) = self.load(name)? {
            if binary.is_valid() {
                return Ok(Some(binary));
            }
        }
        debug!(provider = self.name(), %name, "not found, attempting install");
        self.install(name)
    }
}

fn hash_file_sha256(path: &Path) -> PkgrResult<String> {
    let mut file = std::fs::File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; 4096];
    loop {
        let read = file.read(&mut buffer)?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// Throttle helper for providers (like `apt`) whose install handler must
/// not refresh a remote index more than once per window.
pub struct Throttle {
    last_run: Mutex<Option<std::time::Instant>>,
    window: Duration,
}

impl Throttle {
    pub fn new(window: Duration) -> Self {
        Self {
            last_run: Mutex::new(None),
            window,
        }
    }

    /// Returns `true` if the action should run now (and records that it
    /// did); `false` if it ran within the window and should be skipped.
    pub fn should_run(&self) -> bool {
        let mut last_run = self.last_run.lock().unwrap();
        let now = std::time::Instant::now();
        match *last_run {
            Some(previous) if now.duration_since(previous) < self.window => false,
            _ => {
                *last_run = Some(now);
                true
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::HandlerRef;
    use std::collections::HashMap;

    struct StubProvider {
        config: ProviderConfig,
        path: String,
    }

    impl Provider for StubProvider {
        fn config(&self) -> &ProviderConfig {
            &self.config
        }

        fn path(&self) -> String {
            self.path.clone()
        }
    }

    fn make_fake_binary(dir: &Path, name: &str, version_output: &str) -> PathBuf {
        let script = dir.join(name);
        std::fs::write(
            &script,
            format!("#!/bin/sh\necho '{version_output}'\n"),
        )
        .unwrap();
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();
        }
        script
    }

    #[test]
    fn load_resolves_abspath_and_version() {
        let dir = tempfile::tempdir().unwrap();
        make_fake_binary(dir.path(), "fake-tool", "fake-tool version 1.2.3");

        let provider = StubProvider {
            config: ProviderConfig::new("stub"),
            path: dir.path().to_string_lossy().to_string(),
        };

        let binary = provider.load("fake-tool").unwrap().expect("should load");
        assert_eq!(binary.loaded_version.unwrap().as_triple(), (1, 2, 3));
    }

    #[test]
    fn missing_binary_loads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let provider = StubProvider {
            config: ProviderConfig::new("stub"),
            path: dir.path().to_string_lossy().to_string(),
        };
        assert!(provider.load("does-not-exist").unwrap().is_none());
    }

    #[test]
    fn wildcard_override_short_circuits_subprocess() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = ProviderConfig::new("stub");
        let mut overrides: HandlerOverrides = HashMap::new();
        overrides
            .entry(crate::handler::WILDCARD.into())
            .or_default()
            .insert(HandlerKind::Version, HandlerRef::Literal("1.2.3".into()));
        config.overrides = overrides;

        let provider = StubProvider {
            config,
            path: dir.path().to_string_lossy().to_string(),
        };

        let version = provider.get_version("anything").unwrap().unwrap();
        assert_eq!(version.as_triple(), (1, 2, 3));
    }

    #[test]
    fn get_abspath_is_cached() {
        let dir = tempfile::tempdir().unwrap();
        make_fake_binary(dir.path(), "cached-tool", "cached-tool 1.0.0");
        let provider = StubProvider {
            config: ProviderConfig::new("stub"),
            path: dir.path().to_string_lossy().to_string(),
        };

        let first = provider.get_abspath("cached-tool").unwrap();
        let second = provider.get_abspath("cached-tool").unwrap();
        assert_eq!(first, second);
        assert_eq!(provider.config().cache.lock().unwrap().len(), 1);
    }

    #[test]
    fn default_install_handler_fails_without_override() {
        let dir = tempfile::tempdir().unwrap();
        let provider = StubProvider {
            config: ProviderConfig::new("stub"),
            path: dir.path().to_string_lossy().to_string(),
        };
        assert!(provider.install("anything").is_err());
    }
}
