//! The `Binary` aggregate: a named binary backed by an ordered list of
//! providers, tried in turn until one succeeds.
//!
//! Grounded on `pydantic_pkgr/binary.py`'s `Binary` model: `load`/`install`/
//! `load_or_install` walk `binproviders_supported` in order, returning the
//! first provider's result that validates; per-binary overrides supplied by
//! the caller take precedence over a provider's own `handlers_for`, which in
//! turn takes precedence over whatever the provider was constructed with.
//! All provider failures are collected and surfaced together rather than
//! only reporting the last one, mirroring the source's `outer_exc`/
//! `inner_exc` chain but without losing the earlier attempts' reasons.

use pkgr_core::handler::{merge_without_overwrite, resolve_handler, HandlerKind, HandlerOverrides};
use pkgr_core::provider::ProviderConfig;
use pkgr_core::validators::bin_name;
use pkgr_core::{HandlerRegistry, PkgrError, PkgrResult, Provider, SemVer, ShallowBinary};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::debug;

/// A name plus the ordered set of providers allowed to resolve it, and any
/// per-binary handler overrides the caller wants applied ahead of whatever
/// each provider was built with.
pub struct Binary {
    pub name: String,
    pub description: String,
    providers: Vec<Arc<dyn Provider>>,
    /// provider name -> per-binary handler overrides, keyed like any other
    /// `HandlerOverrides` (by this binary's name or the `"*"` wildcard).
    overrides: HashMap<String, HandlerOverrides>,
}

impl Binary {
    pub fn new(name: impl AsRef<str>, providers: Vec<Arc<dyn Provider>>) -> PkgrResult<Self> {
        let name = bin_name(name.as_ref())?;
        if providers.is_empty() {
            return Err(PkgrError::InvalidInput {
                field: "providers",
                value: name,
                reason: "at least one provider must be configured".to_string(),
            });
        }
        Ok(Self {
            description: name.clone(),
            name,
            providers,
            overrides: HashMap::new(),
        })
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Register a caller-supplied handler override for one provider. Wins
    /// over that provider's own `handlers_for` and its construction-time
    /// overrides for this binary.
    pub fn with_override(
        mut self,
        provider_name: impl Into<String>,
        kind: HandlerKind,
        handler_ref: pkgr_core::HandlerRef,
    ) -> Self {
        self.overrides
            .entry(provider_name.into())
            .or_default()
            .entry(self.name.clone())
            .or_default()
            .insert(kind, handler_ref);
        self
    }

    pub fn providers(&self) -> &[Arc<dyn Provider>] {
        &self.providers
    }

    /// Precedence, highest first: this binary's own overrides for the
    /// provider, then the provider's `handlers_for` for this binary name,
    /// then the provider's own construction-time overrides.
    fn merged_overrides(&self, provider: &dyn Provider) -> HandlerOverrides {
        let mut merged: HandlerOverrides = HashMap::new();
        if let Some(binary_overrides) = self.overrides.get(provider.name()) {
            merge_without_overwrite(&mut merged, binary_overrides);
        }
        merge_without_overwrite(&mut merged, &provider.handlers_for(&self.name));
        merge_without_overwrite(&mut merged, &provider.config().overrides);
        merged
    }

    fn overlay<'a>(&self, provider: &'a dyn Provider) -> OverlayProvider<'a> {
        OverlayProvider::new(provider, self.merged_overrides(provider))
    }

    pub fn load(&self) -> PkgrResult<ShallowBinary> {
        self.try_providers(|overlay| overlay.load(&self.name))
    }

    pub fn install(&self) -> PkgrResult<ShallowBinary> {
        self.try_providers(|overlay| overlay.install(&self.name))
    }

    pub fn load_or_install(&self) -> PkgrResult<ShallowBinary> {
        self.try_providers(|overlay| overlay.load_or_install(&self.name))
    }

    fn try_providers(
        &self,
        op: impl Fn(&OverlayProvider) -> PkgrResult<Option<ShallowBinary>>,
    ) -> PkgrResult<ShallowBinary> {
        let mut errors = Vec::new();
        for provider in &self.providers {
            let overlay = self.overlay(provider.as_ref());
            match op(&overlay) {
                Ok(Some(binary)) if binary.is_valid() => return Ok(binary),
                Ok(Some(_)) => {
                    errors.push((provider.name().to_string(), "resolved but is not valid".to_string()));
                }
                Ok(None) => {
                    errors.push((provider.name().to_string(), "binary not found".to_string()));
                }
                Err(err) => {
                    debug!(provider = provider.name(), error = %err, "provider failed");
                    errors.push((provider.name().to_string(), err.to_string()));
                }
            }
        }
        Err(PkgrError::all_providers_failed(self.name.clone(), errors))
    }
}

/// Wraps one real provider with a merged override map for a single
/// resolution pass, without mutating the provider itself (providers are
/// shared `Arc<dyn Provider>` instances, often reused across many
/// binaries). Falls through to the wrapped provider's own abspath/version/
/// packages/install logic whenever no override applies, so provider-specific
/// fallbacks (brew's Cellar probing, npm's `show`/`list` fallback) are
/// preserved on the non-overridden path.
struct OverlayProvider<'a> {
    inner: &'a dyn Provider,
    config: ProviderConfig,
}

impl<'a> OverlayProvider<'a> {
    fn new(inner: &'a dyn Provider, overrides: HandlerOverrides) -> Self {
        let inner_config = inner.config();
        let config = ProviderConfig {
            name: inner_config.name.clone(),
            installer_bin: inner_config.installer_bin.clone(),
            euid: inner_config.euid,
            overrides,
            dry_run: inner_config.dry_run,
            quiet: inner_config.quiet,
            version_timeout: inner_config.version_timeout,
            install_timeout: inner_config.install_timeout,
            cache: Mutex::new(pkgr_core::cache::ResultCache::new()),
        };
        Self { inner, config }
    }
}

impl<'a> Provider for OverlayProvider<'a> {
    fn config(&self) -> &ProviderConfig {
        &self.config
    }

    fn name(&self) -> &str {
        self.inner.name()
    }

    fn path(&self) -> String {
        self.inner.path()
    }

    fn registry(&self) -> HandlerRegistry {
        self.inner.registry()
    }

    fn setup(&self) -> PkgrResult<()> {
        self.inner.setup()
    }

    fn handlers_for(&self, name: &str) -> HandlerOverrides {
        self.inner.handlers_for(name)
    }

    fn get_abspath_opts(&self, name: &str, nocache: bool) -> PkgrResult<Option<PathBuf>> {
        if let Some(handler_ref) = resolve_handler(&self.config.overrides, name, HandlerKind::Abspath) {
            let resolved = handler_ref.resolve(name, &self.registry())?;
            return Ok(Some(PathBuf::from(resolved)));
        }
        self.inner.get_abspath_opts(name, nocache)
    }

    fn get_version_opts(
        &self,
        name: &str,
        abspath: Option<&Path>,
        nocache: bool,
    ) -> PkgrResult<Option<SemVer>> {
        if let Some(handler_ref) = resolve_handler(&self.config.overrides, name, HandlerKind::Version) {
            let resolved = handler_ref.resolve(name, &self.registry())?;
            return Ok(SemVer::parse(&resolved));
        }
        self.inner.get_version_opts(name, abspath, nocache)
    }

    fn get_packages(&self, name: &str) -> PkgrResult<Vec<String>> {
        if let Some(handler_ref) = resolve_handler(&self.config.overrides, name, HandlerKind::Packages) {
            let resolved = handler_ref.resolve(name, &self.registry())?;
            return Ok(resolved.split(',').map(str::to_string).collect());
        }
        self.inner.get_packages(name)
    }

    fn run_install(&self, name: &str, packages: &[String]) -> PkgrResult<()> {
        if let Some(handler_ref) = resolve_handler(&self.config.overrides, name, HandlerKind::Install) {
            handler_ref.resolve(name, &self.registry())?;
            return Ok(());
        }
        self.inner.run_install(name, packages)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pkgr_core::handler::WILDCARD;
    use pkgr_core::HandlerRef;

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

    fn fake_binary(dir: &Path, name: &str, version_output: &str) -> String {
        let script = dir.join(name);
        std::fs::write(&script, format!("#!/bin/sh\necho '{version_output}'\n")).unwrap();
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();
        }
        dir.to_string_lossy().to_string()
    }

    #[test]
    fn first_successful_provider_wins() {
        let empty_dir = tempfile::tempdir().unwrap();
        let found_dir = tempfile::tempdir().unwrap();
        let path = fake_binary(found_dir.path(), "fake-tool", "fake-tool 1.2.3");

        let empty_provider: Arc<dyn Provider> = Arc::new(StubProvider {
            config: ProviderConfig::new("empty"),
            path: empty_dir.path().to_string_lossy().to_string(),
        });
        let real_provider: Arc<dyn Provider> = Arc::new(StubProvider {
            config: ProviderConfig::new("real"),
            path,
        });

        let binary = Binary::new("fake-tool", vec![empty_provider, real_provider]).unwrap();
        let loaded = binary.load().unwrap();
        assert_eq!(loaded.loaded_binprovider.as_deref(), Some("real"));
        assert_eq!(loaded.loaded_version.unwrap().as_triple(), (1, 2, 3));
    }

    #[test]
    fn all_providers_failing_is_reported_together() {
        let dir = tempfile::tempdir().unwrap();
        let a: Arc<dyn Provider> = Arc::new(StubProvider {
            config: ProviderConfig::new("prov_a"),
            path: dir.path().to_string_lossy().to_string(),
        });
        let b: Arc<dyn Provider> = Arc::new(StubProvider {
            config: ProviderConfig::new("prov_b"),
            path: dir.path().to_string_lossy().to_string(),
        });

        let binary = Binary::new("does-not-exist", vec![a, b]).unwrap();
        let err = binary.load().unwrap_err();
        let message = err.to_string();
        assert!(message.contains("prov_a"));
        assert!(message.contains("prov_b"));
    }

    #[test]
    fn binary_level_override_wins_over_provider_subprocess() {
        let dir = tempfile::tempdir().unwrap();
        let provider: Arc<dyn Provider> = Arc::new(StubProvider {
            config: ProviderConfig::new("stub"),
            path: dir.path().to_string_lossy().to_string(),
        });

        let binary = Binary::new("anything", vec![provider])
            .unwrap()
            .with_override("stub", HandlerKind::Abspath, HandlerRef::Literal("/bin/true".into()))
            .with_override("stub", HandlerKind::Version, HandlerRef::Literal("9.9.9".into()));

        let loaded = binary.load().unwrap();
        assert_eq!(loaded.loaded_abspath, Some(PathBuf::from("/bin/true")));
        assert_eq!(loaded.loaded_version.unwrap().as_triple(), (9, 9, 9));
    }

    #[test]
    fn wildcard_provider_override_is_respected_through_the_overlay() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = ProviderConfig::new("stub");
        config
            .overrides
            .entry(WILDCARD.into())
            .or_default()
            .insert(HandlerKind::Version, HandlerRef::Literal("5.5.5".into()));
        let provider: Arc<dyn Provider> = Arc::new(StubProvider {
            config,
            path: fake_binary(dir.path(), "wild-tool", "wild-tool 1.0.0"),
        });

        let binary = Binary::new("wild-tool", vec![provider]).unwrap();
        let loaded = binary.load().unwrap();
        assert_eq!(loaded.loaded_version.unwrap().as_triple(), (5, 5, 5));
    }

    #[test]
    fn empty_provider_list_is_rejected() {
        assert!(Binary::new("anything", vec![]).is_err());
    }
}
