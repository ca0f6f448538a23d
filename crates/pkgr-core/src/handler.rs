//! Handler override resolution.
//!
//! The distilled design accepts handler values as either callables or
//! "dotted-import" strings resolved at call time via reflection. Here that
//! becomes a closed tagged sum resolved through an explicit registry —
//! no runtime import machinery, no `eval`.

use crate::error::{PkgrError, PkgrResult};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// The four handler kinds a `Provider` may override, per binary or wildcard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandlerKind {
    Abspath,
    Version,
    Packages,
    Install,
}

impl HandlerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Abspath => "abspath",
            Self::Version => "version",
            Self::Packages => "packages",
            Self::Install => "install",
        }
    }
}

impl fmt::Display for HandlerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A handler override value: either a literal result, a reference to a
/// dotted path resolved through a [`HandlerRegistry`], or a closure.
#[derive(Clone)]
pub enum HandlerRef {
    /// A fixed, already-computed value (wrapped in a nullary closure
    /// at resolution time).
    Literal(String),
    /// A lookup key into the consumer's `HandlerRegistry`, replacing the
    /// source's `importlib`-style dotted import strings.
    Dotted(String),
    /// A provider-bound callable, keyed by method name for display purposes.
    Method(String, Arc<dyn Fn(&str) -> PkgrResult<String> + Send + Sync>),
    /// An arbitrary function taking the binary name as its sole argument.
    Func(Arc<dyn Fn(&str) -> PkgrResult<String> + Send + Sync>),
}

impl fmt::Debug for HandlerRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Literal(value) => write!(f, "Literal({value:?})"),
            Self::Dotted(path) => write!(f, "Dotted({path:?})"),
            Self::Method(name, _) => write!(f, "Method({name:?})"),
            Self::Func(_) => write!(f, "Func(..)"),
        }
    }
}

/// Maps dotted-path strings to callables. Populated by the consumer at
/// startup; resolving an unregistered path is a `NoHandler` error rather
/// than a crash.
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    entries: HashMap<String, Arc<dyn Fn(&str) -> PkgrResult<String> + Send + Sync>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        dotted_path: impl Into<String>,
        handler: impl Fn(&str) -> PkgrResult<String> + Send + Sync + 'static,
    ) {
        self.entries.insert(dotted_path.into(), Arc::new(handler));
    }

    fn get(&self, dotted_path: &str) -> Option<Arc<dyn Fn(&str) -> PkgrResult<String> + Send + Sync>> {
        self.entries.get(dotted_path).cloned()
    }
}

impl HandlerRef {
    /// Resolve this reference into a string result for `binary_name`.
    pub fn resolve(
        &self,
        binary_name: &str,
        registry: &HandlerRegistry,
    ) -> PkgrResult<String> {
        match self {
            Self::Literal(value) => Ok(value.clone()),
            Self::Method(_, func) | Self::Func(func) => func(binary_name),
            Self::Dotted(path) => {
                let handler = registry.get(path).ok_or_else(|| PkgrError::NoHandler {
                    handler: path.clone(),
                    name: binary_name.to_string(),
                })?;
                handler(binary_name)
            }
        }
    }
}

/// Per-binary-name (or `"*"` wildcard) handler overrides for one kind.
pub type HandlerOverrides = HashMap<String, HashMap<HandlerKind, HandlerRef>>;

pub const WILDCARD: &str = "*";

/// Resolve precedence: explicit per-binary override, provider wildcard
/// override, then the caller-supplied default.
pub fn resolve_handler<'a>(
    overrides: &'a HandlerOverrides,
    binary_name: &str,
    kind: HandlerKind,
) -> Option<&'a HandlerRef> {
    overrides
        .get(binary_name)
        .and_then(|byname| byname.get(&kind))
        .or_else(|| {
            overrides
                .get(WILDCARD)
                .and_then(|wildcard| wildcard.get(&kind))
        })
}

/// Merge `overlay` onto `base` without overwriting values already present
/// in `base` — the symmetric override-dict merge rule from the source's
/// binary-vs-provider override maps (binary-level wins).
pub fn merge_without_overwrite(base: &mut HandlerOverrides, overlay: &HandlerOverrides) {
    for (name, handlers) in overlay {
        let entry = base.entry(name.clone()).or_default();
        for (kind, handler_ref) in handlers {
            entry.entry(*kind).or_insert_with(|| handler_ref.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn per_binary_override_wins_over_wildcard() {
        let mut overrides: HandlerOverrides = HashMap::new();
        overrides.entry("wget".into()).or_default().insert(
            HandlerKind::Version,
            HandlerRef::Literal("1.2.3".into()),
        );
        overrides.entry(WILDCARD.into()).or_default().insert(
            HandlerKind::Version,
            HandlerRef::Literal("9.9.9".into()),
        );

        let registry = HandlerRegistry::new();
        let resolved = resolve_handler(&overrides, "wget", HandlerKind::Version).unwrap();
        assert_eq!(resolved.resolve("wget", &registry).unwrap(), "1.2.3");
    }

    #[test]
    fn wildcard_applies_when_no_specific_override() {
        let mut overrides: HandlerOverrides = HashMap::new();
        overrides.entry(WILDCARD.into()).or_default().insert(
            HandlerKind::Version,
            HandlerRef::Literal("9.9.9".into()),
        );
        let registry = HandlerRegistry::new();
        let resolved = resolve_handler(&overrides, "anything", HandlerKind::Version).unwrap();
        assert_eq!(resolved.resolve("anything", &registry).unwrap(), "9.9.9");
    }

    #[test]
    fn merge_keeps_base_values_on_conflict() {
        let mut base: HandlerOverrides = HashMap::new();
        base.entry("wget".into())
            .or_default()
            .insert(HandlerKind::Version, HandlerRef::Literal("base".into()));

        let mut overlay: HandlerOverrides = HashMap::new();
        overlay
            .entry("wget".into())
            .or_default()
            .insert(HandlerKind::Version, HandlerRef::Literal("overlay".into()));
        overlay
            .entry("wget".into())
            .or_default()
            .insert(HandlerKind::Abspath, HandlerRef::Literal("/bin/wget".into()));

        merge_without_overwrite(&mut base, &overlay);

        let registry = HandlerRegistry::new();
        assert_eq!(
            resolve_handler(&base, "wget", HandlerKind::Version)
                .unwrap()
                .resolve("wget", &registry)
                .unwrap(),
            "base"
        );
        assert_eq!(
            resolve_handler(&base, "wget", HandlerKind::Abspath)
                .unwrap()
                .resolve("wget", &registry)
                .unwrap(),
            "/bin/wget"
        );
    }

    #[test]
    fn dotted_handler_resolves_through_registry() {
        let mut registry = HandlerRegistry::new();
        registry.register("pkgr.handlers.fixed_version", |_name| Ok("4.5.6".to_string()));

        let mut overrides: HandlerOverrides = HashMap::new();
        overrides.entry("wget".into()).or_default().insert(
            HandlerKind::Version,
            HandlerRef::Dotted("pkgr.handlers.fixed_version".into()),
        );

        let resolved = resolve_handler(&overrides, "wget", HandlerKind::Version).unwrap();
        assert_eq!(resolved.resolve("wget", &registry).unwrap(), "4.5.6");
    }

    #[test]
    fn unregistered_dotted_handler_errors() {
        let mut overrides: HandlerOverrides = HashMap::new();
        overrides.entry("wget".into()).or_default().insert(
            HandlerKind::Version,
            HandlerRef::Dotted("does.not.exist".into()),
        );
        let registry = HandlerRegistry::new();
        let resolved = resolve_handler(&overrides, "wget", HandlerKind::Version).unwrap();
        assert!(resolved.resolve("wget", &registry).is_err());
    }
}
