//! Error types for pkgr

/// Result type alias for pkgr operations
pub type PkgrResult<T> = Result<T, PkgrError>;

/// Errors produced while resolving, validating, or installing a binary.
#[derive(thiserror::Error, Debug)]
pub enum PkgrError {
    #[error("invalid input '{value}' for {field}: {reason}")]
    InvalidInput {
        field: &'static str,
        value: String,
        reason: String,
    },

    #[error("binary '{name}' not found via provider '{provider}'")]
    NotFound { provider: String, name: String },

    #[error("could not parse a version from '{provider}' output for '{name}': {output:?}")]
    VersionUnparseable {
        provider: String,
        name: String,
        output: String,
    },

    #[error("command '{command}' failed with status {status:?}: {stderr}")]
    ExecFailed {
        command: String,
        status: Option<i32>,
        stderr: String,
    },

    #[error("install of '{name}' via '{provider}' failed: {reason}")]
    InstallFailed {
        provider: String,
        name: String,
        reason: String,
    },

    #[error("provider '{provider}' lacks permission to install '{name}'")]
    PermissionDenied { provider: String, name: String },

    #[error("no handler resolved for {handler} on '{name}'")]
    NoHandler { handler: String, name: String },

    #[error("operation not supported on this platform: {operation} ({reason})")]
    UnsupportedOperation {
        operation: String,
        reason: String,
    },

    #[error("all providers failed for '{name}': {}", format_provider_errors(.errors))]
    AllProvidersFailed {
        name: String,
        errors: Vec<(String, String)>,
    },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("config error: {0}")]
    Config(String),
}

fn format_provider_errors(errors: &[(String, String)]) -> String {
    errors
        .iter()
        .map(|(provider, message)| format!("{provider}: {message}"))
        .collect::<Vec<_>>()
        .join("; ")
}

impl PkgrError {
    pub fn all_providers_failed(name: impl Into<String>, errors: Vec<(String, String)>) -> Self {
        Self::AllProvidersFailed {
            name: name.into(),
            errors,
        }
    }
}
