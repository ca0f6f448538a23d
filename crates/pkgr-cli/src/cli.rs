//! Command-line surface: one subcommand per provider, plus the `resolve`
//! aggregate. Mirrors `vx-cli::cli`'s `clap` derive idiom, trimmed to a
//! synchronous, single-binary-name-at-a-time tool.

use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(name = "pkgr")]
#[command(about = "Binary package resolution and installation engine")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable debug-level logging, overriding RUST_LOG
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to a pkgr.toml config file
    #[arg(long, global = true)]
    pub config: Option<std::path::PathBuf>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum ProviderName {
    Env,
    Apt,
    Brew,
    Pip,
    Npm,
}

impl ProviderName {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Env => "env",
            Self::Apt => "apt",
            Self::Brew => "brew",
            Self::Pip => "pip",
            Self::Npm => "npm",
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum Action {
    Install,
    Load,
    LoadOrInstall,
    Abspath,
    Version,
    Packages,
    Sha256,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run a single provider directly: `pkgr <provider> <action> <name>`
    #[command(name = "env")]
    Env { action: Action, name: String },
    #[command(name = "apt")]
    Apt { action: Action, name: String },
    #[command(name = "brew")]
    Brew { action: Action, name: String },
    #[command(name = "pip")]
    Pip { action: Action, name: String },
    #[command(name = "npm")]
    Npm { action: Action, name: String },

    /// Try every configured provider in order until one resolves `name`
    Resolve {
        name: String,
        /// Restrict resolution to a single provider
        #[arg(long)]
        provider: Option<ProviderName>,
        /// Install if not already found
        #[arg(long)]
        install: bool,
        /// Log the actions that would run without executing them
        #[arg(long)]
        dry_run: bool,
    },
}
