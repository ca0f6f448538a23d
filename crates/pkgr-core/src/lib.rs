//! Core types shared by every `pkgr` provider and the `Binary` aggregate:
//! version parsing, name/path validators, the `Provider` contract, handler
//! override resolution, the result cache, and subprocess execution.

pub mod cache;
pub mod error;
pub mod exec;
pub mod handler;
pub mod provider;
pub mod semver;
pub mod shallow_binary;
pub mod validators;

pub use error::{PkgrError, PkgrResult};
pub use exec::{current_euid, exec as exec_command, owner_euid, Euid, ExecOptions, ExecResult};
pub use handler::{HandlerKind, HandlerOverrides, HandlerRef, HandlerRegistry, WILDCARD};
pub use provider::{Provider, ProviderConfig, Throttle};
pub use semver::SemVer;
pub use shallow_binary::{ShallowBinary, UNKNOWN_SHA256};
pub use validators::{bin_abspath, bin_abspaths, bin_name, binprovider_name};
