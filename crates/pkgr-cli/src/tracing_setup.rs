//! Tracing setup.
//!
//! Adapted from `vx-cli::tracing_setup`'s `EnvFilter` priority rules
//! (`RUST_LOG` > `--verbose` > default); dropped `tracing-indicatif` since
//! `pkgr` runs one synchronous operation per invocation rather than a long
//! async download/extract pipeline with progress to show.

use std::sync::Once;
use tracing_subscriber::EnvFilter;

static INIT: Once = Once::new();

pub fn init_tracing(verbose: bool) {
    INIT.call_once(|| {
        let env_filter = if std::env::var("RUST_LOG").is_ok() {
            EnvFilter::from_default_env()
        } else if verbose {
            EnvFilter::new("pkgr=debug,info")
        } else {
            EnvFilter::new("pkgr=info,warn,error")
        };

        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(verbose)
            .with_writer(std::io::stderr)
            .try_init()
            .ok();
    });
}
