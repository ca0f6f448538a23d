//! Command dispatch: build the requested provider(s), run the action, and
//! print the result. JSON for whole-binary results (`install`/`load`/
//! `load-or-install`), plain text for scalar lookups, matching `vx-cli`'s
//! practice of keeping command bodies thin and data-shape-driven.

use crate::cli::{Action, ProviderName};
use pkgr_binary::Binary;
use pkgr_config::PkgrConfig;
use pkgr_core::{Provider, ShallowBinary};
use std::sync::Arc;

pub fn build_provider(name: ProviderName, config: &PkgrConfig) -> Box<dyn Provider> {
    match name {
        ProviderName::Env => Box::new(
            pkgr_provider_env::EnvProvider::new()
                .with_dry_run(config.dry_run)
                .with_quiet(config.quiet),
        ),
        ProviderName::Apt => Box::new(
            pkgr_provider_apt::AptProvider::new()
                .with_dry_run(config.dry_run)
                .with_quiet(config.quiet),
        ),
        ProviderName::Brew => Box::new(
            pkgr_provider_brew::BrewProvider::new()
                .with_dry_run(config.dry_run)
                .with_quiet(config.quiet),
        ),
        ProviderName::Pip => {
            let mut provider = pkgr_provider_pip::PipProvider::new()
                .with_dry_run(config.dry_run)
                .with_quiet(config.quiet);
            if let Some(venv) = &config.pip.pip_venv {
                provider = provider.with_venv(venv.clone());
            }
            Box::new(provider)
        }
        ProviderName::Npm => {
            let mut provider = pkgr_provider_npm::NpmProvider::new()
                .with_dry_run(config.dry_run)
                .with_quiet(config.quiet);
            if let Some(prefix) = &config.npm.npm_prefix {
                provider = provider.with_prefix(prefix.clone());
            }
            Box::new(provider)
        }
    }
}

fn default_providers(config: &PkgrConfig) -> Vec<Arc<dyn Provider>> {
    [
        ProviderName::Env,
        ProviderName::Apt,
        ProviderName::Brew,
        ProviderName::Pip,
        ProviderName::Npm,
    ]
    .into_iter()
    .map(|name| Arc::from(build_provider(name, config)))
    .collect()
}

pub fn run_provider_action(provider_name: ProviderName, action: Action, name: &str, config: &PkgrConfig) -> anyhow::Result<()> {
    let provider = build_provider(provider_name, config);
    match action {
        Action::Install => print_binary(provider.install(name)?.unwrap_or_else(|| empty(name))),
        Action::Load => print_binary(provider.load(name)?.unwrap_or_else(|| empty(name))),
        Action::LoadOrInstall => print_binary(provider.load_or_install(name)?.unwrap_or_else(|| empty(name))),
        Action::Abspath => print_option(provider.get_abspath(name)?.map(|p| p.display().to_string())),
        Action::Version => print_option(provider.get_version(name)?.map(|v| v.to_string())),
        Action::Packages => println!("{}", provider.get_packages(name)?.join(",")),
        Action::Sha256 => print_option(provider.get_sha256(name)?),
    }
    Ok(())
}

pub fn run_resolve(
    name: &str,
    only_provider: Option<ProviderName>,
    install: bool,
    dry_run: bool,
    mut config: PkgrConfig,
) -> anyhow::Result<()> {
    config.dry_run = config.dry_run || dry_run;

    let providers = match only_provider {
        Some(provider_name) => vec![Arc::from(build_provider(provider_name, &config))],
        None => default_providers(&config),
    };

    let binary = Binary::new(name, providers)?;
    let result = if install { binary.load_or_install() } else { binary.load() };
    print_binary(result?);
    Ok(())
}

fn empty(name: &str) -> ShallowBinary {
    ShallowBinary::new(name, Vec::new())
}

fn print_binary(binary: ShallowBinary) {
    match serde_json::to_string_pretty(&binary) {
        Ok(json) => println!("{json}"),
        Err(err) => eprintln!("failed to serialize result: {err}"),
    }
}

fn print_option(value: Option<String>) {
    match value {
        Some(value) => println!("{value}"),
        None => println!("(not found)"),
    }
}
