use clap::Parser;
use pkgr_cli::cli::{Cli, Commands};
use pkgr_cli::commands::run_provider_action;
use pkgr_cli::tracing_setup::init_tracing;
use pkgr_config::PkgrConfig;

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Err(err) = run(cli) {
        eprintln!("pkgr: {err:#}");
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let config = PkgrConfig::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Env { action, name } => run_provider_action(pkgr_cli::cli::ProviderName::Env, action, &name, &config),
        Commands::Apt { action, name } => run_provider_action(pkgr_cli::cli::ProviderName::Apt, action, &name, &config),
        Commands::Brew { action, name } => run_provider_action(pkgr_cli::cli::ProviderName::Brew, action, &name, &config),
        Commands::Pip { action, name } => run_provider_action(pkgr_cli::cli::ProviderName::Pip, action, &name, &config),
        Commands::Npm { action, name } => run_provider_action(pkgr_cli::cli::ProviderName::Npm, action, &name, &config),
        Commands::Resolve {
            name,
            provider,
            install,
            dry_run,
        } => pkgr_cli::commands::run_resolve(&name, provider, install, dry_run, config),
    }
}
