mod cli;
mod commands;
mod error_fmt;
mod host;
mod logging;

use clap::Parser;
use cli::{Cli, Commands, JSON_MODE};
use error_fmt::{exit_code_for_error, format_error_json, humanize};
use proxi_core::ProxiError;

fn main() {
    let _ = color_eyre::install();
    let cli = Cli::parse();
    let _ = JSON_MODE.set(cli.json);

    if let Err(e) = run(cli) {
        if JSON_MODE.get().copied().unwrap_or(false) {
            eprintln!("{}", format_error_json(&e));
        } else {
            eprintln!("{}", humanize(&e));
        }
        std::process::exit(exit_code_for_error(&e));
    }
}

fn run(cli: Cli) -> eyre::Result<()> {
    let mut cfg = proxi_config::load_file(&cli.config)
        .map_err(|e| ProxiError::Config(e.to_string()))?;
    if let Some(store) = cli.store {
        cfg.store.path = store;
    }
    logging::init(cli.json, &cli.log_level, &cfg.logging)?;
    tracing::debug!(config = %cli.config.display(), store = %cfg.store.path.display(), "config loaded");

    match cli.cmd {
        Commands::Calibrate {
            virtual_time,
            cancel_after_ms,
        } => commands::run_calibrate(&cfg, cli.json, virtual_time, cancel_after_ms),
        Commands::Presence {
            polls,
            policy,
            virtual_time,
        } => commands::run_presence(&cfg, cli.json, polls, policy.map(Into::into), virtual_time),
        Commands::Show => commands::run_show(&cfg, cli.json),
        Commands::FactoryReset => commands::run_factory_reset(&cfg, cli.json),
        Commands::SelfCheck => commands::run_self_check(&cfg, cli.json),
    }
}
