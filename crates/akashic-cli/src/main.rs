//! Akashic operator CLI.

use std::io::{self, IsTerminal};

use akashic_core::{ResolverConfig, ResolverError};
use clap::Parser;

mod cli;
mod commands;
mod logging;

use crate::cli::{Cli, Command, LogFormatArg};
use crate::logging::{init_logging, LogConfig, LogFormat};

/// `EX_TEMPFAIL`: the learned store was busy; retrying may succeed.
const EXIT_RETRYABLE: i32 = 75;

fn main() {
    let cli = Cli::parse();
    if let Err(error) = init_logging(&log_config_from_cli(&cli)) {
        eprintln!("error: failed to initialize logging: {error}");
        std::process::exit(1);
    }

    let config = match &cli.data_dir {
        Some(dir) => ResolverConfig::with_data_dir(dir),
        None => ResolverConfig::from_env(),
    };

    let result = match &cli.command {
        Command::Lookup(args) => commands::run_lookup(config, args),
        Command::Commit(args) => commands::run_commit(config, args),
        Command::Alias(args) => commands::run_alias(config, args),
        Command::Unlearn(args) => commands::run_unlearn(config, args),
        Command::Status => commands::run_status(config),
        Command::Config => commands::run_config(config),
    };

    if let Err(error) = result {
        eprintln!("error: {error:#}");
        let retryable = error
            .downcast_ref::<ResolverError>()
            .is_some_and(ResolverError::is_retryable);
        std::process::exit(if retryable { EXIT_RETRYABLE } else { 1 });
    }
}

fn log_config_from_cli(cli: &Cli) -> LogConfig {
    let mut config = LogConfig::from_verbosity(cli.verbose);
    config.use_env_filter = cli.verbose == 0;
    config.format = match cli.log_format {
        LogFormatArg::Pretty => LogFormat::Pretty,
        LogFormatArg::Compact => LogFormat::Compact,
        LogFormatArg::Json => LogFormat::Json,
    };
    config.with_ansi = !cli.no_color && io::stderr().is_terminal();
    config
}
