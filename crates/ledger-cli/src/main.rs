//! Ledger snapshot CLI.

use std::io::{self, IsTerminal};

use clap::{ColorChoice, Parser};
use ledger_cli::cli::{Cli, Command, LogFormatArg, LogLevelArg};
use ledger_cli::commands::{run_check, run_inspect, run_migrate, run_record};
use ledger_cli::logging::{LogConfig, LogFormat, init_logging};
use ledger_cli::settings::Settings;
use ledger_cli::summary::{print_check, print_inspect, print_migrate, print_record};
use ledger_persistence::PersistenceError;
use tracing::level_filters::LevelFilter;

fn main() {
    let cli = Cli::parse();
    cli.color.write_global();
    let log_config = log_config_from_cli(&cli);
    if let Err(error) = init_logging(&log_config) {
        eprintln!("error: failed to initialize logging: {error}");
        std::process::exit(1);
    }

    let settings = match Settings::load_optional(cli.config.as_deref()) {
        Ok(settings) => settings,
        Err(error) => {
            report(&error);
            std::process::exit(1);
        }
    };

    let exit_code = match cli.command {
        Command::Inspect(args) => match run_inspect(&args) {
            Ok(result) => {
                print_inspect(&result);
                if result.consistent { 0 } else { 2 }
            }
            Err(error) => report(&error),
        },
        Command::Check(args) => match run_check(&args) {
            Ok(result) => {
                print_check(&result);
                if result.consistent { 0 } else { 2 }
            }
            Err(error) => report(&error),
        },
        Command::Migrate(args) => match run_migrate(&args) {
            Ok(result) => {
                print_migrate(&result);
                0
            }
            Err(error) => report(&error),
        },
        Command::Record(args) => match run_record(&args, &settings) {
            Ok(result) => {
                print_record(&result);
                0
            }
            Err(error) => report(&error),
        },
    };
    std::process::exit(exit_code);
}

/// Print an error, with a hint when the cause is a persistence failure.
fn report(error: &anyhow::Error) -> i32 {
    match error.downcast_ref::<PersistenceError>() {
        Some(persistence) => {
            eprintln!("error: {}", persistence.user_message());
            if let Some(hint) = persistence.suggestion() {
                eprintln!("hint: {hint}");
            }
            tracing::debug!(error = %persistence, "Command failed");
        }
        None => eprintln!("error: {error:#}"),
    }
    1
}

/// Build logging configuration from CLI flags with consistent precedence.
fn log_config_from_cli(cli: &Cli) -> LogConfig {
    let mut config = LogConfig {
        level_filter: cli.verbosity.tracing_level_filter(),
        ..LogConfig::default()
    };
    config.use_env_filter = !(cli.verbosity.is_present() || cli.log_level.is_some());
    if let Some(level) = cli.log_level {
        config.level_filter = match level {
            LogLevelArg::Error => LevelFilter::ERROR,
            LogLevelArg::Warn => LevelFilter::WARN,
            LogLevelArg::Info => LevelFilter::INFO,
            LogLevelArg::Debug => LevelFilter::DEBUG,
            LogLevelArg::Trace => LevelFilter::TRACE,
        };
    }
    config.format = match cli.log_format {
        LogFormatArg::Pretty => LogFormat::Pretty,
        LogFormatArg::Compact => LogFormat::Compact,
        LogFormatArg::Json => LogFormat::Json,
    };
    config.log_file = cli.log_file.clone();
    config.with_ansi = match cli.color.color {
        ColorChoice::Always => true,
        ColorChoice::Never => false,
        ColorChoice::Auto => cli.log_file.is_none() && io::stderr().is_terminal(),
    };
    config
}
