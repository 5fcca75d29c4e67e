//! fhirmap CLI - Command-line interface for the mapping engine
//!
//! This is the main entry point for the fhirmap CLI application, providing
//! commands for transforming source files into resources, extracting
//! resources from a server back into source records, and checking mappings.

mod cli;
mod config;
mod error;
mod handlers;
mod logging;
mod output;

use cli::{Cli, Commands};
use colored::control;
use config::Config;
use error::Result;
use logging::{timing::Timer, LoggingConfig};
use output::OutputWriter;
use std::process;
use tracing::instrument;
use tracing_appender::non_blocking::WorkerGuard;

#[tokio::main]
async fn main() {
    // Parse command-line arguments
    let cli = Cli::parse_args();

    // Set up colored output
    control::set_override(cli.use_color());

    let code = match Config::load_with_file(cli.config.as_deref()) {
        Ok(config) => {
            let guard = match init_logging(&cli, &config) {
                Ok(guard) => guard,
                Err(e) => {
                    eprintln!("Failed to initialize logging: {}", e);
                    None
                }
            };
            let code = report(run(cli, config).await);
            // flush the log file before exiting
            drop(guard);
            code
        }
        Err(e) => report(Err(e)),
    };

    process::exit(code);
}

/// Print the error, if any, and return the exit code
fn report(result: Result<()>) -> i32 {
    match result {
        Ok(()) => 0,
        Err(e) => {
            eprintln!("{}", error::format_error(&e, control::SHOULD_COLORIZE.should_colorize()));
            if let Some(hint) = e.hint() {
                eprintln!("\n{}", hint);
            }
            e.exit_code()
        }
    }
}

/// Main application logic
#[instrument(skip_all, fields(command = ?cli.command))]
async fn run(cli: Cli, config: Config) -> Result<()> {
    let _timer = Timer::new("cli_execution");

    let mut output = OutputWriter::new(cli.output, cli.use_color(), cli.quiet);

    tracing::info!(
        run_id = logging::current_run_id(),
        verbosity = cli.verbosity_level(),
        "Executing command"
    );

    match cli.command {
        Commands::Transform(args) => handlers::handle_transform(args, &config, &mut output).await,
        Commands::Extract(args) => handlers::handle_extract(args, &config, &mut output).await,
        Commands::Check(args) => handlers::handle_check(args, &config, &mut output).await,
        Commands::Path(args) => handlers::handle_path(args, &mut output),
    }
}

/// Initialize the logging system
fn init_logging(cli: &Cli, config: &Config) -> Result<Option<WorkerGuard>> {
    let mut logging_config = LoggingConfig::from_verbosity(cli.verbosity_level());
    logging_config.merge_section(&config.logging, cli.verbosity_level());
    logging_config.merge_with_env(|key| std::env::var(key).ok());

    // If quiet mode, only log errors
    if cli.quiet {
        logging_config.level = "error".to_string();
        logging_config.console = false;
    }

    logging::init_logging(logging_config)
}
