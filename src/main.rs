use clap::Parser;
use std::io::{self, IsTerminal};
use test_janitor::cli::commands;
use test_janitor::cli::{Cli, Commands};
use test_janitor::logging::init_logging;
use test_janitor::output::OutputContext;
use test_janitor::{JanitorError, StructuredError};

fn main() {
    let cli = Cli::parse();

    if let Err(e) = init_logging(cli.verbose, cli.quiet, cli.log_file.as_deref()) {
        eprintln!("Failed to initialize logging: {e}");
    }

    let ctx = OutputContext::from_flags(cli.json, cli.quiet, cli.no_color);

    let result = match &cli.command {
        Commands::Run(args) => commands::run::execute(args, &ctx),
        Commands::Analyze(args) => commands::analyze::execute(args, &ctx),
        Commands::Cleanup(args) => commands::cleanup::execute(args, &ctx),
        Commands::Validate(args) => commands::validate::execute(args, &ctx),
        Commands::Document(args) => commands::document::execute(args, &ctx),
        Commands::Rollback(args) => commands::rollback::execute(args, &ctx),
        Commands::Config(args) => commands::config::execute(args, &ctx),
        Commands::Schema(args) => commands::schema::execute(args),
        Commands::Completions(args) => commands::completions::execute(args),
    };

    if let Err(e) = result {
        handle_error(&e, cli.json, cli.no_color);
    }
}

/// Handle errors with structured output support.
///
/// When --json is set or stdout is not a TTY, outputs structured JSON to stderr.
/// Otherwise, outputs human-readable error with optional color.
fn handle_error(err: &JanitorError, json_mode: bool, no_color: bool) -> ! {
    let structured = StructuredError::from_error(err);
    let exit_code = structured.exit_code();

    let use_json = json_mode || !io::stdout().is_terminal();

    if use_json {
        let json = structured.to_json();
        eprintln!(
            "{}",
            serde_json::to_string_pretty(&json).unwrap_or_else(|_| json.to_string())
        );
    } else {
        let use_color = !no_color && io::stderr().is_terminal();
        eprintln!("{}", structured.to_human(use_color));
    }

    std::process::exit(exit_code);
}
