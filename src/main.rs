use std::process::ExitCode;

use argthread::cli::{AppContext, Cli, normalize_go_flags, usage_error_line};
use clap::Parser;

fn main() -> ExitCode {
    let cli = match Cli::try_parse_from(normalize_go_flags(std::env::args_os())) {
        Ok(cli) => cli,
        // --help and --version
        Err(err) if !err.use_stderr() => err.exit(),
        Err(err) => {
            eprintln!("Error: {}.", usage_error_line(&err));
            return ExitCode::FAILURE;
        }
    };
    argthread::init_tracing(cli.verbose);

    // Build a context once, pass everywhere
    let ctx = AppContext {
        quiet: cli.quiet,
        no_color: cli.no_color,
        dry_run: cli.dry_run,
    };

    match argthread::core::refactor::run(cli.args, &ctx) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {err:#}.");
            ExitCode::FAILURE
        }
    }
}
