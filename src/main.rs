//! codesift CLI entry point.

use clap::Parser;
use codesift::cli::{self, Cli, Commands, EXIT_ERROR};
use codesift::telemetry;

fn main() {
    let cli = Cli::parse();
    telemetry::init_tracing(cli.log_json, telemetry::level_for_verbosity(cli.verbose));

    let result = match &cli.command {
        Commands::Analyze(args) => cli::run_analyze(args),
        Commands::Batch(args) => cli::run_batch(args),
        Commands::Init(args) => cli::run_init(args),
    };

    let exit_code = match result {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            EXIT_ERROR
        }
    };

    std::process::exit(exit_code);
}
