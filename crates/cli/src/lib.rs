pub mod commands;

use clap::{Parser, Subcommand};
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "protogas",
    about = "Protogas gateway operator CLI",
    long_about = "Apply migrations, check readiness, inspect configuration, and prune stale call data.",
    after_help = "Examples:\n  protogas migrate\n  protogas doctor --json\n  protogas sweep --retention-days 7"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Apply pending database migrations and return structured status output")]
    Migrate,
    #[command(about = "Validate config, database connectivity, and schema state")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(about = "Inspect effective configuration values with source attribution")]
    Config,
    #[command(about = "Delete expired replay records and call state")]
    Sweep {
        #[arg(long, help = "Override idempotency.retention_days for this run")]
        retention_days: Option<u32>,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Migrate => commands::migrate::run(),
        Command::Doctor { json } => commands::doctor::run(json),
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run() }
        }
        Command::Sweep { retention_days } => commands::sweep::run(retention_days),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
