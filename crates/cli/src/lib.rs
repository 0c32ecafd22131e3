pub mod commands;

use clap::{ArgGroup, Parser, Subcommand};
use std::process::ExitCode;

use commands::operations::OperationFilter;

#[derive(Debug, Parser)]
#[command(
    name = "triage",
    about = "Issue triage bot operator CLI",
    long_about = "Apply migrations, inspect configuration, list recorded operations and expire feedback messages.",
    after_help = "Examples:\n  triage migrate\n  triage config\n  triage operations --status completed\n  triage sweep"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Apply pending database migrations and return structured status output")]
    Migrate,
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
    #[command(
        about = "List recorded operations for a chat group or in a given status, newest first",
        group(ArgGroup::new("filter").required(true).args(["group", "status"]))
    )]
    Operations {
        #[arg(long, help = "Chat group (channel) id")]
        group: Option<String>,
        #[arg(long, help = "pending|processing|completed|failed|undone")]
        status: Option<String>,
        #[arg(long, default_value_t = 20)]
        limit: u32,
    },
    #[command(about = "Delete every feedback message whose deletion time has passed, once")]
    Sweep,
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Migrate => commands::migrate::run(),
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run() }
        }
        Command::Operations { group, status, limit } => {
            let filter = match (group, status) {
                (Some(group), _) => OperationFilter::Group(group),
                (None, Some(status)) => OperationFilter::Status(status),
                (None, None) => OperationFilter::Status(String::new()),
            };
            commands::operations::run(filter, limit)
        }
        Command::Sweep => commands::sweep::run(),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
