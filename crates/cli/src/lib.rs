pub mod commands;

use clap::{Parser, Subcommand};
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "pactum",
    about = "Pactum operator CLI",
    long_about = "Inspect configuration, prepare the session store, check readiness, and ask the agreement assistant one-off questions.",
    after_help = "Examples:\n  pactum doctor --json\n  pactum config\n  pactum ask \"Who are the parties to ACME_SPA.pdf?\""
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Apply pending session-store migrations and return structured status output")]
    Migrate,
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
    #[command(about = "Validate config, session store connectivity, and backend wiring")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(about = "Run one assistant turn against the configured backends")]
    Ask {
        #[arg(long, help = "Continue a stored session instead of starting a throwaway one")]
        session: Option<String>,
        #[arg(required = true, num_args = 1.., help = "Question to ask")]
        question: Vec<String>,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Migrate => commands::migrate::run(),
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run() }
        }
        Command::Doctor { json } => commands::doctor::run(json),
        Command::Ask { session, question } => {
            commands::ask::run(&question.join(" "), session.as_deref())
        }
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
