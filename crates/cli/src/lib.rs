pub mod commands;

use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(
    name = "payrelay",
    about = "Payrelay operator CLI",
    long_about = "Inspect configuration and lookup data, check readiness, and run payment requests outside Slack.",
    after_help = "Examples:\n  payrelay doctor --json\n  payrelay lookup U0123ABCD\n  payrelay process --user U0123ABCD --text \"PAYMENT REQUEST 25 USDC to bob\""
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
    #[command(about = "Validate config, lookup files, and payment server reachability")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(about = "Show the wallet, manager, and budget recorded for a Slack user")]
    Lookup {
        #[arg(help = "Slack user id, e.g. U0123ABCD")]
        user: String,
    },
    #[command(about = "Run one payment request through the agent and print every turn")]
    Process {
        #[arg(long, help = "Slack user id the request is made on behalf of")]
        user: String,
        #[arg(long, help = "Request text as it would appear in Slack")]
        text: String,
    },
    #[command(about = "Process recent messages from a Slack channel, printing turns to stdout")]
    Backfill {
        #[arg(long, help = "Slack channel id to read history from")]
        channel: String,
        #[arg(long, default_value_t = 5, help = "Number of recent messages to fetch")]
        limit: u32,
        #[arg(long, default_value_t = 2, help = "Seconds to wait between requests")]
        delay_secs: u64,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run() }
        }
        Command::Doctor { json } => {
            commands::CommandResult { exit_code: 0, output: commands::doctor::run(json) }
        }
        Command::Lookup { user } => commands::lookup::run(&user),
        Command::Process { user, text } => commands::process::run(&user, &text),
        Command::Backfill { channel, limit, delay_secs } => {
            commands::backfill::run(commands::backfill::BackfillOptions {
                channel,
                limit,
                delay: Duration::from_secs(delay_secs),
            })
        }
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
