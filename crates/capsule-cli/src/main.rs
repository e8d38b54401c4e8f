//! Capsule CLI - drive Capsule sandboxes from the command line.

use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};

mod commands;
mod output;

use output::{Output, OutputFormat};

/// Capsule deterministic WebAssembly sandbox
#[derive(Parser)]
#[command(name = "capsule", author, version, about)]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Command,
}

/// Flags every subcommand honors.
#[derive(Args)]
struct GlobalArgs {
    /// Output format
    #[arg(short = 'f', long, global = true, default_value = "human")]
    format: OutputFormat,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Quiet mode (suppress non-essential output)
    #[arg(short, long, global = true)]
    quiet: bool,
}

/// Available commands.
#[derive(Subcommand)]
enum Command {
    /// Execute an exported function in a fresh sandbox
    Run(commands::run::RunArgs),
    /// Validate a module against the sandbox's import policy
    Validate(commands::validate::ValidateArgs),
    /// Inspect a module's imports and exports
    Inspect(commands::inspect::InspectArgs),
}

impl Command {
    fn dispatch(self, out: &Output) -> anyhow::Result<()> {
        match self {
            Command::Run(args) => commands::run::execute(args, out),
            Command::Validate(args) => commands::validate::execute(args, out),
            Command::Inspect(args) => commands::inspect::execute(args, out),
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let out = Output::new(cli.global.format, cli.global.quiet);
    output::init_tracing(cli.global.verbose);

    match cli.command.dispatch(&out) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            out.failure(&err);
            ExitCode::FAILURE
        }
    }
}
