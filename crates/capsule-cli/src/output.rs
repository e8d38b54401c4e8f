//! Terminal output and logging plumbing shared by every subcommand.
//!
//! Each command produces one serializable result; [`Output::emit`] decides
//! whether the user sees the human rendering or one of the JSON forms, so
//! the commands themselves never match on the format.

use serde::Serialize;
use tracing_subscriber::EnvFilter;

/// Output format options.
#[derive(Clone, Copy, Debug, Default, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable output
    #[default]
    Human,
    /// JSON output
    Json,
    /// Compact JSON (single line)
    JsonCompact,
}

/// How a command talks to the terminal.
#[derive(Clone, Copy)]
pub struct Output {
    format: OutputFormat,
    quiet: bool,
}

impl Output {
    /// Bundle the user's format and quiet flags.
    pub fn new(format: OutputFormat, quiet: bool) -> Self {
        Self { format, quiet }
    }

    /// Whether non-essential chatter should be suppressed.
    pub fn is_quiet(&self) -> bool {
        self.quiet
    }

    /// Emit a command result. `human` renders the human form; `value`
    /// covers both JSON forms.
    pub fn emit<T: Serialize>(&self, value: &T, human: impl FnOnce()) -> anyhow::Result<()> {
        match self.format {
            OutputFormat::Human => human(),
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(value)?),
            OutputFormat::JsonCompact => println!("{}", serde_json::to_string(value)?),
        }
        Ok(())
    }

    /// Report a fatal error, respecting quiet mode.
    pub fn failure(&self, err: &anyhow::Error) {
        if !self.quiet {
            eprintln!("Error: {err:#}");
        }
    }
}

/// Install the tracing subscriber, keyed off the `-v` count unless
/// `RUST_LOG`-style configuration is already present.
pub fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("capsule={level}")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}
