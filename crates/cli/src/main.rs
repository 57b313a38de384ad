mod commands;
mod config;
mod logging;
mod state;

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand, ValueEnum};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use crate::commands::CliError;
use crate::config::AdopetConfig;

/// Output format for CLI responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub(crate) enum OutputFormat {
    Text,
    Json,
}

/// Adopet adoption lifecycle administration.
#[derive(Parser)]
#[command(name = "adopet", version, about = "Adopet adoption lifecycle administration")]
struct Cli {
    /// Output format (text or json)
    #[arg(long, global = true, default_value = "text", value_enum)]
    output: OutputFormat,

    /// Configuration file (TOML). Defaults apply when the default file is absent.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// State file; overrides `store.state_path` from the configuration
    #[arg(long, global = true)]
    state: Option<PathBuf>,

    /// Evaluate windows as of this RFC 3339 instant instead of the wall clock
    /// (one-shot commands only; `run` refuses it)
    #[arg(long, global = true, value_parser = parse_instant)]
    now: Option<OffsetDateTime>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
pub(crate) enum Commands {
    /// List a pet as available for adoption
    ListPet {
        pet_id: String,
        /// Tutor who owns the pet
        #[arg(long)]
        owner: String,
        /// Display name
        #[arg(long)]
        name: String,
    },

    /// Record a user's interest (favorite) in a pet
    Interest {
        pet_id: String,
        #[arg(long)]
        user: String,
    },

    /// Tutor marks the pet adopted by a candidate adopter
    Nominate {
        pet_id: String,
        #[arg(long)]
        tutor: String,
        #[arg(long)]
        adopter: String,
    },

    /// The nominated adopter confirms the adoption
    AdopterConfirm {
        pet_id: String,
        #[arg(long)]
        adopter: String,
    },

    /// Admin registers the adoption (finalizes it)
    Register {
        pet_id: String,
        /// Adopter to register; defaults to the tutor's nominee
        #[arg(long)]
        adopter: Option<String>,
    },

    /// Admin confirms a registered adoption (idempotent)
    Confirm { pet_id: String },

    /// Admin flags a registered adoption after the fact
    Reject {
        pet_id: String,
        #[arg(long)]
        reason: Option<String>,
    },

    /// Admin rejects the tutor's nomination before registration
    RejectNomination {
        pet_id: String,
        #[arg(long)]
        reason: Option<String>,
    },

    /// Show a pet's adoption state
    Show { pet_id: String },

    /// List pets still available for adoption
    Feed,

    /// Run both escalation sweeps once
    Reconcile,

    /// Run the escalation scheduler until interrupted
    Run {
        /// Seconds between ticks; overrides `scheduler.interval_secs`
        #[arg(long)]
        interval_secs: Option<u64>,
    },

    /// Print the effective configuration
    Config,
}

fn parse_instant(s: &str) -> Result<OffsetDateTime, String> {
    OffsetDateTime::parse(s, &Rfc3339).map_err(|e| format!("expected an RFC 3339 timestamp: {e}"))
}

const DEFAULT_CONFIG_PATH: &str = "adopet.toml";

fn main() {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => AdopetConfig::load(path, true),
        None => AdopetConfig::load(std::path::Path::new(DEFAULT_CONFIG_PATH), false),
    };
    let mut config = match config {
        Ok(c) => c,
        Err(e) => {
            report_error(&CliError::Config(e), cli.output);
            process::exit(1);
        }
    };
    if let Some(path) = cli.state {
        config.store.state_path = path;
    }

    logging::init(&config.log);

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("error: failed to create tokio runtime: {e}");
            process::exit(1);
        }
    };
    let ctx = commands::Context {
        config,
        output: cli.output,
        now: cli.now,
    };
    if let Err(e) = rt.block_on(commands::dispatch(cli.command, ctx)) {
        report_error(&e, cli.output);
        process::exit(1);
    }
}

/// Print a failure to stderr in the requested format.
pub(crate) fn report_error(err: &CliError, output: OutputFormat) {
    match output {
        OutputFormat::Text => eprintln!("error: {err}"),
        OutputFormat::Json => {
            let body = serde_json::json!({
                "error": err.to_string(),
                "kind": err.kind(),
            });
            eprintln!("{body}");
        }
    }
}
