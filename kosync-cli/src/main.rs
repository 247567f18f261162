//! KOSync CLI - administration for the KOReader progress sync server.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use tracing_subscriber::EnvFilter;

mod commands;
mod exit_codes;
mod utils;

use exit_codes::ExitCode;

const AFTER_HELP: &str = "\
Exit codes:
  0   Success
  1   General error
  64  Usage error
  65  Backfill halted on a failed batch
  66  Input file not found or unreadable
  67  Unknown user
  69  Database unavailable
  78  Configuration error (e.g. DATABASE_URL not set)";

#[derive(Parser)]
#[command(name = "kosync")]
#[command(author, version, about = "KOReader progress sync administration", long_about = None)]
#[command(after_help = AFTER_HELP)]
struct Cli {
    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    /// When to use colors
    #[arg(long, global = true, value_enum, default_value_t = ColorChoice::Auto)]
    color: ColorChoice,

    /// PostgreSQL connection string
    #[arg(long, global = true, env = "DATABASE_URL", hide_env_values = true)]
    database_url: Option<String>,

    /// Root directory of the document library
    #[arg(long, global = true, env = "LIBRARY_ROOT")]
    library_root: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum ColorChoice {
    Auto,
    Always,
    Never,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the content and name fingerprints KOReader computes for a file
    Fingerprint {
        /// Path to the document
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Print machine-readable JSON
        #[arg(long)]
        json: bool,
    },

    /// Manage sync users
    User {
        #[command(subcommand)]
        action: UserCommand,
    },

    /// Compute missing fingerprints for documents already in the catalog
    Backfill {
        /// Only process documents of this user
        #[arg(long, value_name = "USERNAME")]
        owner: Option<String>,

        /// Recompute fingerprints that are already recorded
        #[arg(long)]
        force: bool,

        /// Documents per transaction (defaults to BACKFILL_BATCH_SIZE or 50)
        #[arg(long, value_name = "N", value_parser = clap::value_parser!(u64).range(1..))]
        batch_size: Option<u64>,
    },

    /// Remove mappings for fingerprints a user's documents no longer have
    Prune {
        #[arg(value_name = "USERNAME")]
        username: String,
    },

    /// Show the latest progress of a document across all its fingerprints
    Progress {
        #[arg(value_name = "USERNAME")]
        username: String,

        #[arg(value_name = "DOCUMENT_ID")]
        document_id: i64,

        /// Print machine-readable JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum UserCommand {
    /// Register a sync user, or replace an existing user's key
    Add {
        #[arg(value_name = "USERNAME")]
        username: String,

        /// Client key exactly as KOReader sends it (MD5 of the password)
        #[arg(long, conflicts_with = "password")]
        key: Option<String>,

        /// Plain password; the client key is derived as MD5(password)
        #[arg(long)]
        password: Option<String>,
    },
}

fn init_tracing(verbose: u8, quiet: bool) {
    let default = match (quiet, verbose) {
        (true, _) => "error",
        (false, 0) => "warn",
        (false, 1) => "debug",
        (false, _) => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(cli: Cli) -> Result<()> {
    let ctx = utils::Context {
        database_url: cli.database_url,
        library_root: cli.library_root,
        quiet: cli.quiet,
    };

    match cli.command {
        Commands::Fingerprint { file, json } => commands::fingerprint::execute(&ctx, file, json).await,
        Commands::User {
            action: UserCommand::Add {
                username,
                key,
                password,
            },
        } => commands::user::add(&ctx, username, key, password).await,
        Commands::Backfill {
            owner,
            force,
            batch_size,
        } => commands::backfill::execute(&ctx, owner, force, batch_size).await,
        Commands::Prune { username } => commands::prune::execute(&ctx, username).await,
        Commands::Progress {
            username,
            document_id,
            json,
        } => commands::progress::execute(&ctx, username, document_id, json).await,
    }
}

#[tokio::main]
async fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            // --help and --version are reported on stdout
            let code = if err.use_stderr() {
                exit_codes::USAGE_ERROR
            } else {
                exit_codes::SUCCESS
            };
            let _ = err.print();
            std::process::exit(code);
        }
    };

    match cli.color {
        ColorChoice::Always => colored::control::set_override(true),
        ColorChoice::Never => colored::control::set_override(false),
        ColorChoice::Auto => {}
    }
    init_tracing(cli.verbose, cli.quiet);

    if let Err(err) = run(cli).await {
        let exit = ExitCode::from_anyhow(&err);
        if let Some(message) = &exit.message {
            eprintln!("{} {}", "Error:".red().bold(), message);
        }
        std::process::exit(exit.code);
    }
}
