//! # Paper Intake CLI (`intake`)
//!
//! The `intake` binary initialises the document database, runs duplicate
//! checks and uploads from the command line, and starts the HTTP server.
//!
//! ## Usage
//!
//! ```bash
//! intake --config ./config/intake.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `intake init` | Create the SQLite database and run schema migrations |
//! | `intake check --project P <file>` | Score a file against a project, store nothing |
//! | `intake upload --project P <file>` | Store a file unless it resembles an existing one |
//! | `intake replace --project P --existing ID <file>` | Replace a stored document |
//! | `intake list --project P` | List a project's documents |
//! | `intake get <id>` | Show one document |
//! | `intake reconcile --project P` | Report rows left by interrupted replacements |
//! | `intake serve` | Start the HTTP server |
//!
//! ## Examples
//!
//! ```bash
//! intake init
//! intake check --project thesis ./drafts/chapter-2.pdf
//! intake upload --project thesis ./drafts/chapter-2.pdf
//! intake replace --project thesis --existing 5f0c... ./drafts/chapter-2-v2.pdf
//! RUST_LOG=paper_intake=debug intake serve
//! ```

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use paper_intake::{config, get, migrate, reconcile, server, upload_cmd};

/// Paper Intake: duplicate-aware document uploads for research projects.
#[derive(Parser)]
#[command(
    name = "intake",
    about = "Paper Intake: duplicate-aware document uploads for research projects",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(
        long,
        global = true,
        env = "INTAKE_CONFIG",
        default_value = "./config/intake.toml"
    )]
    config: PathBuf,

    /// Log at debug level unless RUST_LOG is set.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Idempotent: running it multiple times is safe.
    Init,

    /// Score a file against a project without storing it.
    Check {
        #[arg(long)]
        project: String,

        /// File to check.
        path: PathBuf,

        /// Use this file's contents as the extracted text instead of
        /// extracting from `path`.
        #[arg(long)]
        text_file: Option<PathBuf>,

        /// Print the verdict as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Store a file in a project.
    ///
    /// Refuses (exit code 1) when the file resembles an existing document,
    /// unless `--force` is given.
    Upload {
        #[arg(long)]
        project: String,

        path: PathBuf,

        /// Store even when the check reports a (possible) duplicate.
        #[arg(long)]
        force: bool,

        #[arg(long)]
        user: Option<String>,
    },

    /// Replace a stored document with a new file.
    Replace {
        #[arg(long)]
        project: String,

        /// ID of the document to replace.
        #[arg(long)]
        existing: String,

        path: PathBuf,

        #[arg(long)]
        user: Option<String>,
    },

    /// List documents in a project, newest first.
    List {
        #[arg(long)]
        project: String,
    },

    /// Show a document by ID.
    Get { id: String },

    /// Find and optionally repair rows left by interrupted replacements.
    Reconcile {
        #[arg(long)]
        project: String,

        /// Pending rows older than this many minutes are reported as stale.
        #[arg(long, default_value_t = 60)]
        pending_grace_minutes: i64,

        /// Apply the fixes instead of only reporting them.
        #[arg(long)]
        apply: bool,
    },

    /// Start the HTTP server.
    Serve,
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Check {
            project,
            path,
            text_file,
            json,
        } => {
            upload_cmd::run_check(&cfg, &project, &path, text_file.as_deref(), json).await?;
        }
        Commands::Upload {
            project,
            path,
            force,
            user,
        } => {
            upload_cmd::run_upload(&cfg, &project, &path, user, force).await?;
        }
        Commands::Replace {
            project,
            existing,
            path,
            user,
        } => {
            upload_cmd::run_replace(&cfg, &project, &existing, &path, user).await?;
        }
        Commands::List { project } => {
            get::run_list(&cfg, &project).await?;
        }
        Commands::Get { id } => {
            get::run_get(&cfg, &id).await?;
        }
        Commands::Reconcile {
            project,
            pending_grace_minutes,
            apply,
        } => {
            reconcile::run_reconcile(&cfg, &project, pending_grace_minutes, apply).await?;
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
    }

    Ok(())
}
