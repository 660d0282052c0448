//! # Dossier CLI (`dossier`)
//!
//! Stage, review and merge structured record bundles.
//!
//! ## Usage
//!
//! ```bash
//! dossier --config ./dossier.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `dossier ingest <files..>` | Extract bundles from JSON exports and stage them (or merge with `--direct`) |
//! | `dossier list` | List staged records, newest first |
//! | `dossier show <id>` | Print one staged record |
//! | `dossier preview <id>` | Show what approving a record would add |
//! | `dossier approve <id>` | Approve and merge a record |
//! | `dossier reject <id> --reason <text>` | Reject a record |
//! | `dossier retry-merge <id>` | Re-apply an approved record |
//! | `dossier cleanup` | Delete old approved/rejected records |
//! | `dossier audit` | Report duplicate pairs in the knowledge base |
//! | `dossier show-kb` | Print the knowledge base |
//!
//! Results are printed as JSON on stdout; logs go to stderr.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use chrono::Duration;
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use dossier::config::DEFAULT_CONFIG_PATH;
use dossier::{Config, IngestMode, IngestRequest, JsonBundleExtractor, StageId, StageStatus, Workspace};

/// Dossier: deduplicating review queue for résumé, patent and profile data.
#[derive(Parser)]
#[command(name = "dossier", version)]
struct Cli {
    /// Path to the configuration file (TOML).
    ///
    /// When omitted, `./dossier.toml` is used if it exists and built-in
    /// defaults otherwise.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract bundles from files and stage them for review.
    Ingest {
        /// JSON bundle exports to ingest.
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// External profile URL recorded with the proposal.
        #[arg(long)]
        profile_url: Option<String>,

        /// Name to record on the profile if none is set yet.
        #[arg(long)]
        name: Option<String>,

        /// Merge immediately instead of staging.
        #[arg(long)]
        direct: bool,
    },

    /// List staged records.
    List {
        /// Only show records in this status (pending, approved, rejected).
        #[arg(long)]
        status: Option<StageStatus>,
    },

    /// Print one staged record.
    Show { id: String },

    /// Show what approving a record would route to each collection.
    Preview { id: String },

    /// Approve a pending record and merge it.
    Approve { id: String },

    /// Reject a pending record.
    Reject {
        id: String,

        /// Why the record was rejected.
        #[arg(long)]
        reason: String,
    },

    /// Re-run the merge of an approved record.
    RetryMerge { id: String },

    /// Delete approved and rejected records older than the retention age.
    Cleanup {
        /// Override `staging.retention_days`.
        #[arg(long)]
        max_age_days: Option<u32>,
    },

    /// Report entry pairs in the knowledge base that are duplicates.
    Audit,

    /// Print the knowledge base.
    ShowKb,
}

fn load_config(path: Option<&Path>) -> Result<Config> {
    let config = match path {
        Some(p) => Config::load(p)?,
        None => Config::load_or_default(Path::new(DEFAULT_CONFIG_PATH))?,
    };
    Ok(config)
}

fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;
    init_tracing(&config);

    let workspace = Workspace::open(&config)
        .with_context(|| format!("Failed to open data directory {}", config.storage.data_dir.display()))?;
    let staging = workspace.staging();

    match cli.command {
        Commands::Ingest {
            files,
            profile_url,
            name,
            direct,
        } => {
            let request = IngestRequest {
                files,
                profile_url,
                name_hint: name,
                mode: if direct { IngestMode::Direct } else { IngestMode::Staged },
            };
            let outcome = workspace.ingestor(Arc::new(JsonBundleExtractor)).ingest(request)?;
            print_json(&outcome)?;
        }
        Commands::List { status } => print_json(&staging.list(status)?)?,
        Commands::Show { id } => {
            let id = StageId::from(id);
            match staging.get(&id)? {
                Some(record) => print_json(&record)?,
                None => bail!("No staged entry found with ID: {id}"),
            }
        }
        Commands::Preview { id } => print_json(&staging.preview(&StageId::from(id))?)?,
        Commands::Approve { id } => print_json(&staging.approve(&StageId::from(id))?)?,
        Commands::Reject { id, reason } => print_json(&staging.reject(&StageId::from(id), reason)?)?,
        Commands::RetryMerge { id } => print_json(&staging.retry_merge(&StageId::from(id))?)?,
        Commands::Cleanup { max_age_days } => {
            let max_age = max_age_days.map_or_else(|| workspace.retention(), |d| Duration::days(i64::from(d)));
            let removed = staging.cleanup(max_age)?;
            print_json(&serde_json::json!({ "removed": removed }))?;
        }
        Commands::Audit => print_json(&workspace.merger().audit()?)?,
        Commands::ShowKb => print_json(&workspace.merger().snapshot()?)?,
    }

    Ok(())
}
