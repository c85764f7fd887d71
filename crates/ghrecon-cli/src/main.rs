//! ghrecon - reconcile stored GitHub history against harvested API state.
//!
//! The harvester dumps a batch of issue and pull-request candidates as
//! JSON; `ghrecon sync` replays that batch against the analytics
//! database, writing synthetic snapshot bundles wherever the stored
//! history diverges from what the API reported. `ghrecon recent-repos`
//! lists the repositories with recent event activity, which is how the
//! harvester usually scopes its next fetch.

use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{NaiveDateTime, TimeZone, Utc};
use clap::{Parser, Subcommand};
use ghrecon_core::candidate::Batch;
use ghrecon_core::config::{EngineConfig, SyncMode};
use ghrecon_core::github::{resolve_token, GithubClient};
use ghrecon_core::redact::HideSet;
use ghrecon_sync::{Reconciler, Store};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// GitHub history reconciliation for the gha_* analytics store.
#[derive(Parser, Debug)]
#[command(name = "ghrecon")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to the analytics database.
    #[arg(long, env = "GHRECON_DB", default_value = "ghrecon.db")]
    db: PathBuf,

    /// Log filter when RUST_LOG is not set.
    #[arg(long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Reconcile a harvested batch against the store.
    Sync {
        /// Harvester-produced batch file (JSON).
        #[arg(long)]
        batch: PathBuf,

        /// OAuth token: a literal value, a file path (detected by a
        /// `/` in the value), or `-` for anonymous access.
        #[arg(long, env = "GHRECON_GITHUB_TOKEN", default_value = "-")]
        github_token: String,

        /// GitHub API base URL.
        #[arg(long, default_value = "https://api.github.com")]
        api_url: String,

        /// Worker threads; 0 uses available parallelism.
        #[arg(long, default_value_t = 0)]
        threads: usize,

        /// Debug verbosity (0-2).
        #[arg(long, default_value_t = 0)]
        debug: u8,

        /// Compare against the latest stored state instead of the
        /// per-second stored state.
        #[arg(long)]
        manual: bool,

        /// Bypass the snapshot writer (dry run).
        #[arg(long)]
        skip_writes: bool,

        /// Hide-set file, one login per line.
        #[arg(long)]
        hide_file: Option<PathBuf>,
    },

    /// List repositories with events after a cutoff.
    RecentRepos {
        /// Cutoff instant, `YYYY-MM-DD HH:MM:SS` (UTC).
        #[arg(long)]
        since: String,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(cli.log_level.clone()));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Command::Sync {
            batch,
            github_token,
            api_url,
            threads,
            debug,
            manual,
            skip_writes,
            hide_file,
        } => run_sync(
            &cli.db,
            &batch,
            &github_token,
            &api_url,
            EngineConfig {
                threads,
                debug,
                skip_writes,
                mode: if manual {
                    SyncMode::Manual
                } else {
                    SyncMode::Automatic
                },
            },
            hide_file.as_deref(),
        ),
        Command::RecentRepos { since } => run_recent_repos(&cli.db, &since),
    }
}

fn run_sync(
    db: &std::path::Path,
    batch_path: &std::path::Path,
    github_token: &str,
    api_url: &str,
    config: EngineConfig,
    hide_file: Option<&std::path::Path>,
) -> Result<()> {
    let hide = match hide_file {
        Some(path) => HideSet::load(path)
            .with_context(|| format!("reading hide file {}", path.display()))?,
        None => HideSet::empty(),
    };
    info!(hidden_logins = hide.len(), "hide set loaded");

    let file = File::open(batch_path)
        .with_context(|| format!("opening batch file {}", batch_path.display()))?;
    let batch: Batch = serde_json::from_reader(BufReader::new(file))
        .with_context(|| format!("parsing batch file {}", batch_path.display()))?;

    let token = resolve_token(github_token).context("resolving GitHub token")?;
    let probe = Arc::new(GithubClient::new(api_url, token));

    let store =
        Store::open(db).with_context(|| format!("opening database {}", db.display()))?;

    let reconciler = Reconciler::new(store, Arc::new(hide), config, probe);
    let summary = reconciler.run(batch);
    info!(
        issues_checked = summary.checked_issues,
        prs_checked = summary.checked_prs,
        issue_counts = ?summary.issue_counts,
        pr_counts = ?summary.pr_counts,
        "reconciliation run complete"
    );
    Ok(())
}

fn run_recent_repos(db: &std::path::Path, since: &str) -> Result<()> {
    let since = NaiveDateTime::parse_from_str(since, "%Y-%m-%d %H:%M:%S")
        .with_context(|| format!("parsing cutoff {since}"))?;
    let since = Utc.from_utc_datetime(&since);

    let store =
        Store::open(db).with_context(|| format!("opening database {}", db.display()))?;
    let repos = store.recent_repos(since).context("listing recent repos")?;
    for repo in repos {
        println!("{repo}");
    }
    Ok(())
}
