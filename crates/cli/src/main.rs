//! livemerge command-line tool.
//!
//! Merges two edited versions of an Ableton Live set against their common
//! ancestor and writes the result. Suitable as a git merge driver:
//!
//! ```text
//! [merge "livemerge"]
//!     driver = livemerge %O %A %B %A
//! ```

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use livemerge_core::config::MergeConfig;
use livemerge_core::errors::{MergeError, MergeStage};
use livemerge_core::merge::MergeEngine;
use livemerge_core::model::Document;
use livemerge_core::package::Compression;

/// Config file picked up when `--config` is not given.
const DEFAULT_CONFIG: &str = ".merge/livemerge.toml";

// ---------------------------------------------------------------------------
// CLI argument definitions
// ---------------------------------------------------------------------------

/// Three-way merge of Ableton Live sets.
#[derive(Parser, Debug)]
#[command(name = "livemerge", version, about = "Three-way merge of Ableton Live sets")]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Give up waiting for conflict resolution after this many seconds.
    #[arg(long)]
    timeout_secs: Option<u64>,

    /// Output compression: auto, always or never.
    #[arg(long)]
    compress: Option<Compression>,

    /// Common ancestor.
    base: PathBuf,

    /// Our version.
    ours: PathBuf,

    /// Their version.
    theirs: PathBuf,

    /// Where to write the merged set.
    output: PathBuf,
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            return ExitCode::FAILURE;
        }
    };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log.level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match run(cli, config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli, config: MergeConfig) -> Result<()> {
    let base = load_document(&cli.base, "base")?;
    let ours = load_document(&cli.ours, "ours")?;
    let theirs = load_document(&cli.theirs, "theirs")?;

    let engine = MergeEngine::from_config(&config);
    let cancel = engine.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupted, cancelling merge");
            cancel.cancel();
        }
    });

    let outcome = engine.merge(&base, &ours, &theirs).await?;

    outcome
        .document
        .save(&cli.output, config.output.compression)
        .with_context(|| format!("failed to write '{}'", cli.output.display()))?;

    let stats = &outcome.stats;
    info!(
        output = %cli.output.display(),
        tracks = outcome.document.tracks().len(),
        conflicts = stats.conflicts,
        "wrote merged set"
    );
    println!(
        "Merged into {}: {} removed, {} updated, {} added, {} conflict(s) resolved",
        cli.output.display(),
        stats.removed,
        stats.updated_from_ours + stats.updated_from_theirs + stats.identical_in_both,
        stats.added_from_ours + stats.added_from_theirs,
        stats.conflicts,
    );
    Ok(())
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Explicit `--config`, else the repository default if present, else
/// built-in defaults. Command-line overrides are applied last.
fn load_config(cli: &Cli) -> Result<MergeConfig> {
    let path = cli
        .config
        .clone()
        .or_else(|| Some(PathBuf::from(DEFAULT_CONFIG)).filter(|p| p.exists()));

    let mut config = match path {
        Some(path) => MergeConfig::load_from_file(&path)
            .with_context(|| format!("failed to load configuration '{}'", path.display()))?,
        None => MergeConfig::default(),
    };

    if let Some(secs) = cli.timeout_secs {
        config.resolver.timeout_secs = Some(secs);
    }
    if let Some(compression) = cli.compress {
        config.output.compression = compression;
    }
    config.validate().context("invalid configuration")?;
    Ok(config)
}

fn load_document(path: &Path, role: &str) -> Result<Document> {
    Document::load(path)
        .map_err(|source| MergeError::Document {
            stage: MergeStage::Load,
            source,
        })
        .with_context(|| format!("failed to read {role} '{}'", path.display()))
}
