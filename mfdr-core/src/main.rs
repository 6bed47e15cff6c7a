//! mfdr - music library integrity scanner
//!
//! `scan-dir` classifies every audio file under a folder and optionally
//! quarantines the bad ones. `scan-manifest` checks a JSON track manifest and
//! looks for replacements of tracks whose file is gone.
//!
//! Ctrl-C stops at the next item boundary and saves a checkpoint; run the same
//! command with `--resume` to continue.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use mfdr_common::config::{default_config_path, resolve_state_folder};
use mfdr_common::human_size::format_size;
use mfdr_core::config::MfdrConfig;
use mfdr_core::services::{
    FfmpegProber, FileSystemMutator, JsonCheckpointStore, JsonManifestReader, LoftyMetadataReader,
    QuarantinePlanner, ReplacementPlanner, ScanOrchestrator, ScanReport,
};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "mfdr")]
#[command(about = "Find damaged tracks in a music library and match replacements")]
#[command(version)]
struct Cli {
    /// Configuration file; must exist and parse (defaults to ~/.config/mfdr/config.toml)
    #[arg(long, global = true, env = "MFDR_CONFIG")]
    config: Option<PathBuf>,

    /// Folder for checkpoints and scan state
    #[arg(long, global = true)]
    state_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Classify every audio file below a folder
    ScanDir {
        root: PathBuf,

        #[command(flatten)]
        common: ScanArgs,
    },
    /// Verify a JSON track manifest and find replacements for missing tracks
    ScanManifest {
        manifest: PathBuf,

        /// Folders searched for replacement candidates
        #[arg(long = "search", required = true)]
        search_roots: Vec<PathBuf>,

        /// Folder receiving copies of accepted replacements
        #[arg(long)]
        auto_add: Option<PathBuf>,

        /// Only handle tracks whose file is missing
        #[arg(long)]
        missing_only: bool,

        #[command(flatten)]
        common: ScanArgs,
    },
}

#[derive(Args, Debug)]
struct ScanArgs {
    /// Seek-only probing, metadata advisory
    #[arg(long)]
    fast: bool,

    /// Report decisions without moving or copying files
    #[arg(long)]
    dry_run: bool,

    /// Continue from the stored checkpoint of the same scan
    #[arg(long)]
    resume: bool,

    /// Quarantine folder for bad files
    #[arg(long)]
    quarantine: Option<PathBuf>,

    /// Concurrent classifications
    #[arg(long)]
    workers: Option<usize>,

    /// Stop after this many items
    #[arg(long)]
    limit: Option<usize>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => MfdrConfig::load_required(path),
        None => MfdrConfig::load(default_config_path().as_deref()),
    }
    .context("invalid configuration")?;
    mfdr_common::logging::init_tracing(&config.base.logging).context("logging setup failed")?;

    info!(
        "mfdr {} ({} {}, built {})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_PROFILE"),
        env!("BUILD_TIMESTAMP")
    );

    let state_dir = resolve_state_folder(cli.state_dir.as_deref(), &config.base);
    info!("State folder: {}", state_dir.display());

    let (common, missing_only) = match &cli.command {
        Command::ScanDir { common, .. } => (common, false),
        Command::ScanManifest {
            common, missing_only, ..
        } => (common, *missing_only),
    };
    config.scan.fast |= common.fast;
    config.scan.dry_run |= common.dry_run;
    config.scan.missing_only |= missing_only;
    if let Some(workers) = common.workers {
        config.scan.workers = workers;
    }
    config.scan.validate().context("invalid scan options")?;

    let store = Arc::new(JsonCheckpointStore::new(state_dir.join("checkpoints")));
    let mut orchestrator = ScanOrchestrator::from_config(
        &config.scan,
        Arc::new(FfmpegProber::new()),
        Arc::new(LoftyMetadataReader::new()),
        store,
    )
    .with_mutator(Arc::new(FileSystemMutator::new()));

    if let Some(quarantine) = common.quarantine.clone().or(config.base.quarantine_folder.clone()) {
        info!("Quarantine folder: {}", quarantine.display());
        orchestrator = orchestrator.with_quarantine(QuarantinePlanner::new(quarantine));
    }

    let mut options = orchestrator.options().clone();
    options.resume = common.resume;
    options.limit = common.limit;

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupt received, stopping at the next item");
            on_signal.cancel();
        }
    });

    let report = match cli.command {
        Command::ScanDir { root, .. } => {
            let orchestrator = orchestrator.with_options(options);
            orchestrator.scan_directories(&[root], &cancel).await?
        }
        Command::ScanManifest {
            manifest,
            search_roots,
            auto_add,
            ..
        } => {
            let mut orchestrator = orchestrator.with_options(options);
            if let Some(auto_add) = auto_add {
                orchestrator = orchestrator.with_replacement(ReplacementPlanner::new(auto_add));
            }
            let reader = JsonManifestReader::new(manifest);
            orchestrator.scan_manifest(&reader, &search_roots, &cancel).await?
        }
    };

    print_report(&report, config.scan.dry_run);
    Ok(())
}

fn print_report(report: &ScanReport, dry_run: bool) {
    println!("Scan {} ({}): {:?}", &report.scan_key[..12.min(report.scan_key.len())], report.mode, report.state);
    println!("  {}", report.statistics.display_string());
    println!("  {} items this run", report.processed);

    let quarantined_bytes = report.quarantined_bytes();
    if quarantined_bytes > 0 {
        let verb = if dry_run { "would be quarantined" } else { "quarantined" };
        println!("  {} {}", format_size(quarantined_bytes), verb);
    }

    for decision in &report.decisions {
        println!("  - {}", decision.describe());
    }
    for warning in &report.warnings {
        println!("  ! {}", warning);
    }
}
