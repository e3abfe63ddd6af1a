//! fedingest - command-line media ingest for Fedora repositories
//!
//! Plays the host role for operators: runs each named file through the
//! probe -> map -> upload -> annotate pipeline and prints the resulting
//! object URL and attribute writes.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

use fedingest::{IngestConfig, IngestPipeline, MediaFile, UploadOutcome};

#[derive(Parser)]
#[command(
    name = "fedingest",
    about = "Ingest media files into a Fedora repository",
    version
)]
struct Args {
    /// Media files to ingest
    #[arg(required = true)]
    files: Vec<PathBuf>,

    /// Configuration file (default: $FEDINGEST_CONFIG, then the platform
    /// config directory)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override the destination container path
    #[arg(long)]
    container: Option<String>,

    /// Debug-level logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize tracing
    let level = if args.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let mut config =
        IngestConfig::load(args.config.as_deref()).context("failed to load configuration")?;
    if let Some(container) = args.container {
        config.repository.container_path = container;
    }

    info!("fedingest {}", env!("CARGO_PKG_VERSION"));
    info!("repository: {}", config.repository.base_url);

    let pipeline = IngestPipeline::new(&config).context("probe tool unavailable")?;

    let mut failures = 0usize;
    for path in &args.files {
        let file = match MediaFile::from_path(path) {
            Ok(file) => file,
            Err(e) => {
                error!(file = %path.display(), error = %e, "cannot read file");
                failures += 1;
                continue;
            }
        };

        match pipeline.process(&file).await {
            UploadOutcome::Success {
                object_url,
                attributes,
                annotation_error,
                ..
            } => {
                println!("{} -> {}", file.original_name, object_url);
                for (target, value) in config.attributes.writes_for(&attributes) {
                    println!("  {} = {}", target, value);
                }
                if let Some(reason) = annotation_error {
                    eprintln!("  warning: metadata not attached: {}", reason);
                }
            }
            UploadOutcome::Failure { reason } => {
                error!(file = %file.original_name, error = %reason, "ingest failed");
                failures += 1;
            }
        }
    }

    if failures > 0 {
        bail!("{} of {} files failed", failures, args.files.len());
    }

    Ok(())
}
