//! dirsizer - total size and file count of a directory tree.
//!
//! Usage:
//!   dirsizer [PATH]                 Size PATH (defaults to current directory)
//!   dirsizer -j 4 --global [PATH]   At most 4 filesystem calls at once
//!   dirsizer --json [PATH]          Print the totals as JSON
//!   dirsizer --help                 Show help

use std::path::{Path, PathBuf};

use clap::Parser;
use color_eyre::eyre::{Context, Result};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use dirsizer_walk::{CancellationToken, FsOptions, FsTree, LimitScope, Sizer, SizerConfig, Totals};

#[derive(Parser)]
#[command(
    name = "dirsizer",
    version,
    about = "Total size and file count of a directory tree",
    long_about = "dirsizer walks a directory tree with bounded concurrency and reports \
                  the total size and number of files beneath it.\n\n\
                  Any error aborts the whole walk: no partial totals are printed."
)]
struct Cli {
    /// Path to size (defaults to current directory)
    #[arg(default_value = ".")]
    path: PathBuf,

    /// Concurrency ceiling (0 = number of CPUs)
    #[arg(short, long, default_value = "0")]
    jobs: usize,

    /// Apply the ceiling to the whole walk instead of per directory
    #[arg(short, long)]
    global: bool,

    /// Follow symbolic links
    #[arg(short = 'L', long)]
    follow_symlinks: bool,

    /// Skip hidden files and directories
    #[arg(long)]
    no_hidden: bool,

    /// Count hardlinked files only once
    #[arg(short = 'H', long)]
    dedupe_hardlinks: bool,

    /// Print totals as JSON
    #[arg(long)]
    json: bool,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let path = cli.path.canonicalize().context("Invalid path")?;

    let config = SizerConfig::builder()
        .max_workers(cli.jobs)
        .limit_scope(if cli.global {
            LimitScope::Global
        } else {
            LimitScope::PerContainer
        })
        .build()
        .context("Invalid sizer configuration")?;

    let options = FsOptions::builder()
        .follow_symlinks(cli.follow_symlinks)
        .include_hidden(!cli.no_hidden)
        .dedupe_hardlinks(cli.dedupe_hardlinks)
        .build()
        .context("Invalid filesystem options")?;

    let cancel = CancellationToken::new();
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::debug!("interrupted, cancelling");
            interrupt.cancel();
        }
    });

    let tree = FsTree::new(&path, options);
    let totals = Sizer::with_config(config)
        .size(&cancel, tree.root())
        .await
        .context("Sizing failed")?;

    if cli.dedupe_hardlinks {
        tracing::debug!(files = tree.hardlinked_files(), "hardlinked files counted once");
    }

    if cli.json {
        print_json(&path, totals)?;
    } else {
        println!(
            "{}  {} in {} files",
            path.display(),
            format_size(totals.size),
            totals.count
        );
    }

    Ok(())
}

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "dirsizer=debug,dirsizer_walk=debug",
        _ => "dirsizer=trace,dirsizer_walk=trace",
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

/// Print totals as a JSON object.
fn print_json(path: &Path, totals: Totals) -> Result<()> {
    let report = serde_json::json!({
        "path": path,
        "size": totals.size,
        "count": totals.count,
    });
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

/// Format size in human-readable form.
fn format_size(bytes: u64) -> String {
    humansize::format_size(bytes, humansize::BINARY)
}
