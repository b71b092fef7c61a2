//! Command-line check for a media library.
//!
//! # Responsibility
//! - Open a library from an optional JSON config path (in-memory otherwise).
//! - Print repository diagnostics and library stats for a quick sanity check.

use clap::Parser;
use medialib_core::{core_version, Library, LibraryConfig, LibraryError};
use std::path::PathBuf;
use std::process::ExitCode;

/// Open a media library and print its cache diagnostics and stats.
#[derive(Parser, Debug)]
#[command(name = "medialib")]
#[command(version, about, long_about = None)]
struct Cli {
    /// JSON configuration file; an in-memory library is used when omitted
    #[arg(value_name = "CONFIG")]
    config: Option<PathBuf>,

    /// Recompute every derived aggregate before printing stats
    #[arg(long)]
    reconcile: bool,
}

fn main() -> ExitCode {
    match run(Cli::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            log::error!("event=cli_run module=cli status=error error={err}");
            eprintln!("medialib: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), LibraryError> {
    let config = match cli.config {
        Some(path) => LibraryConfig::from_path(path)?,
        None => LibraryConfig::in_memory(),
    };
    let library = Library::open(&config)?;

    println!("medialib_core version={}", core_version());
    for diag in library.diagnostics() {
        println!(
            "repository={} mode={} cached={} pending_changes={}",
            diag.name,
            diag.mode.as_str(),
            diag.cached,
            diag.pending_changes
        );
    }
    if cli.reconcile {
        let report = library.reconcile()?;
        println!("reconciled={}", report.total());
    }
    let stats = library.stats()?;
    println!(
        "groups={} series={} episodes={} files={} filters={} users={} watched={}",
        stats.groups,
        stats.series,
        stats.episodes,
        stats.files,
        stats.filters,
        stats.users,
        stats.watched_episodes
    );
    Ok(())
}
