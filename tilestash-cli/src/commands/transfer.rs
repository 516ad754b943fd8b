//! Transfer and maintenance commands: export, import, prune, reset.

use super::{format_size, wait, wait_with_progress};
use crate::error::CliError;
use std::io::{self, BufRead, Write};
use std::path::Path;
use std::sync::mpsc;
use tilestash::store::ImportMode;
use tilestash::worker::CacheWorker;

/// Export every tile set into a portable database.
pub fn export(worker: &CacheWorker, path: &Path) -> Result<(), CliError> {
    let sets = wait(worker.fetch_tile_sets())?;
    let count = sets.len();

    let (progress_tx, progress_rx) = mpsc::channel();
    let reply = worker.export_sets(path, sets, Some(progress_tx));
    wait_with_progress(reply, progress_rx)?;

    println!("Exported {} set(s) to {}", count, path.display());
    Ok(())
}

/// Import a portable database, merging by default.
pub fn import(worker: &CacheWorker, path: &Path, replace: bool) -> Result<(), CliError> {
    let mode = if replace {
        ImportMode::Replace
    } else {
        ImportMode::Merge
    };

    let (progress_tx, progress_rx) = mpsc::channel();
    let reply = worker.import_sets(path, mode, Some(progress_tx));
    wait_with_progress(reply, progress_rx)?;

    println!("Imported {}", path.display());
    Ok(())
}

/// Prune spontaneously cached tiles.
pub fn prune(worker: &CacheWorker, bytes: u64) -> Result<(), CliError> {
    wait(worker.prune_cache(bytes))?;
    println!("Pruned about {} of browsing tiles", format_size(bytes));
    Ok(())
}

/// Reset the cache database after confirmation.
pub fn reset(worker: &CacheWorker, yes: bool) -> Result<(), CliError> {
    if !yes {
        print!("Delete every cached tile and tile set? [y/N] ");
        let _ = io::stdout().flush();
        let mut answer = String::new();
        let _ = io::stdin().lock().read_line(&mut answer);
        if !matches!(answer.trim(), "y" | "Y" | "yes") {
            return Err(CliError::Aborted);
        }
    }

    wait(worker.reset())?;
    println!("Cache reset.");
    Ok(())
}
