//! Command implementations.

pub mod sets;
pub mod transfer;

use crate::error::CliError;
use std::sync::mpsc::{Receiver, TryRecvError};
use std::thread;
use std::time::Duration;
use tilestash::error::CacheError;

/// Wait for a worker reply, treating a dropped channel as a worker failure.
pub fn wait<T>(rx: Receiver<Result<T, CacheError>>) -> Result<T, CliError> {
    match rx.recv() {
        Ok(result) => result.map_err(CliError::from),
        Err(_) => Err(CliError::WorkerGone),
    }
}

/// Wait for a worker reply while printing progress percentages.
pub fn wait_with_progress<T>(
    rx: Receiver<Result<T, CacheError>>,
    progress: Receiver<u8>,
) -> Result<T, CliError> {
    let mut last = None;
    loop {
        for percent in progress.try_iter() {
            if last != Some(percent) {
                last = Some(percent);
                eprint!("\r{percent:3}%");
            }
        }
        match rx.try_recv() {
            Ok(result) => {
                if last.is_some() {
                    eprintln!();
                }
                return result.map_err(CliError::from);
            }
            Err(TryRecvError::Empty) => thread::sleep(Duration::from_millis(50)),
            Err(TryRecvError::Disconnected) => {
                if last.is_some() {
                    eprintln!();
                }
                return Err(CliError::WorkerGone);
            }
        }
    }
}

/// Render a byte count with a binary unit suffix.
pub fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{value:.1} {}", UNITS[unit])
    }
}
