//! Management CLI for tilestash cache databases.

mod args;
mod commands;
mod error;

use args::{Cli, Command};
use clap::Parser;
use std::process::ExitCode;
use tilestash::config::CacheConfig;
use tilestash::worker::CacheWorker;

fn main() -> ExitCode {
    let cli = Cli::parse();

    let _logging_guard = if cli.verbose {
        match tilestash::logging::init_logging("logs", "tilestash.log") {
            Ok(guard) => Some(guard),
            Err(e) => {
                eprintln!("warning: failed to initialize logging: {e}");
                None
            }
        }
    } else {
        None
    };

    let worker = CacheWorker::new(CacheConfig::new(&cli.database));

    let result = match cli.command {
        Command::Stats => commands::sets::stats(&worker),
        Command::CreateSet(args) => commands::sets::create_set(&worker, args),
        Command::DeleteSet { name } => commands::sets::delete_set(&worker, &name),
        Command::RenameSet { name, new_name } => {
            commands::sets::rename_set(&worker, &name, &new_name)
        }
        Command::Export { path } => commands::transfer::export(&worker, &path),
        Command::Import { path, replace } => commands::transfer::import(&worker, &path, replace),
        Command::Prune { bytes } => commands::transfer::prune(&worker, bytes),
        Command::Reset { yes } => commands::transfer::reset(&worker, yes),
    };

    worker.stop();

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{e}");
            ExitCode::FAILURE
        }
    }
}
