//! Tile set commands: stats, create, delete, rename.

use super::{format_size, wait};
use crate::args::CreateSetArgs;
use crate::error::CliError;
use tilestash::coord::BoundingBox;
use tilestash::store::{TileSet, TileSetPlan};
use tilestash::worker::CacheWorker;

/// Print cache totals and a line per tile set.
pub fn stats(worker: &CacheWorker) -> Result<(), CliError> {
    let sets = wait(worker.fetch_tile_sets())?;

    if let Some(default) = sets.iter().find(|s| s.default_set) {
        println!(
            "Cache: {} tiles, {}",
            default.saved_tile_count,
            format_size(default.saved_tile_size)
        );
        println!(
            "  browsing only: {} tiles, {}",
            default.total_tile_count,
            format_size(default.total_tile_size)
        );
    }

    let named: Vec<&TileSet> = sets.iter().filter(|s| !s.default_set).collect();
    if named.is_empty() {
        println!("No tile sets.");
        return Ok(());
    }

    println!();
    println!("Tile sets:");
    for set in named {
        let provider = set
            .provider
            .map(|p| p.short_name())
            .unwrap_or("unknown");
        println!(
            "  {:<24} {:>9} z{}-{}  {}/{} tiles  {}",
            set.name,
            provider,
            set.min_zoom,
            set.max_zoom,
            set.saved_tile_count,
            set.total_tile_count,
            format_size(set.total_tile_size)
        );
    }
    Ok(())
}

/// Create a tile set from command line bounds.
pub fn create_set(worker: &CacheWorker, args: CreateSetArgs) -> Result<(), CliError> {
    let plan = TileSetPlan {
        name: args.name,
        provider: args.provider,
        bbox: BoundingBox::new(args.top_lat, args.top_lon, args.bottom_lat, args.bottom_lon),
        min_zoom: args.min_zoom,
        max_zoom: args.max_zoom,
    };

    let set = wait(worker.create_tile_set(plan))?;
    println!(
        "Created \"{}\": {} tiles planned, {} already cached",
        set.name, set.total_tile_count, set.saved_tile_count
    );
    Ok(())
}

/// Delete a tile set by name.
pub fn delete_set(worker: &CacheWorker, name: &str) -> Result<(), CliError> {
    let set = find_set(worker, name)?;
    if set.default_set {
        return Err(CliError::DefaultSetProtected);
    }
    wait(worker.delete_tile_set(set.id))?;
    println!("Deleted \"{name}\"");
    Ok(())
}

/// Rename a tile set.
pub fn rename_set(worker: &CacheWorker, name: &str, new_name: &str) -> Result<(), CliError> {
    let set = find_set(worker, name)?;
    wait(worker.rename_tile_set(set.id, new_name))?;
    println!("Renamed \"{name}\" to \"{new_name}\"");
    Ok(())
}

fn find_set(worker: &CacheWorker, name: &str) -> Result<TileSet, CliError> {
    let sets = wait(worker.fetch_tile_sets())?;
    sets.into_iter()
        .find(|s| s.name == name)
        .ok_or_else(|| CliError::NoSuchSet(name.to_string()))
}
