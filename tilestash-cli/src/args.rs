//! Command line argument definitions.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use tilestash::provider::TileProvider;

/// Manage tilestash map tile cache databases.
#[derive(Debug, Parser)]
#[command(name = "tilestash", version, about)]
pub struct Cli {
    /// Path of the cache database file
    #[arg(short, long, global = true, default_value = "tiles.db")]
    pub database: PathBuf,

    /// Log to logs/tilestash.log and stderr
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Show cache totals and every tile set
    Stats,

    /// Create a tile set covering a bounding box and queue its downloads
    CreateSet(CreateSetArgs),

    /// Delete a tile set and the tiles only it references
    DeleteSet {
        /// Name of the set to delete
        name: String,
    },

    /// Rename a tile set
    RenameSet {
        /// Current name
        name: String,
        /// New name
        new_name: String,
    },

    /// Export all tile sets into a portable database file
    Export {
        /// Target file (overwritten if present)
        path: PathBuf,
    },

    /// Import a portable database file
    Import {
        /// Source file
        path: PathBuf,
        /// Replace the whole cache instead of merging
        #[arg(long)]
        replace: bool,
    },

    /// Delete the oldest spontaneously cached tiles
    Prune {
        /// Number of bytes to reclaim
        bytes: u64,
    },

    /// Drop all cached data and start over
    Reset {
        /// Skip the confirmation prompt
        #[arg(long)]
        yes: bool,
    },
}

#[derive(Debug, Args)]
pub struct CreateSetArgs {
    /// Name of the new set
    pub name: String,

    /// Tile provider (osm, bing-road, bing-sat, google-street, google-sat, esri)
    #[arg(short, long, default_value = "osm")]
    pub provider: TileProvider,

    /// Latitude of the north-west corner
    #[arg(long, allow_hyphen_values = true)]
    pub top_lat: f64,

    /// Longitude of the north-west corner
    #[arg(long, allow_hyphen_values = true)]
    pub top_lon: f64,

    /// Latitude of the south-east corner
    #[arg(long, allow_hyphen_values = true)]
    pub bottom_lat: f64,

    /// Longitude of the south-east corner
    #[arg(long, allow_hyphen_values = true)]
    pub bottom_lon: f64,

    /// Shallowest zoom level to cover
    #[arg(long, default_value_t = 3)]
    pub min_zoom: u8,

    /// Deepest zoom level to cover
    #[arg(long, default_value_t = 3)]
    pub max_zoom: u8,
}
