//! TileStash - persistent map tile cache and tile set manager
//!
//! This library provides a disk-backed cache for raster map tiles, stored in
//! a single SQLite database and organized into user-defined tile sets (a
//! bounding box plus a zoom range). All database access is serialized through
//! a single background worker that foreground callers talk to with typed
//! task descriptors.
//!
//! # High-Level API
//!
//! ```ignore
//! use tilestash::config::CacheConfig;
//! use tilestash::worker::CacheWorker;
//!
//! let config = CacheConfig::new("/tmp/tiles.db");
//! let worker = CacheWorker::new(config);
//!
//! // Fetch a cached tile; the receiver resolves when the worker gets to it.
//! let rx = worker.fetch_tile("00000000010000001200000034007");
//! let tile = rx.recv()??;
//! ```

pub mod config;
pub mod coord;
pub mod error;
pub mod logging;
pub mod provider;
pub mod store;
pub mod tile;
pub mod worker;

/// Version of the TileStash library and CLI.
///
/// This is synchronized across all components in the workspace.
/// The version is defined in `Cargo.toml` and injected at compile time.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
