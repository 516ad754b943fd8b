//! Error types for the tile cache.

use thiserror::Error;

/// Errors surfaced by cache operations.
///
/// Every task reply channel carries `Result<_, CacheError>`; the worker loop
/// itself never unwinds on these.
#[derive(Debug, Error)]
pub enum CacheError {
    /// The worker failed to open its database and refuses data tasks
    #[error("Database Not Initialized")]
    DatabaseNotInitialized,

    /// Opening the cache database file failed
    #[error("Failed to open cache database: {0}")]
    OpenFailure(String),

    /// Creating the cache schema failed; the database file has been removed
    #[error("Failed to create cache schema: {0}")]
    SchemaFailure(String),

    /// The tile set query failed or the default set row is missing
    #[error("No tile set in database")]
    NoTileSetsFound,

    /// Lookup by hash found nothing
    #[error("Tile not in cache database")]
    TileNotFound,

    /// Inserting a tile set row failed
    #[error("Error saving tile set")]
    SetInsertFailure,

    /// Queueing a tile for download failed
    #[error("Error creating tile set download list")]
    DownloadListInsertFailure,

    /// Renaming a tile set failed
    #[error("Error renaming tile set")]
    RenameFailure,

    /// The import source database could not be opened
    #[error("Error opening import database")]
    ImportOpenFailure,

    /// Every tile in the import source was already cached
    #[error("No unique tiles in imported database")]
    ImportNoUniqueTiles,

    /// The export target database could not be opened
    #[error("Error opening export database")]
    ExportOpenFailure,

    /// The export target schema could not be created
    #[error("Error creating export database")]
    ExportCreateFailure,

    /// Underlying SQL error
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),

    /// Cache I/O error
    #[error("Cache I/O error: {0}")]
    Io(#[from] std::io::Error),
}
