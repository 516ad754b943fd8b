//! Database façade.
//!
//! `Store` owns the rusqlite connection and isolates every SQL statement in
//! the crate. The worker thread is the only place a `Store` lives; detached
//! value objects are what cross back to foreground callers.

mod downloads;
mod maintenance;
mod sets;
mod tiles;
mod transfer;

pub use sets::{CacheTotals, TileSet, TileSetPlan};
pub use transfer::ImportMode;

use crate::error::CacheError;
use rusqlite::{params, Connection, OptionalExtension};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, warn};

/// Name of the singleton default set seeded at schema creation.
pub const DEFAULT_SET_NAME: &str = "Default Tile Set";

const SCHEMA_SQL: &str = "
    CREATE TABLE IF NOT EXISTS Tiles (
        tileID INTEGER PRIMARY KEY NOT NULL,
        hash TEXT NOT NULL UNIQUE,
        format TEXT NOT NULL,
        tile BLOB NULL,
        size INTEGER,
        type INTEGER,
        date INTEGER DEFAULT 0
    );
    CREATE INDEX IF NOT EXISTS hash ON Tiles (hash, size, type);

    CREATE TABLE IF NOT EXISTS TileSets (
        setID INTEGER PRIMARY KEY NOT NULL,
        name TEXT NOT NULL UNIQUE,
        typeStr TEXT,
        topleftLat REAL DEFAULT 0.0,
        topleftLon REAL DEFAULT 0.0,
        bottomRightLat REAL DEFAULT 0.0,
        bottomRightLon REAL DEFAULT 0.0,
        minZoom INTEGER DEFAULT 3,
        maxZoom INTEGER DEFAULT 3,
        type INTEGER DEFAULT -1,
        numTiles INTEGER DEFAULT 0,
        defaultSet INTEGER DEFAULT 0,
        date INTEGER DEFAULT 0
    );

    CREATE TABLE IF NOT EXISTS SetTiles (
        setID INTEGER,
        tileID INTEGER
    );

    CREATE TABLE IF NOT EXISTS TilesDownload (
        setID INTEGER,
        hash TEXT NOT NULL UNIQUE,
        type INTEGER,
        x INTEGER,
        y INTEGER,
        z INTEGER,
        state INTEGER DEFAULT 0
    );

    CREATE TABLE IF NOT EXISTS Settings (
        key TEXT PRIMARY KEY NOT NULL,
        value TEXT
    );
";

/// The cache database.
pub struct Store {
    conn: Connection,
    path: PathBuf,
    /// Lazily resolved id of the default set; invalidated by reset
    default_set: Option<u64>,
}

impl Store {
    /// Open (or create) the cache database at `path`.
    ///
    /// Creates the parent directory if needed, applies the connection
    /// pragmas, and runs idempotent schema creation including the default
    /// set seed. A schema failure removes the database file so the next
    /// attempt restarts clean.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, CacheError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent)?;
            }
        }

        let conn = Self::connect(&path).map_err(|e| CacheError::OpenFailure(e.to_string()))?;

        if let Err(e) = Self::create_schema(&conn, true) {
            // Start from scratch on the next open.
            drop(conn);
            let _ = fs::remove_file(&path);
            return Err(CacheError::SchemaFailure(e.to_string()));
        }

        debug!(path = %path.display(), "cache database opened");
        Ok(Self {
            conn,
            path,
            default_set: None,
        })
    }

    fn connect(path: &Path) -> rusqlite::Result<Connection> {
        let conn = Connection::open(path)?;
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;",
        )?;
        Ok(conn)
    }

    /// Idempotently create the five relations and the tile lookup index.
    ///
    /// When `create_default_set` is true, ensures the row with `defaultSet=1`
    /// exists; export targets are created without it so imported sets keep
    /// their own default marker.
    pub(crate) fn create_schema(
        conn: &Connection,
        create_default_set: bool,
    ) -> rusqlite::Result<()> {
        conn.execute_batch(SCHEMA_SQL)?;

        if create_default_set {
            let existing: Option<i64> = conn
                .query_row(
                    "SELECT setID FROM TileSets WHERE defaultSet = 1",
                    [],
                    |row| row.get(0),
                )
                .optional()?;
            if existing.is_none() {
                conn.execute(
                    "INSERT INTO TileSets(name, defaultSet, date) VALUES(?1, 1, ?2)",
                    params![DEFAULT_SET_NAME, unix_time()],
                )?;
            }
        }

        Ok(())
    }

    /// Path of the database file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Id of the default set, resolved once and cached.
    pub fn default_set_id(&mut self) -> Result<u64, CacheError> {
        if let Some(id) = self.default_set {
            return Ok(id);
        }

        let id: Option<i64> = self
            .conn
            .query_row(
                "SELECT setID FROM TileSets WHERE defaultSet = 1",
                [],
                |row| row.get(0),
            )
            .optional()?;

        match id {
            Some(id) => {
                self.default_set = Some(id as u64);
                Ok(id as u64)
            }
            None => {
                warn!("default tile set row is missing");
                Err(CacheError::NoTileSetsFound)
            }
        }
    }

    /// Look up a set id by name.
    pub fn find_set_id(&self, name: &str) -> Result<Option<u64>, CacheError> {
        let id: Option<i64> = self
            .conn
            .query_row(
                "SELECT setID FROM TileSets WHERE name = ?1",
                params![name],
                |row| row.get(0),
            )
            .optional()?;
        Ok(id.map(|id| id as u64))
    }
}

/// Seconds since the Unix epoch, clamped to zero on clock errors.
pub(crate) fn unix_time() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::Store;
    use tempfile::TempDir;

    pub fn open_temp_store() -> (Store, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = Store::open(dir.path().join("tiles.db")).unwrap();
        (store, dir)
    }
}
