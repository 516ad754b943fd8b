//! Tile row operations: spontaneous save and hash lookup.

use super::{unix_time, Store};
use crate::error::CacheError;
use crate::provider::TileProvider;
use crate::tile::Tile;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, warn};

/// Look up a tile id by hash on any connection (used both directly and
/// inside set-creation transactions).
pub(crate) fn find_tile_id(conn: &Connection, hash: &str) -> rusqlite::Result<Option<i64>> {
    conn.query_row(
        "SELECT tileID FROM Tiles WHERE hash = ?1",
        params![hash],
        |row| row.get(0),
    )
    .optional()
}

/// True when an insert failed because a UNIQUE constraint already holds.
pub(crate) fn is_constraint_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _)
            if e.code == rusqlite::ErrorCode::ConstraintViolation
    )
}

impl Store {
    /// Save a spontaneously downloaded tile.
    ///
    /// The mapping layer may request the same tile twice in a row; a
    /// duplicate hash is the normal no-op path, not an error. On a fresh
    /// insert the tile is linked to `set_id`, or to the default set when no
    /// set is given.
    pub fn save_tile(&mut self, tile: &Tile, set_id: Option<u64>) -> Result<(), CacheError> {
        let inserted = self.conn.execute(
            "INSERT INTO Tiles(hash, format, tile, size, type, date) VALUES(?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                tile.hash,
                tile.format,
                tile.data,
                tile.size() as i64,
                tile.provider.id(),
                unix_time()
            ],
        );

        if let Err(err) = inserted {
            if is_constraint_violation(&err) {
                debug!(hash = %tile.hash, "tile already cached");
                return Ok(());
            }
            return Err(err.into());
        }

        let tile_id = self.conn.last_insert_rowid();
        let set_id = match set_id {
            Some(id) => id,
            None => self.default_set_id()?,
        };

        if let Err(err) = self.conn.execute(
            "INSERT INTO SetTiles(tileID, setID) VALUES(?1, ?2)",
            params![tile_id, set_id as i64],
        ) {
            warn!(hash = %tile.hash, set_id, error = %err, "failed to link tile to set");
            return Err(err.into());
        }

        debug!(hash = %tile.hash, set_id, "tile cached");
        Ok(())
    }

    /// Fetch a tile blob by hash.
    pub fn fetch_tile(&self, hash: &str) -> Result<Tile, CacheError> {
        let row = self
            .conn
            .query_row(
                "SELECT tile, format, type FROM Tiles WHERE hash = ?1",
                params![hash],
                |row| {
                    Ok((
                        row.get::<_, Vec<u8>>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, i64>(2)?,
                    ))
                },
            )
            .optional()?;

        match row {
            Some((data, format, provider_id)) => Ok(Tile {
                hash: hash.to_string(),
                format,
                data,
                provider: TileProvider::from_id(provider_id).unwrap_or_default(),
            }),
            None => Err(CacheError::TileNotFound),
        }
    }

    /// Look up a tile id by hash.
    pub fn find_tile(&self, hash: &str) -> Result<Option<i64>, CacheError> {
        Ok(find_tile_id(&self.conn, hash)?)
    }
}
