//! Maintenance passes: bogus-tile cleanup, pruning, full reset.

use super::sets::UNIQUE_TO_SET_SUBQUERY;
use super::Store;
use crate::error::CacheError;
use rusqlite::{params, OptionalExtension};
use tracing::{debug, info, warn};

/// Settings key marking the one-shot bogus-tile cleanup as done.
const BOGUS_CLEANUP_DONE_KEY: &str = "bogus_cleanup_done";

impl Store {
    /// Delete cached copies of a provider's "no tile at this zoom"
    /// placeholder image.
    ///
    /// Early versions cached these placeholder graphics, which then blocked
    /// zooming past the deepest real imagery. Runs once per installation,
    /// guarded by a settings flag. Returns the number of tiles removed.
    pub fn cleanup_bogus_tiles(&mut self, pattern: &[u8]) -> Result<usize, CacheError> {
        let done: Option<String> = self
            .conn
            .query_row(
                "SELECT value FROM Settings WHERE key = ?1",
                params![BOGUS_CLEANUP_DONE_KEY],
                |row| row.get(0),
            )
            .optional()?;
        if done.is_some() {
            return Ok(0);
        }
        self.conn.execute(
            "INSERT OR REPLACE INTO Settings(key, value) VALUES(?1, '1')",
            params![BOGUS_CLEANUP_DONE_KEY],
        )?;

        // Cheap length filter first, then byte comparison.
        let candidates = {
            let mut stmt = self
                .conn
                .prepare("SELECT tileID, tile, hash FROM Tiles WHERE LENGTH(tile) = ?1")?;
            let rows = stmt.query_map(params![pattern.len() as i64], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, Vec<u8>>(1)?,
                    row.get::<_, String>(2)?,
                ))
            })?;
            rows.collect::<rusqlite::Result<Vec<_>>>()?
        };

        let mut removed = 0;
        for (tile_id, data, hash) in candidates {
            if data == pattern {
                debug!(%hash, "removing bogus tile");
                if let Err(err) = self
                    .conn
                    .execute("DELETE FROM Tiles WHERE tileID = ?1", params![tile_id])
                {
                    warn!(%hash, %err, "failed to delete bogus tile");
                    continue;
                }
                removed += 1;
            }
        }

        if removed > 0 {
            info!(removed, "bogus tile cleanup finished");
        }
        Ok(removed)
    }

    /// Prune the oldest tiles unique to the default set until roughly
    /// `amount` bytes are reclaimed.
    ///
    /// At most `batch` tiles are examined per pass. Tiles belonging to any
    /// named set are never touched. A failed per-tile delete aborts the
    /// pass.
    pub fn prune(&mut self, amount: u64, batch: usize) -> Result<(), CacheError> {
        let default_id = self.default_set_id()?;

        let victims = {
            let mut stmt = self.conn.prepare(&format!(
                "SELECT tileID, size, hash FROM Tiles \
                 WHERE tileID IN ({UNIQUE_TO_SET_SUBQUERY}) \
                 ORDER BY date ASC LIMIT ?2"
            ))?;
            let rows = stmt.query_map(params![default_id as i64, batch as i64], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, String>(2)?,
                ))
            })?;
            rows.collect::<rusqlite::Result<Vec<_>>>()?
        };

        let mut outstanding = amount as i64;
        let mut selected = Vec::new();
        for (tile_id, size, hash) in victims {
            if outstanding < 0 {
                break;
            }
            debug!(%hash, size, "pruning tile");
            selected.push(tile_id);
            outstanding -= size;
        }

        let count = selected.len();
        for tile_id in selected {
            if self
                .conn
                .execute("DELETE FROM Tiles WHERE tileID = ?1", params![tile_id])
                .is_err()
            {
                break;
            }
        }

        info!(amount, pruned = count, "cache pruned");
        Ok(())
    }

    /// Drop every data table and rebuild the schema with a fresh default
    /// set. The settings table and the file itself are left alone.
    pub fn reset(&mut self) -> Result<(), CacheError> {
        self.conn.execute_batch(
            "DROP TABLE IF EXISTS Tiles;
             DROP TABLE IF EXISTS TileSets;
             DROP TABLE IF EXISTS SetTiles;
             DROP TABLE IF EXISTS TilesDownload;",
        )?;
        self.default_set = None;
        Self::create_schema(&self.conn, true)
            .map_err(|e| CacheError::SchemaFailure(e.to_string()))?;
        info!("cache database reset");
        Ok(())
    }
}
