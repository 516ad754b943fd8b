//! Tile set operations: creation, enumeration, rename, delete, and the
//! derived statistics attached to every set handed back to callers.

use super::tiles::{find_tile_id, is_constraint_violation};
use super::{unix_time, Store};
use crate::coord::{self, BoundingBox};
use crate::error::CacheError;
use crate::provider::{TileProvider, DEFAULT_AVERAGE_TILE_SIZE};
use crate::tile::DownloadState;
use rusqlite::params;
use tracing::{debug, warn};

/// Subquery selecting the tiles whose only membership row belongs to the
/// bound set. These are the reclaim unit for delete and prune.
pub(crate) const UNIQUE_TO_SET_SUBQUERY: &str = "SELECT A.tileID FROM SetTiles A \
     JOIN SetTiles B ON A.tileID = B.tileID \
     WHERE B.setID = ?1 GROUP BY A.tileID HAVING COUNT(A.tileID) = 1";

/// Aggregate cache statistics emitted after totals recomputation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CacheTotals {
    /// Tiles in the cache, across all sets
    pub total_count: u64,
    /// Bytes in the cache, across all sets
    pub total_size: u64,
    /// Tiles unique to the default set
    pub default_count: u64,
    /// Bytes unique to the default set
    pub default_size: u64,
}

/// The plan for a new tile set: an area, a zoom range and a provider.
#[derive(Debug, Clone)]
pub struct TileSetPlan {
    pub name: String,
    pub provider: TileProvider,
    pub bbox: BoundingBox,
    pub min_zoom: u8,
    pub max_zoom: u8,
}

/// A tile set row with its derived statistics, detached from the store.
#[derive(Debug, Clone)]
pub struct TileSet {
    pub id: u64,
    pub name: String,
    /// Display name of the provider at creation time
    pub type_str: String,
    /// `None` for the default set, which has no provider of its own
    pub provider: Option<TileProvider>,
    pub bbox: BoundingBox,
    pub min_zoom: u8,
    pub max_zoom: u8,
    /// Planned tile count from the bounding box and zoom range
    pub total_tile_count: u64,
    pub default_set: bool,
    /// Epoch seconds of creation
    pub created: i64,

    // Derived, never stored:
    /// Tiles of this set present in the cache
    pub saved_tile_count: u64,
    /// Bytes of this set present in the cache
    pub saved_tile_size: u64,
    /// Actual size when complete, estimated otherwise
    pub total_tile_size: u64,
    /// Tiles referenced by no other set (estimated while incomplete)
    pub unique_tile_count: u64,
    pub unique_tile_size: u64,
}

impl Store {
    /// Create a tile set and queue its missing tiles for download.
    ///
    /// Tiles already cached are linked immediately; the rest land in
    /// `TilesDownload` as `Pending`. The whole enumeration runs inside one
    /// transaction.
    pub fn create_tile_set(&mut self, plan: &TileSetPlan) -> Result<TileSet, CacheError> {
        let provider = plan.provider;
        let min_zoom = plan.min_zoom.clamp(provider.min_zoom(), provider.max_zoom());
        let max_zoom = plan.max_zoom.clamp(min_zoom, provider.max_zoom());

        let planned =
            coord::planned_tile_count(min_zoom, max_zoom, &plan.bbox).map_err(|err| {
                warn!(name = %plan.name, %err, "tile set plan is out of range");
                CacheError::SetInsertFailure
            })?;

        let created = unix_time();
        self.conn
            .execute(
                "INSERT INTO TileSets(name, typeStr, topleftLat, topleftLon, \
                 bottomRightLat, bottomRightLon, minZoom, maxZoom, type, numTiles, date) \
                 VALUES(?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                params![
                    plan.name,
                    provider.name(),
                    plan.bbox.top_left_lat,
                    plan.bbox.top_left_lon,
                    plan.bbox.bottom_right_lat,
                    plan.bbox.bottom_right_lon,
                    min_zoom,
                    max_zoom,
                    provider.id(),
                    planned as i64,
                    created
                ],
            )
            .map_err(|err| {
                warn!(name = %plan.name, %err, "failed to insert tile set");
                CacheError::SetInsertFailure
            })?;
        let set_id = self.conn.last_insert_rowid();

        let tx = self.conn.transaction()?;
        for zoom in min_zoom..=max_zoom {
            let range = coord::tile_range(zoom, &plan.bbox).map_err(|err| {
                warn!(name = %plan.name, %err, "tile set plan is out of range");
                CacheError::SetInsertFailure
            })?;
            for (x, y) in range.iter() {
                let hash = provider.tile_hash(x, y, zoom);
                match find_tile_id(&tx, &hash)? {
                    Some(tile_id) => {
                        // Already cached, no download needed.
                        tx.execute(
                            "INSERT OR IGNORE INTO SetTiles(tileID, setID) VALUES(?1, ?2)",
                            params![tile_id, set_id],
                        )?;
                        debug!(%hash, "tile already cached for new set");
                    }
                    None => {
                        tx.execute(
                            "INSERT OR IGNORE INTO TilesDownload(setID, hash, type, x, y, z, state) \
                             VALUES(?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                            params![
                                set_id,
                                hash,
                                provider.id(),
                                x,
                                y,
                                zoom,
                                DownloadState::Pending.as_i64()
                            ],
                        )
                        .map_err(|err| {
                            warn!(%hash, %err, "failed to queue tile for download");
                            CacheError::DownloadListInsertFailure
                        })?;
                    }
                }
            }
        }
        tx.commit()?;

        let mut set = TileSet {
            id: set_id as u64,
            name: plan.name.clone(),
            type_str: provider.name().to_string(),
            provider: Some(provider),
            bbox: plan.bbox,
            min_zoom,
            max_zoom,
            total_tile_count: planned,
            default_set: false,
            created,
            saved_tile_count: 0,
            saved_tile_size: 0,
            total_tile_size: 0,
            unique_tile_count: 0,
            unique_tile_size: 0,
        };
        self.update_set_totals(&mut set)?;

        debug!(name = %set.name, id = set.id, planned, "tile set created");
        Ok(set)
    }

    /// All tile sets, default set first, each with derived statistics.
    pub fn list_tile_sets(&mut self) -> Result<Vec<TileSet>, CacheError> {
        let mut sets = {
            let mut stmt = self
                .conn
                .prepare(
                    "SELECT setID, name, typeStr, topleftLat, topleftLon, \
                     bottomRightLat, bottomRightLon, minZoom, maxZoom, type, \
                     numTiles, defaultSet, date \
                     FROM TileSets ORDER BY defaultSet DESC, name ASC",
                )
                .map_err(|_| CacheError::NoTileSetsFound)?;
            let rows = stmt
                .query_map([], |row| {
                    Ok(TileSet {
                        id: row.get::<_, i64>(0)? as u64,
                        name: row.get(1)?,
                        type_str: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
                        bbox: BoundingBox::new(
                            row.get(3)?,
                            row.get(4)?,
                            row.get(5)?,
                            row.get(6)?,
                        ),
                        min_zoom: row.get::<_, i64>(7)? as u8,
                        max_zoom: row.get::<_, i64>(8)? as u8,
                        provider: TileProvider::from_id(row.get::<_, i64>(9)?),
                        total_tile_count: row.get::<_, i64>(10)? as u64,
                        default_set: row.get::<_, i64>(11)? != 0,
                        created: row.get(12)?,
                        saved_tile_count: 0,
                        saved_tile_size: 0,
                        total_tile_size: 0,
                        unique_tile_count: 0,
                        unique_tile_size: 0,
                    })
                })
                .map_err(|_| CacheError::NoTileSetsFound)?;
            rows.collect::<rusqlite::Result<Vec<_>>>()
                .map_err(|_| CacheError::NoTileSetsFound)?
        };

        for set in &mut sets {
            self.update_set_totals(set)?;
        }
        Ok(sets)
    }

    /// Rename a tile set.
    pub fn rename_tile_set(&mut self, set_id: u64, new_name: &str) -> Result<(), CacheError> {
        self.conn
            .execute(
                "UPDATE TileSets SET name = ?1 WHERE setID = ?2",
                params![new_name, set_id as i64],
            )
            .map_err(|err| {
                warn!(set_id, new_name, %err, "failed to rename tile set");
                CacheError::RenameFailure
            })?;
        Ok(())
    }

    /// Delete a tile set along with the tiles unique to it, its download
    /// queue rows and its membership rows.
    pub fn delete_tile_set(&mut self, set_id: u64) -> Result<(), CacheError> {
        let id = set_id as i64;
        self.conn.execute(
            &format!("DELETE FROM Tiles WHERE tileID IN ({UNIQUE_TO_SET_SUBQUERY})"),
            params![id],
        )?;
        self.conn
            .execute("DELETE FROM TilesDownload WHERE setID = ?1", params![id])?;
        self.conn
            .execute("DELETE FROM TileSets WHERE setID = ?1", params![id])?;
        self.conn
            .execute("DELETE FROM SetTiles WHERE setID = ?1", params![id])?;
        self.update_totals()?;
        debug!(set_id, "tile set deleted");
        Ok(())
    }

    /// Recompute the aggregate totals.
    pub fn update_totals(&mut self) -> Result<CacheTotals, CacheError> {
        let default_id = self.default_set_id()?;

        let (total_count, total_size) = self.conn.query_row(
            "SELECT COUNT(size), SUM(size) FROM Tiles",
            [],
            count_and_sum,
        )?;
        let (default_count, default_size) = self.conn.query_row(
            &format!(
                "SELECT COUNT(size), SUM(size) FROM Tiles \
                 WHERE tileID IN ({UNIQUE_TO_SET_SUBQUERY})"
            ),
            params![default_id as i64],
            count_and_sum,
        )?;

        Ok(CacheTotals {
            total_count,
            total_size,
            default_count,
            default_size,
        })
    }

    /// Attach derived statistics to a set row.
    ///
    /// The default set reports the whole cache as saved and its unique tiles
    /// as total. A named set measures its joined rows and estimates what is
    /// not downloaded yet from the provider's average tile size (or its own
    /// average once more than ten tiles are in).
    pub(crate) fn update_set_totals(&mut self, set: &mut TileSet) -> Result<(), CacheError> {
        if set.default_set {
            let totals = self.update_totals()?;
            set.saved_tile_count = totals.total_count;
            set.saved_tile_size = totals.total_size;
            set.total_tile_count = totals.default_count;
            set.total_tile_size = totals.default_size;
            return Ok(());
        }

        let (saved_count, saved_size) = self.conn.query_row(
            "SELECT COUNT(size), SUM(size) FROM Tiles A \
             INNER JOIN SetTiles B ON A.tileID = B.tileID WHERE B.setID = ?1",
            params![set.id as i64],
            count_and_sum,
        )?;
        set.saved_tile_count = saved_count;
        set.saved_tile_size = saved_size;

        let mut avg = set
            .provider
            .map(|p| p.average_tile_size())
            .unwrap_or(DEFAULT_AVERAGE_TILE_SIZE);
        if set.total_tile_count <= set.saved_tile_count {
            // Fully downloaded, the saved size is the total size.
            set.total_tile_size = set.saved_tile_size;
        } else {
            if set.saved_tile_count > 10 && set.saved_tile_size > 0 {
                avg = set.saved_tile_size / set.saved_tile_count;
            }
            set.total_tile_size = avg * set.total_tile_count;
        }

        let (unique_count, unique_size) = self.conn.query_row(
            &format!(
                "SELECT COUNT(size), SUM(size) FROM Tiles \
                 WHERE tileID IN ({UNIQUE_TO_SET_SUBQUERY})"
            ),
            params![set.id as i64],
            count_and_sum,
        )?;

        // The measured count is only accurate once everything is downloaded;
        // estimate from the plan otherwise.
        let mut expected_unique = set.total_tile_count.saturating_sub(set.saved_tile_count);
        let mut expected_size = unique_size;
        if unique_count == 0 {
            expected_size = expected_unique * avg;
        } else {
            expected_unique = unique_count;
        }
        set.unique_tile_count = expected_unique;
        set.unique_tile_size = expected_size;
        Ok(())
    }

    /// Insert a tile set row copied from another database, returning the new
    /// set id. Used by import and export, which preserve the source's
    /// `defaultSet` flag and planned count.
    pub(crate) fn insert_set_row(
        conn: &rusqlite::Connection,
        set: &SetRow,
    ) -> Result<i64, CacheError> {
        conn.execute(
            "INSERT INTO TileSets(name, typeStr, topleftLat, topleftLon, \
             bottomRightLat, bottomRightLon, minZoom, maxZoom, type, numTiles, \
             defaultSet, date) VALUES(?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            params![
                set.name,
                set.type_str,
                set.top_left_lat,
                set.top_left_lon,
                set.bottom_right_lat,
                set.bottom_right_lon,
                set.min_zoom,
                set.max_zoom,
                set.provider_id,
                set.num_tiles,
                set.default_set as i64,
                unix_time()
            ],
        )
        .map_err(|err| {
            if is_constraint_violation(&err) {
                warn!(name = %set.name, "tile set name already exists");
            }
            CacheError::SetInsertFailure
        })?;
        Ok(conn.last_insert_rowid())
    }
}

/// Raw tile set fields as copied between databases.
#[derive(Debug, Clone)]
pub(crate) struct SetRow {
    pub name: String,
    pub type_str: Option<String>,
    pub top_left_lat: f64,
    pub top_left_lon: f64,
    pub bottom_right_lat: f64,
    pub bottom_right_lon: f64,
    pub min_zoom: i64,
    pub max_zoom: i64,
    pub provider_id: i64,
    pub num_tiles: i64,
    pub default_set: bool,
}

/// Map a `COUNT(size), SUM(size)` row; the sum is NULL on empty input.
fn count_and_sum(row: &rusqlite::Row<'_>) -> rusqlite::Result<(u64, u64)> {
    let count: i64 = row.get(0)?;
    let sum: Option<i64> = row.get(1)?;
    Ok((count.max(0) as u64, sum.unwrap_or(0).max(0) as u64))
}
