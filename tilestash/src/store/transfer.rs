//! Import and export of portable cache databases.
//!
//! Both directions stream tiles between the main connection and a transient
//! secondary connection on the other file, reporting integer-percent
//! progress as they go.

use super::sets::{SetRow, TileSet, UNIQUE_TO_SET_SUBQUERY};
use super::tiles::is_constraint_violation;
use super::{unix_time, Store};
use crate::error::CacheError;
use rusqlite::params;
use std::fs;
use std::path::Path;
use tracing::{debug, info, warn};

/// How an imported database is applied to the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportMode {
    /// Fold the imported sets and tiles into the existing cache
    Merge,
    /// Replace the cache database file wholesale
    Replace,
}

impl Store {
    /// Export the given sets into a fresh database at `target`.
    ///
    /// The target schema is created without a default-set seed so the
    /// exported sets keep their own `defaultSet` markers. Each set's tiles
    /// are copied inside one transaction.
    pub fn export_sets(
        &mut self,
        target: &Path,
        sets: &[TileSet],
        mut progress: impl FnMut(u8),
    ) -> Result<(), CacheError> {
        if target.exists() {
            fs::remove_file(target)?;
        }
        let mut export_conn = Self::connect(target).map_err(|err| {
            warn!(target = %target.display(), %err, "failed to open export database");
            CacheError::ExportOpenFailure
        })?;
        Self::create_schema(&export_conn, false).map_err(|err| {
            warn!(%err, "failed to create export schema");
            CacheError::ExportCreateFailure
        })?;

        // The default set exports everything it can see, named sets only
        // their unique tiles; that sum is the progress denominator.
        let total: u64 = sets
            .iter()
            .map(|set| {
                if set.default_set {
                    set.total_tile_count
                } else {
                    set.unique_tile_count
                }
            })
            .sum();
        let total = total.max(1);

        let mut current: u64 = 0;
        for set in sets {
            let export_set_id = Self::insert_set_row(
                &export_conn,
                &SetRow {
                    name: set.name.clone(),
                    type_str: if set.type_str.is_empty() {
                        None
                    } else {
                        Some(set.type_str.clone())
                    },
                    top_left_lat: set.bbox.top_left_lat,
                    top_left_lon: set.bbox.top_left_lon,
                    bottom_right_lat: set.bbox.bottom_right_lat,
                    bottom_right_lon: set.bbox.bottom_right_lon,
                    min_zoom: i64::from(set.min_zoom),
                    max_zoom: i64::from(set.max_zoom),
                    provider_id: set.provider.map(|p| p.id()).unwrap_or(-1),
                    num_tiles: set.total_tile_count as i64,
                    default_set: set.default_set,
                },
            )
            .map_err(|_| CacheError::ExportCreateFailure)?;

            let tile_ids: Vec<i64> = {
                let mut stmt = self
                    .conn
                    .prepare("SELECT tileID FROM SetTiles WHERE setID = ?1")?;
                let rows = stmt.query_map(params![set.id as i64], |row| row.get(0))?;
                rows.collect::<rusqlite::Result<Vec<_>>>()?
            };

            let tx = export_conn.transaction()?;
            for tile_id in tile_ids {
                let row: Option<(String, String, Vec<u8>, i64)> = {
                    use rusqlite::OptionalExtension;
                    self.conn
                        .query_row(
                            "SELECT hash, format, tile, type FROM Tiles WHERE tileID = ?1",
                            params![tile_id],
                            |row| {
                                Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
                            },
                        )
                        .optional()?
                };
                let Some((hash, format, data, provider_id)) = row else {
                    continue;
                };

                if tx
                    .execute(
                        "INSERT INTO Tiles(hash, format, tile, size, type, date) \
                         VALUES(?1, ?2, ?3, ?4, ?5, ?6)",
                        params![hash, format, data, data.len() as i64, provider_id, unix_time()],
                    )
                    .is_err()
                {
                    // Shared tile copied for an earlier set already.
                    continue;
                }
                let export_tile_id = tx.last_insert_rowid();
                tx.execute(
                    "INSERT INTO SetTiles(tileID, setID) VALUES(?1, ?2)",
                    params![export_tile_id, export_set_id],
                )?;

                current += 1;
                let percent = ((current as f64 / total as f64) * 100.0).min(100.0) as u8;
                progress(percent);
            }
            tx.commit()?;
        }

        info!(target = %target.display(), sets = sets.len(), tiles = current, "export finished");
        Ok(())
    }

    /// Replace the cache database file with an imported one.
    ///
    /// The caller must have dropped the old `Store` first; a new one is
    /// returned once the copied file passes schema initialization.
    pub fn import_replace(
        database_path: &Path,
        import_path: &Path,
        mut progress: impl FnMut(u8),
    ) -> Result<Store, CacheError> {
        if !import_path.exists() {
            return Err(CacheError::ImportOpenFailure);
        }

        let _ = fs::remove_file(database_path);
        // Stale WAL sidecars must not outlive the file they belong to.
        for suffix in ["-wal", "-shm"] {
            let mut sidecar = database_path.as_os_str().to_os_string();
            sidecar.push(suffix);
            let _ = fs::remove_file(Path::new(&sidecar));
        }

        fs::copy(import_path, database_path)?;
        progress(25);

        let store = Store::open(database_path)?;
        progress(50);
        progress(100);

        info!(path = %database_path.display(), "cache database replaced from import");
        Ok(store)
    }

    /// Merge another cache database into this one.
    ///
    /// Source sets map onto the default set (when they are the source's
    /// default) or onto a newly created set with a collision-free name.
    /// Only tiles unique to each source set are copied, so a tile shared
    /// between two source sets is not imported; this matches the behavior
    /// of the databases these files are exported from.
    pub fn import_merge(
        &mut self,
        import_path: &Path,
        mut progress: impl FnMut(u8),
    ) -> Result<(), CacheError> {
        if !import_path.exists() {
            return Err(CacheError::ImportOpenFailure);
        }
        let src = Self::connect(import_path).map_err(|err| {
            warn!(path = %import_path.display(), %err, "failed to open import database");
            CacheError::ImportOpenFailure
        })?;

        // Total source tiles is the progress denominator; tiles we turn out
        // to already have are subtracted as we discover them.
        let mut tile_count: i64 = src
            .query_row("SELECT COUNT(tileID) FROM Tiles", [], |row| row.get(0))
            .map_err(|err| {
                warn!(%err, "import source has no tile table");
                CacheError::ImportOpenFailure
            })?;

        if tile_count > 0 {
            let source_sets: Vec<(i64, SetRow)> = {
                let mut stmt = src
                    .prepare(
                        "SELECT setID, name, typeStr, topleftLat, topleftLon, \
                         bottomRightLat, bottomRightLon, minZoom, maxZoom, type, \
                         numTiles, defaultSet \
                         FROM TileSets ORDER BY defaultSet DESC, name ASC",
                    )
                    .map_err(|_| CacheError::NoTileSetsFound)?;
                let rows = stmt
                    .query_map([], |row| {
                        Ok((
                            row.get::<_, i64>(0)?,
                            SetRow {
                                name: row.get(1)?,
                                type_str: row.get(2)?,
                                top_left_lat: row.get(3)?,
                                top_left_lon: row.get(4)?,
                                bottom_right_lat: row.get(5)?,
                                bottom_right_lon: row.get(6)?,
                                min_zoom: row.get(7)?,
                                max_zoom: row.get(8)?,
                                provider_id: row.get(9)?,
                                num_tiles: row.get(10)?,
                                default_set: row.get::<_, i64>(11)? != 0,
                            },
                        ))
                    })
                    .map_err(|_| CacheError::NoTileSetsFound)?;
                rows.collect::<rusqlite::Result<Vec<_>>>()
                    .map_err(|_| CacheError::NoTileSetsFound)?
            };

            let mut last_progress: i64 = -1;
            let mut current_count: i64 = 0;
            for (src_set_id, mut row) in source_sets {
                let source_is_default = row.default_set;
                let target_set_id = if source_is_default {
                    self.default_set_id()? as i64
                } else {
                    if self.find_set_id(&row.name)?.is_some() {
                        // A set with this name exists; suffix until unique.
                        let base = row.name.clone();
                        let mut attempt = 0;
                        loop {
                            attempt += 1;
                            let candidate = format!("{} {:02}", base, attempt);
                            if self.find_set_id(&candidate)?.is_none() || attempt > 99 {
                                row.name = candidate;
                                break;
                            }
                        }
                    }
                    row.default_set = false;
                    Self::insert_set_row(&self.conn, &row)?
                };

                let source_tiles: Vec<(String, String, Vec<u8>, i64)> = {
                    let mut stmt = src.prepare(&format!(
                        "SELECT hash, format, tile, type FROM Tiles \
                         WHERE tileID IN ({UNIQUE_TO_SET_SUBQUERY})"
                    ))?;
                    let rows = stmt.query_map(params![src_set_id], |row| {
                        Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
                    })?;
                    rows.collect::<rusqlite::Result<Vec<_>>>()?
                };

                let mut tiles_found: i64 = 0;
                let mut tiles_saved: i64 = 0;
                let tx = self.conn.transaction()?;
                for (hash, format, data, provider_id) in source_tiles {
                    tiles_found += 1;
                    match tx.execute(
                        "INSERT INTO Tiles(hash, format, tile, size, type, date) \
                         VALUES(?1, ?2, ?3, ?4, ?5, ?6)",
                        params![hash, format, data, data.len() as i64, provider_id, unix_time()],
                    ) {
                        Ok(_) => {
                            tiles_saved += 1;
                            let new_tile_id = tx.last_insert_rowid();
                            tx.execute(
                                "INSERT INTO SetTiles(tileID, setID) VALUES(?1, ?2)",
                                params![new_tile_id, target_set_id],
                            )?;
                            current_count += 1;
                            let percent = ((current_count as f64 / tile_count as f64)
                                * 100.0) as i64;
                            if percent != last_progress {
                                last_progress = percent;
                                progress(percent.clamp(0, 100) as u8);
                            }
                        }
                        Err(err) if is_constraint_violation(&err) => {
                            // Already cached.
                        }
                        Err(err) => return Err(err.into()),
                    }
                }
                tx.commit()?;

                if tiles_saved > 0 {
                    // numTiles reflects what actually landed, not the
                    // source's plan.
                    let member_count: i64 = self.conn.query_row(
                        "SELECT COUNT(size) FROM Tiles A \
                         INNER JOIN SetTiles B ON A.tileID = B.tileID WHERE B.setID = ?1",
                        params![target_set_id],
                        |row| row.get(0),
                    )?;
                    self.conn.execute(
                        "UPDATE TileSets SET numTiles = ?1 WHERE setID = ?2",
                        params![member_count, target_set_id],
                    )?;
                }

                let already_cached = tiles_found - tiles_saved;
                tile_count = (tile_count - already_cached).max(0);

                if tiles_saved == 0 && !source_is_default {
                    debug!(name = %row.name, "no unique tiles in imported set, removing it");
                    self.delete_tile_set(target_set_id as u64)?;
                }
            }
        }

        drop(src);
        if tile_count == 0 {
            return Err(CacheError::ImportNoUniqueTiles);
        }
        info!(path = %import_path.display(), "import merge finished");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::open_temp_store;
    use super::super::TileSetPlan;
    use super::*;
    use crate::coord::BoundingBox;
    use crate::provider::TileProvider;
    use crate::tile::Tile;
    use tempfile::TempDir;

    fn osm_tile(x: u32, y: u32, byte: u8) -> Tile {
        Tile::new(TileProvider::OpenStreetMap, x, y, 3, "png", vec![byte; 64])
    }

    // Covers tiles (4,3) and (5,3) at zoom 3.
    fn plan(name: &str) -> TileSetPlan {
        TileSetPlan {
            name: name.to_string(),
            provider: TileProvider::OpenStreetMap,
            bbox: BoundingBox::new(20.0, 10.0, 15.0, 60.0),
            min_zoom: 3,
            max_zoom: 3,
        }
    }

    /// A store whose named set "Alpha" holds two tiles of its own.
    fn source_store() -> (Store, TempDir) {
        let (mut store, dir) = open_temp_store();
        let set = store.create_tile_set(&plan("Alpha")).unwrap();
        store.save_tile(&osm_tile(4, 3, 0x11), Some(set.id)).unwrap();
        store.save_tile(&osm_tile(5, 3, 0x22), Some(set.id)).unwrap();
        (store, dir)
    }

    #[test]
    fn test_export_copies_sets_and_tiles() {
        let (mut store, dir) = source_store();
        store.save_tile(&osm_tile(0, 0, 0x33), None).unwrap();

        let sets = store.list_tile_sets().unwrap();
        let target = dir.path().join("export.db");
        let mut reports = Vec::new();
        store
            .export_sets(&target, &sets, |p| reports.push(p))
            .unwrap();

        let mut exported = Store::open(&target).unwrap();
        let names: Vec<String> = exported
            .list_tile_sets()
            .unwrap()
            .into_iter()
            .map(|s| s.name)
            .collect();
        assert!(names.contains(&"Alpha".to_string()));
        assert!(names.contains(&super::super::DEFAULT_SET_NAME.to_string()));

        let tile = exported
            .fetch_tile(&TileProvider::OpenStreetMap.tile_hash(4, 3, 3))
            .unwrap();
        assert_eq!(tile.data, vec![0x11; 64]);
        assert!(!reports.is_empty());
        assert_eq!(*reports.last().unwrap(), 100);
    }

    #[test]
    fn test_export_overwrites_existing_target() {
        let (mut store, dir) = source_store();
        let target = dir.path().join("export.db");
        std::fs::write(&target, b"not a database").unwrap();

        let sets = store.list_tile_sets().unwrap();
        store.export_sets(&target, &sets, |_| {}).unwrap();
        assert!(Store::open(&target).is_ok());
    }

    #[test]
    fn test_import_replace_round_trip() {
        let (mut source, source_dir) = source_store();
        let sets = source.list_tile_sets().unwrap();
        let export_path = source_dir.path().join("portable.db");
        source.export_sets(&export_path, &sets, |_| {}).unwrap();

        let dest_dir = TempDir::new().unwrap();
        let dest_path = dest_dir.path().join("tiles.db");
        {
            let mut dest = Store::open(&dest_path).unwrap();
            dest.save_tile(&osm_tile(9, 9, 0x99), None).unwrap();
            drop(dest);
        }

        let mut reports = Vec::new();
        let replaced =
            Store::import_replace(&dest_path, &export_path, |p| reports.push(p)).unwrap();

        // The old spontaneous tile is gone, the imported tiles are there.
        assert!(replaced
            .fetch_tile(&TileProvider::OpenStreetMap.tile_hash(9, 9, 3))
            .is_err());
        let tile = replaced
            .fetch_tile(&TileProvider::OpenStreetMap.tile_hash(5, 3, 3))
            .unwrap();
        assert_eq!(tile.data, vec![0x22; 64]);
        assert_eq!(reports, vec![25, 50, 100]);
    }

    #[test]
    fn test_import_merge_creates_missing_set() {
        let (mut source, source_dir) = source_store();
        let sets = source.list_tile_sets().unwrap();
        let export_path = source_dir.path().join("portable.db");
        source.export_sets(&export_path, &sets, |_| {}).unwrap();

        let (mut dest, _dir) = open_temp_store();
        dest.import_merge(&export_path, |_| {}).unwrap();

        assert!(dest.find_set_id("Alpha").unwrap().is_some());
        assert!(dest
            .fetch_tile(&TileProvider::OpenStreetMap.tile_hash(4, 3, 3))
            .is_ok());
    }

    #[test]
    fn test_import_merge_name_collision_appends_suffix() {
        let (mut source, source_dir) = source_store();
        let sets = source.list_tile_sets().unwrap();
        let export_path = source_dir.path().join("portable.db");
        source.export_sets(&export_path, &sets, |_| {}).unwrap();

        let (mut dest, _dir) = open_temp_store();
        // An unrelated set already owns the name.
        dest.create_tile_set(&plan("Alpha")).unwrap();

        dest.import_merge(&export_path, |_| {}).unwrap();

        let alpha_01 = dest.find_set_id("Alpha 01").unwrap();
        assert!(alpha_01.is_some());
        // The pre-existing set is untouched.
        let original = dest.find_set_id("Alpha").unwrap().unwrap();
        assert_ne!(Some(original), alpha_01);
    }

    #[test]
    fn test_import_merge_suffix_skips_taken_names() {
        let (mut source, source_dir) = source_store();
        let sets = source.list_tile_sets().unwrap();
        let export_path = source_dir.path().join("portable.db");
        source.export_sets(&export_path, &sets, |_| {}).unwrap();

        let (mut dest, _dir) = open_temp_store();
        dest.create_tile_set(&plan("Alpha")).unwrap();
        let placeholder_id = dest
            .create_tile_set(&TileSetPlan {
                name: "placeholder".into(),
                ..plan("x")
            })
            .unwrap()
            .id;
        dest.rename_tile_set(placeholder_id, "Alpha 01").unwrap();

        dest.import_merge(&export_path, |_| {}).unwrap();
        assert!(dest.find_set_id("Alpha 02").unwrap().is_some());
    }

    #[test]
    fn test_import_merge_all_duplicates_is_an_error() {
        let (mut source, source_dir) = source_store();
        let sets = source.list_tile_sets().unwrap();
        let export_path = source_dir.path().join("portable.db");
        source.export_sets(&export_path, &sets, |_| {}).unwrap();

        let (mut dest, _dir) = open_temp_store();
        dest.import_merge(&export_path, |_| {}).unwrap();

        // Importing the same file again finds nothing new.
        let err = dest.import_merge(&export_path, |_| {}).unwrap_err();
        assert!(matches!(err, CacheError::ImportNoUniqueTiles));
        // The redundant suffixed set was dropped again.
        assert!(dest.find_set_id("Alpha 01").unwrap().is_none());
    }

    #[test]
    fn test_import_missing_file_is_an_error() {
        let (mut dest, dir) = open_temp_store();
        let missing = dir.path().join("nope.db");
        assert!(matches!(
            dest.import_merge(&missing, |_| {}),
            Err(CacheError::ImportOpenFailure)
        ));
        assert!(matches!(
            Store::import_replace(dest.path(), &missing, |_| {}),
            Err(CacheError::ImportOpenFailure)
        ));
    }

    #[test]
    fn test_import_merge_progress_reaches_100() {
        let (mut source, source_dir) = source_store();
        let sets = source.list_tile_sets().unwrap();
        let export_path = source_dir.path().join("portable.db");
        source.export_sets(&export_path, &sets, |_| {}).unwrap();

        let (mut dest, _dir) = open_temp_store();
        let mut reports = Vec::new();
        dest.import_merge(&export_path, |p| reports.push(p)).unwrap();
        assert_eq!(*reports.last().unwrap(), 100);
    }
}
