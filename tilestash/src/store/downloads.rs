//! Download queue operations.

use super::Store;
use crate::error::CacheError;
use crate::provider::TileProvider;
use crate::tile::{DownloadScope, DownloadState, TileDownload};
use rusqlite::params;
use tracing::debug;

impl Store {
    /// Fetch up to `count` pending downloads for a set and mark exactly
    /// those rows `Downloading`.
    ///
    /// Selection and marking run in one transaction, so the marked rows are
    /// always the returned rows.
    pub fn download_list(
        &mut self,
        set_id: u64,
        count: usize,
    ) -> Result<Vec<TileDownload>, CacheError> {
        let tx = self.conn.transaction()?;

        let tiles = {
            let mut stmt = tx.prepare(
                "SELECT hash, type, x, y, z FROM TilesDownload \
                 WHERE setID = ?1 AND state = ?2 LIMIT ?3",
            )?;
            let rows = stmt.query_map(
                params![
                    set_id as i64,
                    DownloadState::Pending.as_i64(),
                    count as i64
                ],
                |row| {
                    Ok(TileDownload {
                        hash: row.get(0)?,
                        provider: TileProvider::from_id(row.get::<_, i64>(1)?)
                            .unwrap_or_default(),
                        x: row.get::<_, i64>(2)? as u32,
                        y: row.get::<_, i64>(3)? as u32,
                        zoom: row.get::<_, i64>(4)? as u8,
                    })
                },
            )?;
            rows.collect::<rusqlite::Result<Vec<_>>>()?
        };

        for tile in &tiles {
            tx.execute(
                "UPDATE TilesDownload SET state = ?1 WHERE setID = ?2 AND hash = ?3",
                params![
                    DownloadState::Downloading.as_i64(),
                    set_id as i64,
                    tile.hash
                ],
            )?;
        }

        tx.commit()?;
        debug!(set_id, fetched = tiles.len(), "download list handed out");
        Ok(tiles)
    }

    /// Update the download state of one or all rows of a set.
    ///
    /// `Complete` is never stored: completing a single hash removes its row,
    /// and completing with [`DownloadScope::All`] clears the set's whole
    /// queue.
    pub fn update_download_state(
        &mut self,
        set_id: u64,
        scope: &DownloadScope,
        state: DownloadState,
    ) -> Result<(), CacheError> {
        match (state, scope) {
            (DownloadState::Complete, DownloadScope::Hash(hash)) => {
                self.conn.execute(
                    "DELETE FROM TilesDownload WHERE setID = ?1 AND hash = ?2",
                    params![set_id as i64, hash],
                )?;
            }
            (DownloadState::Complete, DownloadScope::All) => {
                self.conn.execute(
                    "DELETE FROM TilesDownload WHERE setID = ?1",
                    params![set_id as i64],
                )?;
            }
            (state, DownloadScope::All) => {
                self.conn.execute(
                    "UPDATE TilesDownload SET state = ?1 WHERE setID = ?2",
                    params![state.as_i64(), set_id as i64],
                )?;
            }
            (state, DownloadScope::Hash(hash)) => {
                self.conn.execute(
                    "UPDATE TilesDownload SET state = ?1 WHERE setID = ?2 AND hash = ?3",
                    params![state.as_i64(), set_id as i64, hash],
                )?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::open_temp_store;
    use super::super::TileSetPlan;
    use super::*;
    use crate::coord::BoundingBox;

    // Covers a 3x2 rectangle of tiles at zoom 4 (x 8..10, y 6..7).
    fn six_tile_plan() -> TileSetPlan {
        TileSetPlan {
            name: "Area".to_string(),
            provider: TileProvider::OpenStreetMap,
            bbox: BoundingBox::new(30.0, 0.1, 18.0, 55.0),
            min_zoom: 4,
            max_zoom: 4,
        }
    }

    fn pending_count(store: &mut Store, set_id: u64) -> i64 {
        store
            .conn
            .query_row(
                "SELECT COUNT(*) FROM TilesDownload WHERE setID = ?1 AND state = 0",
                params![set_id as i64],
                |row| row.get(0),
            )
            .unwrap()
    }

    fn downloading_count(store: &mut Store, set_id: u64) -> i64 {
        store
            .conn
            .query_row(
                "SELECT COUNT(*) FROM TilesDownload WHERE setID = ?1 AND state = 1",
                params![set_id as i64],
                |row| row.get(0),
            )
            .unwrap()
    }

    #[test]
    fn test_download_list_marks_exactly_the_returned_rows() {
        let (mut store, _dir) = open_temp_store();
        let set = store.create_tile_set(&six_tile_plan()).unwrap();
        assert_eq!(set.total_tile_count, 6);

        let batch = store.download_list(set.id, 2).unwrap();
        assert_eq!(batch.len(), 2);
        assert_eq!(pending_count(&mut store, set.id), 4);
        assert_eq!(downloading_count(&mut store, set.id), 2);
    }

    #[test]
    fn test_download_list_excludes_in_flight_rows() {
        let (mut store, _dir) = open_temp_store();
        let set = store.create_tile_set(&six_tile_plan()).unwrap();

        let first = store.download_list(set.id, 4).unwrap();
        let second = store.download_list(set.id, 4).unwrap();
        assert_eq!(first.len(), 4);
        assert_eq!(second.len(), 2);

        let first_hashes: Vec<_> = first.iter().map(|t| &t.hash).collect();
        for tile in &second {
            assert!(!first_hashes.contains(&&tile.hash));
        }
    }

    #[test]
    fn test_download_list_empty_set() {
        let (mut store, _dir) = open_temp_store();
        let batch = store.download_list(42, 10).unwrap();
        assert!(batch.is_empty());
    }

    #[test]
    fn test_complete_removes_row() {
        let (mut store, _dir) = open_temp_store();
        let set = store.create_tile_set(&six_tile_plan()).unwrap();

        let batch = store.download_list(set.id, 1).unwrap();
        store
            .update_download_state(
                set.id,
                &DownloadScope::Hash(batch[0].hash.clone()),
                DownloadState::Complete,
            )
            .unwrap();

        let remaining: i64 = store
            .conn
            .query_row(
                "SELECT COUNT(*) FROM TilesDownload WHERE setID = ?1",
                params![set.id as i64],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(remaining, 5);
        assert_eq!(downloading_count(&mut store, set.id), 0);
    }

    #[test]
    fn test_complete_scope_all_clears_the_set() {
        let (mut store, _dir) = open_temp_store();
        let set = store.create_tile_set(&six_tile_plan()).unwrap();
        let other = store
            .create_tile_set(&TileSetPlan {
                name: "Other".to_string(),
                provider: TileProvider::OpenStreetMap,
                bbox: BoundingBox::new(30.0, -55.0, 18.0, -0.1),
                min_zoom: 4,
                max_zoom: 4,
            })
            .unwrap();

        store.download_list(set.id, 3).unwrap();
        store
            .update_download_state(set.id, &DownloadScope::All, DownloadState::Complete)
            .unwrap();

        let remaining: i64 = store
            .conn
            .query_row(
                "SELECT COUNT(*) FROM TilesDownload WHERE setID = ?1",
                params![set.id as i64],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(remaining, 0);
        // Other sets' queues are untouched.
        assert_eq!(pending_count(&mut store, other.id), other.total_tile_count as i64);
    }

    #[test]
    fn test_scope_all_resets_every_row() {
        let (mut store, _dir) = open_temp_store();
        let set = store.create_tile_set(&six_tile_plan()).unwrap();

        store.download_list(set.id, 3).unwrap();
        assert_eq!(downloading_count(&mut store, set.id), 3);

        store
            .update_download_state(set.id, &DownloadScope::All, DownloadState::Pending)
            .unwrap();
        assert_eq!(pending_count(&mut store, set.id), 6);
    }

    #[test]
    fn test_error_state_is_persisted() {
        let (mut store, _dir) = open_temp_store();
        let set = store.create_tile_set(&six_tile_plan()).unwrap();
        let batch = store.download_list(set.id, 1).unwrap();

        store
            .update_download_state(
                set.id,
                &DownloadScope::Hash(batch[0].hash.clone()),
                DownloadState::Error,
            )
            .unwrap();

        let errored: i64 = store
            .conn
            .query_row(
                "SELECT COUNT(*) FROM TilesDownload WHERE setID = ?1 AND state = 3",
                params![set.id as i64],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(errored, 1);
    }
}
