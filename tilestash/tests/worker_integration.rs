//! Integration tests for the cache worker.
//!
//! These tests drive the complete worker pipeline through the public API:
//! - Spontaneous tile caching and duplicate handling
//! - Tile set creation with a partial download cycle
//! - Unique-versus-shared tile reclamation on set delete
//! - Export followed by replace-import round trips
//! - Pruning and reset
//!
//! Every test uses its own scratch database with a short idle timeout so
//! worker restarts stay fast.

use std::time::Duration;
use tempfile::TempDir;
use tilestash::config::CacheConfig;
use tilestash::coord::BoundingBox;
use tilestash::error::CacheError;
use tilestash::provider::TileProvider;
use tilestash::store::{ImportMode, TileSetPlan};
use tilestash::tile::{DownloadScope, DownloadState, Tile};
use tilestash::worker::CacheWorker;

// =============================================================================
// Test Helpers
// =============================================================================

const RECV_TIMEOUT: Duration = Duration::from_secs(10);

fn test_worker() -> (CacheWorker, TempDir) {
    let dir = TempDir::new().unwrap();
    let config = CacheConfig::new(dir.path().join("tiles.db"))
        .with_idle_timeout(Duration::from_millis(200));
    (CacheWorker::new(config), dir)
}

fn osm_tile(x: u32, y: u32, zoom: u8, byte: u8) -> Tile {
    Tile::new(TileProvider::OpenStreetMap, x, y, zoom, "png", vec![byte; 32])
}

/// Covers tiles (4,3) and (5,3) at zoom 3, five tiles over zooms 3..=4.
fn west_plan(name: &str, max_zoom: u8) -> TileSetPlan {
    TileSetPlan {
        name: name.to_string(),
        provider: TileProvider::OpenStreetMap,
        bbox: BoundingBox::new(20.0, 10.0, 15.0, 60.0),
        min_zoom: 3,
        max_zoom,
    }
}

/// Covers tiles (5,3) and (6,3) at zoom 3, overlapping `west_plan`.
fn east_plan(name: &str) -> TileSetPlan {
    TileSetPlan {
        name: name.to_string(),
        provider: TileProvider::OpenStreetMap,
        bbox: BoundingBox::new(20.0, 45.1, 15.0, 100.0),
        min_zoom: 3,
        max_zoom: 3,
    }
}

// =============================================================================
// Integration Tests
// =============================================================================

#[test]
fn test_spontaneous_caching() {
    let (worker, _dir) = test_worker();

    let tile = Tile::new(TileProvider::OpenStreetMap, 1, 1, 4, "png", vec![0xFF; 10]);
    let hash = tile.hash.clone();
    worker.cache_tile(tile, None);

    let fetched = worker
        .fetch_tile(hash.clone())
        .recv_timeout(RECV_TIMEOUT)
        .unwrap()
        .unwrap();
    assert_eq!(fetched.data, vec![0xFF; 10]);

    // A second save with the same hash is a no-op, not an overwrite.
    let imposter = Tile::new(TileProvider::OpenStreetMap, 1, 1, 4, "png", vec![0x00; 10]);
    worker.cache_tile(imposter, None);

    let fetched = worker
        .fetch_tile(hash)
        .recv_timeout(RECV_TIMEOUT)
        .unwrap()
        .unwrap();
    assert_eq!(fetched.data, vec![0xFF; 10]);
}

#[test]
fn test_create_set_and_partial_download_cycle() {
    let (worker, _dir) = test_worker();

    let set = worker
        .create_tile_set(west_plan("Survey", 4))
        .recv_timeout(RECV_TIMEOUT)
        .unwrap()
        .unwrap();
    assert_eq!(set.total_tile_count, 5);

    // Take a batch of two; exactly those go in flight.
    let batch = worker
        .download_list(set.id, 2)
        .recv_timeout(RECV_TIMEOUT)
        .unwrap()
        .unwrap();
    assert_eq!(batch.len(), 2);

    let rest = worker
        .download_list(set.id, 10)
        .recv_timeout(RECV_TIMEOUT)
        .unwrap()
        .unwrap();
    assert_eq!(rest.len(), 3);

    // Complete the first batch the way the downloader would: store the
    // tile, then clear its download row.
    for download in &batch {
        let tile = Tile::new(
            download.provider,
            download.x,
            download.y,
            download.zoom,
            "png",
            vec![0xAB; 64],
        );
        worker.cache_tile(tile, Some(set.id));
        worker.update_download_state(
            set.id,
            DownloadScope::Hash(download.hash.clone()),
            DownloadState::Complete,
        );
    }

    let sets = worker
        .fetch_tile_sets()
        .recv_timeout(RECV_TIMEOUT)
        .unwrap()
        .unwrap();
    let survey = sets.iter().find(|s| s.name == "Survey").unwrap();
    assert_eq!(survey.saved_tile_count, 2);
    assert_eq!(survey.total_tile_count, 5);
    assert!(survey.saved_tile_count <= survey.total_tile_count);
}

#[test]
fn test_delete_set_keeps_shared_tiles() {
    let (worker, _dir) = test_worker();

    let west = worker
        .create_tile_set(west_plan("West", 3))
        .recv_timeout(RECV_TIMEOUT)
        .unwrap()
        .unwrap();
    worker.cache_tile(osm_tile(4, 3, 3, 0x11), Some(west.id));
    worker.cache_tile(osm_tile(5, 3, 3, 0x22), Some(west.id));

    let east = worker
        .create_tile_set(east_plan("East"))
        .recv_timeout(RECV_TIMEOUT)
        .unwrap()
        .unwrap();
    worker.cache_tile(osm_tile(6, 3, 3, 0x33), Some(east.id));

    worker
        .delete_tile_set(west.id)
        .recv_timeout(RECV_TIMEOUT)
        .unwrap()
        .unwrap();

    let west_only = TileProvider::OpenStreetMap.tile_hash(4, 3, 3);
    let shared = TileProvider::OpenStreetMap.tile_hash(5, 3, 3);
    let east_only = TileProvider::OpenStreetMap.tile_hash(6, 3, 3);

    assert!(matches!(
        worker
            .fetch_tile(west_only)
            .recv_timeout(RECV_TIMEOUT)
            .unwrap(),
        Err(CacheError::TileNotFound)
    ));
    assert!(worker
        .fetch_tile(shared)
        .recv_timeout(RECV_TIMEOUT)
        .unwrap()
        .is_ok());
    assert!(worker
        .fetch_tile(east_only)
        .recv_timeout(RECV_TIMEOUT)
        .unwrap()
        .is_ok());

    let sets = worker
        .fetch_tile_sets()
        .recv_timeout(RECV_TIMEOUT)
        .unwrap()
        .unwrap();
    assert!(sets.iter().all(|s| s.name != "West"));
    assert!(sets.iter().any(|s| s.name == "East"));
}

#[test]
fn test_export_then_replace_import_round_trip() {
    let (worker, dir) = test_worker();

    let set = worker
        .create_tile_set(west_plan("Portable", 3))
        .recv_timeout(RECV_TIMEOUT)
        .unwrap()
        .unwrap();
    worker.cache_tile(osm_tile(4, 3, 3, 0x44), Some(set.id));
    worker.cache_tile(osm_tile(5, 3, 3, 0x55), Some(set.id));

    let sets = worker
        .fetch_tile_sets()
        .recv_timeout(RECV_TIMEOUT)
        .unwrap()
        .unwrap();
    let export_path = dir.path().join("portable.db");
    worker
        .export_sets(&export_path, sets, None)
        .recv_timeout(RECV_TIMEOUT)
        .unwrap()
        .unwrap();

    // A second cache picks the export up wholesale.
    let other_dir = TempDir::new().unwrap();
    let other = CacheWorker::new(
        CacheConfig::new(other_dir.path().join("tiles.db"))
            .with_idle_timeout(Duration::from_millis(200)),
    );
    other.cache_tile(osm_tile(9, 9, 4, 0x99), None);

    let (progress_tx, progress_rx) = std::sync::mpsc::channel();
    other
        .import_sets(&export_path, ImportMode::Replace, Some(progress_tx))
        .recv_timeout(RECV_TIMEOUT)
        .unwrap()
        .unwrap();

    let reports: Vec<u8> = progress_rx.try_iter().collect();
    assert_eq!(reports, vec![25, 50, 100]);

    // Imported content is byte-identical; pre-import content is gone.
    let tile = other
        .fetch_tile(TileProvider::OpenStreetMap.tile_hash(4, 3, 3))
        .recv_timeout(RECV_TIMEOUT)
        .unwrap()
        .unwrap();
    assert_eq!(tile.data, vec![0x44; 32]);
    assert!(matches!(
        other
            .fetch_tile(TileProvider::OpenStreetMap.tile_hash(9, 9, 4))
            .recv_timeout(RECV_TIMEOUT)
            .unwrap(),
        Err(CacheError::TileNotFound)
    ));

    let names: Vec<String> = other
        .fetch_tile_sets()
        .recv_timeout(RECV_TIMEOUT)
        .unwrap()
        .unwrap()
        .into_iter()
        .map(|s| s.name)
        .collect();
    assert!(names.contains(&"Portable".to_string()));
}

#[test]
fn test_merge_import_adds_only_new_tiles() {
    let (worker, dir) = test_worker();

    let set = worker
        .create_tile_set(west_plan("Shared", 3))
        .recv_timeout(RECV_TIMEOUT)
        .unwrap()
        .unwrap();
    worker.cache_tile(osm_tile(4, 3, 3, 0x66), Some(set.id));
    worker.cache_tile(osm_tile(5, 3, 3, 0x77), Some(set.id));

    let sets = worker
        .fetch_tile_sets()
        .recv_timeout(RECV_TIMEOUT)
        .unwrap()
        .unwrap();
    let export_path = dir.path().join("portable.db");
    worker
        .export_sets(&export_path, sets, None)
        .recv_timeout(RECV_TIMEOUT)
        .unwrap()
        .unwrap();

    // Merging into a cache that already has everything is an error.
    let result = worker
        .import_sets(&export_path, ImportMode::Merge, None)
        .recv_timeout(RECV_TIMEOUT)
        .unwrap();
    assert!(matches!(result, Err(CacheError::ImportNoUniqueTiles)));

    // Merging into an empty cache brings the set over.
    let other_dir = TempDir::new().unwrap();
    let other = CacheWorker::new(
        CacheConfig::new(other_dir.path().join("tiles.db"))
            .with_idle_timeout(Duration::from_millis(200)),
    );
    other
        .import_sets(&export_path, ImportMode::Merge, None)
        .recv_timeout(RECV_TIMEOUT)
        .unwrap()
        .unwrap();
    assert!(other
        .fetch_tile(TileProvider::OpenStreetMap.tile_hash(5, 3, 3))
        .recv_timeout(RECV_TIMEOUT)
        .unwrap()
        .is_ok());
}

#[test]
fn test_prune_shrinks_default_set() {
    let (worker, _dir) = test_worker();

    for x in 0..4 {
        worker.cache_tile(osm_tile(x, 0, 6, 0x10 + x as u8), None);
    }

    worker
        .prune_cache(40)
        .recv_timeout(RECV_TIMEOUT)
        .unwrap()
        .unwrap();

    let sets = worker
        .fetch_tile_sets()
        .recv_timeout(RECV_TIMEOUT)
        .unwrap()
        .unwrap();
    let default = sets.iter().find(|s| s.default_set).unwrap();
    // Four 32-byte tiles minus at least ceil(40/32) pruned.
    assert!(default.saved_tile_count <= 2);
}

#[test]
fn test_reset_clears_everything_but_the_default_set() {
    let (worker, _dir) = test_worker();

    worker.cache_tile(osm_tile(1, 1, 5, 0x01), None);
    worker
        .create_tile_set(west_plan("Doomed", 3))
        .recv_timeout(RECV_TIMEOUT)
        .unwrap()
        .unwrap();

    worker
        .reset()
        .recv_timeout(RECV_TIMEOUT)
        .unwrap()
        .unwrap();

    let sets = worker
        .fetch_tile_sets()
        .recv_timeout(RECV_TIMEOUT)
        .unwrap()
        .unwrap();
    assert_eq!(sets.len(), 1);
    assert!(sets[0].default_set);
    assert_eq!(sets[0].saved_tile_count, 0);
}

#[test]
fn test_tasks_run_in_submission_order() {
    let (worker, _dir) = test_worker();

    // Save and fetch the same hash back-to-back; FIFO order guarantees the
    // fetch sees the save.
    let tile = osm_tile(2, 2, 5, 0xEE);
    let hash = tile.hash.clone();
    worker.cache_tile(tile, None);
    let fetched = worker
        .fetch_tile(hash)
        .recv_timeout(RECV_TIMEOUT)
        .unwrap()
        .unwrap();
    assert_eq!(fetched.data, vec![0xEE; 32]);
}
