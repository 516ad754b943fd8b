//! Tile value objects.
//!
//! These are plain detached values: the worker builds them from database rows
//! and hands them to foreground callers over reply channels with no further
//! tie to the worker-owned connection.

use crate::provider::TileProvider;

/// A raster tile blob with its cache metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tile {
    /// Canonical cache hash, unique across providers
    pub hash: String,
    /// Image format shorthand, e.g. "png" or "jpg"
    pub format: String,
    /// Raw image bytes
    pub data: Vec<u8>,
    /// Source provider
    pub provider: TileProvider,
}

impl Tile {
    /// Create a tile keyed by its provider address.
    pub fn new(
        provider: TileProvider,
        x: u32,
        y: u32,
        zoom: u8,
        format: impl Into<String>,
        data: Vec<u8>,
    ) -> Self {
        Self {
            hash: provider.tile_hash(x, y, zoom),
            format: format.into(),
            data,
            provider,
        }
    }

    /// Byte length of the image blob.
    pub fn size(&self) -> u64 {
        self.data.len() as u64
    }
}

/// A tile queued for download on behalf of a set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TileDownload {
    pub hash: String,
    pub provider: TileProvider,
    pub x: u32,
    pub y: u32,
    pub zoom: u8,
}

/// Download queue states persisted in `TilesDownload.state`.
///
/// `Complete` is never stored: completing a single hash deletes its row, and
/// completing a whole set clears every row of that set (see
/// [`DownloadScope`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadState {
    Pending,
    Downloading,
    Complete,
    Error,
}

impl DownloadState {
    /// Integer representation stored in the database.
    pub fn as_i64(&self) -> i64 {
        match self {
            DownloadState::Pending => 0,
            DownloadState::Downloading => 1,
            DownloadState::Complete => 2,
            DownloadState::Error => 3,
        }
    }
}

/// Which download rows an update applies to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadScope {
    /// Every download row of the set
    All,
    /// The single row with this hash
    Hash(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tile_new_derives_hash() {
        let tile = Tile::new(TileProvider::OpenStreetMap, 3, 4, 5, "png", vec![0xFF; 10]);
        assert_eq!(tile.hash, TileProvider::OpenStreetMap.tile_hash(3, 4, 5));
        assert_eq!(tile.format, "png");
        assert_eq!(tile.size(), 10);
    }

    #[test]
    fn test_download_state_values() {
        assert_eq!(DownloadState::Pending.as_i64(), 0);
        assert_eq!(DownloadState::Downloading.as_i64(), 1);
        assert_eq!(DownloadState::Complete.as_i64(), 2);
        assert_eq!(DownloadState::Error.as_i64(), 3);
    }

    #[test]
    fn test_download_scope_equality() {
        assert_eq!(DownloadScope::All, DownloadScope::All);
        assert_eq!(
            DownloadScope::Hash("a".into()),
            DownloadScope::Hash("a".into())
        );
        assert_ne!(DownloadScope::All, DownloadScope::Hash("a".into()));
    }
}
