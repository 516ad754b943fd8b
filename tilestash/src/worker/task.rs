//! Typed task descriptors for the cache worker.
//!
//! Each variant owns its inputs and, where the operation produces a payload,
//! an mpsc reply sender. Submitting a task transfers its ownership to the
//! worker; the reply channel is the only way results travel back.

use crate::error::CacheError;
use crate::store::{ImportMode, TileSet, TileSetPlan};
use crate::tile::{DownloadScope, DownloadState, Tile, TileDownload};
use std::path::PathBuf;
use std::sync::mpsc::Sender;
use tracing::warn;

/// Reply channel carried by tasks that produce a result.
pub type Reply<T> = Sender<Result<T, CacheError>>;

/// Progress channel for long-running transfers; values are integer percent.
pub type ProgressSender = Sender<u8>;

/// A unit of work for the cache worker.
pub enum Task {
    /// Warm up the worker (database open and schema check happen on the
    /// worker thread regardless; this variant exists so callers can force
    /// and await initialization)
    Init { reply: Option<Reply<()>> },
    /// Save a spontaneously downloaded tile, into `set_id` or the default set
    CacheTile { tile: Tile, set_id: Option<u64> },
    /// Fetch a tile blob by hash
    FetchTile { hash: String, reply: Reply<Tile> },
    /// Enumerate all tile sets with statistics
    FetchTileSets { reply: Reply<Vec<TileSet>> },
    /// Create a tile set and queue its missing tiles
    CreateTileSet {
        plan: TileSetPlan,
        reply: Reply<TileSet>,
    },
    /// Hand out up to `count` pending downloads, marking them in flight
    GetDownloadList {
        set_id: u64,
        count: usize,
        reply: Reply<Vec<TileDownload>>,
    },
    /// Update one or all download rows of a set
    UpdateDownloadState {
        set_id: u64,
        scope: DownloadScope,
        state: DownloadState,
    },
    /// Delete a set and the tiles unique to it
    DeleteTileSet { set_id: u64, reply: Reply<()> },
    /// Rename a set
    RenameTileSet {
        set_id: u64,
        new_name: String,
        reply: Reply<()>,
    },
    /// Reclaim roughly `amount` bytes from the default set's unique tiles
    PruneCache { amount: u64, reply: Reply<()> },
    /// Drop and recreate all data tables
    Reset { reply: Reply<()> },
    /// Export the given sets into a portable database file
    Export {
        path: PathBuf,
        sets: Vec<TileSet>,
        progress: Option<ProgressSender>,
        reply: Reply<()>,
    },
    /// Import a portable database file
    Import {
        path: PathBuf,
        mode: ImportMode,
        progress: Option<ProgressSender>,
        reply: Reply<()>,
    },
}

impl Task {
    /// Short name for logging.
    pub fn name(&self) -> &'static str {
        match self {
            Task::Init { .. } => "Init",
            Task::CacheTile { .. } => "CacheTile",
            Task::FetchTile { .. } => "FetchTile",
            Task::FetchTileSets { .. } => "FetchTileSets",
            Task::CreateTileSet { .. } => "CreateTileSet",
            Task::GetDownloadList { .. } => "GetDownloadList",
            Task::UpdateDownloadState { .. } => "UpdateDownloadState",
            Task::DeleteTileSet { .. } => "DeleteTileSet",
            Task::RenameTileSet { .. } => "RenameTileSet",
            Task::PruneCache { .. } => "PruneCache",
            Task::Reset { .. } => "Reset",
            Task::Export { .. } => "Export",
            Task::Import { .. } => "Import",
        }
    }

    /// True for the only variant a failed worker still accepts.
    pub fn is_init(&self) -> bool {
        matches!(self, Task::Init { .. })
    }

    /// Complete the task with an error without running it.
    ///
    /// Fire-and-forget variants have no reply channel; for those the error
    /// is only logged.
    pub(crate) fn fail(self, err: CacheError) {
        let name = self.name();
        match self {
            Task::Init { reply: Some(reply) } => {
                let _ = reply.send(Err(err));
            }
            Task::Init { reply: None } => {}
            Task::CacheTile { .. } | Task::UpdateDownloadState { .. } => {
                warn!(task = name, %err, "task rejected");
            }
            Task::FetchTile { reply, .. } => {
                let _ = reply.send(Err(err));
            }
            Task::FetchTileSets { reply, .. } => {
                let _ = reply.send(Err(err));
            }
            Task::CreateTileSet { reply, .. } => {
                let _ = reply.send(Err(err));
            }
            Task::GetDownloadList { reply, .. } => {
                let _ = reply.send(Err(err));
            }
            Task::DeleteTileSet { reply, .. } => {
                let _ = reply.send(Err(err));
            }
            Task::RenameTileSet { reply, .. } => {
                let _ = reply.send(Err(err));
            }
            Task::PruneCache { reply, .. } => {
                let _ = reply.send(Err(err));
            }
            Task::Reset { reply, .. } => {
                let _ = reply.send(Err(err));
            }
            Task::Export { reply, .. } => {
                let _ = reply.send(Err(err));
            }
            Task::Import { reply, .. } => {
                let _ = reply.send(Err(err));
            }
        }
    }
}
