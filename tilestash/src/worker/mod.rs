//! The cache worker: a single background thread draining a FIFO of typed
//! tasks against the store.
//!
//! The worker spawns lazily on the first enqueue, initializes the database
//! before touching any data task, recomputes aggregate totals on an adaptive
//! deadline, and shuts itself down after idling on an empty queue. A later
//! enqueue restarts it; the schema is already in place, so restarts are
//! cheap.

mod task;

pub use task::{ProgressSender, Reply, Task};

use crate::config::CacheConfig;
use crate::error::CacheError;
use crate::store::{CacheTotals, ImportMode, Store, TileSet, TileSetPlan};
use crate::tile::{DownloadScope, DownloadState, Tile, TileDownload};
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Condvar, Mutex};
use std::thread;
use std::time::Instant;
use tracing::{debug, warn};

/// Queue depth above which totals refreshes slow to the long interval.
const DEEP_QUEUE: usize = 100;

/// Queue depth below which totals refreshes return to the short interval.
const SHALLOW_QUEUE: usize = 25;

struct Shared {
    queue: VecDeque<Task>,
    /// Worker thread is alive
    running: bool,
    /// `stop()` was called; exit at the next wake
    stopping: bool,
    /// Database initialization failed; only `Init` is accepted
    failed: bool,
}

struct WorkerInner {
    config: CacheConfig,
    totals_tx: Option<Sender<CacheTotals>>,
    shared: Mutex<Shared>,
    work_available: Condvar,
}

/// Shared handle to the cache worker.
///
/// Cloning is cheap; all clones feed the same queue and worker thread.
#[derive(Clone)]
pub struct CacheWorker {
    inner: Arc<WorkerInner>,
}

impl CacheWorker {
    /// Create a worker handle. The worker thread starts on the first
    /// enqueue.
    pub fn new(config: CacheConfig) -> Self {
        Self::build(config, None)
    }

    /// Create a worker handle that reports aggregate totals on `totals_tx`
    /// after every recomputation.
    pub fn with_totals_channel(config: CacheConfig, totals_tx: Sender<CacheTotals>) -> Self {
        Self::build(config, Some(totals_tx))
    }

    fn build(config: CacheConfig, totals_tx: Option<Sender<CacheTotals>>) -> Self {
        Self {
            inner: Arc::new(WorkerInner {
                config,
                totals_tx,
                shared: Mutex::new(Shared {
                    queue: VecDeque::new(),
                    running: false,
                    stopping: false,
                    failed: false,
                }),
                work_available: Condvar::new(),
            }),
        }
    }

    /// Submit a task, starting or waking the worker thread.
    ///
    /// Returns false when the worker is in the failed state and the task is
    /// not `Init`; the task is then completed with
    /// [`CacheError::DatabaseNotInitialized`].
    pub fn enqueue(&self, task: Task) -> bool {
        let mut shared = self.inner.shared.lock().unwrap();
        if shared.failed && !task.is_init() {
            drop(shared);
            task.fail(CacheError::DatabaseNotInitialized);
            return false;
        }

        shared.queue.push_back(task);
        if shared.running {
            drop(shared);
            self.inner.work_available.notify_one();
        } else {
            shared.running = true;
            shared.stopping = false;
            let inner = Arc::clone(&self.inner);
            thread::Builder::new()
                .name("tile-cache-worker".to_string())
                .spawn(move || run_loop(inner))
                .expect("Failed to spawn tile cache worker thread");
        }
        true
    }

    /// Discard all queued, unstarted tasks and signal the worker to exit.
    ///
    /// The in-flight task, if any, runs to completion. Discarded tasks are
    /// dropped without completion, closing their reply channels.
    pub fn stop(&self) {
        let mut shared = self.inner.shared.lock().unwrap();
        shared.queue.clear();
        shared.stopping = true;
        drop(shared);
        self.inner.work_available.notify_all();
    }

    /// True while the worker thread is alive.
    pub fn is_running(&self) -> bool {
        self.inner.shared.lock().unwrap().running
    }

    /// Save a tile into `set_id`, or the default set when `None`.
    pub fn cache_tile(&self, tile: Tile, set_id: Option<u64>) -> bool {
        self.enqueue(Task::CacheTile { tile, set_id })
    }

    /// Fetch a tile by hash.
    pub fn fetch_tile(&self, hash: impl Into<String>) -> Receiver<Result<Tile, CacheError>> {
        let (reply, rx) = mpsc::channel();
        self.enqueue(Task::FetchTile {
            hash: hash.into(),
            reply,
        });
        rx
    }

    /// Enumerate all tile sets with their statistics.
    pub fn fetch_tile_sets(&self) -> Receiver<Result<Vec<TileSet>, CacheError>> {
        let (reply, rx) = mpsc::channel();
        self.enqueue(Task::FetchTileSets { reply });
        rx
    }

    /// Create a tile set from a plan.
    pub fn create_tile_set(&self, plan: TileSetPlan) -> Receiver<Result<TileSet, CacheError>> {
        let (reply, rx) = mpsc::channel();
        self.enqueue(Task::CreateTileSet { plan, reply });
        rx
    }

    /// Fetch up to `count` pending downloads for a set.
    pub fn download_list(
        &self,
        set_id: u64,
        count: usize,
    ) -> Receiver<Result<Vec<TileDownload>, CacheError>> {
        let (reply, rx) = mpsc::channel();
        self.enqueue(Task::GetDownloadList {
            set_id,
            count,
            reply,
        });
        rx
    }

    /// Update the download state of one or all rows of a set.
    pub fn update_download_state(
        &self,
        set_id: u64,
        scope: DownloadScope,
        state: DownloadState,
    ) -> bool {
        self.enqueue(Task::UpdateDownloadState {
            set_id,
            scope,
            state,
        })
    }

    /// Delete a tile set and the tiles unique to it.
    pub fn delete_tile_set(&self, set_id: u64) -> Receiver<Result<(), CacheError>> {
        let (reply, rx) = mpsc::channel();
        self.enqueue(Task::DeleteTileSet { set_id, reply });
        rx
    }

    /// Rename a tile set.
    pub fn rename_tile_set(
        &self,
        set_id: u64,
        new_name: impl Into<String>,
    ) -> Receiver<Result<(), CacheError>> {
        let (reply, rx) = mpsc::channel();
        self.enqueue(Task::RenameTileSet {
            set_id,
            new_name: new_name.into(),
            reply,
        });
        rx
    }

    /// Reclaim roughly `amount` bytes of default-set tiles.
    pub fn prune_cache(&self, amount: u64) -> Receiver<Result<(), CacheError>> {
        let (reply, rx) = mpsc::channel();
        self.enqueue(Task::PruneCache { amount, reply });
        rx
    }

    /// Drop and recreate all data tables.
    pub fn reset(&self) -> Receiver<Result<(), CacheError>> {
        let (reply, rx) = mpsc::channel();
        self.enqueue(Task::Reset { reply });
        rx
    }

    /// Export the given sets into a portable database at `path`.
    pub fn export_sets(
        &self,
        path: impl Into<PathBuf>,
        sets: Vec<TileSet>,
        progress: Option<ProgressSender>,
    ) -> Receiver<Result<(), CacheError>> {
        let (reply, rx) = mpsc::channel();
        self.enqueue(Task::Export {
            path: path.into(),
            sets,
            progress,
            reply,
        });
        rx
    }

    /// Import a portable database at `path`.
    pub fn import_sets(
        &self,
        path: impl Into<PathBuf>,
        mode: ImportMode,
        progress: Option<ProgressSender>,
    ) -> Receiver<Result<(), CacheError>> {
        let (reply, rx) = mpsc::channel();
        self.enqueue(Task::Import {
            path: path.into(),
            mode,
            progress,
            reply,
        });
        rx
    }
}

fn run_loop(inner: Arc<WorkerInner>) {
    debug!("cache worker starting");

    let mut slot: Option<Store> = match Store::open(&inner.config.database_path) {
        Ok(mut store) => {
            if let Some(pattern) = &inner.config.no_tile_bytes {
                if let Err(err) = store.cleanup_bogus_tiles(pattern) {
                    warn!(%err, "bogus tile cleanup failed");
                }
            }
            inner.shared.lock().unwrap().failed = false;
            Some(store)
        }
        Err(err) => {
            warn!(%err, "failed to initialize cache database");
            let mut shared = inner.shared.lock().unwrap();
            shared.failed = true;
            shared.running = false;
            let queued: Vec<Task> = shared.queue.drain(..).collect();
            drop(shared);
            for task in queued {
                task.fail(CacheError::DatabaseNotInitialized);
            }
            return;
        }
    };

    let mut last_totals = Instant::now();
    let mut totals_deadline = inner.config.short_totals_interval;

    let mut shared = inner.shared.lock().unwrap();
    loop {
        if shared.stopping {
            break;
        }
        if let Some(task) = shared.queue.pop_front() {
            drop(shared);
            dispatch(&mut slot, &inner.config, task);

            shared = inner.shared.lock().unwrap();
            let depth = shared.queue.len();
            if depth > DEEP_QUEUE {
                totals_deadline = inner.config.long_totals_interval;
            } else if depth < SHALLOW_QUEUE {
                totals_deadline = inner.config.short_totals_interval;
            }

            if depth == 0 || last_totals.elapsed() >= totals_deadline {
                drop(shared);
                emit_totals(&mut slot, &inner);
                last_totals = Instant::now();
                shared = inner.shared.lock().unwrap();
            }
        } else {
            let (guard, _timed_out) = inner
                .work_available
                .wait_timeout(shared, inner.config.idle_timeout)
                .unwrap();
            shared = guard;
            if shared.queue.is_empty() {
                break;
            }
        }
    }
    shared.running = false;
    shared.stopping = false;
    drop(shared);

    // Dropping the store closes the database.
    drop(slot);
    debug!("cache worker stopped");
}

fn dispatch(slot: &mut Option<Store>, config: &CacheConfig, task: Task) {
    let task_name = task.name();
    debug!(task = task_name, "running task");

    match task {
        Task::Init { reply } => {
            let result = if slot.is_some() {
                Ok(())
            } else {
                Err(CacheError::DatabaseNotInitialized)
            };
            if let Some(reply) = reply {
                let _ = reply.send(result);
            }
        }
        Task::Import {
            path,
            mode: ImportMode::Replace,
            progress,
            reply,
        } => {
            let _ = reply.send(replace_store(slot, config, &path, progress.as_ref()));
        }
        data_task => {
            let Some(store) = slot.as_mut() else {
                data_task.fail(CacheError::DatabaseNotInitialized);
                return;
            };
            match data_task {
                Task::CacheTile { tile, set_id } => {
                    if let Err(err) = store.save_tile(&tile, set_id) {
                        warn!(task = task_name, %err, "task failed");
                    }
                }
                Task::FetchTile { hash, reply } => {
                    let _ = reply.send(store.fetch_tile(&hash));
                }
                Task::FetchTileSets { reply } => {
                    let _ = reply.send(store.list_tile_sets());
                }
                Task::CreateTileSet { plan, reply } => {
                    let _ = reply.send(store.create_tile_set(&plan));
                }
                Task::GetDownloadList {
                    set_id,
                    count,
                    reply,
                } => {
                    let _ = reply.send(store.download_list(set_id, count));
                }
                Task::UpdateDownloadState {
                    set_id,
                    scope,
                    state,
                } => {
                    if let Err(err) = store.update_download_state(set_id, &scope, state) {
                        warn!(task = task_name, %err, "task failed");
                    }
                }
                Task::DeleteTileSet { set_id, reply } => {
                    let _ = reply.send(store.delete_tile_set(set_id));
                }
                Task::RenameTileSet {
                    set_id,
                    new_name,
                    reply,
                } => {
                    let _ = reply.send(store.rename_tile_set(set_id, &new_name));
                }
                Task::PruneCache { amount, reply } => {
                    let _ = reply.send(store.prune(amount, config.prune_batch));
                }
                Task::Reset { reply } => {
                    let _ = reply.send(store.reset());
                }
                Task::Export {
                    path,
                    sets,
                    progress,
                    reply,
                } => {
                    let result = store.export_sets(&path, &sets, |percent| {
                        if let Some(tx) = &progress {
                            let _ = tx.send(percent);
                        }
                    });
                    let _ = reply.send(result);
                }
                Task::Import {
                    path,
                    mode: ImportMode::Merge,
                    progress,
                    reply,
                } => {
                    let result = store.import_merge(&path, |percent| {
                        if let Some(tx) = &progress {
                            let _ = tx.send(percent);
                        }
                    });
                    let _ = reply.send(result);
                }
                // Handled in the outer match.
                Task::Init { .. }
                | Task::Import {
                    mode: ImportMode::Replace,
                    ..
                } => {}
            }
        }
    }
}

/// Swap the database file for an imported one and reopen the store.
fn replace_store(
    slot: &mut Option<Store>,
    config: &CacheConfig,
    import_path: &Path,
    progress: Option<&ProgressSender>,
) -> Result<(), CacheError> {
    // Close the current database before touching its file.
    *slot = None;

    let report = |percent: u8| {
        if let Some(tx) = progress {
            let _ = tx.send(percent);
        }
    };
    let store = Store::import_replace(&config.database_path, import_path, report)?;
    *slot = Some(store);
    Ok(())
}

fn emit_totals(slot: &mut Option<Store>, inner: &WorkerInner) {
    let Some(store) = slot.as_mut() else {
        return;
    };
    match store.update_totals() {
        Ok(totals) => {
            debug!(
                total_count = totals.total_count,
                total_size = totals.total_size,
                default_count = totals.default_count,
                default_size = totals.default_size,
                "totals updated"
            );
            if let Some(tx) = &inner.totals_tx {
                let _ = tx.send(totals);
            }
        }
        Err(err) => warn!(%err, "failed to update totals"),
    }
}
