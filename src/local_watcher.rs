//! `LocalWatcher` (§4.3): turns raw `notify` filesystem events into the
//! semantic operations `Prep` understands, inferring moves from a delete
//! followed by a content-matching add and sequencing folder deletions so
//! children are always dispatched before their parent.
//!
//! Grounded on the `notify` -> async-channel bridge and `tokio::select!`
//! debounce-loop shape of a desktop vault watcher in the broader corpus;
//! generalized here from a single debounce deadline into the two
//! independent pending-deletion timers §4.3 specifies.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

use crate::checksum_queue::ChecksumQueue;
use crate::document::{DocId, DocType, Document, Side};
use crate::error::WatcherError;
use crate::filters::SyncFilters;
use crate::metadata_store::MetadataStore;
use crate::prep::{Op, PrepHandle};

const UNLINK_FILE_INITIAL_DELAY: Duration = Duration::from_millis(1250);
const UNLINK_FILE_RETRY_DELAY: Duration = Duration::from_millis(100);
const UNLINK_FOLDER_POLL: Duration = Duration::from_millis(350);
const STOP_GRACE_PERIOD: Duration = Duration::from_secs(3);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PendingKind {
    File,
    Folder,
}

struct PendingRecord {
    kind: PendingKind,
    /// Bumped every time a path re-enters `pending`; a timer captures the
    /// generation it was armed with and no-ops if it no longer matches,
    /// which is how "the pending record is consumed by that handler
    /// instead" (§4.3) is implemented without cancelling the sleeping task.
    generation: u64,
}

#[derive(Default)]
struct WatcherState {
    paths: Option<HashSet<String>>,
    known_dirs: HashSet<String>,
    pending: HashMap<String, PendingRecord>,
    next_generation: u64,
}

impl WatcherState {
    fn arm(&mut self, path: String, kind: PendingKind) -> u64 {
        self.next_generation += 1;
        let generation = self.next_generation;
        self.pending.insert(path, PendingRecord { kind, generation });
        generation
    }

    fn consume(&mut self, path: &str) -> bool {
        self.pending.remove(path).is_some()
    }

    fn still_armed(&self, path: &str, generation: u64) -> bool {
        matches!(self.pending.get(path), Some(r) if r.generation == generation)
    }
}

/// Size/executable-bit facts the watcher reads off `std::fs::Metadata` at
/// event time. Kept separate from `FileAttrs` so the watcher doesn't need
/// to know about checksums until the queue has one.
pub struct FileStats {
    pub size: i64,
    pub executable: bool,
}

impl FileStats {
    pub fn from_metadata(meta: &std::fs::Metadata) -> Self {
        let executable = is_executable(meta);
        FileStats {
            size: meta.len() as i64,
            executable,
        }
    }
}

#[cfg(unix)]
fn is_executable(meta: &std::fs::Metadata) -> bool {
    use std::os::unix::fs::PermissionsExt;
    meta.permissions().mode() & 0o111 != 0
}

#[cfg(not(unix))]
fn is_executable(_meta: &std::fs::Metadata) -> bool {
    false
}

pub struct LocalWatcher {
    root: PathBuf,
    store: Arc<Mutex<MetadataStore>>,
    checksums: ChecksumQueue,
    prep: PrepHandle,
    filters: SyncFilters,
    state: Mutex<WatcherState>,
}

impl LocalWatcher {
    pub fn new(
        root: PathBuf,
        store: Arc<Mutex<MetadataStore>>,
        checksums: ChecksumQueue,
        prep: PrepHandle,
        filters: SyncFilters,
    ) -> Arc<Self> {
        Arc::new(Self {
            root,
            store,
            checksums,
            prep,
            filters,
            state: Mutex::new(WatcherState::default()),
        })
    }

    /// Arm a `notify` watch on the root and run the event pipeline until
    /// `rx` closes or a fatal error (ENOSPC / watch exhaustion) occurs.
    ///
    /// `rx` is fed by a `notify` callback bridged onto this channel — see
    /// `spawn_watcher` for the synchronous-callback-to-async-channel glue.
    pub async fn run(
        self: &Arc<Self>,
        mut rx: mpsc::UnboundedReceiver<notify::Result<Event>>,
    ) -> Result<(), WatcherError> {
        self.initial_scan().await;
        self.on_ready();

        while let Some(res) = rx.recv().await {
            match res {
                Ok(event) => self.handle_raw_event(event).await,
                Err(err) => {
                    let werr = WatcherError::from(err);
                    if matches!(werr, WatcherError::Fatal(_)) {
                        return Err(werr);
                    }
                    crate::logging::error(&format!("watcher error: {werr}"));
                }
            }
        }
        Ok(())
    }

    /// Cancel every still-pending deletion as if its timer had just fired,
    /// drop the watch, and give outstanding checksum/dispatch work a
    /// bounded grace period to land (§5).
    pub async fn stop(&self) {
        let finalized: Vec<(String, PendingKind)> = {
            let mut state = self.state.lock().expect("watcher state mutex poisoned");
            let drained: Vec<_> = state
                .pending
                .drain()
                .map(|(path, record)| (path, record.kind))
                .collect();
            drained
        };
        for (path, kind) in finalized {
            match kind {
                PendingKind::File => self.emit(Op::DeleteFile(DocId::from_path(&path))),
                PendingKind::Folder => self.emit(Op::DeleteFolder(DocId::from_path(&path))),
            }
        }
        tokio::time::sleep(STOP_GRACE_PERIOD).await;
    }

    async fn initial_scan(self: &Arc<Self>) {
        {
            let mut state = self.state.lock().expect("watcher state mutex poisoned");
            state.paths = Some(HashSet::new());
        }

        let root = self.root.clone();
        let entries = tokio::task::spawn_blocking(move || {
            walkdir::WalkDir::new(&root)
                .min_depth(1)
                .into_iter()
                .filter_map(|e| e.ok())
                .collect::<Vec<_>>()
        })
        .await
        .unwrap_or_default();

        for entry in entries {
            let Ok(rel) = entry.path().strip_prefix(&self.root) else {
                continue;
            };
            let rel = rel.to_string_lossy().replace('\\', "/");
            let is_dir = entry.file_type().is_dir();
            if self.filters.ignore.should_ignore_rel(Path::new(&rel), is_dir) {
                continue;
            }
            if is_dir {
                self.on_add_dir(rel).await;
            } else if entry.file_type().is_file() {
                if let Ok(meta) = entry.metadata() {
                    self.on_add_file(rel, FileStats::from_metadata(&meta)).await;
                }
            }
        }
    }

    /// §4.3 `on_ready`: anything the store still thinks is live but that
    /// the scan didn't see is gone, including deletes that happened while
    /// this process wasn't running.
    fn on_ready(self: &Arc<Self>) {
        let known = {
            let mut state = self.state.lock().expect("watcher state mutex poisoned");
            state.paths.take().unwrap_or_default()
        };
        let mut docs = {
            let store = self.store.lock().expect("metadata store mutex poisoned");
            store.by_recursive_path("").unwrap_or_default()
        };
        docs.sort_by(|a, b| b.id.cmp(&a.id));
        for doc in docs {
            if doc.deleted {
                continue;
            }
            if !known.contains(&doc.path) {
                self.emit(Op::DeleteDoc(doc.id));
            }
        }
    }

    pub async fn on_add_file(self: &Arc<Self>, rel_path: String, stats: FileStats) {
        {
            let mut state = self.state.lock().expect("watcher state mutex poisoned");
            if let Some(paths) = state.paths.as_mut() {
                paths.insert(rel_path.clone());
            }
            state.known_dirs.remove(&rel_path);
            state.consume(&rel_path);
        }

        let abs = self.root.join(&rel_path);
        let checksum = match self.checksums.enqueue(abs).await {
            Ok(c) => c,
            Err(err) => {
                crate::logging::error(&format!("hashing {rel_path} failed: {err}"));
                return;
            }
        };

        let mut doc = Document::new_file(rel_path.clone(), Utc::now());
        fill_file_attrs(&mut doc, &stats, &checksum);

        let pending_is_empty = {
            let state = self.state.lock().expect("watcher state mutex poisoned");
            state.pending.is_empty()
        };
        if pending_is_empty {
            self.emit(Op::AddFile(doc));
            return;
        }

        let candidates = {
            let store = self.store.lock().expect("metadata store mutex poisoned");
            store.by_checksum(&checksum).unwrap_or_default()
        };
        let matched = {
            let state = self.state.lock().expect("watcher state mutex poisoned");
            candidates.into_iter().find(|c| state.pending.contains_key(&c.path))
        };

        match matched {
            Some(was) => {
                {
                    let mut state = self.state.lock().expect("watcher state mutex poisoned");
                    state.consume(&was.path);
                }
                self.emit(Op::MoveFile { was, doc });
            }
            None => self.emit(Op::AddFile(doc)),
        }
    }

    pub async fn on_add_dir(self: &Arc<Self>, rel_path: String) {
        {
            let mut state = self.state.lock().expect("watcher state mutex poisoned");
            if let Some(paths) = state.paths.as_mut() {
                paths.insert(rel_path.clone());
            }
            state.known_dirs.insert(rel_path.clone());
            state.consume(&rel_path);
        }
        let doc = Document::new_folder(rel_path, Utc::now());
        self.emit(Op::PutFolder(doc));
    }

    pub async fn on_change(self: &Arc<Self>, rel_path: String, stats: FileStats) {
        let abs = self.root.join(&rel_path);
        let checksum = match self.checksums.enqueue(abs).await {
            Ok(c) => c,
            Err(err) => {
                crate::logging::error(&format!("hashing {rel_path} failed: {err}"));
                return;
            }
        };
        let mut doc = Document::new_file(rel_path, Utc::now());
        fill_file_attrs(&mut doc, &stats, &checksum);
        self.emit(Op::UpdateFile(doc));
    }

    pub fn on_unlink_file(self: &Arc<Self>, rel_path: String) {
        let generation = {
            let mut state = self.state.lock().expect("watcher state mutex poisoned");
            state.arm(rel_path.clone(), PendingKind::File)
        };
        let watcher = Arc::clone(self);
        tokio::spawn(async move {
            watcher.run_file_deletion_timer(rel_path, generation).await;
        });
    }

    async fn run_file_deletion_timer(self: Arc<Self>, rel_path: String, generation: u64) {
        tokio::time::sleep(UNLINK_FILE_INITIAL_DELAY).await;
        loop {
            let still_armed = {
                let state = self.state.lock().expect("watcher state mutex poisoned");
                state.still_armed(&rel_path, generation)
            };
            if !still_armed {
                return;
            }
            if self.checksums.in_flight() == 0 {
                let mut state = self.state.lock().expect("watcher state mutex poisoned");
                if state.still_armed(&rel_path, generation) {
                    state.consume(&rel_path);
                } else {
                    return;
                }
                drop(state);
                self.emit(Op::DeleteFile(DocId::from_path(&rel_path)));
                return;
            }
            tokio::time::sleep(UNLINK_FILE_RETRY_DELAY).await;
        }
    }

    pub fn on_unlink_folder(self: &Arc<Self>, rel_path: String) {
        let generation = {
            let mut state = self.state.lock().expect("watcher state mutex poisoned");
            state.known_dirs.remove(&rel_path);
            state.arm(rel_path.clone(), PendingKind::Folder)
        };
        let watcher = Arc::clone(self);
        tokio::spawn(async move {
            watcher.run_folder_deletion_timer(rel_path, generation).await;
        });
    }

    async fn run_folder_deletion_timer(self: Arc<Self>, rel_path: String, generation: u64) {
        loop {
            tokio::time::sleep(UNLINK_FOLDER_POLL).await;
            let (still_armed, any_child_pending) = {
                let state = self.state.lock().expect("watcher state mutex poisoned");
                let still_armed = state.still_armed(&rel_path, generation);
                let prefix = format!("{rel_path}/");
                let any_child_pending = state
                    .pending
                    .keys()
                    .any(|p| p != &rel_path && p.starts_with(&prefix));
                (still_armed, any_child_pending)
            };
            if !still_armed {
                return;
            }
            if !any_child_pending {
                let mut state = self.state.lock().expect("watcher state mutex poisoned");
                if state.still_armed(&rel_path, generation) {
                    state.consume(&rel_path);
                } else {
                    return;
                }
                drop(state);
                self.emit(Op::DeleteFolder(DocId::from_path(&rel_path)));
                return;
            }
        }
    }

    async fn handle_raw_event(self: &Arc<Self>, event: Event) {
        for path in &event.paths {
            let Ok(rel) = path.strip_prefix(&self.root) else {
                continue;
            };
            let rel = rel.to_string_lossy().replace('\\', "/");
            if rel.is_empty() {
                continue;
            }

            match &event.kind {
                EventKind::Create(_) => self.handle_create(rel).await,
                EventKind::Modify(_) => self.handle_modify(rel).await,
                EventKind::Remove(_) => self.handle_remove(rel),
                _ => {}
            }
        }
    }

    async fn handle_create(self: &Arc<Self>, rel: String) {
        let abs = self.root.join(&rel);
        let Ok(meta) = std::fs::metadata(&abs) else {
            // Already gone by the time we stat it; treat as a delete.
            self.handle_remove(rel);
            return;
        };
        if self.filters.ignore.should_ignore_rel(Path::new(&rel), meta.is_dir()) {
            return;
        }
        if meta.is_dir() {
            self.on_add_dir(rel).await;
        } else {
            self.on_add_file(rel, FileStats::from_metadata(&meta)).await;
        }
    }

    async fn handle_modify(self: &Arc<Self>, rel: String) {
        let abs = self.root.join(&rel);
        let Ok(meta) = std::fs::metadata(&abs) else {
            return;
        };
        if meta.is_dir() || self.filters.ignore.should_ignore_rel(Path::new(&rel), meta.is_dir()) {
            return;
        }
        self.on_change(rel, FileStats::from_metadata(&meta)).await;
    }

    fn handle_remove(self: &Arc<Self>, rel: String) {
        let was_dir = {
            let state = self.state.lock().expect("watcher state mutex poisoned");
            state.known_dirs.contains(&rel)
        };
        if was_dir {
            self.on_unlink_folder(rel);
        } else {
            self.on_unlink_file(rel);
        }
    }

    fn emit(&self, op: Op) {
        if self.prep.submit(Side::Local, op).is_err() {
            crate::logging::error("prep queue closed; dropping local event");
        }
    }
}

fn fill_file_attrs(doc: &mut Document, stats: &FileStats, checksum: &str) {
    if let DocType::File(attrs) = &mut doc.doc_type {
        attrs.checksum = Some(checksum.to_string());
        attrs.size = Some(stats.size);
        attrs.executable = Some(stats.executable);
    }
}

/// Bridges `notify`'s synchronous callback into the async channel `run`
/// consumes. `notify`'s callback runs on its own OS thread; `tx.send` on an
/// unbounded channel is non-blocking and safe to call from there.
pub fn spawn_watcher(
    root: &Path,
) -> Result<(RecommendedWatcher, mpsc::UnboundedReceiver<notify::Result<Event>>), WatcherError> {
    let (tx, rx) = mpsc::unbounded_channel();
    let mut watcher = notify::recommended_watcher(move |res| {
        let _ = tx.send(res);
    })
    .map_err(WatcherError::from)?;
    watcher
        .watch(root, RecursiveMode::Recursive)
        .map_err(WatcherError::from)?;
    Ok((watcher, rx))
}
