//! `Prep` (§5): the single-consumer dispatch queue that serializes every
//! `LocalWatcher` event and every remote-producer call onto the one task
//! that owns the `Merge`/`MetadataStore` write path. Nothing else in this
//! crate is allowed to call a `Merge` method directly — this is the only
//! door.

use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;

use crate::document::{Document, DocId, Side};
use crate::error::{MergeError, PrepError};
use crate::merge::Merge;
use crate::metadata_store::MetadataStore;

/// A semantic operation, already normalized by the side that produced it
/// (`LocalWatcher` or a `RemoteProducer`), waiting to be folded into the
/// `MetadataStore` by `Merge`.
#[derive(Debug, Clone)]
pub enum Op {
    AddFile(Document),
    UpdateFile(Document),
    PutFolder(Document),
    MoveFile { was: Document, doc: Document },
    MoveFolder { was: Document, doc: Document },
    /// A generic "this id is gone" notification from a producer that can't
    /// tell file from folder on its own (e.g. a remote delete event whose
    /// payload is bare). `Prep` resolves the kind by consulting the store.
    DeleteDoc(DocId),
    DeleteFile(DocId),
    DeleteFolder(DocId),
    TrashFile(DocId),
    TrashFolder(DocId),
    RestoreFile { was: DocId, doc: Document },
    RestoreFolder { was: DocId, doc: Document },
}

/// Cheaply-cloned submission handle for the queue. `LocalWatcher` holds one
/// directly; a `RemoteProducer` implementation wraps one too (see
/// `remote.rs`).
#[derive(Clone)]
pub struct PrepHandle {
    tx: mpsc::UnboundedSender<(Side, Op)>,
}

impl PrepHandle {
    pub fn submit(&self, side: Side, op: Op) -> Result<(), PrepError> {
        self.tx.send((side, op)).map_err(|_| PrepError::Closed)
    }

    #[cfg(test)]
    pub(crate) fn for_test() -> (Self, mpsc::UnboundedReceiver<(Side, Op)>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (PrepHandle { tx }, rx)
    }
}

pub struct Prep {
    store: Arc<Mutex<MetadataStore>>,
    rx: mpsc::UnboundedReceiver<(Side, Op)>,
}

impl Prep {
    pub fn new(store: Arc<Mutex<MetadataStore>>) -> (Self, PrepHandle) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Prep { store, rx }, PrepHandle { tx })
    }

    /// Drain the queue until every handle is dropped. Runs until the crate
    /// process shuts down; errors from individual operations are logged and
    /// otherwise swallowed so one bad event can't wedge the whole pipeline.
    pub async fn run(mut self) {
        while let Some((side, op)) = self.rx.recv().await {
            if let Err(err) = self.dispatch(side, op) {
                crate::logging::error(&format!("merge dispatch failed: {err}"));
            }
        }
    }

    fn dispatch(&mut self, side: Side, op: Op) -> Result<(), MergeError> {
        // `DeleteDoc` needs a pre-read to learn file-vs-folder before it can
        // pick which `Merge` method to call; resolve it before taking the
        // lock that `Merge` itself will hold for the actual write.
        let op = if let Op::DeleteDoc(id) = op {
            let existing = self.store.lock().expect("metadata store mutex poisoned").get(&id)?;
            match existing {
                None => return Ok(()),
                Some(doc) if doc.is_folder() => Op::DeleteFolder(id),
                Some(_) => Op::DeleteFile(id),
            }
        } else {
            op
        };

        let mut store = self.store.lock().expect("metadata store mutex poisoned");
        let mut merge = Merge::new(&mut store);
        match op {
            Op::AddFile(doc) => {
                merge.add_file(side, doc)?;
            }
            Op::UpdateFile(doc) => {
                merge.update_file(side, doc)?;
            }
            Op::PutFolder(doc) => {
                merge.put_folder(side, doc)?;
            }
            Op::MoveFile { was, doc } => {
                merge.move_file(side, doc, was)?;
            }
            Op::MoveFolder { was, doc } => {
                merge.move_folder(side, doc, was)?;
            }
            Op::DeleteDoc(_) => unreachable!("resolved to DeleteFile/DeleteFolder above"),
            Op::DeleteFile(id) => {
                merge.delete_file(side, &id)?;
            }
            Op::DeleteFolder(id) => {
                merge.delete_folder(side, &id)?;
            }
            Op::TrashFile(id) => {
                merge.trash_file(side, &id)?;
            }
            Op::TrashFolder(id) => {
                merge.trash_folder(side, &id)?;
            }
            Op::RestoreFile { was, doc } => {
                merge.restore_file(side, &was, doc)?;
            }
            Op::RestoreFolder { was, doc } => {
                merge.restore_folder(side, &was, doc)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Document;
    use chrono::Utc;

    #[tokio::test]
    async fn dispatches_add_file_into_the_store() {
        let store = Arc::new(Mutex::new(MetadataStore::open_in_memory().unwrap()));
        let (prep, handle) = Prep::new(store.clone());
        let runner = tokio::spawn(prep.run());

        handle
            .submit(Side::Local, Op::AddFile(Document::new_file("a.txt", Utc::now())))
            .unwrap();

        drop(handle);
        runner.await.unwrap();

        let got = store
            .lock()
            .unwrap()
            .get(&DocId::from_path("a.txt"))
            .unwrap();
        assert!(got.is_some());
    }

    #[tokio::test]
    async fn delete_doc_resolves_kind_before_delegating() {
        let store = Arc::new(Mutex::new(MetadataStore::open_in_memory().unwrap()));
        let (prep, handle) = Prep::new(store.clone());
        let runner = tokio::spawn(prep.run());

        handle
            .submit(Side::Local, Op::PutFolder(Document::new_folder("dir", Utc::now())))
            .unwrap();
        handle.submit(Side::Local, Op::DeleteDoc(DocId::from_path("dir"))).unwrap();

        drop(handle);
        runner.await.unwrap();

        let got = store.lock().unwrap().get(&DocId::from_path("dir")).unwrap().unwrap();
        assert!(got.deleted);
    }
}
