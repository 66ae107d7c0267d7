//! `RemoteProducer` (§6): the seam a remote-side producer calls into `Prep`
//! through, symmetric with the calls `LocalWatcher` makes for the local
//! side. The network/object-store client that would implement this trait
//! in production is out of scope (§1) — this module defines the seam and
//! ships an in-memory recording double that real tests drive instead.

use std::sync::Mutex;

use crate::document::{DocId, Document, Side};
use crate::error::PrepError;
use crate::prep::{Op, PrepHandle};

/// Mirrors `Prep`'s dispatch vocabulary for a producer that observes
/// changes on the remote side. Every method is fire-and-forget: the
/// producer hands an already-normalized `Document`/`DocId` to `Prep` and
/// moves on, trusting the single dispatch task to serialize it against
/// whatever the local side is doing concurrently (§5).
pub trait RemoteProducer {
    fn add_file(&self, doc: Document) -> Result<(), PrepError>;
    fn update_file(&self, doc: Document) -> Result<(), PrepError>;
    fn put_folder(&self, doc: Document) -> Result<(), PrepError>;
    fn move_file(&self, was: Document, doc: Document) -> Result<(), PrepError>;
    fn move_folder(&self, was: Document, doc: Document) -> Result<(), PrepError>;
    fn delete_doc(&self, id: DocId) -> Result<(), PrepError>;
    fn trash_file(&self, id: DocId) -> Result<(), PrepError>;
    fn trash_folder(&self, id: DocId) -> Result<(), PrepError>;
    fn restore_file(&self, was: DocId, doc: Document) -> Result<(), PrepError>;
    fn restore_folder(&self, was: DocId, doc: Document) -> Result<(), PrepError>;
}

impl RemoteProducer for PrepHandle {
    fn add_file(&self, doc: Document) -> Result<(), PrepError> {
        self.submit(Side::Remote, Op::AddFile(doc))
    }

    fn update_file(&self, doc: Document) -> Result<(), PrepError> {
        self.submit(Side::Remote, Op::UpdateFile(doc))
    }

    fn put_folder(&self, doc: Document) -> Result<(), PrepError> {
        self.submit(Side::Remote, Op::PutFolder(doc))
    }

    fn move_file(&self, was: Document, doc: Document) -> Result<(), PrepError> {
        self.submit(Side::Remote, Op::MoveFile { was, doc })
    }

    fn move_folder(&self, was: Document, doc: Document) -> Result<(), PrepError> {
        self.submit(Side::Remote, Op::MoveFolder { was, doc })
    }

    fn delete_doc(&self, id: DocId) -> Result<(), PrepError> {
        self.submit(Side::Remote, Op::DeleteDoc(id))
    }

    fn trash_file(&self, id: DocId) -> Result<(), PrepError> {
        self.submit(Side::Remote, Op::TrashFile(id))
    }

    fn trash_folder(&self, id: DocId) -> Result<(), PrepError> {
        self.submit(Side::Remote, Op::TrashFolder(id))
    }

    fn restore_file(&self, was: DocId, doc: Document) -> Result<(), PrepError> {
        self.submit(Side::Remote, Op::RestoreFile { was, doc })
    }

    fn restore_folder(&self, was: DocId, doc: Document) -> Result<(), PrepError> {
        self.submit(Side::Remote, Op::RestoreFolder { was, doc })
    }
}

/// One call a `RecordingRemoteProducer` observed, kept verbatim for test
/// assertions.
#[derive(Debug, Clone)]
pub enum RemoteCall {
    AddFile(Document),
    UpdateFile(Document),
    PutFolder(Document),
    MoveFile { was: Document, doc: Document },
    MoveFolder { was: Document, doc: Document },
    DeleteDoc(DocId),
    TrashFile(DocId),
    TrashFolder(DocId),
    RestoreFile { was: DocId, doc: Document },
    RestoreFolder { was: DocId, doc: Document },
}

/// Records every call instead of forwarding it anywhere. Used to prove the
/// trait's shape is exercisable without a real network client.
#[derive(Default)]
pub struct RecordingRemoteProducer {
    pub calls: Mutex<Vec<RemoteCall>>,
}

impl RecordingRemoteProducer {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, call: RemoteCall) {
        self.calls.lock().expect("recording mutex poisoned").push(call);
    }
}

impl RemoteProducer for RecordingRemoteProducer {
    fn add_file(&self, doc: Document) -> Result<(), PrepError> {
        self.push(RemoteCall::AddFile(doc));
        Ok(())
    }

    fn update_file(&self, doc: Document) -> Result<(), PrepError> {
        self.push(RemoteCall::UpdateFile(doc));
        Ok(())
    }

    fn put_folder(&self, doc: Document) -> Result<(), PrepError> {
        self.push(RemoteCall::PutFolder(doc));
        Ok(())
    }

    fn move_file(&self, was: Document, doc: Document) -> Result<(), PrepError> {
        self.push(RemoteCall::MoveFile { was, doc });
        Ok(())
    }

    fn move_folder(&self, was: Document, doc: Document) -> Result<(), PrepError> {
        self.push(RemoteCall::MoveFolder { was, doc });
        Ok(())
    }

    fn delete_doc(&self, id: DocId) -> Result<(), PrepError> {
        self.push(RemoteCall::DeleteDoc(id));
        Ok(())
    }

    fn trash_file(&self, id: DocId) -> Result<(), PrepError> {
        self.push(RemoteCall::TrashFile(id));
        Ok(())
    }

    fn trash_folder(&self, id: DocId) -> Result<(), PrepError> {
        self.push(RemoteCall::TrashFolder(id));
        Ok(())
    }

    fn restore_file(&self, was: DocId, doc: Document) -> Result<(), PrepError> {
        self.push(RemoteCall::RestoreFile { was, doc });
        Ok(())
    }

    fn restore_folder(&self, was: DocId, doc: Document) -> Result<(), PrepError> {
        self.push(RemoteCall::RestoreFolder { was, doc });
        Ok(())
    }
}
