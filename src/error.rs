//! Typed error hierarchy for the four core component boundaries (§7).
//!
//! `NotFound` and `Conflict` are resolved internally by `merge` and never
//! escape to a producer; they exist here only so `metadata_store` has a
//! closed, matchable return type.

use thiserror::Error;

use crate::document::DocId;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("document not found: {0}")]
    NotFound(DocId),

    #[error("conflict writing {id}: expected rev {expected:?}, store has {actual:?}")]
    Conflict {
        id: DocId,
        expected: Option<i64>,
        actual: Option<i64>,
    },

    #[error("transient store error: {0}")]
    Transient(#[from] rusqlite::Error),

    #[error("store I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound(_))
    }
}

#[derive(Debug, Error)]
pub enum MergeError {
    #[error(transparent)]
    Store(#[from] StoreError),

    /// A file/folder type mismatch on `update_file`/`put_folder`. Fatal for
    /// the operation that triggered it; the caller logs and drops the event.
    #[error("cannot resolve {id}: existing document is a {existing_kind}, incoming is a {incoming_kind}")]
    CannotResolve {
        id: DocId,
        existing_kind: &'static str,
        incoming_kind: &'static str,
    },
}

#[derive(Debug, Error)]
pub enum ChecksumError {
    #[error("read error hashing {path}: {source}")]
    Io {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("checksum queue shut down before this entry was processed")]
    QueueClosed,
}

#[derive(Debug, Error)]
pub enum WatcherError {
    #[error("watcher I/O error: {0}")]
    Transient(String),

    /// `ENOSPC` or equivalent kernel watch exhaustion. Bubbles out of the
    /// watcher's run loop and shuts it down.
    #[error("fatal watcher error (watch limit exhausted): {0}")]
    Fatal(String),
}

impl From<notify::Error> for WatcherError {
    fn from(err: notify::Error) -> Self {
        if is_watch_exhaustion(&err) {
            WatcherError::Fatal(err.to_string())
        } else {
            WatcherError::Transient(err.to_string())
        }
    }
}

fn is_watch_exhaustion(err: &notify::Error) -> bool {
    match &err.kind {
        notify::ErrorKind::MaxFilesWatch => true,
        notify::ErrorKind::Io(io_err) => io_err.raw_os_error() == Some(28), // ENOSPC
        _ => false,
    }
}

/// `Prep`'s dispatch queue (§5) has shut down.
#[derive(Debug, Error)]
pub enum PrepError {
    #[error("prep dispatch queue is closed")]
    Closed,
}
