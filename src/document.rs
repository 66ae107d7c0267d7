//! The `Document` data model (§3): the unit of metadata shared by every
//! component, plus `DocId` normalization and the per-side revision model.

use std::collections::BTreeMap;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use unicode_normalization::UnicodeNormalization;

/// One of the two observing sides.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Side {
    Local,
    Remote,
}

impl Side {
    pub fn other(self) -> Side {
        match self {
            Side::Local => Side::Remote,
            Side::Remote => Side::Local,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Side::Local => "local",
            Side::Remote => "remote",
        }
    }
}

/// A normalized path used as the store's primary key (invariant 1 of §3).
///
/// Normalization folds Unicode representation (NFC) so that e.g. HFS+'s
/// NFD-decomposed filenames compare equal to the same name written
/// elsewhere, and case-folds on platforms with case-insensitive,
/// case-preserving filesystems (Windows, default macOS). This is the only
/// place platform rules enter the core (§9).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DocId(String);

impl DocId {
    pub fn from_path(path: &str) -> Self {
        let normalized: String = path.nfc().collect();
        let folded = if cfg!(any(target_os = "windows", target_os = "macos")) {
            normalized.to_lowercase()
        } else {
            normalized
        };
        DocId(folded.replace('\\', "/"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// `id(dirname(self))`, or `None` if `self` is already at the root.
    pub fn parent(&self) -> Option<DocId> {
        let trimmed = self.0.trim_end_matches('/');
        let idx = trimmed.rfind('/')?;
        if idx == 0 {
            return None;
        }
        Some(DocId(trimmed[..idx].to_string()))
    }

    /// Whether `self` is `other` or a descendant of `other` (invariant 6).
    pub fn is_or_is_under(&self, other: &DocId) -> bool {
        self.0 == other.0 || self.0.starts_with(&format!("{}/", other.0))
    }

    /// Rewrite `self` (assumed to be `old_prefix` or under it) so that it is
    /// rooted at `new_prefix` instead. Used for recursive moves.
    pub fn reparent(&self, old_prefix: &DocId, new_prefix: &DocId) -> DocId {
        if self.0 == old_prefix.0 {
            return new_prefix.clone();
        }
        let suffix = self.0.strip_prefix(&format!("{}/", old_prefix.0));
        match suffix {
            Some(rest) => DocId(format!("{}/{}", new_prefix.0, rest)),
            None => self.clone(),
        }
    }

    pub fn from_raw(raw: impl Into<String>) -> Self {
        DocId(raw.into())
    }
}

impl std::fmt::Display for DocId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Per-side short-rev bookkeeping (§3, §9 glossary: "short rev").
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sides(BTreeMap<Side, i64>);

impl Sides {
    pub fn get(&self, side: Side) -> Option<i64> {
        self.0.get(&side).copied()
    }

    pub fn set(&mut self, side: Side, rev: i64) {
        self.0.insert(side, rev);
    }

    pub fn remove(&mut self, side: Side) {
        self.0.remove(&side);
    }

    pub fn max(&self) -> i64 {
        self.0.values().copied().max().unwrap_or(0)
    }

    pub fn is_up_to_date(&self, side: Side) -> bool {
        match self.get(side) {
            Some(rev) => rev == self.max(),
            None => false,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Side, i64)> + '_ {
        self.0.iter().map(|(s, r)| (*s, *r))
    }
}

/// Opaque descriptor of the remote twin of a document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteRef {
    pub id: String,
    pub rev: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileAttrs {
    pub checksum: Option<String>,
    pub size: Option<i64>,
    pub executable: Option<bool>,
    pub mime: Option<String>,
    pub class: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FolderAttrs {}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DocType {
    File(FileAttrs),
    Folder(FolderAttrs),
}

impl DocType {
    pub fn kind(&self) -> &'static str {
        match self {
            DocType::File(_) => "file",
            DocType::Folder(_) => "folder",
        }
    }

    pub fn as_file(&self) -> Option<&FileAttrs> {
        match self {
            DocType::File(attrs) => Some(attrs),
            DocType::Folder(_) => None,
        }
    }

    pub fn as_file_mut(&mut self) -> Option<&mut FileAttrs> {
        match self {
            DocType::File(attrs) => Some(attrs),
            DocType::Folder(_) => None,
        }
    }
}

/// Opaque revision token produced by the `MetadataStore` on each write.
pub type Rev = i64;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: DocId,
    pub path: String,
    pub doc_type: DocType,
    pub rev: Option<Rev>,
    pub creation_date: DateTime<Utc>,
    pub last_modification: DateTime<Utc>,
    pub tags: Vec<String>,
    pub sides: Sides,
    pub remote: Option<RemoteRef>,
    pub deleted: bool,
    pub move_to: Option<DocId>,
    pub trashed: bool,
    pub errors: u32,
}

impl Document {
    pub fn new_file(path: impl Into<String>, now: DateTime<Utc>) -> Self {
        let path = path.into();
        Document {
            id: DocId::from_path(&path),
            path,
            doc_type: DocType::File(FileAttrs::default()),
            rev: None,
            creation_date: now,
            last_modification: now,
            tags: Vec::new(),
            sides: Sides::default(),
            remote: None,
            deleted: false,
            move_to: None,
            trashed: false,
            errors: 0,
        }
    }

    pub fn new_folder(path: impl Into<String>, now: DateTime<Utc>) -> Self {
        let path = path.into();
        Document {
            id: DocId::from_path(&path),
            path,
            doc_type: DocType::Folder(FolderAttrs {}),
            rev: None,
            creation_date: now,
            last_modification: now,
            tags: Vec::new(),
            sides: Sides::default(),
            remote: None,
            deleted: false,
            move_to: None,
            trashed: false,
            errors: 0,
        }
    }

    pub fn is_file(&self) -> bool {
        matches!(self.doc_type, DocType::File(_))
    }

    pub fn is_folder(&self) -> bool {
        matches!(self.doc_type, DocType::Folder(_))
    }

    pub fn checksum(&self) -> Option<&str> {
        self.doc_type.as_file()?.checksum.as_deref()
    }

    /// invariant enforcement helper for Merge: "is `side` the side that sets
    /// this document's short-rev to the new high-water mark".
    pub fn mark_side(&mut self, side: Side, existing: Option<&Document>) {
        let base = existing.map(|d| d.sides.max()).unwrap_or(0);
        self.sides.set(side, base + 1);
    }
}

/// Compare two file documents' content identity (§4.4 `same_binary`).
pub fn same_binary(a: &Document, b: &Document) -> bool {
    match (&a.doc_type, &b.doc_type) {
        (DocType::File(fa), DocType::File(fb)) => {
            fa.checksum.is_some() && fa.checksum == fb.checksum && fa.size == fb.size
        }
        _ => false,
    }
}

/// Derive the parent folder's relative path string from a child's path.
pub fn parent_path(path: &str) -> Option<&str> {
    let trimmed = path.trim_end_matches('/');
    let idx = trimmed.rfind(['/', '\\'])?;
    if idx == 0 {
        None
    } else {
        Some(&trimmed[..idx])
    }
}

pub fn basename(path: &str) -> &str {
    Path::new(path)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(path)
}
