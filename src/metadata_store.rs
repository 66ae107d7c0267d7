//! `MetadataStore` (§4.1): a persistent, revisioned journal of `Document`s
//! backed by `rusqlite`, with point, recursive-prefix, and checksum lookups
//! plus an atomic multi-document write for moves and recursive deletes.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use crate::document::{
    Document, DocId, DocType, FileAttrs, FolderAttrs, RemoteRef, Side, Sides,
};
use crate::error::StoreError;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS documents (
    id TEXT PRIMARY KEY,
    path TEXT NOT NULL,
    doc_type TEXT NOT NULL,
    rev INTEGER NOT NULL,
    checksum TEXT,
    size INTEGER,
    executable INTEGER,
    mime TEXT,
    class TEXT,
    creation_date TEXT NOT NULL,
    last_modification TEXT NOT NULL,
    tags TEXT NOT NULL,
    local_rev INTEGER,
    remote_rev INTEGER,
    remote_id TEXT,
    remote_rev_token TEXT,
    deleted INTEGER NOT NULL DEFAULT 0,
    move_to TEXT,
    trashed INTEGER NOT NULL DEFAULT 0,
    errors INTEGER NOT NULL DEFAULT 0
);

CREATE INDEX IF NOT EXISTS idx_documents_checksum ON documents(checksum);
CREATE INDEX IF NOT EXISTS idx_documents_path ON documents(path);

CREATE TABLE IF NOT EXISTS document_history (
    history_id INTEGER PRIMARY KEY AUTOINCREMENT,
    id TEXT NOT NULL,
    local_rev INTEGER,
    remote_rev INTEGER,
    snapshot TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_history_id_local ON document_history(id, local_rev);
CREATE INDEX IF NOT EXISTS idx_history_id_remote ON document_history(id, remote_rev);
"#;

pub struct MetadataStore {
    conn: Connection,
}

impl MetadataStore {
    pub fn open(db_path: &std::path::Path) -> Result<Self, StoreError> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(db_path)?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn })
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn })
    }

    pub fn get(&self, id: &DocId) -> Result<Option<Document>, StoreError> {
        let mut stmt = self.conn.prepare_cached(SELECT_COLUMNS)?;
        stmt.query_row(params![id.as_str()], row_to_document)
            .optional()
            .map_err(StoreError::from)
    }

    /// Compare-and-swap write: fails with `StoreError::Conflict` if
    /// `doc.rev` doesn't match the row currently stored at `doc.id`.
    pub fn put(&mut self, doc: Document) -> Result<Document, StoreError> {
        let tx = self.conn.transaction()?;
        let written = put_one(&tx, doc)?;
        tx.commit()?;
        Ok(written)
    }

    /// Atomic multi-write: all documents commit in one transaction or none
    /// do (§4.1, used for moves and recursive deletes).
    pub fn bulk_put(&mut self, docs: Vec<Document>) -> Result<Vec<Document>, StoreError> {
        let tx = self.conn.transaction()?;
        let mut out = Vec::with_capacity(docs.len());
        for doc in docs {
            out.push(put_one(&tx, doc)?);
        }
        tx.commit()?;
        Ok(out)
    }

    /// Documents whose id begins with `prefix + "/"`, or every document if
    /// `prefix` is empty, sorted by id ascending, all depths included.
    pub fn by_recursive_path(&self, prefix: &str) -> Result<Vec<Document>, StoreError> {
        let mut stmt;
        let rows = if prefix.is_empty() {
            stmt = self
                .conn
                .prepare_cached(&format!("{SELECT_COLUMNS} ORDER BY id ASC"))?;
            stmt.query_map([], row_to_document)?
                .collect::<Result<Vec<_>, _>>()?
        } else {
            stmt = self.conn.prepare_cached(&format!(
                "{SELECT_COLUMNS} WHERE id = ?1 OR id LIKE ?2 ESCAPE '\\' ORDER BY id ASC"
            ))?;
            let like_prefix = format!("{}/%", escape_like(prefix));
            stmt.query_map(params![prefix, like_prefix], row_to_document)?
                .collect::<Result<Vec<_>, _>>()?
        };
        Ok(rows)
    }

    pub fn by_checksum(&self, checksum: &str) -> Result<Vec<Document>, StoreError> {
        let mut stmt = self
            .conn
            .prepare_cached(&format!("{SELECT_COLUMNS} WHERE checksum = ?1"))?;
        let rows = stmt
            .query_map(params![checksum], row_to_document)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// The historic snapshot of `id` matching `short_rev` on some side.
    pub fn previous_rev(&self, id: &DocId, short_rev: i64) -> Result<Option<Document>, StoreError> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT snapshot FROM document_history
             WHERE id = ?1 AND (local_rev = ?2 OR remote_rev = ?2)
             ORDER BY history_id DESC LIMIT 1",
        )?;
        let snapshot: Option<String> = stmt
            .query_row(params![id.as_str(), short_rev], |row| row.get(0))
            .optional()?;
        Ok(snapshot
            .map(|s| serde_json::from_str(&s))
            .transpose()
            .map_err(|e| StoreError::Io(std::io::Error::new(std::io::ErrorKind::InvalidData, e)))?)
    }
}

const SELECT_COLUMNS: &str = "SELECT id, path, doc_type, rev, checksum, size, executable, mime, \
class, creation_date, last_modification, tags, local_rev, remote_rev, remote_id, \
remote_rev_token, deleted, move_to, trashed, errors FROM documents";

fn escape_like(s: &str) -> String {
    s.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_")
}

fn put_one(tx: &rusqlite::Transaction<'_>, mut doc: Document) -> Result<Document, StoreError> {
    let current_rev: Option<i64> = tx
        .query_row(
            "SELECT rev FROM documents WHERE id = ?1",
            params![doc.id.as_str()],
            |row| row.get(0),
        )
        .optional()?;

    if doc.rev != current_rev {
        return Err(StoreError::Conflict {
            id: doc.id.clone(),
            expected: doc.rev,
            actual: current_rev,
        });
    }

    let next_rev = current_rev.unwrap_or(0) + 1;
    doc.rev = Some(next_rev);

    let (checksum, size, executable, mime, class) = match &doc.doc_type {
        DocType::File(attrs) => (
            attrs.checksum.clone(),
            attrs.size,
            attrs.executable,
            attrs.mime.clone(),
            attrs.class.clone(),
        ),
        DocType::Folder(_) => (None, None, None, None, None),
    };
    let doc_type_tag = doc.doc_type.kind();
    let tags_json = serde_json::to_string(&doc.tags)
        .map_err(|e| StoreError::Io(std::io::Error::new(std::io::ErrorKind::InvalidData, e)))?;
    let local_rev = doc.sides.get(Side::Local);
    let remote_rev = doc.sides.get(Side::Remote);
    let (remote_id, remote_rev_token) = match &doc.remote {
        Some(r) => (Some(r.id.clone()), Some(r.rev.clone())),
        None => (None, None),
    };

    tx.execute(
        "INSERT INTO documents (id, path, doc_type, rev, checksum, size, executable, mime, class, \
         creation_date, last_modification, tags, local_rev, remote_rev, remote_id, remote_rev_token, \
         deleted, move_to, trashed, errors) \
         VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14,?15,?16,?17,?18,?19,?20) \
         ON CONFLICT(id) DO UPDATE SET path=excluded.path, doc_type=excluded.doc_type, \
         rev=excluded.rev, checksum=excluded.checksum, size=excluded.size, \
         executable=excluded.executable, mime=excluded.mime, class=excluded.class, \
         creation_date=excluded.creation_date, last_modification=excluded.last_modification, \
         tags=excluded.tags, local_rev=excluded.local_rev, remote_rev=excluded.remote_rev, \
         remote_id=excluded.remote_id, remote_rev_token=excluded.remote_rev_token, \
         deleted=excluded.deleted, move_to=excluded.move_to, trashed=excluded.trashed, \
         errors=excluded.errors",
        params![
            doc.id.as_str(),
            doc.path,
            doc_type_tag,
            next_rev,
            checksum,
            size,
            executable,
            mime,
            class,
            doc.creation_date.to_rfc3339(),
            doc.last_modification.to_rfc3339(),
            tags_json,
            local_rev,
            remote_rev,
            remote_id,
            remote_rev_token,
            doc.deleted as i64,
            doc.move_to.as_ref().map(|m| m.as_str().to_string()),
            doc.trashed as i64,
            doc.errors,
        ],
    )?;

    let snapshot = serde_json::to_string(&doc)
        .map_err(|e| StoreError::Io(std::io::Error::new(std::io::ErrorKind::InvalidData, e)))?;
    tx.execute(
        "INSERT INTO document_history (id, local_rev, remote_rev, snapshot) VALUES (?1,?2,?3,?4)",
        params![doc.id.as_str(), local_rev, remote_rev, snapshot],
    )?;

    Ok(doc)
}

fn row_to_document(row: &rusqlite::Row<'_>) -> rusqlite::Result<Document> {
    let id: String = row.get(0)?;
    let path: String = row.get(1)?;
    let doc_type_tag: String = row.get(2)?;
    let rev: i64 = row.get(3)?;
    let checksum: Option<String> = row.get(4)?;
    let size: Option<i64> = row.get(5)?;
    let executable: Option<bool> = row.get(6)?;
    let mime: Option<String> = row.get(7)?;
    let class: Option<String> = row.get(8)?;
    let creation_date: String = row.get(9)?;
    let last_modification: String = row.get(10)?;
    let tags_json: String = row.get(11)?;
    let local_rev: Option<i64> = row.get(12)?;
    let remote_rev: Option<i64> = row.get(13)?;
    let remote_id: Option<String> = row.get(14)?;
    let remote_rev_token: Option<String> = row.get(15)?;
    let deleted: i64 = row.get(16)?;
    let move_to: Option<String> = row.get(17)?;
    let trashed: i64 = row.get(18)?;
    let errors: i64 = row.get(19)?;

    let doc_type = if doc_type_tag == "file" {
        DocType::File(FileAttrs {
            checksum,
            size,
            executable,
            mime,
            class,
        })
    } else {
        DocType::Folder(FolderAttrs {})
    };

    let mut sides = Sides::default();
    if let Some(r) = local_rev {
        sides.set(Side::Local, r);
    }
    if let Some(r) = remote_rev {
        sides.set(Side::Remote, r);
    }

    let tags: Vec<String> = serde_json::from_str(&tags_json).unwrap_or_default();

    Ok(Document {
        id: DocId::from_raw(id),
        path,
        doc_type,
        rev: Some(rev),
        creation_date: parse_rfc3339(&creation_date),
        last_modification: parse_rfc3339(&last_modification),
        tags,
        sides,
        remote: remote_id.map(|rid| RemoteRef {
            id: rid,
            rev: remote_rev_token.unwrap_or_default(),
        }),
        deleted: deleted != 0,
        move_to: move_to.map(DocId::from_raw),
        trashed: trashed != 0,
        errors: errors as u32,
    })
}

fn parse_rfc3339(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2024-01-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn put_then_get_round_trips() {
        let mut store = MetadataStore::open_in_memory().unwrap();
        let mut doc = Document::new_file("a.txt", now());
        doc.mark_side(Side::Local, None);
        let written = store.put(doc).unwrap();
        assert_eq!(written.rev, Some(1));

        let fetched = store.get(&DocId::from_path("a.txt")).unwrap().unwrap();
        assert_eq!(fetched.path, "a.txt");
        assert_eq!(fetched.rev, Some(1));
    }

    #[test]
    fn put_rejects_stale_rev_as_conflict() {
        let mut store = MetadataStore::open_in_memory().unwrap();
        let mut doc = Document::new_file("a.txt", now());
        doc.mark_side(Side::Local, None);
        let written = store.put(doc).unwrap();

        let mut stale = written.clone();
        stale.rev = Some(0);
        stale.last_modification = now();
        let err = store.put(stale).unwrap_err();
        assert!(matches!(err, StoreError::Conflict { .. }));
    }

    #[test]
    fn by_recursive_path_includes_all_depths_sorted() {
        let mut store = MetadataStore::open_in_memory().unwrap();
        for p in ["dir", "dir/a", "dir/sub", "dir/sub/b", "dir2/x"] {
            let mut doc = if p.contains('.') || p == "dir/a" || p == "dir/sub/b" {
                Document::new_file(p, now())
            } else {
                Document::new_folder(p, now())
            };
            doc.mark_side(Side::Local, None);
            store.put(doc).unwrap();
        }

        let descendants = store.by_recursive_path("dir").unwrap();
        let ids: Vec<_> = descendants.iter().map(|d| d.id.as_str().to_string()).collect();
        assert_eq!(ids, vec!["dir", "dir/a", "dir/sub", "dir/sub/b"]);
    }

    #[test]
    fn by_checksum_finds_matching_files() {
        let mut store = MetadataStore::open_in_memory().unwrap();
        let mut doc = Document::new_file("a.txt", now());
        if let DocType::File(ref mut attrs) = doc.doc_type {
            attrs.checksum = Some("abc123".into());
        }
        doc.mark_side(Side::Local, None);
        store.put(doc).unwrap();

        let hits = store.by_checksum("abc123").unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].path, "a.txt");
    }

    #[test]
    fn bulk_put_commits_all_or_none() {
        let mut store = MetadataStore::open_in_memory().unwrap();
        let mut a = Document::new_file("a.txt", now());
        a.mark_side(Side::Local, None);
        let mut b = Document::new_file("b.txt", now());
        b.mark_side(Side::Local, None);

        let result = store.bulk_put(vec![a, b]).unwrap();
        assert_eq!(result.len(), 2);
        assert!(store.get(&DocId::from_path("a.txt")).unwrap().is_some());
        assert!(store.get(&DocId::from_path("b.txt")).unwrap().is_some());
    }

    #[test]
    fn previous_rev_recovers_historic_snapshot() {
        let mut store = MetadataStore::open_in_memory().unwrap();
        let mut doc = Document::new_file("a.txt", now());
        doc.mark_side(Side::Local, None);
        if let DocType::File(ref mut attrs) = doc.doc_type {
            attrs.checksum = Some("v1".into());
        }
        let v1 = store.put(doc).unwrap();

        let mut v2 = v1.clone();
        if let DocType::File(ref mut attrs) = v2.doc_type {
            attrs.checksum = Some("v2".into());
        }
        v2.mark_side(Side::Local, Some(&v1));
        store.put(v2).unwrap();

        let historic = store
            .previous_rev(&DocId::from_path("a.txt"), 1)
            .unwrap()
            .unwrap();
        assert_eq!(historic.checksum(), Some("v1"));
    }
}
