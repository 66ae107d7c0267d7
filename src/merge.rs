//! `Merge` (§4.4): the reconciler. Every public method takes `(side, doc[,
//! was])`, reads the current store entry at `doc.id`, and resolves the
//! write against the invariants in §3 — creating ancestor folders on
//! demand, renaming the losing side of a conflict, and committing recursive
//! moves/deletes as one atomic `bulk_put`.
//!
//! Only this module calls `MetadataStore::put`/`bulk_put` (§5 shared-resource
//! policy); producers never write to the store directly.

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{SecondsFormat, Utc};

use crate::document::{
    basename, parent_path, same_binary, DocId, Document, DocType, FileAttrs, FolderAttrs, Side,
};
use crate::error::{MergeError, StoreError};
use crate::metadata_store::MetadataStore;

const MAX_BASENAME_CHARS: usize = 180;

pub struct Merge<'a> {
    store: &'a mut MetadataStore,
}

impl<'a> Merge<'a> {
    pub fn new(store: &'a mut MetadataStore) -> Self {
        Self { store }
    }

    fn get(&self, id: &DocId) -> Result<Option<Document>, StoreError> {
        self.store.get(id)
    }

    fn put(&mut self, doc: Document) -> Result<Document, StoreError> {
        self.store.put(doc)
    }

    fn bulk_put(&mut self, docs: Vec<Document>) -> Result<Vec<Document>, StoreError> {
        self.store.bulk_put(docs)
    }

    /// §4.4 `add_file`.
    pub fn add_file(&mut self, side: Side, mut doc: Document) -> Result<Option<Document>, MergeError> {
        let existing = self.get(&doc.id)?;
        doc.mark_side(side, existing.as_ref());

        match existing {
            None => {
                self.ensure_parents(&doc)?;
                Ok(Some(self.put(doc)?))
            }
            Some(existing) if existing.is_folder() => {
                Ok(Some(self.conflict_rename(side, doc, existing)?))
            }
            Some(existing) if same_binary(&existing, &doc) => {
                carry_forward_metadata(&mut doc, &existing);
                if unchanged(&existing, &doc) {
                    Ok(None)
                } else {
                    Ok(Some(self.put(doc)?))
                }
            }
            Some(existing) => {
                if side == Side::Local && existing.sides.get(Side::Local).is_some() {
                    self.resolve_initial_add(side, doc, existing)
                } else {
                    Ok(Some(self.conflict_rename(side, doc, existing)?))
                }
            }
        }
    }

    /// §4.4 `resolve_initial_add`: the local watcher's initial scan replayed
    /// an add for a path the store already knows about on this side.
    fn resolve_initial_add(
        &mut self,
        side: Side,
        doc: Document,
        existing: Document,
    ) -> Result<Option<Document>, MergeError> {
        if existing.sides.get(Side::Remote).is_none() {
            return self.update_file(side, doc);
        }
        if existing.sides.get(Side::Local) == existing.sides.get(Side::Remote) {
            return self.update_file(side, doc);
        }

        let local_short_rev = existing.sides.get(Side::Local).unwrap_or(0);
        let previous = self.store.previous_rev(&existing.id, local_short_rev)?;
        match previous.and_then(|p| p.checksum().map(|c| c.to_string())) {
            Some(checksum) if Some(checksum.as_str()) == doc.checksum() => Ok(None),
            _ => Ok(Some(self.conflict_rename(side.other(), doc, existing)?)),
        }
    }

    /// §4.4 `update_file`.
    pub fn update_file(&mut self, side: Side, mut doc: Document) -> Result<Option<Document>, MergeError> {
        let existing = self.get(&doc.id)?;
        doc.mark_side(side, existing.as_ref());

        match existing {
            None => {
                self.ensure_parents(&doc)?;
                Ok(Some(self.put(doc)?))
            }
            Some(existing) if existing.is_folder() => Err(MergeError::CannotResolve {
                id: doc.id,
                existing_kind: existing.doc_type.kind(),
                incoming_kind: doc.doc_type.kind(),
            }),
            Some(existing) if same_binary(&existing, &doc) => {
                carry_forward_metadata(&mut doc, &existing);
                if unchanged(&existing, &doc) {
                    Ok(None)
                } else {
                    Ok(Some(self.put(doc)?))
                }
            }
            Some(existing) if !existing.sides.is_up_to_date(side) => {
                Ok(Some(self.conflict_rename(side, doc, existing)?))
            }
            Some(_) => Ok(Some(self.put(doc)?)),
        }
    }

    /// §4.4 `put_folder`: same shape as `update_file` without a hash compare.
    pub fn put_folder(&mut self, side: Side, mut doc: Document) -> Result<Option<Document>, MergeError> {
        let existing = self.get(&doc.id)?;
        doc.mark_side(side, existing.as_ref());

        match existing {
            None => {
                self.ensure_parents(&doc)?;
                Ok(Some(self.put(doc)?))
            }
            Some(existing) if existing.is_file() => {
                Ok(Some(self.conflict_rename(side, doc, existing)?))
            }
            Some(existing) if !existing.sides.is_up_to_date(side) && folder_changed(&existing, &doc) => {
                Ok(Some(self.conflict_rename(side, doc, existing)?))
            }
            Some(existing) if folder_changed(&existing, &doc) => Ok(Some(self.put(doc)?)),
            Some(_) => Ok(None),
        }
    }

    /// §4.4 `move_file`.
    pub fn move_file(
        &mut self,
        side: Side,
        mut doc: Document,
        mut was: Document,
    ) -> Result<Vec<Document>, MergeError> {
        if was.sides.get(side).is_none() {
            return Ok(self.add_file(side, doc)?.into_iter().collect());
        }

        let destination_existing = self.get(&doc.id)?;
        doc.mark_side(side, destination_existing.as_ref());
        carry_forward_metadata(&mut doc, &was);

        was.deleted = true;
        was.move_to = Some(doc.id.clone());

        match destination_existing {
            Some(occupant) if occupant.is_file() => {
                let conflict_doc = self.rename_into_conflict(doc)?;
                was.move_to = Some(conflict_doc.id.clone());
                Ok(self.bulk_put(vec![was, conflict_doc])?)
            }
            _ => Ok(self.bulk_put(vec![was, doc])?),
        }
    }

    /// §4.4 `move_folder`: moves the folder document itself, then cascades
    /// to every descendant via `move_folder_recursively`.
    pub fn move_folder(
        &mut self,
        side: Side,
        mut doc: Document,
        mut was: Document,
    ) -> Result<Vec<Document>, MergeError> {
        if was.sides.get(side).is_none() {
            return Ok(self.put_folder(side, doc)?.into_iter().collect());
        }

        let destination_existing = self.get(&doc.id)?;
        doc.mark_side(side, destination_existing.as_ref());

        was.deleted = true;

        let doc = match destination_existing {
            Some(occupant) if occupant.is_file() => self.rename_into_conflict(doc)?,
            _ => doc,
        };
        was.move_to = Some(doc.id.clone());

        let old_prefix = was.id.clone();
        let new_prefix = doc.id.clone();
        let descendants = self.store.by_recursive_path(old_prefix.as_str())?;

        let mut batch = Vec::with_capacity(descendants.len() * 2 + 2);
        batch.push(was);
        batch.push(doc);

        for descendant in descendants {
            if descendant.id == old_prefix {
                continue; // the folder itself, already queued above
            }
            let new_id = descendant.id.reparent(&old_prefix, &new_prefix);
            let new_path = reparent_path(&descendant.path, &old_prefix, &new_prefix);

            let mut tombstone = descendant.clone();
            tombstone.deleted = true;
            tombstone.move_to = Some(new_id.clone());

            let mut moved = descendant;
            moved.id = new_id;
            moved.path = new_path;
            moved.rev = None;
            moved.last_modification = Utc::now();
            moved.mark_side(side, Some(&tombstone));

            batch.push(tombstone);
            batch.push(moved);
        }

        Ok(self.bulk_put(batch)?)
    }

    /// §4.4 `delete_file`.
    pub fn delete_file(&mut self, side: Side, id: &DocId) -> Result<Option<Document>, MergeError> {
        let Some(mut existing) = self.get(id)? else {
            return Ok(None);
        };
        if existing.sides.get(side).is_none() {
            return Ok(None);
        }
        existing.mark_side(side, None);
        existing.deleted = true;
        Ok(Some(self.put(existing)?))
    }

    /// §4.4 `delete_folder` / `delete_folder_recursively`.
    pub fn delete_folder(&mut self, side: Side, id: &DocId) -> Result<Vec<Document>, MergeError> {
        let Some(folder) = self.get(id)? else {
            return Ok(Vec::new());
        };
        let mut descendants = self.store.by_recursive_path(id.as_str())?;
        // children before parent, per §5 ordering guarantee 3.
        descendants.sort_by(|a, b| b.id.cmp(&a.id));

        let mut preserve_folder = false;
        let mut batch = Vec::with_capacity(descendants.len());
        for mut descendant in descendants {
            if descendant.id == *id {
                continue;
            }
            if descendant.sides.is_up_to_date(side) {
                descendant.mark_side(side, None);
                descendant.deleted = true;
                batch.push(descendant);
            } else {
                descendant.remote = None;
                descendant.sides.remove(side.other());
                preserve_folder = true;
                batch.push(descendant);
            }
        }

        let mut folder = folder;
        if preserve_folder {
            folder.sides.remove(side);
        } else {
            folder.mark_side(side, None);
            folder.deleted = true;
        }
        batch.push(folder);

        Ok(self.bulk_put(batch)?)
    }

    /// §4.4 `trash_file`.
    pub fn trash_file(&mut self, side: Side, id: &DocId) -> Result<Option<Document>, MergeError> {
        let Some(mut existing) = self.get(id)? else {
            return Ok(None);
        };
        existing.mark_side(side, None);
        existing.trashed = true;
        Ok(Some(self.put(existing)?))
    }

    /// §4.4 `trash_folder`: aborts (degrades to a no-op write that only
    /// clears `sides[side]` and `errors`) if any descendant changed on the
    /// opposite side since this side last observed the folder.
    pub fn trash_folder(&mut self, side: Side, id: &DocId) -> Result<Vec<Document>, MergeError> {
        let Some(mut folder) = self.get(id)? else {
            return Ok(Vec::new());
        };
        let descendants = self.store.by_recursive_path(id.as_str())?;
        let opposite_updated = descendants
            .iter()
            .any(|d| d.is_file() && !d.sides.is_up_to_date(side));

        if opposite_updated {
            folder.sides.remove(side);
            folder.errors = 0;
            return Ok(vec![self.put(folder)?]);
        }

        folder.mark_side(side, None);
        folder.trashed = true;
        Ok(vec![self.put(folder)?])
    }

    /// §4.4 `restore_file`.
    pub fn restore_file(
        &mut self,
        side: Side,
        was: &DocId,
        doc: Document,
    ) -> Result<Option<Document>, MergeError> {
        self.delete_ignoring_not_found(was)?;
        self.update_file(side, doc)
    }

    /// §4.4 `restore_folder`.
    pub fn restore_folder(
        &mut self,
        side: Side,
        was: &DocId,
        doc: Document,
    ) -> Result<Option<Document>, MergeError> {
        self.delete_ignoring_not_found(was)?;
        self.put_folder(side, doc)
    }

    fn delete_ignoring_not_found(&mut self, id: &DocId) -> Result<(), MergeError> {
        if let Some(mut existing) = self.get(id)? {
            existing.deleted = true;
            self.put(existing)?;
        }
        Ok(())
    }

    /// Walk up `dirname(id)` synthesizing missing ancestor folders (§4.4
    /// Parent existence).
    fn ensure_parents(&mut self, doc: &Document) -> Result<(), MergeError> {
        let Some(parent_id) = doc.id.parent() else {
            return Ok(());
        };
        if self.get(&parent_id)?.is_some() {
            return Ok(());
        }
        let Some(parent_path) = parent_path(&doc.path) else {
            return Ok(());
        };
        let mut folder = Document::new_folder(parent_path, Utc::now());
        // A synthesized ancestor has no dedicated source side event; mark
        // both sides as having observed it so neither producer re-derives
        // a spurious conflict for it later.
        folder.sides.set(Side::Local, 1);
        folder.sides.set(Side::Remote, 1);
        self.ensure_parents(&folder)?;
        self.put(folder)?;
        Ok(())
    }

    /// §4.4 Conflict resolution: renames `existing` (the side that already
    /// has this id) out of the way under a fresh conflict id, then writes
    /// `incoming` at the now-vacated original id, all as one atomic batch —
    /// the id's rev chain runs live(r) -> tombstone(r+1, move_to=conflict
    /// id) -> incoming(r+2), alongside a brand-new row for the renamed
    /// document. Returns the committed `incoming`.
    fn conflict_rename(
        &mut self,
        _losing_side: Side,
        mut incoming: Document,
        existing: Document,
    ) -> Result<Document, MergeError> {
        let next_rev = existing.rev.unwrap_or(0) + 1;
        let conflict_path = conflict_path(&existing.path);
        let conflict_id = DocId::from_path(&conflict_path);

        let mut tombstone = existing.clone();
        tombstone.deleted = true;
        tombstone.move_to = Some(conflict_id.clone());

        let mut renamed_live = existing;
        renamed_live.id = conflict_id;
        renamed_live.path = conflict_path;
        renamed_live.rev = None;

        incoming.rev = Some(next_rev);

        let mut results = self.bulk_put(vec![tombstone, renamed_live, incoming])?;
        Ok(results.pop().unwrap())
    }

    /// Computes the conflict path for `doc` and writes it under that new
    /// id/path, returning the renamed (not yet re-put) document ready for
    /// the caller to commit.
    fn rename_into_conflict(&mut self, mut doc: Document) -> Result<Document, MergeError> {
        let new_path = conflict_path(&doc.path);
        doc.id = DocId::from_path(&new_path);
        doc.path = new_path;
        doc.rev = None;
        Ok(doc)
    }
}

/// Disambiguates conflict ids minted within the same millisecond (two
/// conflicts on the same base path in one process can easily land in the
/// same wall-clock millisecond, e.g. back-to-back test assertions); the
/// timestamp alone is not enough to keep them unique.
static CONFLICT_SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// §4.4 Conflict resolution path transformation:
/// `<dir>/<basename truncated to 180 chars>-conflict-<ISO8601 timestamp, ms precision, fs-safe>-<seq><extension>`.
fn conflict_path(path: &str) -> String {
    let dir = parent_path(path);
    let name = basename(path);
    let (stem, ext) = split_extension(name);
    let truncated_stem = truncate_chars(stem, MAX_BASENAME_CHARS);
    let timestamp = Utc::now()
        .to_rfc3339_opts(SecondsFormat::Millis, true)
        .replace(':', "-");
    let seq = CONFLICT_SEQUENCE.fetch_add(1, Ordering::Relaxed);

    let new_name = if ext.is_empty() {
        format!("{truncated_stem}-conflict-{timestamp}-{seq}")
    } else {
        format!("{truncated_stem}-conflict-{timestamp}-{seq}.{ext}")
    };

    match dir {
        Some(dir) => format!("{dir}/{new_name}"),
        None => new_name,
    }
}

fn split_extension(name: &str) -> (&str, &str) {
    match name.rfind('.') {
        Some(0) => (name, ""), // dotfile with no extension, e.g. ".gitignore"
        Some(idx) => (&name[..idx], &name[idx + 1..]),
        None => (name, ""),
    }
}

fn truncate_chars(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

fn reparent_path(path: &str, old_prefix: &DocId, new_prefix: &DocId) -> String {
    let old = old_prefix.as_str();
    let new = new_prefix.as_str();
    if let Some(rest) = path.strip_prefix(old) {
        format!("{new}{rest}")
    } else {
        path.to_string()
    }
}

/// Merge metadata fields present on `from` but missing on `into`, without
/// overwriting fields `into` already set explicitly.
fn carry_forward_metadata(into: &mut Document, from: &Document) {
    into.creation_date = from.creation_date.min(into.creation_date);
    if into.tags.is_empty() {
        into.tags = from.tags.clone();
    }
    if into.remote.is_none() {
        into.remote = from.remote.clone();
    }
    if let (DocType::File(into_attrs), DocType::File(from_attrs)) =
        (&mut into.doc_type, &from.doc_type)
    {
        fill_missing_file_attrs(into_attrs, from_attrs);
    }
}

fn fill_missing_file_attrs(into: &mut FileAttrs, from: &FileAttrs) {
    if into.checksum.is_none() {
        into.checksum = from.checksum.clone();
    }
    if into.size.is_none() {
        into.size = from.size;
    }
    if into.executable.is_none() {
        into.executable = from.executable;
    }
    if into.mime.is_none() {
        into.mime = from.mime.clone();
    }
    if into.class.is_none() {
        into.class = from.class.clone();
    }
}

fn unchanged(existing: &Document, doc: &Document) -> bool {
    existing.tags == doc.tags
        && existing.trashed == doc.trashed
        && match (&existing.doc_type, &doc.doc_type) {
            (DocType::File(a), DocType::File(b)) => a == b,
            (DocType::Folder(FolderAttrs {}), DocType::Folder(FolderAttrs {})) => true,
            _ => false,
        }
}

fn folder_changed(existing: &Document, doc: &Document) -> bool {
    existing.tags != doc.tags || existing.trashed != doc.trashed
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(path: &str, checksum: &str) -> Document {
        let mut doc = Document::new_file(path, Utc::now());
        if let DocType::File(ref mut attrs) = doc.doc_type {
            attrs.checksum = Some(checksum.to_string());
            attrs.size = Some(checksum.len() as i64);
        }
        doc
    }

    fn folder(path: &str) -> Document {
        Document::new_folder(path, Utc::now())
    }

    #[test]
    fn add_file_creates_missing_ancestors() {
        let mut store = MetadataStore::open_in_memory().unwrap();
        let mut merge = Merge::new(&mut store);
        merge.add_file(Side::Local, file("dir/sub/a.txt", "x")).unwrap();

        drop(merge);
        assert!(store.get(&DocId::from_path("dir")).unwrap().unwrap().is_folder());
        assert!(store.get(&DocId::from_path("dir/sub")).unwrap().unwrap().is_folder());
        assert!(store.get(&DocId::from_path("dir/sub/a.txt")).unwrap().unwrap().is_file());
    }

    #[test]
    fn add_file_over_folder_conflict_renames_the_folder() {
        let mut store = MetadataStore::open_in_memory().unwrap();
        {
            let mut merge = Merge::new(&mut store);
            merge.put_folder(Side::Local, folder("a")).unwrap();
        }
        let mut merge = Merge::new(&mut store);
        merge.add_file(Side::Remote, file("a", "content")).unwrap();
        drop(merge);

        let live = store.get(&DocId::from_path("a")).unwrap().unwrap();
        assert!(live.is_file());

        let all = store.by_recursive_path("").unwrap();
        let renamed_folder = all
            .iter()
            .find(|d| d.is_folder() && d.path.contains("-conflict-"));
        assert!(renamed_folder.is_some());
    }

    /// S2 — simple rename: moving a.txt -> b.txt yields a live b.txt with
    /// the same checksum, a tombstone at a.txt with move_to set, no delete.
    #[test]
    fn move_file_rename_scenario() {
        let mut store = MetadataStore::open_in_memory().unwrap();
        let original = {
            let mut merge = Merge::new(&mut store);
            merge.add_file(Side::Local, file("a.txt", "X")).unwrap().unwrap()
        };

        let mut merge = Merge::new(&mut store);
        let dest = file("b.txt", "X");
        merge.move_file(Side::Local, dest, original.clone()).unwrap();
        drop(merge);

        let tombstone = store.get(&DocId::from_path("a.txt")).unwrap().unwrap();
        assert!(tombstone.deleted);
        assert_eq!(tombstone.move_to.unwrap().as_str(), "b.txt");

        let live = store.get(&DocId::from_path("b.txt")).unwrap().unwrap();
        assert!(!live.deleted);
        assert_eq!(live.checksum(), Some("X"));
    }

    /// S4 — local update after remote update: the remote "v2" gets
    /// conflict-renamed; the local "v3" becomes the live document.
    #[test]
    fn update_file_conflict_when_side_stale() {
        let mut store = MetadataStore::open_in_memory().unwrap();
        {
            // Both sides observe v1 (sides = {local: 1, remote: 2}).
            let mut merge = Merge::new(&mut store);
            merge.add_file(Side::Local, file("note", "v1")).unwrap();
            merge.update_file(Side::Remote, file("note", "v1")).unwrap();
        }

        // Remote writes v2; local has not observed it (local stays at 1).
        {
            let mut merge = Merge::new(&mut store);
            merge.update_file(Side::Remote, file("note", "v2")).unwrap();
        }

        // Local writes v3 without having observed v2 -> stale on local side.
        {
            let mut merge = Merge::new(&mut store);
            merge.update_file(Side::Local, file("note", "v3")).unwrap();
        }

        let live = store.get(&DocId::from_path("note")).unwrap().unwrap();
        assert_eq!(live.checksum(), Some("v3"));

        let all = store.by_recursive_path("").unwrap();
        let conflicted = all.iter().find(|d| d.path.contains("-conflict-"));
        assert!(conflicted.is_some());
        assert_eq!(conflicted.unwrap().checksum(), Some("v2"));
    }

    /// S5 — recursive folder move with children preserved.
    #[test]
    fn move_folder_recursively_rewrites_descendants() {
        let mut store = MetadataStore::open_in_memory().unwrap();
        {
            let mut merge = Merge::new(&mut store);
            merge.put_folder(Side::Local, folder("dir")).unwrap();
            merge.add_file(Side::Local, file("dir/a", "A")).unwrap();
            merge.add_file(Side::Local, file("dir/b", "B")).unwrap();
        }

        let was = store.get(&DocId::from_path("dir")).unwrap().unwrap();
        let mut merge = Merge::new(&mut store);
        merge.move_folder(Side::Local, folder("dir2"), was).unwrap();
        drop(merge);

        assert!(store.get(&DocId::from_path("dir")).unwrap().unwrap().deleted);
        assert!(store.get(&DocId::from_path("dir/a")).unwrap().unwrap().deleted);
        assert!(store.get(&DocId::from_path("dir/b")).unwrap().unwrap().deleted);

        let new_a = store.get(&DocId::from_path("dir2/a")).unwrap().unwrap();
        let new_b = store.get(&DocId::from_path("dir2/b")).unwrap().unwrap();
        assert!(!new_a.deleted && new_a.checksum() == Some("A"));
        assert!(!new_b.deleted && new_b.checksum() == Some("B"));
    }

    /// S6 — trash aborts when other side updated a child.
    #[test]
    fn trash_folder_aborts_when_descendant_diverged() {
        let mut store = MetadataStore::open_in_memory().unwrap();
        {
            let mut merge = Merge::new(&mut store);
            merge.put_folder(Side::Remote, folder("dir")).unwrap();
            merge.put_folder(Side::Local, folder("dir")).unwrap();
            merge.add_file(Side::Remote, file("dir/a", "A")).unwrap();
            merge.add_file(Side::Local, file("dir/a", "A")).unwrap();
            merge.add_file(Side::Remote, file("dir/b", "B")).unwrap();
            merge.add_file(Side::Local, file("dir/b", "B")).unwrap();
        }
        // Remote updates dir/a again without local observing it.
        {
            let mut merge = Merge::new(&mut store);
            merge.update_file(Side::Remote, file("dir/a", "A2")).unwrap();
        }

        let mut merge = Merge::new(&mut store);
        merge.trash_folder(Side::Local, &DocId::from_path("dir")).unwrap();
        drop(merge);

        let dir = store.get(&DocId::from_path("dir")).unwrap().unwrap();
        assert!(!dir.trashed);
        assert!(dir.sides.get(Side::Local).is_none());

        assert!(!store.get(&DocId::from_path("dir/a")).unwrap().unwrap().deleted);
        assert!(!store.get(&DocId::from_path("dir/b")).unwrap().unwrap().deleted);
    }

    #[test]
    fn conflict_path_truncates_long_basenames() {
        let long_name = "a".repeat(250);
        let path = conflict_path(&format!("dir/{long_name}.txt"));
        let name = basename(&path);
        let stem_len = name.find("-conflict-").unwrap();
        assert!(stem_len <= MAX_BASENAME_CHARS);
        assert!(name.ends_with(".txt"));
    }

    #[test]
    fn delete_folder_recursively_tombstones_all_descendants() {
        let mut store = MetadataStore::open_in_memory().unwrap();
        {
            let mut merge = Merge::new(&mut store);
            merge.put_folder(Side::Local, folder("dir")).unwrap();
            merge.put_folder(Side::Remote, folder("dir")).unwrap();
            merge.add_file(Side::Local, file("dir/a", "A")).unwrap();
            merge.add_file(Side::Remote, file("dir/a", "A")).unwrap();
        }

        let mut merge = Merge::new(&mut store);
        merge.delete_folder(Side::Local, &DocId::from_path("dir")).unwrap();
        drop(merge);

        assert!(store.get(&DocId::from_path("dir")).unwrap().unwrap().deleted);
        assert!(store.get(&DocId::from_path("dir/a")).unwrap().unwrap().deleted);
    }
}
