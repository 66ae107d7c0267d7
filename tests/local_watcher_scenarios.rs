//! Black-box end-to-end scenarios (§8) driving a real `notify` watcher
//! against a real temp directory, through `LocalWatcher` and `Prep` into a
//! real `MetadataStore`. These exercise the full local pipeline the unit
//! tests in `local_watcher.rs`/`merge.rs` can only simulate piecemeal.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use twinsync::checksum_queue::ChecksumQueue;
use twinsync::document::DocId;
use twinsync::filters::SyncFilters;
use twinsync::local_watcher::{spawn_watcher, LocalWatcher};
use twinsync::metadata_store::MetadataStore;
use twinsync::prep::Prep;

struct Harness {
    root: PathBuf,
    store: Arc<Mutex<MetadataStore>>,
}

async fn start(prefix: &str) -> Harness {
    let mut root = std::env::temp_dir();
    root.push(format!(
        "twinsync-scenario-{prefix}-{}",
        std::process::id()
    ));
    let _ = fs::remove_dir_all(&root);
    fs::create_dir_all(&root).unwrap();

    let store = Arc::new(Mutex::new(MetadataStore::open_in_memory().unwrap()));
    let filters = SyncFilters::load(&root, &[]).unwrap();
    let (checksums, _checksum_join) = ChecksumQueue::spawn();
    let (prep, handle) = Prep::new(store.clone());
    tokio::spawn(prep.run());

    let watcher = LocalWatcher::new(root.clone(), store.clone(), checksums, handle, filters);
    let (raw_watcher, rx) = spawn_watcher(&root).unwrap();
    tokio::spawn(async move {
        let _ = watcher.run(rx).await;
        drop(raw_watcher);
    });

    // Let the initial scan/watch settle before the test drives file events.
    tokio::time::sleep(Duration::from_millis(200)).await;

    Harness { root, store }
}

impl Harness {
    fn doc(&self, rel: &str) -> Option<twinsync::document::Document> {
        self.store
            .lock()
            .unwrap()
            .get(&DocId::from_path(rel))
            .unwrap()
    }

    fn write(&self, rel: &str, content: &str) {
        let path = self.root.join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, content).unwrap();
    }

    fn rename(&self, from: &str, to: &str) {
        fs::rename(self.root.join(from), self.root.join(to)).unwrap();
    }

    fn remove(&self, rel: &str) {
        fs::remove_file(self.root.join(rel)).unwrap();
    }
}

fn checksum_of(path: &Path) -> String {
    use base64::engine::general_purpose::STANDARD as BASE64;
    use base64::Engine;
    let data = fs::read(path).unwrap();
    BASE64.encode(md5::compute(&data).0)
}

#[tokio::test(flavor = "multi_thread")]
async fn s2_simple_rename_preserves_checksum_and_tombstones_the_old_id() {
    let h = start("s2").await;
    h.write("a.txt", "X");
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert!(h.doc("a.txt").is_some(), "a.txt should have been scanned in");

    h.rename("a.txt", "b.txt");
    tokio::time::sleep(Duration::from_millis(800)).await;

    let old = h.doc("a.txt").expect("tombstone for a.txt must remain");
    assert!(old.deleted, "a.txt should be tombstoned, not live");
    let new = h.doc("b.txt").expect("b.txt should be live");
    assert!(!new.deleted);
    assert_eq!(
        new.checksum().map(|c| c.to_string()),
        Some(checksum_of(&h.root.join("b.txt")))
    );
    assert_eq!(old.move_to.as_ref(), Some(&new.id));
}

#[tokio::test(flavor = "multi_thread")]
async fn s3_delete_then_unrelated_add_does_not_infer_a_move() {
    let h = start("s3").await;
    h.write("a", "X");
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert!(h.doc("a").is_some());

    h.remove("a");
    // Past the unlink-file deletion timer (1250ms initial delay + retries)
    // plus a margin, so the delete commits before the unrelated add lands.
    tokio::time::sleep(Duration::from_millis(2000)).await;

    let deleted = h.doc("a").expect("a should be tombstoned");
    assert!(deleted.deleted);
    assert!(
        deleted.move_to.is_none(),
        "an unrelated later add must not be inferred as a's destination"
    );

    h.write("b", "Y");
    tokio::time::sleep(Duration::from_millis(500)).await;

    let added = h.doc("b").expect("b should be live");
    assert!(!added.deleted);
}
