//! Top-level wiring (§5): load configuration, take the workspace lock,
//! build the `MetadataStore`/`ChecksumQueue`/`Prep`/`LocalWatcher` stack,
//! and run it until a shutdown signal arrives.

use std::sync::Arc;

use anyhow::{Context, Result};

use crate::checksum_queue::ChecksumQueue;
use crate::config::EngineConfig;
use crate::filters::SyncFilters;
use crate::local_watcher::{spawn_watcher, LocalWatcher};
use crate::metadata_store::MetadataStore;
use crate::prep::Prep;
use crate::workspace::WorkspaceLock;

/// Holds everything a running engine needs alive. Dropping it releases the
/// workspace lock.
pub struct Engine {
    _lock: WorkspaceLock,
    watcher: Arc<LocalWatcher>,
}

impl Engine {
    /// Load `cfg`, take the workspace lock, and start the watcher + prep
    /// pipeline. Returns once everything is constructed; the caller drives
    /// it to completion with `run`.
    pub async fn start(cfg: &EngineConfig) -> Result<(Self, tokio::task::JoinHandle<()>)> {
        let lock = WorkspaceLock::try_lock(&cfg.sync_path)
            .with_context(|| format!("lock workspace {}", cfg.sync_path.display()))?;

        let db_path = cfg.sync_path.join(".data").join("metadata.sqlite");
        let store = Arc::new(std::sync::Mutex::new(
            MetadataStore::open(&db_path).with_context(|| format!("open {}", db_path.display()))?,
        ));

        let filters = SyncFilters::load(&cfg.sync_path, &cfg.ignored_patterns)?;
        let (checksums, checksum_join) = ChecksumQueue::spawn();
        let (prep, prep_handle) = Prep::new(store.clone());
        let prep_join = tokio::spawn(prep.run());

        let watcher = LocalWatcher::new(
            cfg.sync_path.clone(),
            store,
            checksums,
            prep_handle,
            filters,
        );

        let (_raw_watcher, rx) = spawn_watcher(&cfg.sync_path)?;
        let watcher_for_run = watcher.clone();
        let run_join = tokio::spawn(async move {
            if let Err(err) = watcher_for_run.run(rx).await {
                crate::logging::error(&format!("watcher stopped: {err}"));
            }
            // Hold onto the notify watcher for as long as the run loop is
            // alive so the OS-level watch isn't torn down early.
            drop(_raw_watcher);
        });

        // Keep handles alive for the caller's shutdown sequence without
        // leaking them as warnings.
        let _ = checksum_join;
        let _ = prep_join;

        Ok((
            Engine {
                _lock: lock,
                watcher,
            },
            run_join,
        ))
    }

    /// Request a graceful stop: flush pending deletions and give
    /// outstanding work `§5`'s grace period to land.
    pub async fn stop(&self) {
        self.watcher.stop().await;
    }
}

/// Run the engine until ctrl-c, returning once everything has stopped.
pub async fn run_until_shutdown(cfg: &EngineConfig) -> Result<()> {
    let (engine, run_join) = Engine::start(cfg).await?;
    crate::logging::info(format!(
        "engine start version={} sync_path={}",
        env!("CARGO_PKG_VERSION"),
        cfg.sync_path.display()
    ));

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            crate::logging::info("shutdown signal received");
        }
        res = run_join => {
            if let Err(err) = res {
                crate::logging::error(&format!("watcher task panicked: {err}"));
            }
        }
    }

    engine.stop().await;
    Ok(())
}
