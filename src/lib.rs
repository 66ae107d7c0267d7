pub mod checksum_queue;
pub mod config;
pub mod document;
pub mod engine;
pub mod error;
pub mod filters;
pub mod local_watcher;
pub mod logging;
pub mod merge;
pub mod metadata_store;
pub mod prep;
pub mod remote;
pub mod workspace;
