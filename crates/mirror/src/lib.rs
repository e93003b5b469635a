//! Server-side mirror of the project's source files.
//!
//! ```text
//! editor/file events
//!     │
//!     ├──> Change Watcher (per-file trailing-edge debounce)
//!     │      └─> Converter Gateway
//!     │            └─> Representation Cache
//!     │
//!     └──> outbound peer messages (UPDATE_REPR, CHECK_RULES_FOR_FILE,
//!          PROJECT_HIERARCHY, FILE_CHANGE)
//! ```
//!
//! The cache holds the last-known representation per file path; it is
//! repopulated wholesale on handshake and incrementally by the watcher.
//! Conversion failures are per-file and non-fatal: the
//! cache keeps the last good value and the watcher keeps running.

mod cache;
mod doi;
mod hierarchy;
mod scan;
mod watcher;

pub use cache::ReprCache;
pub use doi::DoiLog;
pub use hierarchy::{build_hierarchy, HierarchyNode};
pub use scan::scan_project;
pub use watcher::{ChangeWatcher, FileEvent, WatcherConfig};

use thiserror::Error;

pub type Result<T> = std::result::Result<T, MirrorError>;

#[derive(Error, Debug)]
pub enum MirrorError {
    #[error("watcher init failed: {0}")]
    Watch(#[from] notify::Error),
}
