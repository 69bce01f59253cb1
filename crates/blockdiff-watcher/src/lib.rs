//! File watching for workspace documents

pub mod watcher;

pub use watcher::{FileWatcher, WatchEvent, WatcherService};
