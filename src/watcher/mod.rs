pub mod events;
pub mod manager;

pub use events::{deduplicate_events, ChangeKind, FileChangeEvent};
pub use manager::{FileSystemWatcher, FileWatcherManager, WatcherAction};
