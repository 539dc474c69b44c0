pub mod engine;
pub mod state;

pub use engine::{discover_video_files_excluding, IndexingScheduler, ProcessFolderOutcome};
pub use state::SharedIndexingState;
