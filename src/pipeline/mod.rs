pub mod process;
pub mod stages;
pub mod tools;

pub use process::{process_video, ProcessOptions, ProcessOutcome, ProcessProviders, ProcessResult};
