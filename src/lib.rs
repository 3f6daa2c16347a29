pub mod config;
pub mod models;
pub mod orchestration;
pub mod progress;
pub mod remote;
pub mod services;
pub mod storage;

// Re-export commonly used types for convenience.
pub use config::{PipelineSettings, ReviewConfig, SnowballDirection};
pub use models::{FinalStatus, Paper, ScreeningDecision, StatusCounts};
pub use orchestration::{Orchestrator, PipelineContext, Stage};
pub use progress::{ProgressSink, SilentProgress};
pub use storage::{PaperFilter, PaperStore};
