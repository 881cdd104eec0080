// Layer 2 - Replay & Commands
// Drives the processed prefix of the trade log and exposes the lab's command surface

pub mod scheduler;
pub mod resolver;
pub mod scenario;
pub mod playback;
pub mod metrics;

// Re-export commonly used items
pub use scheduler::{ReplayScheduler, SchedulerError, SchedulerStats};
pub use resolver::{ConsistencyResolver, Resolution, ResolverStats};
pub use scenario::{
    VwapLab, Command, Outcome, Accepted, LabError,
    Frame, SeriesFrame,
};
pub use playback::{run_playback, spawn_playback, PlaybackSummary};
pub use metrics::LabMetrics;
