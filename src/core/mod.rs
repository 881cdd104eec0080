// Core Module - Foundational types, config, logging, events

pub mod types;
pub mod config;
pub mod logger;
pub mod events;

// Re-export commonly used items for convenience
pub use types::*;
pub use config::{
    ReplayConfig, BandConfig, SimulationConfig, LoggingConfig,
    ConfigManager, ConfigSummary, ConfigError, get_config,
};
pub use logger::{setup_logging, setup_logging_from};
pub use events::{LabEvent, LabEventKind, EventPriority, EventBus, EventBusStatsSnapshot};
