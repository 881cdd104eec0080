// Layer 1 - Trade Ingestion
// The time-ordered trade log and the simulated trade feed

pub mod trade_log;
pub mod simulator;

// Re-export commonly used items for convenience
pub use trade_log::{TradeLog, TradeLogError, TradeLogStats, Placement};
pub use simulator::TradeSimulator;
