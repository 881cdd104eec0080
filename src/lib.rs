// VWAP Laboratory Engine
// Session and anchored VWAP series with deviation bands over an editable, replayable trade log
//
// core   - types, config, logging, events
// layer1 - trade log and simulated feed
// layer2 - replay scheduler, consistency resolver, command surface, playback
// layer3 - accumulators, anchor manager, bands

pub mod core;
pub mod layer1;
pub mod layer2;
pub mod layer3;

pub use crate::core::{
    AnchorColor, AnchorPreset, NewTrade, Progress, ReplayState, SeriesKey, SeriesPoint, Trade, TradeSource,
    MarketRegime, ConfigManager, get_config, setup_logging, EventBus, LabEvent, LabEventKind,
};
pub use crate::layer1::{TradeLog, TradeSimulator};
pub use crate::layer2::{Command, LabError, Outcome, VwapLab};
pub use crate::layer3::{AnchorManager, VwapPosition};
