// Layer 3 - Aggregators
// Running VWAP statistics per anchor window and the bands derived from them

pub mod accumulator;
pub mod bands;
pub mod anchor_manager;

pub use accumulator::Accumulator;
pub use bands::{Band, BandPoint, VwapPosition, band_series, classify_position};
pub use anchor_manager::{AnchorManager, AnchorManagerStats, AnchorError};
