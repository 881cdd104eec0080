// Core Type Definitions for the VWAP Laboratory
// Trades, anchors, series points and replay state shared by every layer

use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// Enums
// ============================================================================

/// Provenance of a trade in the log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TradeSource {
    Manual,
    Simulated,
}

impl fmt::Display for TradeSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TradeSource::Manual => write!(f, "MANUAL"),
            TradeSource::Simulated => write!(f, "SIMULATED"),
        }
    }
}

impl std::str::FromStr for TradeSource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "MANUAL" => Ok(TradeSource::Manual),
            "SIMULATED" => Ok(TradeSource::Simulated),
            _ => Err(format!("Invalid TradeSource: '{}'. Expected 'MANUAL' or 'SIMULATED'", s)),
        }
    }
}

/// Price behaviour of a simulated scenario
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MarketRegime {
    Ranging,
    TrendingUp,
    TrendingDown,
    Volatile,
}

impl fmt::Display for MarketRegime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Replay scheduler lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReplayState {
    Idle,
    Playing,
    Paused,
    Complete,
}

impl fmt::Display for ReplayState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

// ============================================================================
// Trade
// ============================================================================

/// A trade as stored in the log. Immutable once appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    pub sequence: u64,
    pub time: f64,
    pub price: f64,
    pub volume: f64,
    pub source: TradeSource,
}

impl Trade {
    pub fn notional(&self) -> f64 {
        self.price * self.volume
    }

    pub fn is_manual(&self) -> bool {
        self.source == TradeSource::Manual
    }
}

impl fmt::Display for Trade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Trade(seq={}, t={:.3}, price={:.4}, vol={:.4}, source={})",
            self.sequence, self.time, self.price, self.volume, self.source
        )
    }
}

/// Trade draft handed to the log; the log validates it and assigns the sequence
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NewTrade {
    pub time: f64,
    pub price: f64,
    pub volume: f64,
    pub source: TradeSource,
}

impl NewTrade {
    pub fn new(time: f64, price: f64, volume: f64, source: TradeSource) -> Self {
        Self { time, price, volume, source }
    }

    pub fn manual(time: f64, price: f64, volume: f64) -> Self {
        Self::new(time, price, volume, TradeSource::Manual)
    }

    pub fn simulated(time: f64, price: f64, volume: f64) -> Self {
        Self::new(time, price, volume, TradeSource::Simulated)
    }
}

// ============================================================================
// Anchors
// ============================================================================

/// Opaque display colour chosen by the UI
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AnchorColor(pub String);

impl AnchorColor {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AnchorColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnchorPreset {
    pub id: String,
    pub label: String,
    pub start_time: f64,
    pub color: AnchorColor,
}

impl AnchorPreset {
    pub fn new(id: impl Into<String>, label: impl Into<String>, start_time: f64, color: AnchorColor) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            start_time,
            color,
        }
    }

    /// Whether a trade at `time` falls inside this anchor's window
    pub fn covers(&self, time: f64) -> bool {
        time >= self.start_time
    }
}

impl fmt::Display for AnchorPreset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Anchor(id={}, label={}, start={:.3}, color={})",
            self.id, self.label, self.start_time, self.color
        )
    }
}

/// Addresses either the session series or one anchor's series
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SeriesKey {
    Session,
    Anchor(String),
}

impl SeriesKey {
    pub fn anchor(id: impl Into<String>) -> Self {
        SeriesKey::Anchor(id.into())
    }
}

impl fmt::Display for SeriesKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SeriesKey::Session => write!(f, "session"),
            SeriesKey::Anchor(id) => write!(f, "{}", id),
        }
    }
}

impl std::str::FromStr for SeriesKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err("Empty series key".to_string());
        }
        if trimmed.eq_ignore_ascii_case("session") {
            Ok(SeriesKey::Session)
        } else {
            Ok(SeriesKey::Anchor(trimmed.to_string()))
        }
    }
}

// ============================================================================
// SeriesPoint
// ============================================================================

/// One rendered point: state of an accumulator right after folding a trade
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SeriesPoint {
    pub time: f64,
    pub vwap: f64,
    pub std_dev: f64,
    pub cumulative_volume: f64,
}

impl SeriesPoint {
    /// The "no data" point reported by an empty accumulator
    pub const EMPTY: SeriesPoint = SeriesPoint {
        time: 0.0,
        vwap: 0.0,
        std_dev: 0.0,
        cumulative_volume: 0.0,
    };

    pub fn has_data(&self) -> bool {
        self.cumulative_volume > 0.0
    }

    pub fn upper(&self, multiplier: f64) -> f64 {
        self.vwap + multiplier * self.std_dev
    }

    pub fn lower(&self, multiplier: f64) -> f64 {
        self.vwap - multiplier * self.std_dev
    }
}

impl fmt::Display for SeriesPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "SeriesPoint(t={:.3}, vwap={:.4}, sd={:.4}, vol={:.2})",
            self.time, self.vwap, self.std_dev, self.cumulative_volume
        )
    }
}

// ============================================================================
// Progress
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Progress {
    pub processed: u64,
    pub total: u64,
    pub state: ReplayState,
}

impl Progress {
    pub fn fraction(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.processed as f64 / self.total as f64
        }
    }

    pub fn is_finished(&self) -> bool {
        self.processed == self.total
    }
}

impl fmt::Display for Progress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Progress({}/{}, state={})", self.processed, self.total, self.state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trade_source_round_trip() {
        assert_eq!("manual".parse::<TradeSource>().unwrap(), TradeSource::Manual);
        assert_eq!("SIMULATED".parse::<TradeSource>().unwrap(), TradeSource::Simulated);
        assert!("live".parse::<TradeSource>().is_err());
        assert_eq!(TradeSource::Manual.to_string(), "MANUAL");
    }

    #[test]
    fn test_series_key_parsing() {
        assert_eq!("session".parse::<SeriesKey>().unwrap(), SeriesKey::Session);
        assert_eq!("Session".parse::<SeriesKey>().unwrap(), SeriesKey::Session);
        assert_eq!("abc".parse::<SeriesKey>().unwrap(), SeriesKey::anchor("abc"));
        assert!("  ".parse::<SeriesKey>().is_err());
    }

    #[test]
    fn test_anchor_covers_start_inclusive() {
        let preset = AnchorPreset::new("a", "Open", 10.0, AnchorColor::new("#ff0000"));
        assert!(preset.covers(10.0));
        assert!(preset.covers(11.0));
        assert!(!preset.covers(9.999));
    }

    #[test]
    fn test_progress_fraction() {
        let p = Progress { processed: 0, total: 0, state: ReplayState::Idle };
        assert_eq!(p.fraction(), 0.0);
        assert!(p.is_finished());

        let p = Progress { processed: 1, total: 4, state: ReplayState::Playing };
        assert!((p.fraction() - 0.25).abs() < 1e-12);
        assert!(!p.is_finished());
    }

    #[test]
    fn test_series_point_bands() {
        let point = SeriesPoint { time: 1.0, vwap: 100.0, std_dev: 2.0, cumulative_volume: 5.0 };
        assert_eq!(point.upper(2.0), 104.0);
        assert_eq!(point.lower(1.0), 98.0);
        assert!(point.has_data());
        assert!(!SeriesPoint::EMPTY.has_data());
    }
}
