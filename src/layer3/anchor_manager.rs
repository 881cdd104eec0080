// Anchor Manager - Session VWAP plus user-anchored VWAP tracks
// Routes each processed trade to every accumulator whose window includes it

use std::fmt;
use thiserror::Error;
use tracing::{debug, info};

use crate::core::config::BandConfig;
use crate::core::types::{AnchorPreset, SeriesKey, SeriesPoint, Trade};
use crate::layer1::trade_log::TradeLog;
use crate::layer3::accumulator::Accumulator;
use crate::layer3::bands::{band_series, classify_position, BandPoint, VwapPosition};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum AnchorError {
    #[error("Unknown anchor: {0}")]
    UnknownAnchor(String),
    #[error("Anchor already exists: {0}")]
    DuplicateAnchor(String),
    #[error("Invalid anchor: {reason}")]
    InvalidAnchor { reason: String },
}

/// One accumulator with the series it has produced.
/// `preset == None` is the session track, whose window holds every trade.
#[derive(Debug, Clone)]
struct Track {
    preset: Option<AnchorPreset>,
    accumulator: Accumulator,
    series: Vec<SeriesPoint>,
}

impl Track {
    fn session() -> Self {
        Self { preset: None, accumulator: Accumulator::new(), series: Vec::new() }
    }

    fn anchored(preset: AnchorPreset) -> Self {
        Self { preset: Some(preset), accumulator: Accumulator::new(), series: Vec::new() }
    }

    fn key(&self) -> SeriesKey {
        match &self.preset {
            Some(preset) => SeriesKey::Anchor(preset.id.clone()),
            None => SeriesKey::Session,
        }
    }

    fn start_time(&self) -> f64 {
        self.preset.as_ref().map_or(f64::NEG_INFINITY, |p| p.start_time)
    }

    fn includes(&self, trade: &Trade) -> bool {
        self.preset.as_ref().map_or(true, |p| p.covers(trade.time))
    }

    fn fold(&mut self, trade: &Trade) {
        let point = self.accumulator.fold(trade);
        self.series.push(point);
    }

    fn clear(&mut self) {
        self.accumulator.reset();
        self.series.clear();
    }

    /// Reset, then fold every processed trade inside the window in time order
    fn refill(&mut self, log: &TradeLog, processed: usize) -> usize {
        self.clear();
        let from = log.lower_bound(self.start_time()).min(processed);
        for trade in log.iter_from(from).take(processed - from) {
            self.fold(trade);
        }
        self.series.len()
    }
}

/// Anchor manager statistics
#[derive(Debug, Clone, Default)]
pub struct AnchorManagerStats {
    pub anchor_count: usize,
    pub trades_routed: u64,
    pub folds: u64,
    pub backfilled_points: u64,
    pub rebuilds: u64,
    pub session_points: usize,
}

impl fmt::Display for AnchorManagerStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "AnchorManager(anchors={}, routed={}, folds={}, backfilled={}, rebuilds={})",
            self.anchor_count, self.trades_routed, self.folds, self.backfilled_points, self.rebuilds
        )
    }
}

pub struct AnchorManager {
    session: Track,
    anchors: Vec<Track>,  // creation order

    trades_routed: u64,
    folds: u64,
    backfilled_points: u64,
    rebuilds: u64,
}

impl AnchorManager {
    pub fn new() -> Self {
        Self {
            session: Track::session(),
            anchors: Vec::new(),
            trades_routed: 0,
            folds: 0,
            backfilled_points: 0,
            rebuilds: 0,
        }
    }

    fn track(&self, key: &SeriesKey) -> Result<&Track, AnchorError> {
        match key {
            SeriesKey::Session => Ok(&self.session),
            SeriesKey::Anchor(id) => self
                .anchors
                .iter()
                .find(|t| t.preset.as_ref().is_some_and(|p| &p.id == id))
                .ok_or_else(|| AnchorError::UnknownAnchor(id.clone())),
        }
    }

    fn track_mut(&mut self, key: &SeriesKey) -> Result<&mut Track, AnchorError> {
        match key {
            SeriesKey::Session => Ok(&mut self.session),
            SeriesKey::Anchor(id) => self
                .anchors
                .iter_mut()
                .find(|t| t.preset.as_ref().is_some_and(|p| &p.id == id))
                .ok_or_else(|| AnchorError::UnknownAnchor(id.clone())),
        }
    }

    /// Create an anchor and backfill it from the first `processed` trades of the log.
    /// Returns the number of points backfilled.
    pub fn add_anchor(&mut self, preset: AnchorPreset, log: &TradeLog, processed: usize) -> Result<usize, AnchorError> {
        if preset.id.trim().is_empty() {
            return Err(AnchorError::InvalidAnchor { reason: "anchor id must not be empty".to_string() });
        }
        // The id must parse back to this anchor's SeriesKey
        if preset.id.trim() != preset.id {
            return Err(AnchorError::InvalidAnchor {
                reason: format!("anchor id must not have surrounding whitespace: {:?}", preset.id),
            });
        }
        if preset.id.eq_ignore_ascii_case("session") {
            return Err(AnchorError::InvalidAnchor {
                reason: format!("anchor id {:?} is reserved for the session series", preset.id),
            });
        }
        if !preset.start_time.is_finite() {
            return Err(AnchorError::InvalidAnchor {
                reason: format!("start time must be finite, got {}", preset.start_time),
            });
        }
        if self.contains(&preset.id) {
            return Err(AnchorError::DuplicateAnchor(preset.id));
        }

        let mut track = Track::anchored(preset);
        let backfilled = track.refill(log, processed.min(log.len()));
        self.backfilled_points += backfilled as u64;
        self.folds += backfilled as u64;

        if let Some(preset) = &track.preset {
            info!(
                anchor_id = %preset.id,
                label = %preset.label,
                start_time = preset.start_time,
                backfilled = backfilled,
                "Anchor created"
            );
        }
        self.anchors.push(track);
        Ok(backfilled)
    }

    /// Discard an anchor with its accumulator and series
    pub fn remove_anchor(&mut self, id: &str) -> Result<AnchorPreset, AnchorError> {
        let index = self
            .anchors
            .iter()
            .position(|t| t.preset.as_ref().is_some_and(|p| p.id == id))
            .ok_or_else(|| AnchorError::UnknownAnchor(id.to_string()))?;

        let track = self.anchors.remove(index);
        info!(anchor_id = %id, points = track.series.len(), "Anchor removed");
        track
            .preset
            .ok_or_else(|| AnchorError::UnknownAnchor(id.to_string()))
    }

    /// Fold a newly processed trade into the session and every anchor whose window includes it.
    /// Returns the number of tracks touched.
    pub fn on_trade_processed(&mut self, trade: &Trade) -> usize {
        self.trades_routed += 1;
        self.session.fold(trade);
        let mut touched = 1;

        for track in self.anchors.iter_mut().filter(|t| t.includes(trade)) {
            track.fold(trade);
            touched += 1;
        }

        self.folds += touched as u64;
        debug!(sequence = trade.sequence, time = trade.time, tracks = touched, "Trade folded");
        touched
    }

    /// Recompute one track from scratch over the processed prefix
    pub fn rebuild(&mut self, key: &SeriesKey, log: &TradeLog, processed: usize) -> Result<usize, AnchorError> {
        let processed = processed.min(log.len());
        let points = self.track_mut(key)?.refill(log, processed);
        self.rebuilds += 1;
        self.folds += points as u64;
        Ok(points)
    }

    /// Keys of every track whose window includes a trade at `time`, session first
    pub fn keys_covering(&self, time: f64) -> Vec<SeriesKey> {
        std::iter::once(&self.session)
            .chain(self.anchors.iter())
            .filter(|t| time >= t.start_time())
            .map(Track::key)
            .collect()
    }

    /// Clear every accumulator and series; presets are kept
    pub fn reset_all(&mut self) {
        self.session.clear();
        for track in &mut self.anchors {
            track.clear();
        }
        debug!(anchors = self.anchors.len(), "All tracks cleared");
    }

    pub fn series_for(&self, key: &SeriesKey) -> Result<&[SeriesPoint], AnchorError> {
        Ok(&self.track(key)?.series)
    }

    pub fn latest(&self, key: &SeriesKey) -> Result<Option<SeriesPoint>, AnchorError> {
        Ok(self.track(key)?.series.last().copied())
    }

    pub fn bands_for(&self, key: &SeriesKey, config: &BandConfig) -> Result<Vec<BandPoint>, AnchorError> {
        Ok(band_series(&self.track(key)?.series, config))
    }

    /// Where `price` sits against the latest point of a track; `None` before any data
    pub fn position_of(&self, key: &SeriesKey, price: f64, config: &BandConfig) -> Result<Option<VwapPosition>, AnchorError> {
        Ok(self
            .latest(key)?
            .map(|point| classify_position(price, &point, config)))
    }

    pub fn contains(&self, id: &str) -> bool {
        self.anchors
            .iter()
            .any(|t| t.preset.as_ref().is_some_and(|p| p.id == id))
    }

    pub fn preset(&self, id: &str) -> Option<&AnchorPreset> {
        self.anchors
            .iter()
            .filter_map(|t| t.preset.as_ref())
            .find(|p| p.id == id)
    }

    /// Anchor presets in creation order
    pub fn anchors(&self) -> impl Iterator<Item = &AnchorPreset> {
        self.anchors.iter().filter_map(|t| t.preset.as_ref())
    }

    /// Every series key, session first
    pub fn keys(&self) -> Vec<SeriesKey> {
        std::iter::once(&self.session)
            .chain(self.anchors.iter())
            .map(Track::key)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.anchors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.anchors.is_empty()
    }

    pub fn get_stats(&self) -> AnchorManagerStats {
        AnchorManagerStats {
            anchor_count: self.anchors.len(),
            trades_routed: self.trades_routed,
            folds: self.folds,
            backfilled_points: self.backfilled_points,
            rebuilds: self.rebuilds,
            session_points: self.session.series.len(),
        }
    }
}

impl Default for AnchorManager {
    fn default() -> Self {
        Self::new()
    }
}
