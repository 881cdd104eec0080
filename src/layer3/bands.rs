// Deviation Bands - Envelopes of k standard deviations around a VWAP series
// Also classifies a price against the bands

use serde::Serialize;

use crate::core::config::BandConfig;
use crate::core::types::SeriesPoint;

/// Position of a price relative to VWAP and its outermost band
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum VwapPosition {
    AboveUpper,   // Above the outermost upper band
    Above,        // Above VWAP but inside the bands
    At,           // At VWAP (within tolerance)
    Below,        // Below VWAP but inside the bands
    BelowLower,   // Below the outermost lower band
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Band {
    pub multiplier: f64,
    pub lower: f64,
    pub upper: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BandPoint {
    pub time: f64,
    pub vwap: f64,
    pub bands: Vec<Band>,
}

impl BandPoint {
    pub fn from_point(point: &SeriesPoint, config: &BandConfig) -> Self {
        let bands = config
            .multipliers
            .iter()
            .map(|&multiplier| Band {
                multiplier,
                lower: point.lower(multiplier),
                upper: point.upper(multiplier),
            })
            .collect();

        Self {
            time: point.time,
            vwap: point.vwap,
            bands,
        }
    }
}

/// Band envelope for every point of a series
pub fn band_series(points: &[SeriesPoint], config: &BandConfig) -> Vec<BandPoint> {
    points.iter().map(|p| BandPoint::from_point(p, config)).collect()
}

/// Classify `price` against a point's VWAP and outermost band
pub fn classify_position(price: f64, point: &SeriesPoint, config: &BandConfig) -> VwapPosition {
    let outer = config.outer_multiplier();
    let upper_band = point.upper(outer);
    let lower_band = point.lower(outer);
    let tolerance = point.vwap.abs() * (config.at_tolerance_pct / 100.0);

    if price > upper_band && price > point.vwap + tolerance {
        VwapPosition::AboveUpper
    } else if price > point.vwap + tolerance {
        VwapPosition::Above
    } else if price >= point.vwap - tolerance {
        VwapPosition::At
    } else if price > lower_band {
        VwapPosition::Below
    } else {
        VwapPosition::BelowLower
    }
}
