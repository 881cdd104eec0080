// Accumulator - Running VWAP and volume-weighted standard deviation
// O(1) per trade; variance via the weighted Welford update

use serde::Serialize;

use crate::core::types::{SeriesPoint, Trade};

/// Running statistics for one trade window.
///
/// `vwap` is the running volume-weighted mean, equal to `Σ(p·v) / Σv` but kept as
/// an incremental blend of prices so it stays finite where the raw notional sum would
/// overflow. `m2 = Σ v·(p - mean)²` is updated incrementally, which stays
/// accurate where `E[p²] - E[p]²` on large cumulative sums would cancel.
///
/// `sum_v` is bounded by the trade log, which refuses a trade that would make
/// its total volume non-finite.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Accumulator {
    sum_v: f64,
    mean: f64,
    m2: f64,
    count: u64,
    last_time: f64,
    first_price: Option<f64>,
    distinct_prices: bool,
}

impl Accumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one trade into the window and return the resulting point
    pub fn fold(&mut self, trade: &Trade) -> SeriesPoint {
        let price = trade.price;
        let weight = trade.volume;

        let total = self.sum_v + weight;
        let share = weight / total;
        let delta = price - self.mean;
        self.mean = if delta.is_finite() {
            self.mean + delta * share
        } else {
            // Opposite-signed prices near f64::MAX: blend without forming the difference
            self.mean * (1.0 - share) + price * share
        };
        self.m2 += weight * delta * (price - self.mean);

        self.sum_v = total;
        self.count += 1;
        self.last_time = trade.time;

        match self.first_price {
            None => self.first_price = Some(price),
            Some(first) if first != price => self.distinct_prices = true,
            Some(_) => {}
        }

        self.snapshot()
    }

    /// `None` until some volume has been folded
    pub fn vwap(&self) -> Option<f64> {
        if self.sum_v > 0.0 {
            Some(self.mean)
        } else {
            None
        }
    }

    /// Volume-weighted population standard deviation; 0 until two distinct prices
    pub fn std_dev(&self) -> f64 {
        if !self.distinct_prices || self.sum_v <= 0.0 {
            return 0.0;
        }
        // Rounding can leave a tiny negative residue; an overflowed m2 reads as NaN and clamps to 0
        let variance = (self.m2 / self.sum_v).max(0.0);
        let sd = variance.sqrt();
        if sd.is_finite() {
            sd
        } else {
            0.0
        }
    }

    /// Current state as a point. An empty accumulator reports `SeriesPoint::EMPTY`.
    pub fn snapshot(&self) -> SeriesPoint {
        match self.vwap() {
            Some(vwap) => SeriesPoint {
                time: self.last_time,
                vwap,
                std_dev: self.std_dev(),
                cumulative_volume: self.sum_v,
            },
            None => SeriesPoint::EMPTY,
        }
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn cumulative_volume(&self) -> f64 {
        self.sum_v
    }

    pub fn last_time(&self) -> f64 {
        self.last_time
    }

    pub fn has_data(&self) -> bool {
        self.sum_v > 0.0
    }
}
