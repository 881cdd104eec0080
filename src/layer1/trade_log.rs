// Trade Log - Time-ordered store of every trade in the scenario
// Single source of truth read by the replay scheduler and the anchor manager

use ordered_float::OrderedFloat;
use std::fmt;
use thiserror::Error;
use tracing::{debug, warn};

use crate::core::types::{NewTrade, Trade, TradeSource};

/// Sort key: time first, insertion sequence breaks ties
type TimeKey = (OrderedFloat<f64>, u64);

fn key_of(trade: &Trade) -> TimeKey {
    (OrderedFloat(trade.time), trade.sequence)
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum TradeLogError {
    #[error("Invalid trade: {reason}")]
    InvalidTrade { reason: String },
}

impl TradeLogError {
    fn invalid(reason: impl Into<String>) -> Self {
        TradeLogError::InvalidTrade { reason: reason.into() }
    }
}

/// Where an inserted trade landed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Placement {
    pub sequence: u64,
    pub index: usize,
}

/// Trade log statistics
#[derive(Debug, Clone, Default)]
pub struct TradeLogStats {
    pub len: usize,
    pub manual_count: u64,
    pub simulated_count: u64,
    pub rejected_count: u64,
    pub out_of_order_count: u64,
    pub next_sequence: u64,
}

impl fmt::Display for TradeLogStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "TradeLog(len={}, manual={}, simulated={}, rejected={}, out_of_order={})",
            self.len, self.manual_count, self.simulated_count, self.rejected_count, self.out_of_order_count
        )
    }
}

/// Append-capable, order-preserving trade store.
///
/// Trades are kept in time order with the insertion sequence as tie-break, so
/// index `i` is always the `i`-th trade a replay would deliver. The sequence is
/// assigned here and grows strictly with every accepted trade.
pub struct TradeLog {
    trades: Vec<Trade>,
    next_sequence: u64,
    manual_count: u64,
    simulated_count: u64,
    rejected_count: u64,
    out_of_order_count: u64,
    total_volume: f64,
}

impl TradeLog {
    pub fn new() -> Self {
        Self::with_capacity(1024)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            trades: Vec::with_capacity(capacity),
            next_sequence: 1,
            manual_count: 0,
            simulated_count: 0,
            rejected_count: 0,
            out_of_order_count: 0,
            total_volume: 0.0,
        }
    }

    /// Every window is a subset of the log, so bounding the log's total volume
    /// keeps every accumulator's cumulative volume finite
    fn validate(&self, draft: &NewTrade) -> Result<(), TradeLogError> {
        if !draft.volume.is_finite() || draft.volume <= 0.0 {
            return Err(TradeLogError::invalid(format!("volume must be positive and finite, got {}", draft.volume)));
        }
        if !draft.price.is_finite() {
            return Err(TradeLogError::invalid(format!("price must be finite, got {}", draft.price)));
        }
        if !draft.time.is_finite() {
            return Err(TradeLogError::invalid(format!("time must be finite, got {}", draft.time)));
        }
        if !(draft.price * draft.volume).is_finite() {
            return Err(TradeLogError::invalid(format!(
                "notional overflows: {} x {}",
                draft.price, draft.volume
            )));
        }
        if !(self.total_volume + draft.volume).is_finite() {
            return Err(TradeLogError::invalid(format!(
                "total volume would overflow: {} + {}",
                self.total_volume, draft.volume
            )));
        }
        Ok(())
    }

    /// Validate the draft and turn it into a trade with the next sequence
    fn admit(&mut self, draft: NewTrade) -> Result<Trade, TradeLogError> {
        if let Err(err) = self.validate(&draft) {
            self.rejected_count += 1;
            warn!(error = %err, source = %draft.source, "Trade rejected");
            return Err(err);
        }

        let trade = Trade {
            sequence: self.next_sequence,
            time: draft.time,
            price: draft.price,
            volume: draft.volume,
            source: draft.source,
        };
        self.next_sequence += 1;
        self.total_volume += trade.volume;
        match trade.source {
            TradeSource::Manual => self.manual_count += 1,
            TradeSource::Simulated => self.simulated_count += 1,
        }
        Ok(trade)
    }

    /// Index at which a trade with this key belongs
    fn slot_for(&self, key: TimeKey) -> usize {
        self.trades.partition_point(|t| key_of(t) < key)
    }

    fn place(&mut self, trade: Trade) -> usize {
        let key = key_of(&trade);
        let in_order = self.trades.last().map_or(true, |last| key_of(last) < key);
        if in_order {
            self.trades.push(trade);
            self.trades.len() - 1
        } else {
            self.out_of_order_count += 1;
            let index = self.slot_for(key);
            self.trades.insert(index, trade);
            index
        }
    }

    /// Append a trade and return its sequence.
    /// Never rejects on time: a trade older than the tail is placed in time order.
    pub fn append(&mut self, draft: NewTrade) -> Result<u64, TradeLogError> {
        let trade = self.admit(draft)?;
        let sequence = trade.sequence;
        self.place(trade);
        Ok(sequence)
    }

    /// Insert a trade at its time-ordered position and report the index it landed at
    pub fn insert_and_reorder_by_time(&mut self, draft: NewTrade) -> Result<Placement, TradeLogError> {
        let trade = self.admit(draft)?;
        let sequence = trade.sequence;
        let index = self.place(trade);
        debug!(sequence = sequence, index = index, len = self.trades.len(), "Trade inserted");
        Ok(Placement { sequence, index })
    }

    /// Trades from `index` to the end in time order.
    /// The iterator is `Clone`, so a caller can restart it cheaply.
    pub fn iter_from(&self, index: usize) -> std::slice::Iter<'_, Trade> {
        let start = index.min(self.trades.len());
        self.trades[start..].iter()
    }

    /// Index of the first trade with `time >= time`
    pub fn lower_bound(&self, time: f64) -> usize {
        self.trades.partition_point(|t| t.time < time)
    }

    pub fn get(&self, index: usize) -> Option<&Trade> {
        self.trades.get(index)
    }

    /// Time-order index of the trade with this sequence
    pub fn position_of(&self, sequence: u64) -> Option<usize> {
        self.trades.iter().position(|t| t.sequence == sequence)
    }

    pub fn trades(&self) -> &[Trade] {
        &self.trades
    }

    pub fn len(&self) -> usize {
        self.trades.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trades.is_empty()
    }

    pub fn first_time(&self) -> Option<f64> {
        self.trades.first().map(|t| t.time)
    }

    pub fn total_volume(&self) -> f64 {
        self.total_volume
    }

    pub fn last_time(&self) -> Option<f64> {
        self.trades.last().map(|t| t.time)
    }

    /// Drop every trade and restart sequencing
    pub fn clear(&mut self) {
        self.trades.clear();
        self.next_sequence = 1;
        self.manual_count = 0;
        self.simulated_count = 0;
        self.rejected_count = 0;
        self.out_of_order_count = 0;
        self.total_volume = 0.0;
    }

    pub fn get_stats(&self) -> TradeLogStats {
        TradeLogStats {
            len: self.trades.len(),
            manual_count: self.manual_count,
            simulated_count: self.simulated_count,
            rejected_count: self.rejected_count,
            out_of_order_count: self.out_of_order_count,
            next_sequence: self.next_sequence,
        }
    }
}

impl Default for TradeLog {
    fn default() -> Self {
        Self::new()
    }
}
