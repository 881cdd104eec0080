// Replay Scheduler - Cursor over the trade log and the replay state machine
// Idle -> Playing <-> Paused -> Complete; Complete holds until reset

use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::core::config::ReplayConfig;
use crate::core::types::{Progress, ReplayState, Trade};
use crate::layer1::trade_log::TradeLog;
use crate::layer3::anchor_manager::AnchorManager;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SchedulerError {
    #[error("Cannot {action} while {state}")]
    Misuse { state: ReplayState, action: String },
}

impl SchedulerError {
    fn misuse(state: ReplayState, action: impl Into<String>) -> Self {
        let err = SchedulerError::Misuse { state, action: action.into() };
        warn!(error = %err, "Replay command ignored");
        err
    }
}

/// Replay scheduler statistics
#[derive(Debug, Clone, Default)]
pub struct SchedulerStats {
    pub state: Option<ReplayState>,
    pub cursor: usize,
    pub speed: f64,
    pub ticks: u64,
    pub seeks: u64,
    pub absorbed_inserts: u64,
}

/// Drives the processed prefix of the log forward.
///
/// `cursor` is the count of trades, in time order, already folded into the
/// anchor manager. Everything at or after the cursor is still pending.
pub struct ReplayScheduler {
    cursor: usize,
    state: ReplayState,
    speed: f64,
    config: ReplayConfig,

    ticks: u64,
    seeks: u64,
    absorbed_inserts: u64,
}

impl ReplayScheduler {
    pub fn new(config: ReplayConfig) -> Self {
        debug!(tick_interval_ms = config.tick_interval_ms, speed = config.default_speed, "Initializing ReplayScheduler");
        Self {
            cursor: 0,
            state: ReplayState::Idle,
            speed: config.default_speed,
            config,
            ticks: 0,
            seeks: 0,
            absorbed_inserts: 0,
        }
    }

    fn transition(&mut self, next: ReplayState) {
        if self.state != next {
            info!(from = %self.state, to = %next, cursor = self.cursor, "Replay state changed");
            self.state = next;
        }
    }

    pub fn play(&mut self, total: usize) -> Result<(), SchedulerError> {
        match self.state {
            ReplayState::Idle | ReplayState::Paused => {
                debug!(cursor = self.cursor, total = total, "Replay starting");
                self.transition(ReplayState::Playing);
                Ok(())
            }
            ReplayState::Playing => Ok(()),
            ReplayState::Complete => Err(SchedulerError::misuse(self.state, "play")),
        }
    }

    /// Playing -> Paused; a no-op in every other state
    pub fn pause(&mut self) {
        if self.state == ReplayState::Playing {
            self.transition(ReplayState::Paused);
        }
    }

    /// Process the trade at the cursor. Only acts while Playing.
    pub fn tick(&mut self, log: &TradeLog, anchors: &mut AnchorManager) -> Option<Trade> {
        if self.state != ReplayState::Playing {
            return None;
        }

        let trade = match log.get(self.cursor) {
            Some(trade) => trade.clone(),
            None => {
                self.transition(ReplayState::Complete);
                return None;
            }
        };

        anchors.on_trade_processed(&trade);
        self.cursor += 1;
        self.ticks += 1;
        debug!(cursor = self.cursor, total = log.len(), sequence = trade.sequence, "Tick");

        if self.cursor >= log.len() {
            self.transition(ReplayState::Complete);
        }
        Some(trade)
    }

    /// Fast-forward so that `target` trades are processed.
    /// Targets past the end clamp to the log length; moving backward is refused.
    /// Returns the number of trades processed by this seek.
    pub fn seek(&mut self, target: usize, log: &TradeLog, anchors: &mut AnchorManager) -> Result<usize, SchedulerError> {
        if target < self.cursor {
            return Err(SchedulerError::misuse(self.state, format!("seek backward to {}", target)));
        }

        let target = target.min(log.len());
        let from = self.cursor;
        for trade in log.iter_from(from).take(target - from) {
            anchors.on_trade_processed(trade);
        }
        self.cursor = target;
        self.seeks += 1;

        if self.cursor == log.len() && !log.is_empty() {
            self.transition(ReplayState::Complete);
        } else if self.state == ReplayState::Idle {
            self.transition(ReplayState::Paused);
        }

        debug!(from = from, cursor = self.cursor, total = log.len(), "Seek complete");
        Ok(target - from)
    }

    /// Cursor back to zero, every track cleared, state Idle
    pub fn reset(&mut self, anchors: &mut AnchorManager) {
        anchors.reset_all();
        self.cursor = 0;
        self.transition(ReplayState::Idle);
    }

    /// A trade was inserted inside the processed prefix and already folded
    pub fn absorb_insert(&mut self) {
        self.cursor += 1;
        self.absorbed_inserts += 1;
    }

    pub fn progress(&self, total: usize) -> Progress {
        Progress {
            processed: self.cursor as u64,
            total: total as u64,
            state: self.state,
        }
    }

    pub fn set_speed(&mut self, multiplier: f64) -> Result<(), SchedulerError> {
        if !multiplier.is_finite() || multiplier < self.config.min_speed || multiplier > self.config.max_speed {
            return Err(SchedulerError::misuse(
                self.state,
                format!(
                    "set speed {} outside [{}, {}]",
                    multiplier, self.config.min_speed, self.config.max_speed
                ),
            ));
        }
        self.speed = multiplier;
        debug!(speed = multiplier, "Replay speed set");
        Ok(())
    }

    /// Delay between ticks at the current speed, never below 1ms
    pub fn tick_interval(&self) -> Duration {
        let ms = self.config.tick_interval_ms as f64 / self.speed;
        Duration::from_micros((ms * 1000.0).max(1000.0) as u64)
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn state(&self) -> ReplayState {
        self.state
    }

    pub fn speed(&self) -> f64 {
        self.speed
    }

    pub fn get_stats(&self) -> SchedulerStats {
        SchedulerStats {
            state: Some(self.state),
            cursor: self.cursor,
            speed: self.speed,
            ticks: self.ticks,
            seeks: self.seeks,
            absorbed_inserts: self.absorbed_inserts,
        }
    }
}

impl Default for ReplayScheduler {
    fn default() -> Self {
        Self::new(ReplayConfig::default())
    }
}
