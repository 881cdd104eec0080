// Playback Driver - Async loop that ticks a shared lab at the replay speed
// The write lock is held for one tick at a time, so commands interleave between ticks

use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use crate::core::types::ReplayState;
use crate::layer2::scenario::VwapLab;

/// How a playback run ended
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlaybackSummary {
    pub ticks: u64,
    pub processed: u64,
    pub final_state: ReplayState,
}

fn new_interval(period: Duration) -> tokio::time::Interval {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval
}

/// Tick `lab` until it leaves `Playing` or `max_ticks` trades were processed.
///
/// Pausing or resetting the lab from another task ends the run. A speed change
/// takes effect on the next tick.
pub async fn run_playback(lab: Arc<RwLock<VwapLab>>, max_ticks: Option<u64>) -> PlaybackSummary {
    let mut period = lab.read().tick_interval();
    let mut interval = new_interval(period);
    let mut ticks = 0u64;

    info!(interval_ms = period.as_millis() as u64, "Playback started");

    loop {
        interval.tick().await;

        let (state, current_period) = {
            let mut guard = lab.write();
            if guard.state() == ReplayState::Playing && guard.tick().is_some() {
                ticks += 1;
            }
            (guard.state(), guard.tick_interval())
        };

        if state != ReplayState::Playing || max_ticks.is_some_and(|max| ticks >= max) {
            break;
        }

        if current_period != period {
            debug!(interval_ms = current_period.as_millis() as u64, "Playback speed changed");
            period = current_period;
            interval = new_interval(period);
        }
    }

    let progress = lab.read().progress();
    info!(ticks = ticks, processed = progress.processed, total = progress.total, state = %progress.state, "Playback stopped");

    PlaybackSummary {
        ticks,
        processed: progress.processed,
        final_state: progress.state,
    }
}

/// Run playback on the current tokio runtime
pub fn spawn_playback(lab: Arc<RwLock<VwapLab>>, max_ticks: Option<u64>) -> JoinHandle<PlaybackSummary> {
    tokio::spawn(run_playback(lab, max_ticks))
}
