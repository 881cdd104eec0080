// Consistency Resolver - Keeps tracks correct when a trade lands inside the processed prefix
// Adjacent inserts fold incrementally, backdated inserts rebuild the covering tracks

use serde::Serialize;
use std::fmt;
use tracing::{debug, info};

use crate::core::types::ReplayState;
use crate::layer1::trade_log::{Placement, TradeLog};
use crate::layer2::scheduler::ReplayScheduler;
use crate::layer3::anchor_manager::AnchorManager;

/// What the resolver did with an inserted trade
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Resolution {
    /// Beyond the processed prefix; playback will fold it
    Deferred,
    /// Directly after the processed prefix; folded in place
    Folded { tracks: usize },
    /// Inside the processed prefix; covering tracks recomputed
    Rebuilt { tracks: usize, untouched: usize },
}

impl Resolution {
    pub fn is_rebuild(&self) -> bool {
        matches!(self, Resolution::Rebuilt { .. })
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Resolution::Deferred => write!(f, "deferred"),
            Resolution::Folded { tracks } => write!(f, "folded({})", tracks),
            Resolution::Rebuilt { tracks, untouched } => write!(f, "rebuilt({}, untouched={})", tracks, untouched),
        }
    }
}

/// Resolver statistics
#[derive(Debug, Clone, Default)]
pub struct ResolverStats {
    pub deferred: u64,
    pub folded: u64,
    pub rebuilds: u64,
    pub tracks_rebuilt: u64,
}

#[derive(Default)]
pub struct ConsistencyResolver {
    deferred: u64,
    folded: u64,
    rebuilds: u64,
    tracks_rebuilt: u64,
}

impl ConsistencyResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reconcile the tracks with a trade the log just placed.
    ///
    /// `placement.index` is measured in the log after insertion, against the
    /// scheduler cursor from before it. An engaged insert counts as processed,
    /// so the cursor grows by one and keeps pointing past the same trade.
    pub fn resolve(
        &mut self,
        placement: Placement,
        log: &TradeLog,
        scheduler: &mut ReplayScheduler,
        anchors: &mut AnchorManager,
    ) -> Resolution {
        let cursor = scheduler.cursor();
        // A replay that completed on an empty log has nothing left to play, so it absorbs too
        let engaged = cursor > 0 || scheduler.state() == ReplayState::Complete;
        let trade = match log.get(placement.index) {
            Some(trade) if engaged && placement.index <= cursor => trade,
            _ => {
                self.deferred += 1;
                return Resolution::Deferred;
            }
        };

        if placement.index == cursor {
            let tracks = anchors.on_trade_processed(trade);
            scheduler.absorb_insert();
            self.folded += 1;
            debug!(sequence = placement.sequence, index = placement.index, tracks = tracks, "Adjacent insert folded");
            return Resolution::Folded { tracks };
        }

        scheduler.absorb_insert();
        let processed = scheduler.cursor();
        let covering = anchors.keys_covering(trade.time);
        let untouched = anchors.len() + 1 - covering.len();

        for key in &covering {
            // Keys come from the manager itself, so lookup cannot miss
            if let Err(err) = anchors.rebuild(key, log, processed) {
                debug!(key = %key, error = %err, "Track vanished before rebuild");
            }
        }

        self.rebuilds += 1;
        self.tracks_rebuilt += covering.len() as u64;
        info!(
            sequence = placement.sequence,
            index = placement.index,
            cursor = processed,
            tracks = covering.len(),
            untouched = untouched,
            "Backdated insert rebuilt tracks"
        );
        Resolution::Rebuilt { tracks: covering.len(), untouched }
    }

    pub fn get_stats(&self) -> ResolverStats {
        ResolverStats {
            deferred: self.deferred,
            folded: self.folded,
            rebuilds: self.rebuilds,
            tracks_rebuilt: self.tracks_rebuilt,
        }
    }
}
