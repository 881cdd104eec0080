// Lab Metrics - Collects and formats stats from every engine component
// Aggregates existing per-component stats into a single view

use std::fmt;
use tracing::info;

use crate::core::events::EventBusStatsSnapshot;
use crate::layer1::trade_log::TradeLogStats;
use crate::layer2::resolver::ResolverStats;
use crate::layer2::scheduler::SchedulerStats;
use crate::layer3::anchor_manager::AnchorManagerStats;

/// Metrics snapshot of one laboratory
#[derive(Debug, Clone)]
pub struct LabMetrics {
    pub trade_log: TradeLogStats,
    pub anchors: AnchorManagerStats,
    pub scheduler: SchedulerStats,
    pub resolver: ResolverStats,
    pub events: Option<EventBusStatsSnapshot>,
}

impl LabMetrics {
    pub fn from_stats(
        trade_log: TradeLogStats,
        anchors: AnchorManagerStats,
        scheduler: SchedulerStats,
        resolver: ResolverStats,
        events: Option<EventBusStatsSnapshot>,
    ) -> Self {
        Self { trade_log, anchors, scheduler, resolver, events }
    }

    pub fn total_trades(&self) -> usize {
        self.trade_log.len
    }

    /// Trades still waiting for playback
    pub fn pending_trades(&self) -> usize {
        self.trade_log.len.saturating_sub(self.scheduler.cursor)
    }

    pub fn events_published(&self) -> u64 {
        self.events.as_ref().map(|e| e.total_published).unwrap_or(0)
    }

    /// Print detailed multi-line report
    pub fn print_report(&self) {
        info!("=== VWAP LAB METRICS ===");

        let log = &self.trade_log;
        info!("  Trade Log:  trades={} manual={} simulated={} rejected={} out_of_order={}",
            log.len, log.manual_count, log.simulated_count, log.rejected_count, log.out_of_order_count);

        let s = &self.scheduler;
        let state = s.state.map(|st| st.to_string()).unwrap_or_default();
        info!("  Replay:     state={} cursor={} pending={} speed={:.2}x ticks={} seeks={}",
            state, s.cursor, self.pending_trades(), s.speed, s.ticks, s.seeks);

        let a = &self.anchors;
        info!("  Anchors:    count={} routed={} folds={} backfilled={} rebuilds={}",
            a.anchor_count, a.trades_routed, a.folds, a.backfilled_points, a.rebuilds);

        let r = &self.resolver;
        info!("  Resolver:   deferred={} folded={} rebuilds={} tracks_rebuilt={}",
            r.deferred, r.folded, r.rebuilds, r.tracks_rebuilt);

        if let Some(e) = &self.events {
            info!("  Events:     published={} delivered={} subscribers={} history={}",
                e.total_published, e.total_delivered, e.subscriber_count, e.history_size);
        }
    }
}

impl fmt::Display for LabMetrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "LabMetrics(trades={}, processed={}, anchors={}, rebuilds={})",
            self.trade_log.len, self.scheduler.cursor, self.anchors.anchor_count, self.resolver.rebuilds
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn empty() -> LabMetrics {
        LabMetrics::from_stats(
            TradeLogStats::default(),
            AnchorManagerStats::default(),
            SchedulerStats::default(),
            ResolverStats::default(),
            None,
        )
    }

    #[test]
    fn test_empty_metrics() {
        let metrics = empty();
        assert_eq!(metrics.total_trades(), 0);
        assert_eq!(metrics.pending_trades(), 0);
        assert_eq!(metrics.events_published(), 0);
        metrics.print_report();
    }

    #[test]
    fn test_pending_trades() {
        let mut metrics = empty();
        metrics.trade_log.len = 10;
        metrics.scheduler.cursor = 4;
        assert_eq!(metrics.pending_trades(), 6);
    }

    #[test]
    fn test_display() {
        let s = format!("{}", empty());
        assert!(s.contains("trades=0"));
        assert!(s.contains("rebuilds=0"));
    }
}
