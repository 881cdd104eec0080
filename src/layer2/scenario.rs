// VWAP Laboratory - Scenario state and the command surface used by UI controls
// TradeLog -> ReplayScheduler / ConsistencyResolver -> AnchorManager -> series

use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::core::config::{get_config, BandConfig, ConfigError, ConfigManager, ReplayConfig, SimulationConfig};
use crate::core::events::{EventBus, EventPriority, LabEvent, LabEventKind};
use crate::core::types::{
    AnchorColor, AnchorPreset, NewTrade, Progress, ReplayState, SeriesKey, SeriesPoint, Trade, TradeSource,
};
use crate::layer1::simulator::TradeSimulator;
use crate::layer1::trade_log::{TradeLog, TradeLogError};
use crate::layer2::metrics::LabMetrics;
use crate::layer2::resolver::{ConsistencyResolver, Resolution};
use crate::layer2::scheduler::{ReplayScheduler, SchedulerError};
use crate::layer3::anchor_manager::{AnchorError, AnchorManager};
use crate::layer3::bands::{BandPoint, VwapPosition};

#[derive(Debug, Error)]
pub enum LabError {
    #[error(transparent)]
    TradeLog(#[from] TradeLogError),
    #[error(transparent)]
    Anchor(#[from] AnchorError),
    #[error(transparent)]
    Scheduler(#[from] SchedulerError),
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// A UI control action, applied through the command queue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Command {
    SubmitManualTrade { price: f64, volume: f64, time: Option<f64> },
    IngestSimulated { trade: NewTrade },
    CreateAnchor { start_time: f64, label: String, color: AnchorColor },
    DeleteAnchor { id: String },
    Play,
    Pause,
    Reset,
    Seek { index: usize },
    Tick,
    SetSpeed { multiplier: f64 },
}

/// Where an accepted trade went and how the tracks absorbed it
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Accepted {
    pub sequence: u64,
    pub index: usize,
    pub resolution: Resolution,
}

/// Result of one applied command
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Outcome {
    TradeAccepted(Accepted),
    AnchorCreated { id: String, backfilled: usize },
    AnchorDeleted { id: String },
    State(ReplayState),
    Seeked { processed: usize, cursor: usize },
    Ticked(Option<Trade>),
    SpeedSet(f64),
}

/// One series as the render layer sees it
#[derive(Debug, Clone, Serialize)]
pub struct SeriesFrame {
    pub key: String,
    pub label: String,
    pub color: Option<AnchorColor>,
    pub start_time: Option<f64>,
    pub points: Vec<SeriesPoint>,
    pub bands: Option<BandPoint>,
}

/// Everything a chart needs for one frame
#[derive(Debug, Clone, Serialize)]
pub struct Frame {
    pub progress: Progress,
    pub speed: f64,
    pub series: Vec<SeriesFrame>,
}

/// The laboratory: one trade log, its anchors and one replay.
///
/// Every method runs to completion before the next call; callers that share a
/// lab across tasks wrap it in a lock (see `layer2::playback`).
pub struct VwapLab {
    log: TradeLog,
    anchors: AnchorManager,
    scheduler: ReplayScheduler,
    resolver: ConsistencyResolver,
    bands: BandConfig,
    events: Arc<EventBus>,
    queue: VecDeque<Command>,
}

impl VwapLab {
    /// Build from the process-wide configuration
    pub fn new() -> Self {
        let config = get_config();
        let manager = config.read();
        Self::with_config(manager.replay(), manager.bands())
    }

    pub fn with_config(replay: ReplayConfig, bands: BandConfig) -> Self {
        info!(
            tick_interval_ms = replay.tick_interval_ms,
            bands = bands.multipliers.len(),
            "VwapLab created"
        );
        Self {
            log: TradeLog::new(),
            anchors: AnchorManager::new(),
            scheduler: ReplayScheduler::new(replay),
            resolver: ConsistencyResolver::new(),
            bands,
            events: Arc::new(EventBus::new()),
            queue: VecDeque::new(),
        }
    }

    /// Build from a config manager, refusing an invalid configuration
    pub fn from_manager(manager: &ConfigManager) -> Result<Self, LabError> {
        manager.ensure_valid()?;
        Ok(Self::with_config(manager.replay(), manager.bands()))
    }

    fn emit(&self, kind: LabEventKind, payload: serde_json::Value, priority: EventPriority) {
        self.events.publish(LabEvent::from_json(kind, payload, priority));
    }

    /// Publish the replay transition from `previous`, if any
    fn announce_state(&self, previous: ReplayState) {
        let current = self.scheduler.state();
        if current == previous {
            return;
        }
        self.emit(
            LabEventKind::ReplayStateChanged,
            json!({ "from": previous, "to": current, "cursor": self.scheduler.cursor() }),
            EventPriority::Medium,
        );
        if current == ReplayState::Complete {
            self.emit(
                LabEventKind::ReplayComplete,
                json!({ "processed": self.scheduler.cursor(), "total": self.log.len() }),
                EventPriority::Medium,
            );
        }
    }

    /// Time of the last processed trade, else of the last trade in the log, else 0
    pub fn current_time(&self) -> f64 {
        self.scheduler
            .cursor()
            .checked_sub(1)
            .and_then(|i| self.log.get(i))
            .map(|t| t.time)
            .or_else(|| self.log.last_time())
            .unwrap_or(0.0)
    }

    // ------------------------------------------------------------------------
    // Trades
    // ------------------------------------------------------------------------

    fn ingest(&mut self, draft: NewTrade) -> Result<Accepted, LabError> {
        let placement = match self.log.insert_and_reorder_by_time(draft) {
            Ok(placement) => placement,
            Err(err) => {
                self.emit(
                    LabEventKind::TradeRejected,
                    json!({ "reason": err.to_string(), "source": draft.source, "price": draft.price, "volume": draft.volume }),
                    EventPriority::High,
                );
                return Err(err.into());
            }
        };

        let previous = self.scheduler.state();
        let resolution = self
            .resolver
            .resolve(placement, &self.log, &mut self.scheduler, &mut self.anchors);

        self.emit(
            LabEventKind::TradeIngested,
            json!({
                "sequence": placement.sequence,
                "index": placement.index,
                "source": draft.source,
                "resolution": resolution.to_string(),
            }),
            EventPriority::Low,
        );
        if let Resolution::Rebuilt { tracks, untouched } = resolution {
            self.emit(
                LabEventKind::TracksRebuilt,
                json!({ "sequence": placement.sequence, "tracks": tracks, "untouched": untouched }),
                EventPriority::High,
            );
        }
        self.announce_state(previous);

        Ok(Accepted { sequence: placement.sequence, index: placement.index, resolution })
    }

    /// Insert a manual trade; `None` stamps it at the current replay time
    pub fn submit_manual_trade(&mut self, price: f64, volume: f64, time: Option<f64>) -> Result<Accepted, LabError> {
        let time = time.unwrap_or_else(|| self.current_time());
        debug!(price = price, volume = volume, time = time, "Manual trade submitted");
        self.ingest(NewTrade::manual(time, price, volume))
    }

    /// Insert one trade from the simulated feed
    pub fn ingest_simulated(&mut self, draft: NewTrade) -> Result<Accepted, LabError> {
        self.ingest(NewTrade { source: TradeSource::Simulated, ..draft })
    }

    /// Replace the log with `trades` and rewind the replay. Anchors are kept blank.
    /// Invalid trades are skipped; returns the number loaded.
    pub fn load_scenario(&mut self, trades: Vec<NewTrade>) -> usize {
        let previous = self.scheduler.state();
        self.log.clear();
        self.scheduler.reset(&mut self.anchors);

        let mut loaded = 0;
        let mut rejected = 0;
        for draft in trades {
            match self.log.append(draft) {
                Ok(_) => loaded += 1,
                Err(_) => rejected += 1,
            }
        }

        if rejected > 0 {
            warn!(rejected = rejected, "Scenario trades rejected");
        }
        info!(trades = loaded, anchors = self.anchors.len(), "Scenario loaded");
        self.emit(
            LabEventKind::ScenarioLoaded,
            json!({ "trades": loaded, "rejected": rejected }),
            EventPriority::Medium,
        );
        self.announce_state(previous);
        loaded
    }

    /// Generate a seeded scenario and load it
    pub fn load_simulated(&mut self, config: &SimulationConfig) -> usize {
        let trades = TradeSimulator::new(config.clone()).generate_scenario();
        self.load_scenario(trades)
    }

    // ------------------------------------------------------------------------
    // Anchors
    // ------------------------------------------------------------------------

    /// Create an anchor with a fresh id, backfilled to the current cursor
    pub fn create_anchor(&mut self, start_time: f64, label: &str, color: AnchorColor) -> Result<String, LabError> {
        let id = Uuid::new_v4().to_string();
        self.add_anchor(AnchorPreset::new(id.clone(), label, start_time, color))?;
        Ok(id)
    }

    /// Attach a preset with a caller-chosen id; returns the backfilled point count
    pub fn add_anchor(&mut self, preset: AnchorPreset) -> Result<usize, LabError> {
        let (id, label, start_time) = (preset.id.clone(), preset.label.clone(), preset.start_time);
        let backfilled = self.anchors.add_anchor(preset, &self.log, self.scheduler.cursor())?;
        self.emit(
            LabEventKind::AnchorCreated,
            json!({ "id": id, "label": label, "start_time": start_time, "backfilled": backfilled }),
            EventPriority::Medium,
        );
        Ok(backfilled)
    }

    pub fn delete_anchor(&mut self, id: &str) -> Result<AnchorPreset, LabError> {
        let preset = self.anchors.remove_anchor(id)?;
        self.emit(LabEventKind::AnchorRemoved, json!({ "id": id }), EventPriority::Medium);
        Ok(preset)
    }

    // ------------------------------------------------------------------------
    // Replay
    // ------------------------------------------------------------------------

    pub fn play(&mut self) -> Result<(), LabError> {
        let previous = self.scheduler.state();
        self.scheduler.play(self.log.len())?;
        self.announce_state(previous);
        Ok(())
    }

    pub fn pause(&mut self) {
        let previous = self.scheduler.state();
        self.scheduler.pause();
        self.announce_state(previous);
    }

    /// Rewind to the start; trades and anchor presets are kept
    pub fn reset(&mut self) {
        let previous = self.scheduler.state();
        self.scheduler.reset(&mut self.anchors);
        self.emit(
            LabEventKind::ScenarioReset,
            json!({ "trades": self.log.len(), "anchors": self.anchors.len() }),
            EventPriority::Medium,
        );
        self.announce_state(previous);
    }

    /// Fast-forward until `index` trades are processed; returns the new cursor
    pub fn seek(&mut self, index: usize) -> Result<usize, LabError> {
        let previous = self.scheduler.state();
        self.scheduler.seek(index, &self.log, &mut self.anchors)?;
        self.announce_state(previous);
        Ok(self.scheduler.cursor())
    }

    pub fn tick(&mut self) -> Option<Trade> {
        let previous = self.scheduler.state();
        let trade = self.scheduler.tick(&self.log, &mut self.anchors);
        self.announce_state(previous);
        trade
    }

    pub fn set_speed(&mut self, multiplier: f64) -> Result<(), LabError> {
        Ok(self.scheduler.set_speed(multiplier)?)
    }

    pub fn tick_interval(&self) -> Duration {
        self.scheduler.tick_interval()
    }

    // ------------------------------------------------------------------------
    // Command queue
    // ------------------------------------------------------------------------

    pub fn enqueue(&mut self, command: Command) {
        self.queue.push_back(command);
    }

    pub fn pending_commands(&self) -> usize {
        self.queue.len()
    }

    /// Apply every queued command in order. A failure is reported in its slot
    /// and never stops the commands after it.
    pub fn drain(&mut self) -> Vec<Result<Outcome, LabError>> {
        let commands: Vec<Command> = self.queue.drain(..).collect();
        commands.into_iter().map(|command| self.apply(command)).collect()
    }

    pub fn apply(&mut self, command: Command) -> Result<Outcome, LabError> {
        let result = match command.clone() {
            Command::SubmitManualTrade { price, volume, time } => {
                self.submit_manual_trade(price, volume, time).map(Outcome::TradeAccepted)
            }
            Command::IngestSimulated { trade } => self.ingest_simulated(trade).map(Outcome::TradeAccepted),
            Command::CreateAnchor { start_time, label, color } => {
                let id = Uuid::new_v4().to_string();
                self.add_anchor(AnchorPreset::new(id.clone(), label, start_time, color))
                    .map(|backfilled| Outcome::AnchorCreated { id, backfilled })
            }
            Command::DeleteAnchor { id } => self.delete_anchor(&id).map(|p| Outcome::AnchorDeleted { id: p.id }),
            Command::Play => self.play().map(|_| Outcome::State(self.state())),
            Command::Pause => {
                self.pause();
                Ok(Outcome::State(self.state()))
            }
            Command::Reset => {
                self.reset();
                Ok(Outcome::State(self.state()))
            }
            Command::Seek { index } => {
                let before = self.scheduler.cursor();
                self.seek(index).map(|cursor| Outcome::Seeked { processed: cursor - before, cursor })
            }
            Command::Tick => Ok(Outcome::Ticked(self.tick())),
            Command::SetSpeed { multiplier } => self.set_speed(multiplier).map(|_| Outcome::SpeedSet(multiplier)),
        };

        if let Err(err) = &result {
            warn!(command = ?command, error = %err, "Command rejected");
            self.emit(
                LabEventKind::CommandRejected,
                json!({ "command": command, "error": err.to_string() }),
                EventPriority::High,
            );
        }
        result
    }

    // ------------------------------------------------------------------------
    // Render reads
    // ------------------------------------------------------------------------

    pub fn series_for(&self, key: &SeriesKey) -> Result<&[SeriesPoint], LabError> {
        Ok(self.anchors.series_for(key)?)
    }

    pub fn bands_for(&self, key: &SeriesKey) -> Result<Vec<BandPoint>, LabError> {
        Ok(self.anchors.bands_for(key, &self.bands)?)
    }

    pub fn position_of(&self, key: &SeriesKey, price: f64) -> Result<Option<VwapPosition>, LabError> {
        Ok(self.anchors.position_of(key, price, &self.bands)?)
    }

    pub fn progress(&self) -> Progress {
        self.scheduler.progress(self.log.len())
    }

    pub fn state(&self) -> ReplayState {
        self.scheduler.state()
    }

    /// Snapshot of every series plus progress, session first
    pub fn frame(&self) -> Frame {
        let series = self
            .anchors
            .keys()
            .into_iter()
            .filter_map(|key| {
                let points = self.anchors.series_for(&key).ok()?.to_vec();
                let bands = points.last().map(|p| BandPoint::from_point(p, &self.bands));
                let preset = match &key {
                    SeriesKey::Anchor(id) => self.anchors.preset(id),
                    SeriesKey::Session => None,
                };
                Some(SeriesFrame {
                    key: key.to_string(),
                    label: preset.map_or_else(|| "Session".to_string(), |p| p.label.clone()),
                    color: preset.map(|p| p.color.clone()),
                    start_time: preset.map(|p| p.start_time),
                    points,
                    bands,
                })
            })
            .collect();

        Frame {
            progress: self.progress(),
            speed: self.scheduler.speed(),
            series,
        }
    }

    pub fn trades(&self) -> &TradeLog {
        &self.log
    }

    pub fn anchors(&self) -> impl Iterator<Item = &AnchorPreset> {
        self.anchors.anchors()
    }

    pub fn band_config(&self) -> &BandConfig {
        &self.bands
    }

    pub fn events(&self) -> Arc<EventBus> {
        Arc::clone(&self.events)
    }

    /// Receiver of every event published from now on
    pub fn subscribe(&self) -> broadcast::Receiver<LabEvent> {
        self.events.subscribe_channel()
    }

    pub fn metrics(&self) -> LabMetrics {
        LabMetrics::from_stats(
            self.log.get_stats(),
            self.anchors.get_stats(),
            self.scheduler.get_stats(),
            self.resolver.get_stats(),
            Some(self.events.get_stats()),
        )
    }
}

impl Default for VwapLab {
    fn default() -> Self {
        Self::with_config(ReplayConfig::default(), BandConfig::default())
    }
}
