// Configuration Management for the VWAP Laboratory
// JSON file + environment overrides, shared through a process-wide manager

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::{Arc, OnceLock};
use parking_lot::RwLock;
use thiserror::Error;
use tracing::{info, warn};

use crate::core::types::MarketRegime;

// ============================================================================
// Error Type
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Validation error: {0}")]
    Validation(String),
}

// ============================================================================
// Configuration Structures
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplayConfig {
    pub tick_interval_ms: u64,  // Interval between ticks at speed 1.0
    pub default_speed: f64,
    pub min_speed: f64,
    pub max_speed: f64,
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 250,
            default_speed: 1.0,
            min_speed: 0.1,
            max_speed: 100.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BandConfig {
    pub multipliers: Vec<f64>,  // Standard deviations per band, inner to outer
    pub at_tolerance_pct: f64,  // Distance from VWAP (%) still counted as "at"
}

impl Default for BandConfig {
    fn default() -> Self {
        Self {
            multipliers: vec![1.0, 2.0, 3.0],
            at_tolerance_pct: 0.05,
        }
    }
}

impl BandConfig {
    /// Widest configured band, 0 when no bands are configured
    pub fn outer_multiplier(&self) -> f64 {
        self.multipliers.iter().copied().fold(0.0, f64::max)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    pub seed: u64,
    pub trade_count: usize,
    pub start_price: f64,
    pub start_time: f64,
    pub time_step: f64,
    pub volatility_pct: f64,    // Per-trade price move stddev (%)
    pub min_volume: f64,
    pub max_volume: f64,
    pub regime: MarketRegime,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            trade_count: 500,
            start_price: 100.0,
            start_time: 0.0,
            time_step: 1.0,
            volatility_pct: 0.15,
            min_volume: 1.0,
            max_volume: 250.0,
            regime: MarketRegime::Ranging,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub log_level: String,
    pub json_format: bool,
    pub console_output: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_level: "INFO".to_string(),
            json_format: false,
            console_output: true,
        }
    }
}

// ============================================================================
// Configuration Summary
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct ConfigSummary {
    pub tick_interval_ms: u64,
    pub default_speed: f64,
    pub band_count: usize,
    pub simulation_seed: u64,
    pub simulation_trades: usize,
    pub regime: MarketRegime,
    pub log_level: String,
}

// ============================================================================
// Configuration Manager
// ============================================================================

pub struct ConfigManager {
    replay: Arc<RwLock<ReplayConfig>>,
    bands: Arc<RwLock<BandConfig>>,
    simulation: Arc<RwLock<SimulationConfig>>,
    logging: Arc<RwLock<LoggingConfig>>,
}

impl ConfigManager {
    pub fn new(config_path: Option<&str>) -> Result<Self, ConfigError> {
        let mut manager = Self::with_defaults();

        // Load from file if provided
        if let Some(path) = config_path {
            manager.load_from_file(path)?;
        }

        manager.load_from_env();

        info!("Configuration initialized");
        Ok(manager)
    }

    /// Manager holding the built-in defaults only
    pub fn with_defaults() -> Self {
        Self {
            replay: Arc::new(RwLock::new(ReplayConfig::default())),
            bands: Arc::new(RwLock::new(BandConfig::default())),
            simulation: Arc::new(RwLock::new(SimulationConfig::default())),
            logging: Arc::new(RwLock::new(LoggingConfig::default())),
        }
    }

    /// Load configuration from JSON file
    pub fn load_from_file(&mut self, config_path: &str) -> Result<(), ConfigError> {
        let path = Path::new(config_path);
        if !path.exists() {
            warn!(path = config_path, "Config file not found");
            return Ok(());
        }

        let content = fs::read_to_string(path)?;
        let config_data: HashMap<String, serde_json::Value> = serde_json::from_str(&content)?;

        if let Some(replay_data) = config_data.get("replay") {
            *self.replay.write() = serde_json::from_value::<ReplayConfig>(replay_data.clone())?;
        }

        if let Some(bands_data) = config_data.get("bands") {
            *self.bands.write() = serde_json::from_value::<BandConfig>(bands_data.clone())?;
        }

        if let Some(simulation_data) = config_data.get("simulation") {
            *self.simulation.write() = serde_json::from_value::<SimulationConfig>(simulation_data.clone())?;
        }

        if let Some(logging_data) = config_data.get("logging") {
            *self.logging.write() = serde_json::from_value::<LoggingConfig>(logging_data.clone())?;
        }

        info!(path = config_path, "Configuration loaded");
        Ok(())
    }

    /// Apply overrides from environment variables
    pub fn load_from_env(&mut self) {
        if let Ok(level) = std::env::var("VWAP_LAB_LOG_LEVEL") {
            self.logging.write().log_level = level;
        }
        if let Ok(seed) = std::env::var("VWAP_LAB_SEED") {
            match seed.parse::<u64>() {
                Ok(seed) => self.simulation.write().seed = seed,
                Err(_) => warn!(value = %seed, "Ignoring non-numeric VWAP_LAB_SEED"),
            }
        }
        if let Ok(tick) = std::env::var("VWAP_LAB_TICK_MS") {
            match tick.parse::<u64>() {
                Ok(ms) => self.replay.write().tick_interval_ms = ms,
                Err(_) => warn!(value = %tick, "Ignoring non-numeric VWAP_LAB_TICK_MS"),
            }
        }
    }

    /// Save configuration to JSON file
    pub fn save_to_file(&self, config_path: &str) -> Result<(), ConfigError> {
        let mut config_map = HashMap::new();
        config_map.insert("replay", serde_json::to_value(&*self.replay.read())?);
        config_map.insert("bands", serde_json::to_value(&*self.bands.read())?);
        config_map.insert("simulation", serde_json::to_value(&*self.simulation.read())?);
        config_map.insert("logging", serde_json::to_value(&*self.logging.read())?);

        // Ensure parent directory exists
        if let Some(parent) = Path::new(config_path).parent() {
            fs::create_dir_all(parent)?;
        }

        let json = serde_json::to_string_pretty(&config_map)?;
        fs::write(config_path, json)?;

        info!(path = config_path, "Configuration saved");
        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<bool, ConfigError> {
        let mut errors = Vec::new();
        let replay = self.replay.read();
        let bands = self.bands.read();
        let simulation = self.simulation.read();

        if replay.tick_interval_ms == 0 {
            errors.push("tick_interval_ms must be positive".to_string());
        }
        if !(replay.min_speed > 0.0 && replay.min_speed <= replay.max_speed) {
            errors.push("min_speed must be positive and not above max_speed".to_string());
        }
        if !(replay.min_speed..=replay.max_speed).contains(&replay.default_speed) {
            errors.push("default_speed must lie within [min_speed, max_speed]".to_string());
        }

        if bands.multipliers.iter().any(|m| !m.is_finite() || *m <= 0.0) {
            errors.push("band multipliers must be finite and positive".to_string());
        }
        if !(bands.at_tolerance_pct >= 0.0) {
            errors.push("at_tolerance_pct must be non-negative".to_string());
        }

        if !(simulation.start_price.is_finite() && simulation.start_price > 0.0) {
            errors.push("start_price must be finite and positive".to_string());
        }
        if !(simulation.time_step.is_finite() && simulation.time_step > 0.0) {
            errors.push("time_step must be finite and positive".to_string());
        }
        if !(simulation.min_volume > 0.0 && simulation.min_volume <= simulation.max_volume) {
            errors.push("volume range must be positive with min_volume <= max_volume".to_string());
        }
        if !(simulation.volatility_pct.is_finite() && simulation.volatility_pct >= 0.0) {
            errors.push("volatility_pct must be finite and non-negative".to_string());
        }

        if !errors.is_empty() {
            for error in &errors {
                warn!(error = %error, "Config validation error");
            }
            return Ok(false);
        }

        info!("Configuration validated successfully");
        Ok(true)
    }

    /// Validate and turn failures into an error
    pub fn ensure_valid(&self) -> Result<(), ConfigError> {
        if self.validate()? {
            Ok(())
        } else {
            Err(ConfigError::Validation("configuration has invalid values".to_string()))
        }
    }

    pub fn get_summary(&self) -> ConfigSummary {
        let replay = self.replay.read();
        let bands = self.bands.read();
        let simulation = self.simulation.read();
        let logging = self.logging.read();

        ConfigSummary {
            tick_interval_ms: replay.tick_interval_ms,
            default_speed: replay.default_speed,
            band_count: bands.multipliers.len(),
            simulation_seed: simulation.seed,
            simulation_trades: simulation.trade_count,
            regime: simulation.regime,
            log_level: logging.log_level.clone(),
        }
    }

    // Getters for each config section
    pub fn replay(&self) -> ReplayConfig {
        self.replay.read().clone()
    }

    pub fn bands(&self) -> BandConfig {
        self.bands.read().clone()
    }

    pub fn simulation(&self) -> SimulationConfig {
        self.simulation.read().clone()
    }

    pub fn logging(&self) -> LoggingConfig {
        self.logging.read().clone()
    }

    pub fn set_simulation(&self, simulation: SimulationConfig) {
        *self.simulation.write() = simulation;
    }
}

// Global config instance (thread-safe singleton)
static GLOBAL_CONFIG: OnceLock<Arc<RwLock<ConfigManager>>> = OnceLock::new();

/// Get global configuration instance (singleton)
pub fn get_config() -> Arc<RwLock<ConfigManager>> {
    Arc::clone(GLOBAL_CONFIG.get_or_init(|| {
        let mut manager = ConfigManager::with_defaults();
        manager.load_from_env();
        Arc::new(RwLock::new(manager))
    }))
}
