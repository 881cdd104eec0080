// End-to-End Flow Tests for the VWAP Laboratory
//
// These tests drive the whole engine through its public surface:
//   Commands → TradeLog → ReplayScheduler / ConsistencyResolver → AnchorManager → series
//
// Run with: cargo test --test e2e_flow_test

use std::sync::{Arc, Mutex};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use vwap_lab::core::config::{BandConfig, ConfigManager, ReplayConfig, SimulationConfig};
use vwap_lab::core::{EventPriority, LabEvent, LabEventKind, MarketRegime};
use vwap_lab::layer2::{Command, LabError, Outcome, Resolution};
use vwap_lab::layer3::{AnchorError, VwapPosition};
use vwap_lab::{AnchorColor, AnchorPreset, NewTrade, ReplayState, SeriesKey, SeriesPoint, Trade, TradeSimulator, VwapLab};

// ============================================================================
// Helpers
// ============================================================================

fn lab_with(trades: &[(f64, f64, f64)]) -> VwapLab {
    let mut lab = VwapLab::default();
    lab.load_scenario(trades.iter().map(|&(t, p, v)| NewTrade::simulated(t, p, v)).collect());
    lab
}

fn preset(id: &str, start_time: f64) -> AnchorPreset {
    AnchorPreset::new(id, id.to_uppercase(), start_time, AnchorColor::new("#3366ff"))
}

fn latest(lab: &VwapLab, key: &SeriesKey) -> SeriesPoint {
    *lab.series_for(key).unwrap().last().unwrap()
}

/// Two-pass VWAP and population standard deviation
fn brute_force(trades: &[&Trade]) -> (f64, f64) {
    let sum_v: f64 = trades.iter().map(|t| t.volume).sum();
    let vwap = trades.iter().map(|t| t.price * t.volume).sum::<f64>() / sum_v;
    let var = trades.iter().map(|t| t.volume * (t.price - vwap).powi(2)).sum::<f64>() / sum_v;
    (vwap, var.sqrt())
}

/// Series length and latest values per track match the processed prefix
fn assert_tracks_consistent(lab: &VwapLab) {
    let processed = lab.progress().processed as usize;
    let prefix = &lab.trades().trades()[..processed];

    let mut windows: Vec<(SeriesKey, f64)> = vec![(SeriesKey::Session, f64::NEG_INFINITY)];
    windows.extend(lab.anchors().map(|p| (SeriesKey::anchor(p.id.clone()), p.start_time)));

    for (key, start) in windows {
        let in_window: Vec<&Trade> = prefix.iter().filter(|t| t.time >= start).collect();
        let series = lab.series_for(&key).unwrap();
        assert_eq!(series.len(), in_window.len(), "series length for {}", key);

        if let Some(point) = series.last() {
            let (vwap, sd) = brute_force(&in_window);
            assert!(((point.vwap - vwap) / vwap).abs() < 1e-9, "vwap for {}", key);
            if sd > 1e-9 {
                assert!(((point.std_dev - sd) / sd).abs() < 1e-6, "std dev for {}", key);
            } else {
                assert!(point.std_dev < 1e-6);
            }
            assert!(point.vwap.is_finite() && point.std_dev.is_finite());
        }
    }
}

// ============================================================================
// TEST 1 – Worked scenarios
// ============================================================================

#[test]
fn test_two_trade_session_vwap() {
    let mut lab = lab_with(&[(0.0, 10.0, 100.0), (1.0, 12.0, 50.0)]);
    lab.play().unwrap();
    assert!(lab.tick().is_some());
    assert!(lab.tick().is_some());

    let point = latest(&lab, &SeriesKey::Session);
    assert!((point.vwap - 10.6667).abs() < 1e-4);
    assert_eq!(point.cumulative_volume, 150.0);
    assert_eq!(lab.state(), ReplayState::Complete);
}

#[test]
fn test_backdated_insert_triggers_resolver() {
    let mut lab = lab_with(&[(0.0, 10.0, 100.0), (1.0, 12.0, 50.0)]);
    lab.seek(2).unwrap();

    let accepted = lab.submit_manual_trade(8.0, 200.0, Some(0.5)).unwrap();
    assert_eq!(accepted.resolution, Resolution::Rebuilt { tracks: 1, untouched: 0 });

    let point = latest(&lab, &SeriesKey::Session);
    assert!((point.vwap - 9.1429).abs() < 1e-4);
    assert_eq!(lab.series_for(&SeriesKey::Session).unwrap().len(), 3);
    assert_tracks_consistent(&lab);
}

// ============================================================================
// TEST 2 – Invariant under random command sequences
// ============================================================================

#[test]
fn test_random_commands_keep_tracks_consistent() {
    let mut rng = StdRng::seed_from_u64(20240611);
    let config = SimulationConfig { seed: 5, trade_count: 120, ..SimulationConfig::default() };
    let mut lab = VwapLab::default();
    lab.load_simulated(&config);

    let mut anchor_ids: Vec<String> = Vec::new();
    for step in 0..400 {
        match rng.gen_range(0..10) {
            0 => {
                let start = rng.gen_range(0.0..130.0);
                let id = lab.create_anchor(start, &format!("A{}", step), AnchorColor::new("red")).unwrap();
                anchor_ids.push(id);
            }
            1 if !anchor_ids.is_empty() => {
                let id = anchor_ids.swap_remove(rng.gen_range(0..anchor_ids.len()));
                lab.delete_anchor(&id).unwrap();
            }
            2 | 3 => {
                let time = rng.gen_range(-5.0..140.0);
                let price = rng.gen_range(90.0..110.0);
                lab.submit_manual_trade(price, rng.gen_range(0.5..50.0), Some(time)).unwrap();
            }
            4 => {
                let target = lab.progress().processed as usize + rng.gen_range(0..10);
                lab.seek(target).unwrap();
            }
            5 if lab.state() == ReplayState::Complete => {
                lab.reset();
                lab.play().unwrap();
            }
            6 => lab.pause(),
            _ => {
                if lab.state() != ReplayState::Complete {
                    lab.play().unwrap();
                }
                lab.tick();
            }
        }
        assert_tracks_consistent(&lab);
    }
}

// ============================================================================
// TEST 3 – Determinism
// ============================================================================

fn scripted_run() -> Vec<Vec<SeriesPoint>> {
    let mut lab = VwapLab::default();
    lab.load_simulated(&SimulationConfig { seed: 77, trade_count: 60, regime: MarketRegime::Volatile, ..SimulationConfig::default() });
    lab.add_anchor(preset("open", 10.0)).unwrap();
    lab.seek(30).unwrap();
    lab.submit_manual_trade(101.0, 40.0, Some(12.5)).unwrap();
    lab.add_anchor(preset("late", 40.0)).unwrap();
    lab.play().unwrap();
    while lab.tick().is_some() {}
    lab.submit_manual_trade(99.0, 10.0, None).unwrap();

    vec![
        lab.series_for(&SeriesKey::Session).unwrap().to_vec(),
        lab.series_for(&SeriesKey::anchor("open")).unwrap().to_vec(),
        lab.series_for(&SeriesKey::anchor("late")).unwrap().to_vec(),
    ]
}

#[test]
fn test_same_commands_same_series() {
    assert_eq!(scripted_run(), scripted_run());
}

// ============================================================================
// TEST 4 – Backfill and rollback
// ============================================================================

#[test]
fn test_backfilled_anchor_equals_anchor_from_start() {
    let config = SimulationConfig { seed: 3, trade_count: 80, ..SimulationConfig::default() };

    let mut early = VwapLab::default();
    early.load_simulated(&config);
    early.add_anchor(preset("a", 25.0)).unwrap();
    early.seek(50).unwrap();

    let mut late = VwapLab::default();
    late.load_simulated(&config);
    late.seek(50).unwrap();
    let backfilled = late.add_anchor(preset("a", 25.0)).unwrap();
    assert_eq!(backfilled, 25);

    assert_eq!(
        early.series_for(&SeriesKey::anchor("a")).unwrap(),
        late.series_for(&SeriesKey::anchor("a")).unwrap()
    );
}

#[test]
fn test_rollback_only_touches_covering_tracks() {
    let trades: Vec<(f64, f64, f64)> = (0..10).map(|i| (i as f64, 100.0 + (i % 4) as f64, 1.0 + i as f64)).collect();
    let mut lab = lab_with(&trades);
    lab.add_anchor(preset("early", 2.0)).unwrap();
    lab.add_anchor(preset("late", 6.0)).unwrap();
    lab.seek(10).unwrap();

    let late_before = lab.series_for(&SeriesKey::anchor("late")).unwrap().to_vec();
    let early_before = lab.series_for(&SeriesKey::anchor("early")).unwrap().to_vec();

    let accepted = lab.submit_manual_trade(150.0, 30.0, Some(4.5)).unwrap();
    assert_eq!(accepted.resolution, Resolution::Rebuilt { tracks: 2, untouched: 1 });

    assert_eq!(lab.series_for(&SeriesKey::anchor("late")).unwrap(), late_before.as_slice());
    let early_after = lab.series_for(&SeriesKey::anchor("early")).unwrap();
    assert_eq!(early_after.len(), early_before.len() + 1);
    assert_ne!(early_after.last(), early_before.last());
    assert_tracks_consistent(&lab);
}

// ============================================================================
// TEST 5 – Replay controls
// ============================================================================

#[test]
fn test_replay_control_errors() {
    let mut lab = lab_with(&[(0.0, 10.0, 1.0), (1.0, 11.0, 1.0), (2.0, 12.0, 1.0)]);
    lab.seek(2).unwrap();
    assert_eq!(lab.state(), ReplayState::Paused);

    assert!(matches!(lab.seek(1), Err(LabError::Scheduler(_))));
    assert_eq!(lab.progress().processed, 2);

    assert_eq!(lab.seek(50).unwrap(), 3);
    assert_eq!(lab.state(), ReplayState::Complete);
    assert!(lab.play().is_err());

    // Backward seeking is reset plus forward replay
    lab.reset();
    assert_eq!(lab.seek(1).unwrap(), 1);
    assert_eq!(lab.series_for(&SeriesKey::Session).unwrap().len(), 1);
}

#[test]
fn test_anchor_errors_leave_replay_alone() {
    let mut lab = lab_with(&[(0.0, 10.0, 1.0), (1.0, 11.0, 1.0)]);
    lab.add_anchor(preset("a", 0.0)).unwrap();
    lab.seek(1).unwrap();
    let progress = lab.progress();

    assert!(matches!(
        lab.add_anchor(preset("a", 1.0)),
        Err(LabError::Anchor(AnchorError::DuplicateAnchor(_)))
    ));
    assert!(matches!(
        lab.delete_anchor("nope"),
        Err(LabError::Anchor(AnchorError::UnknownAnchor(_)))
    ));
    assert!(matches!(
        lab.series_for(&"nope".parse().unwrap()),
        Err(LabError::Anchor(AnchorError::UnknownAnchor(_)))
    ));
    assert_eq!(lab.progress(), progress);
}

#[test]
fn test_command_queue_reports_each_slot() {
    let mut lab = lab_with(&[(0.0, 10.0, 5.0), (1.0, 12.0, 5.0)]);
    let commands = vec![
        Command::CreateAnchor { start_time: 0.5, label: "Half".to_string(), color: AnchorColor::new("green") },
        Command::SubmitManualTrade { price: 11.0, volume: -3.0, time: None },
        Command::Seek { index: 2 },
        Command::SubmitManualTrade { price: 11.0, volume: 10.0, time: Some(0.25) },
        Command::Play,
    ];
    for command in commands {
        lab.enqueue(command);
    }

    let results = lab.drain();
    assert!(matches!(results[0], Ok(Outcome::AnchorCreated { backfilled: 0, .. })));
    assert!(matches!(results[1], Err(LabError::TradeLog(_))));
    assert_eq!(results[2].as_ref().unwrap(), &Outcome::Seeked { processed: 2, cursor: 2 });
    assert!(matches!(
        results[3],
        Ok(Outcome::TradeAccepted(accepted)) if accepted.resolution.is_rebuild()
    ));
    assert!(results[4].is_err());
    assert_tracks_consistent(&lab);
}

// ============================================================================
// TEST 6 – Bands and frames
// ============================================================================

#[test]
fn test_bands_follow_series() {
    let mut lab = lab_with(&[(0.0, 10.0, 1.0), (1.0, 12.0, 1.0)]);
    lab.seek(2).unwrap();

    let bands = lab.bands_for(&SeriesKey::Session).unwrap();
    assert_eq!(bands.len(), 2);
    let last = &bands[1];
    assert_eq!(last.vwap, 11.0);
    assert_eq!(last.bands.len(), 3);
    assert_eq!(last.bands[1].lower, 9.0);
    assert_eq!(last.bands[1].upper, 13.0);

    assert_eq!(lab.position_of(&SeriesKey::Session, 11.0).unwrap(), Some(VwapPosition::At));
    assert_eq!(lab.position_of(&SeriesKey::Session, 15.0).unwrap(), Some(VwapPosition::AboveUpper));
    assert_eq!(lab.position_of(&SeriesKey::Session, 10.0).unwrap(), Some(VwapPosition::Below));
}

#[test]
fn test_frame_serializes_for_render_layer() {
    let mut lab = lab_with(&[(0.0, 10.0, 1.0), (1.0, 12.0, 1.0)]);
    lab.add_anchor(preset("a", 1.0)).unwrap();
    lab.seek(1).unwrap();

    let frame = lab.frame();
    let value = serde_json::to_value(&frame).unwrap();
    assert_eq!(value["progress"]["processed"], 1);
    assert_eq!(value["series"][0]["key"], "session");
    assert_eq!(value["series"][1]["label"], "A");
    assert_eq!(value["series"][1]["points"].as_array().unwrap().len(), 0);
    assert!(value["series"][1]["bands"].is_null());
}

#[test]
fn test_extreme_trades_never_reach_render_layer_as_non_finite() {
    let scenarios: [&[(f64, f64, f64)]; 2] = [
        &[(0.0, 1.0e300, 10.0), (1.0, 1.0e300, 1.0e10), (2.0, 1.0e300, 1.0)],
        &[(0.0, 10.0, 1.0e308), (1.0, 12.0, 1.0e308), (2.0, 11.0, 1.0)],
    ];

    for trades in scenarios {
        let mut lab = lab_with(trades);
        lab.add_anchor(preset("a", 1.0)).unwrap();
        lab.seek(trades.len()).unwrap();
        assert!(lab.submit_manual_trade(1.0e300, 1.0e10, Some(0.5)).is_err());
        lab.submit_manual_trade(-1.0e300, 1.0, Some(0.5)).unwrap();

        let frame = lab.frame();
        for series in &frame.series {
            for point in &series.points {
                assert!(point.time.is_finite(), "{}: {:?}", series.key, point);
                assert!(point.vwap.is_finite(), "{}: {:?}", series.key, point);
                assert!(point.std_dev.is_finite(), "{}: {:?}", series.key, point);
                assert!(point.cumulative_volume.is_finite(), "{}: {:?}", series.key, point);
            }
        }
        assert!(lab.trades().get_stats().rejected_count >= 1);
    }
}

#[test]
fn test_session_key_cannot_be_shadowed_by_anchor() {
    let mut lab = lab_with(&[(0.0, 10.0, 1.0), (1.0, 12.0, 1.0)]);
    lab.seek(2).unwrap();

    for id in ["session", "SESSION", " a "] {
        assert!(matches!(
            lab.add_anchor(preset(id, 0.0)),
            Err(LabError::Anchor(AnchorError::InvalidAnchor { .. }))
        ));
    }

    let keys: Vec<String> = lab.frame().series.into_iter().map(|s| s.key).collect();
    assert_eq!(keys, vec!["session".to_string()]);
}

// ============================================================================
// TEST 7 – Event notifications
// ============================================================================

#[test]
fn test_events_announce_state_changes() {
    let mut lab = lab_with(&[(0.0, 10.0, 1.0), (1.0, 12.0, 1.0)]);
    let bus = lab.events();
    let seen: Arc<Mutex<Vec<LabEventKind>>> = Arc::new(Mutex::new(Vec::new()));

    let seen_clone = seen.clone();
    bus.subscribe_all(move |event: &LabEvent| {
        seen_clone.lock().unwrap().push(event.kind);
    });
    let mut rx = lab.subscribe();

    lab.add_anchor(preset("a", 0.0)).unwrap();
    lab.play().unwrap();
    lab.tick();
    lab.tick();
    lab.submit_manual_trade(9.0, 1.0, Some(0.5)).unwrap();

    let kinds = seen.lock().unwrap().clone();
    assert_eq!(
        kinds,
        vec![
            LabEventKind::AnchorCreated,
            LabEventKind::ReplayStateChanged,
            LabEventKind::ReplayStateChanged,
            LabEventKind::ReplayComplete,
            LabEventKind::TradeIngested,
            LabEventKind::TracksRebuilt,
        ]
    );

    let first = rx.try_recv().unwrap();
    assert_eq!(first.kind, LabEventKind::AnchorCreated);
    assert_eq!(first.get("id").unwrap(), "a");

    let rebuilt = bus.get_recent_events(Some(LabEventKind::TracksRebuilt), Some(1));
    assert_eq!(rebuilt[0].priority, EventPriority::High);
    assert_eq!(rebuilt[0].get("tracks").unwrap(), 2);
}

// ============================================================================
// TEST 8 – Configuration and simulation
// ============================================================================

#[test]
fn test_config_round_trip_builds_lab() {
    let path = std::env::temp_dir().join(format!("vwap_lab_e2e_{}.json", std::process::id()));
    let path_str = path.to_str().unwrap();

    let manager = ConfigManager::with_defaults();
    manager.set_simulation(SimulationConfig { seed: 11, trade_count: 40, ..SimulationConfig::default() });
    manager.save_to_file(path_str).unwrap();

    let loaded = ConfigManager::new(Some(path_str)).unwrap();
    assert_eq!(loaded.simulation().seed, 11);
    assert!(loaded.validate().unwrap());

    let mut lab = VwapLab::from_manager(&loaded).unwrap();
    assert_eq!(lab.load_simulated(&loaded.simulation()), 40);
    assert_eq!(lab.progress().total, 40);

    std::fs::remove_file(&path).ok();
}

#[test]
fn test_custom_config_drives_scheduler() {
    let replay = ReplayConfig { tick_interval_ms: 100, max_speed: 4.0, ..ReplayConfig::default() };
    let bands = BandConfig { multipliers: vec![1.5], at_tolerance_pct: 0.0 };
    let mut lab = VwapLab::with_config(replay, bands);

    lab.set_speed(4.0).unwrap();
    assert_eq!(lab.tick_interval(), std::time::Duration::from_millis(25));
    assert!(lab.set_speed(5.0).is_err());
    assert_eq!(lab.band_config().multipliers, vec![1.5]);
}

#[test]
fn test_simulated_scenario_is_seeded() {
    let config = SimulationConfig { seed: 21, trade_count: 30, regime: MarketRegime::TrendingDown, ..SimulationConfig::default() };
    let a: Vec<NewTrade> = TradeSimulator::new(config.clone()).generate_scenario();
    let b: Vec<NewTrade> = TradeSimulator::new(config).generate_scenario();
    assert_eq!(a, b);

    let mut lab = VwapLab::default();
    assert_eq!(lab.load_scenario(a), 30);
    lab.seek(30).unwrap();
    assert_tracks_consistent(&lab);
    assert_eq!(lab.metrics().total_trades(), 30);
}

// ============================================================================
// TEST 9 – Async playback
// ============================================================================

#[tokio::test]
async fn test_playback_driver_with_interleaved_command() {
    use parking_lot::RwLock;
    use vwap_lab::layer2::spawn_playback;

    let replay = ReplayConfig { tick_interval_ms: 1, ..ReplayConfig::default() };
    let mut lab = VwapLab::with_config(replay, BandConfig::default());
    lab.load_simulated(&SimulationConfig { seed: 8, trade_count: 25, ..SimulationConfig::default() });
    lab.play().unwrap();
    let lab = Arc::new(RwLock::new(lab));

    let handle = spawn_playback(Arc::clone(&lab), None);
    lab.write().submit_manual_trade(100.0, 5.0, Some(3.5)).unwrap();

    let summary = handle.await.unwrap();
    assert_eq!(summary.final_state, ReplayState::Complete);
    assert_eq!(summary.processed, 26);
    assert_tracks_consistent(&lab.read());
}
