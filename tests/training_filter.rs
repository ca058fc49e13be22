mod common;

use blunder_check::{
    tracker::LearnedTracker,
    training::{BlunderDataManager, ReviewSettings},
};
use common::fen_after;
use serde_json::{Value, json};

fn record(fen: &str, blunder: &str, top: &str, drop: f64) -> Value {
    let tier = json!({
        "p_win_optimal_before": 0.8,
        "p_win_after_actual_move": 0.8 - drop,
        "p_win_drop": drop,
        "top_moves_before": [
            {"move": top, "notation": "", "p_win": 0.8},
            {"move": "h2h3", "notation": "h3", "p_win": 0.7}
        ]
    });
    json!({
        "game_date": "2024.01.01",
        "game_index": 0,
        "ply_number": 2,
        "player_color": "white",
        "position_before": fen,
        "blunder_move": blunder,
        "blunder_move_notation": "",
        "tiers": {"cheap": tier.clone(), "expensive": tier}
    })
}

fn settings(threshold: f64) -> ReviewSettings {
    ReviewSettings {
        threshold,
        negligible_drop: 0.01,
        show_only_unsolved: true,
    }
}

fn empty_tracker(dir: &tempfile::TempDir) -> LearnedTracker {
    LearnedTracker::open(&dir.path().join("progress.json"))
}

fn positions(mgr: &BlunderDataManager) -> Vec<String> {
    mgr.training_set().map(|r| r.position_before.clone()).collect()
}

#[test]
fn fake_blunders_never_reach_training_set() {
    let dir = tempfile::tempdir().unwrap();
    let tracker = empty_tracker(&dir);
    let fake = record(&fen_after(&[]), "e2e4", "e2e4", 0.005);
    let real = record(&fen_after(&["e2e4"]), "f7f6", "e7e5", 0.3);

    for threshold in [0.0, 0.05, 0.5] {
        let mgr = BlunderDataManager::from_values(
            vec![fake.clone(), real.clone()],
            settings(threshold),
            &tracker,
        )
        .unwrap();
        assert!(mgr.training_set().all(|r| r.blunder_move != "e2e4"));
        assert_eq!(mgr.stats().negligible_fake, 1);
    }
}

#[test]
fn self_contradictory_record_is_an_anomaly() {
    let dir = tempfile::tempdir().unwrap();
    let tracker = empty_tracker(&dir);
    let anomaly = record(&fen_after(&[]), "e2e4", "e2e4", 0.4);
    let mgr = BlunderDataManager::from_values(vec![anomaly], settings(0.1), &tracker).unwrap();

    assert!(mgr.is_empty());
    assert_eq!(mgr.stats().anomaly, 1);
    assert_eq!(mgr.stats().negligible_fake, 0);
}

#[test]
fn malformed_records_are_counted_not_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let tracker = empty_tracker(&dir);
    let mut missing_tiers = record(&fen_after(&[]), "f2f3", "e2e4", 0.3);
    missing_tiers.as_object_mut().unwrap().remove("tiers");
    let bad_fen = record("not a fen", "f2f3", "e2e4", 0.3);
    let bad_move = record(&fen_after(&[]), "Nf3", "e2e4", 0.3);
    let good = record(&fen_after(&[]), "f2f3", "e2e4", 0.3);

    let mgr = BlunderDataManager::from_values(
        vec![missing_tiers, bad_fen, bad_move, json!("junk"), good],
        settings(0.1),
        &tracker,
    )
    .unwrap();

    assert_eq!(mgr.stats().malformed, 4);
    assert_eq!(mgr.loaded(), 1);
    assert_eq!(mgr.len(), 1);
}

#[test]
fn threshold_filters_and_can_be_changed() {
    let dir = tempfile::tempdir().unwrap();
    let tracker = empty_tracker(&dir);
    let small = record(&fen_after(&[]), "f2f3", "e2e4", 0.08);
    let large = record(&fen_after(&["e2e4"]), "f7f6", "e7e5", 0.3);
    let mut mgr =
        BlunderDataManager::from_values(vec![small, large], settings(0.1), &tracker).unwrap();

    assert_eq!(mgr.len(), 1);
    assert_eq!(mgr.stats().below_threshold, 1);

    mgr.next();
    mgr.set_threshold(0.05, &tracker);
    assert_eq!(mgr.len(), 2);
    assert!(mgr.current().is_none());
    assert_eq!(mgr.position_display(), 0);
}

#[test]
fn solved_and_found_top_move_are_hidden_when_unsolved_only() {
    let dir = tempfile::tempdir().unwrap();
    let mut tracker = empty_tracker(&dir);
    let a = fen_after(&[]);
    let b = fen_after(&["e2e4"]);
    let c = fen_after(&["d2d4"]);
    let values = vec![
        record(&a, "f2f3", "e2e4", 0.3),
        record(&b, "f7f6", "e7e5", 0.3),
        record(&c, "g7g5", "d7d5", 0.3),
    ];

    // a: solved outright. b: top move played once but not judged solved.
    tracker.record_attempt(&a, "f2f3", 0.3, "d2d4", 0.79, true);
    tracker.record_attempt(&b, "f7f6", 0.3, "e7e5", 0.5, false);

    let mut mgr = BlunderDataManager::from_values(values, settings(0.1), &tracker).unwrap();
    assert_eq!(positions(&mgr), [c.clone()]);
    assert_eq!(mgr.stats().solved, 1);
    assert_eq!(mgr.stats().found_top_move, 1);

    mgr.set_filter_mode(false, &tracker);
    assert_eq!(positions(&mgr), [a, b, c]);
}

#[test]
fn toggling_filter_mode_is_reversible() {
    let dir = tempfile::tempdir().unwrap();
    let mut tracker = empty_tracker(&dir);
    let a = fen_after(&[]);
    let b = fen_after(&["e2e4"]);
    tracker.record_attempt(&a, "f2f3", 0.3, "d2d4", 0.79, true);
    let values = vec![
        record(&a, "f2f3", "e2e4", 0.3),
        record(&b, "f7f6", "e7e5", 0.3),
    ];
    let mut mgr = BlunderDataManager::from_values(values, settings(0.1), &tracker).unwrap();

    let before = positions(&mgr);
    let stats_before = mgr.stats().clone();
    mgr.set_filter_mode(false, &tracker);
    assert_eq!(mgr.len(), 2);
    mgr.set_filter_mode(true, &tracker);
    assert_eq!(positions(&mgr), before);
    assert_eq!(mgr.stats(), &stats_before);
}

#[test]
fn cursor_wraps_both_ways() {
    let dir = tempfile::tempdir().unwrap();
    let tracker = empty_tracker(&dir);
    let fens = [fen_after(&[]), fen_after(&["e2e4"]), fen_after(&["d2d4"])];
    let values: Vec<Value> = fens
        .iter()
        .map(|f| record(f, "a2a3", "b2b3", 0.3))
        .collect();
    let mut mgr = BlunderDataManager::from_values(values, settings(0.1), &tracker).unwrap();

    assert!(mgr.current().is_none());
    assert_eq!(mgr.next().unwrap().position_before, fens[0]);
    assert_eq!(mgr.position_display(), 1);
    mgr.next();
    mgr.next();
    assert_eq!(mgr.position_display(), 3);
    assert_eq!(mgr.next().unwrap().position_before, fens[0]);
    assert_eq!(mgr.prev().unwrap().position_before, fens[2]);

    mgr.refresh(&tracker);
    assert_eq!(mgr.prev().unwrap().position_before, fens[2]);
}

#[test]
fn empty_training_set_is_a_valid_state() {
    let dir = tempfile::tempdir().unwrap();
    let mut tracker = empty_tracker(&dir);
    let mut mgr = BlunderDataManager::from_values(Vec::new(), settings(0.1), &tracker).unwrap();

    assert!(mgr.next().is_none());
    assert!(mgr.prev().is_none());
    assert!(mgr.current().is_none());
    assert_eq!(mgr.position_display(), 0);
    assert!(!mgr.record_attempt(&mut tracker, "e2e4", 0.5, false));
    assert!(!tracker.is_dirty());
}

#[test]
fn loads_report_file_and_finds_by_position() {
    let dir = tempfile::tempdir().unwrap();
    let tracker = empty_tracker(&dir);
    let path = dir.path().join("report.json");
    let fen = fen_after(&["e2e4"]);
    let report = json!({
        "scan_progress": {"last_pgn_filepath": "/tmp/x.pgn", "last_game_index_processed": 0},
        "blunders": [record(&fen, "f7f6", "e7e5", 0.3)]
    });
    std::fs::write(&path, serde_json::to_string(&report).unwrap()).unwrap();

    let mgr = BlunderDataManager::load(&path, settings(0.5), &tracker).unwrap();
    assert!(mgr.is_empty());
    assert_eq!(mgr.find(&fen).unwrap().blunder_move, "f7f6");
    assert!(mgr.find("8/8/8/8/8/8/8/8 w - - 0 1").is_none());

    assert!(BlunderDataManager::load(&dir.path().join("missing.json"), settings(0.1), &tracker).is_err());
}
