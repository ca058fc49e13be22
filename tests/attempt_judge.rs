mod common;

use blunder_check::{
    attempt::{VerdictSource, judge_attempt},
    config::Review,
    oracle::Oracle,
    report::{BlunderRecord, PlayerColor, TierMeasurement, TierPair},
};
use common::*;

fn tier(optimal: f64, actual: f64, top: &[(&str, f64)]) -> TierMeasurement {
    let mut m = TierMeasurement::new(optimal, actual);
    m.top_moves_before = top.iter().map(|(u, p)| mv(u, *p)).collect();
    m
}

fn record() -> BlunderRecord {
    BlunderRecord {
        game_date: "2024.01.02".into(),
        game_index: 0,
        ply_number: 2,
        player_color: PlayerColor::White,
        position_before: fen_after(BEFORE_G4),
        blunder_move: "g2g4".into(),
        blunder_move_notation: "g4".into(),
        tiers: TierPair {
            cheap: tier(0.80, 0.60, &[("d2d4", 0.80), ("b1c3", 0.70), ("e2e4", 0.65), ("c2c3", 0.64)]),
            expensive: tier(0.72, 0.55, &[("d2d4", 0.72), ("b1c3", 0.71), ("g1h3", 0.70)]),
        },
    }
}

#[test]
fn cheap_list_hit_near_optimum_is_solved() {
    let v = judge_attempt(&record(), "d2d4", &Review::default(), None).unwrap();
    assert!(v.solved);
    assert_eq!(v.source, VerdictSource::PrecomputedCheap);
    assert!(approx(v.p_win_after, 0.80));
}

#[test]
fn expensive_optimum_can_solve_a_cheap_hit() {
    // 0.70 misses the cheap optimum (0.77) but clears the expensive one (0.69).
    let v = judge_attempt(&record(), "b1c3", &Review::default(), None).unwrap();
    assert!(v.solved);
    assert_eq!(v.source, VerdictSource::PrecomputedExpensive);
    assert!(approx(v.p_win_after, 0.70));
}

#[test]
fn cheap_hit_below_both_optima_is_not_solved() {
    let v = judge_attempt(&record(), "e2e4", &Review::default(), None).unwrap();
    assert!(!v.solved);
    assert!(v.improved);
    assert_eq!(v.source, VerdictSource::PrecomputedCheap);
}

#[test]
fn expensive_only_hit_uses_its_score() {
    let v = judge_attempt(&record(), "g1h3", &Review::default(), None).unwrap();
    assert!(v.solved);
    assert_eq!(v.source, VerdictSource::PrecomputedExpensive);
    assert!(approx(v.p_win_after, 0.70));
}

#[test]
fn moves_past_match_depth_fall_back_to_live_oracle() {
    let after_c3 = fen_after(&["f2f3", "e7e5", "c2c3"]);
    let live = TableOracle::neutral()
        .with(&fen_after(BEFORE_G4), &[("d2d4", 0.81)])
        .with(&after_c3, &[("d8h4", 0.21)]);

    let v = judge_attempt(&record(), "c2c3", &Review::default(), Some(&live as &dyn Oracle)).unwrap();
    assert_eq!(v.source, VerdictSource::LiveCheap);
    assert!(approx(v.p_win_after, 0.79));
    assert!(v.solved);
    assert_eq!(live.calls(), 2);
}

#[test]
fn live_fallback_needs_an_oracle() {
    assert!(judge_attempt(&record(), "a2a3", &Review::default(), None).is_err());

    let down = TableOracle::failing();
    assert!(judge_attempt(&record(), "a2a3", &Review::default(), Some(&down as &dyn Oracle)).is_err());
}

#[test]
fn illegal_attempt_is_rejected() {
    assert!(judge_attempt(&record(), "e2e5", &Review::default(), None).is_err());
    assert!(judge_attempt(&record(), "zz", &Review::default(), None).is_err());
}
