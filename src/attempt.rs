use crate::{
    board::{p_win_after_move, parse_position, parse_uci, uci_of},
    config::Review,
    oracle::{Oracle, ScoredMove, Tier, optimal_p_win},
    report::BlunderRecord,
};
use anyhow::{Result, anyhow};
use serde::Serialize;
use shakmaty::Position;
use tracing::{debug, info, warn};

/// Margin over the original move's result that counts as an improvement.
const IMPROVEMENT_MARGIN: f64 = 0.01;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VerdictSource {
    PrecomputedCheap,
    PrecomputedExpensive,
    LiveCheap,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AttemptVerdict {
    pub attempted_move: String,
    pub p_win_after: f64,
    pub solved: bool,
    pub improved: bool,
    pub source: VerdictSource,
}

fn lookup<'a>(moves: &'a [ScoredMove], uci: &str, depth: usize) -> Option<&'a ScoredMove> {
    moves.iter().take(depth).find(|m| m.uci == uci)
}

/// Judge a corrective move played from the record's pre-blunder position.
///
/// Stored top-move lists are consulted first (cheap tier, then expensive);
/// a move in neither is scored live against the cheap oracle. Fails when the
/// move is illegal or a live score is needed and unavailable.
pub fn judge_attempt(
    record: &BlunderRecord,
    attempted: &str,
    cfg: &Review,
    live: Option<&dyn Oracle>,
) -> Result<AttemptVerdict> {
    let pos = parse_position(&record.position_before)?;
    let m = parse_uci(&pos, attempted)?;
    let uci = uci_of(&pos, &m);
    let tol = cfg.solved_tolerance;
    let depth = cfg.precomputed_match_depth.max(1);

    let cheap = &record.tiers.cheap;
    let expensive = &record.tiers.expensive;
    let cheap_hit = lookup(&cheap.top_moves_before, &uci, depth);
    let expensive_hit = lookup(&expensive.top_moves_before, &uci, depth);

    let mut found: Option<(f64, VerdictSource)> = None;
    let mut solved = false;

    if let Some(hit) = cheap_hit {
        found = Some((hit.p_win, VerdictSource::PrecomputedCheap));
        if let Some(best) = cheap.top_move() {
            solved = hit.p_win >= best.p_win - tol;
        }
    }

    if !solved {
        if let Some(hit) = expensive_hit {
            // A cheap-tier score, when present, is kept; only the optimum changes.
            let p_win = found.map_or(hit.p_win, |(p, _)| p);
            if let Some(best) = expensive.top_move() {
                solved = p_win >= best.p_win - tol;
            }
            if found.is_none() || solved {
                found = Some((p_win, VerdictSource::PrecomputedExpensive));
            }
        }
    }

    let (p_win_after, source) = match found {
        Some(found) => found,
        None => {
            let oracle = live.ok_or_else(|| {
                anyhow!("{uci} is not among the stored moves and no live oracle is available")
            })?;
            let mover = pos.turn();
            let mut after = pos.clone();
            after.play_unchecked(m);
            let p_win = p_win_after_move(oracle, Tier::Cheap, &after, mover, 1)
                .ok_or_else(|| anyhow!("live oracle could not score {uci}"))?;
            match optimal_p_win(oracle, Tier::Cheap, &record.position_before) {
                Some(best) => solved = p_win >= best - tol,
                None => warn!("live optimum unavailable for {}", record.position_before),
            }
            debug!("{uci} scored live: {p_win:.3}");
            (p_win, VerdictSource::LiveCheap)
        }
    };

    let improved = p_win_after > cheap.p_win_after_actual_move + IMPROVEMENT_MARGIN;
    info!("attempt {uci} p_win={p_win_after:.3} solved={solved} source={source:?}");

    Ok(AttemptVerdict {
        attempted_move: uci,
        p_win_after,
        solved,
        improved,
        source,
    })
}
