//! Board helpers on top of `shakmaty`: FEN keys, UCI moves, and the
//! terminal-position rules used when a game result replaces an oracle call.

use crate::oracle::{Oracle, Tier, optimal_p_win};
use anyhow::{Result, anyhow};
use shakmaty::{
    CastlingMode, Chess, Color, EnPassantMode, Move, Position, fen::Fen, uci::UciMove,
};
use std::collections::HashMap;

pub const WIN: f64 = 1.0;
pub const LOSS: f64 = 0.0;
pub const DRAW: f64 = 0.5;

pub fn fen_of(pos: &Chess) -> String {
    Fen::from_position(pos, EnPassantMode::Legal).to_string()
}

/// Parse a FEN into a playable position, accepting Chess960 castling rights
/// when the standard interpretation rejects them.
pub fn parse_position(fen: &str) -> Result<Chess> {
    let parsed: Fen = fen
        .trim()
        .parse()
        .map_err(|e| anyhow!("invalid FEN '{fen}': {e}"))?;
    match parsed.clone().into_position::<Chess>(CastlingMode::Standard) {
        Ok(pos) => Ok(pos),
        Err(_) => parsed
            .into_position::<Chess>(CastlingMode::Chess960)
            .map_err(|e| anyhow!("illegal position '{fen}': {e}")),
    }
}

/// Half-moves played before `pos`, derived from its move counters.
pub fn ply_index(pos: &Chess) -> u32 {
    let full = pos.fullmoves().get();
    2 * (full - 1) + u32::from(pos.turn() == Color::Black)
}

pub fn uci_of(pos: &Chess, m: &Move) -> String {
    m.to_uci(pos.castles().mode()).to_string()
}

pub fn parse_uci(pos: &Chess, uci: &str) -> Result<Move> {
    let parsed: UciMove = uci
        .trim()
        .parse()
        .map_err(|e| anyhow!("invalid UCI move '{uci}': {e}"))?;
    parsed
        .to_move(pos)
        .map_err(|e| anyhow!("illegal move '{uci}': {e}"))
}

/// Occurrence counts of positions seen during one game replay.
///
/// Keyed on placement, side to move, castling and en passant, which is what
/// threefold repetition compares.
#[derive(Debug, Default)]
pub struct Repetitions {
    seen: HashMap<String, u32>,
}

impl Repetitions {
    pub fn new(start: &Chess) -> Self {
        let mut reps = Self::default();
        reps.record(start);
        reps
    }

    /// Record `pos` and return how often it has now occurred.
    pub fn record(&mut self, pos: &Chess) -> u32 {
        let count = self.seen.entry(repetition_key(pos)).or_insert(0);
        *count += 1;
        *count
    }

    pub fn count(&self, pos: &Chess) -> u32 {
        self.seen.get(&repetition_key(pos)).copied().unwrap_or(0)
    }
}

fn repetition_key(pos: &Chess) -> String {
    let fen = fen_of(pos);
    fen.split_whitespace().take(4).collect::<Vec<_>>().join(" ")
}

/// Win-probability for `mover` when `pos` ends the game (or a draw can be
/// claimed), `None` while play goes on.
///
/// `occurrences` is how many times `pos` has appeared in the game so far,
/// counting itself.
pub fn resolved_p_win(pos: &Chess, mover: Color, occurrences: u32) -> Option<f64> {
    if pos.is_checkmate() {
        // The side to move is mated.
        return Some(if pos.turn() == mover { LOSS } else { WIN });
    }
    if pos.is_stalemate()
        || pos.is_insufficient_material()
        || pos.halfmoves() >= 100
        || occurrences >= 3
    {
        return Some(DRAW);
    }
    None
}

/// Win-probability for `mover` after their move produced `after`.
///
/// Terminal positions resolve from the result; otherwise the opponent's best
/// line is asked for and inverted. `None` when the oracle has no data.
pub fn p_win_after_move(
    oracle: &dyn Oracle,
    tier: Tier,
    after: &Chess,
    mover: Color,
    occurrences: u32,
) -> Option<f64> {
    if let Some(resolved) = resolved_p_win(after, mover, occurrences) {
        return Some(resolved);
    }
    let opponent_best = optimal_p_win(oracle, tier, &fen_of(after))?;
    Some(1.0 - opponent_best)
}
