pub mod python;
pub mod types;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use tracing::warn;

pub use types::{OracleDiag, ScoredMove};

/// A position-scoring oracle. Moves come back for the side to move in `fen`.
pub trait Oracle {
    fn doctor(&self) -> Result<OracleDiag>;
    fn top_moves(&self, fen: &str, k: usize) -> Result<Vec<ScoredMove>>;
}

impl<O: Oracle + ?Sized> Oracle for &O {
    fn doctor(&self) -> Result<OracleDiag> {
        (**self).doctor()
    }

    fn top_moves(&self, fen: &str, k: usize) -> Result<Vec<ScoredMove>> {
        (**self).top_moves(fen, k)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Cheap,
    Expensive,
}

impl Tier {
    pub fn label(self) -> &'static str {
        match self {
            Tier::Cheap => "cheap",
            Tier::Expensive => "expensive",
        }
    }
}

/// Ranked moves for `fen`, or `None` when the oracle has nothing to say.
///
/// Failures are logged and folded into `None`; callers never see them as errors.
pub fn ranked_moves(oracle: &dyn Oracle, tier: Tier, fen: &str, k: usize) -> Option<Vec<ScoredMove>> {
    match oracle.top_moves(fen, k) {
        Ok(mut moves) if !moves.is_empty() => {
            moves.sort_by(|a, b| b.p_win.total_cmp(&a.p_win));
            moves.truncate(k.max(1));
            Some(moves)
        }
        Ok(_) => None,
        Err(err) => {
            warn!("{} oracle unavailable for {fen}: {err:#}", tier.label());
            None
        }
    }
}

/// Best win-probability available to the side to move in `fen`.
pub fn optimal_p_win(oracle: &dyn Oracle, tier: Tier, fen: &str) -> Option<f64> {
    ranked_moves(oracle, tier, fen, 1).and_then(|m| m.first().map(|m| m.p_win))
}
