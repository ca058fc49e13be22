use crate::{oracle::ScoredMove, util::write_json};
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlayerColor {
    White,
    Black,
}

impl From<shakmaty::Color> for PlayerColor {
    fn from(c: shakmaty::Color) -> Self {
        match c {
            shakmaty::Color::White => PlayerColor::White,
            shakmaty::Color::Black => PlayerColor::Black,
        }
    }
}

/// What one oracle tier measured at the blunder position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TierMeasurement {
    pub p_win_optimal_before: f64,
    pub p_win_after_actual_move: f64,
    pub p_win_drop: f64,
    #[serde(default)]
    pub top_moves_before: Vec<ScoredMove>,
}

impl TierMeasurement {
    pub fn new(optimal: f64, actual: f64) -> Self {
        Self {
            p_win_optimal_before: optimal,
            p_win_after_actual_move: actual,
            p_win_drop: (optimal - actual).clamp(-1.0, 1.0),
            top_moves_before: Vec::new(),
        }
    }

    pub fn top_move(&self) -> Option<&ScoredMove> {
        self.top_moves_before.first()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TierPair {
    pub cheap: TierMeasurement,
    pub expensive: TierMeasurement,
}

/// A blunder confirmed by both tiers. Written once by the scanner, never edited.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlunderRecord {
    #[serde(default = "unknown_date")]
    pub game_date: String,
    pub game_index: u64,
    pub ply_number: u32,
    pub player_color: PlayerColor,
    pub position_before: String,
    pub blunder_move: String,
    #[serde(default)]
    pub blunder_move_notation: String,
    pub tiers: TierPair,
}

fn unknown_date() -> String {
    crate::archive::UNKNOWN_DATE.to_string()
}

impl BlunderRecord {
    /// Drop measured by the cheap tier; the figure review filtering keys on.
    pub fn p_win_drop(&self) -> f64 {
        self.tiers.cheap.p_win_drop
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanProgress {
    pub last_pgn_filepath: String,
    /// -1 before any game has been completed.
    pub last_game_index_processed: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanReport {
    pub scan_progress: ScanProgress,
    pub blunders: Vec<BlunderRecord>,
}

impl ScanReport {
    pub fn fresh(source_path: &Path) -> Self {
        Self {
            scan_progress: ScanProgress {
                last_pgn_filepath: source_path.display().to_string(),
                last_game_index_processed: -1,
            },
            blunders: Vec::new(),
        }
    }

    /// Games a resumed scan must skip before reading new ones.
    pub fn games_to_skip(&self) -> u64 {
        u64::try_from(self.scan_progress.last_game_index_processed + 1).unwrap_or(0)
    }

    pub fn write(&self, path: &Path, atomic: bool) -> Result<()> {
        write_json(path, self, atomic)
    }
}

/// How an existing output file was judged at scan start.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ResumeState {
    #[default]
    Fresh,
    Resumed { from_index: u64, loaded_blunders: usize },
    StaleDifferentArchive { previous: String },
    StaleUnreadable { reason: String },
    RestartedAfterTruncation { expected_skip: u64, skipped: u64 },
}

/// Decide whether `output` holds a checkpoint for `archive_abs`.
///
/// Anything other than a readable report for the same archive yields a fresh
/// report; the old file stays on disk until the first checkpoint replaces it.
pub fn load_for_resume(output: &Path, archive_abs: &Path) -> (ScanReport, ResumeState) {
    let fresh = ScanReport::fresh(archive_abs);
    if !output.exists() {
        return (fresh, ResumeState::Fresh);
    }

    let parsed = std::fs::read_to_string(output)
        .map_err(|e| e.to_string())
        .and_then(|raw| serde_json::from_str::<ScanReport>(&raw).map_err(|e| e.to_string()));

    let previous = match parsed {
        Ok(report) => report,
        Err(reason) => {
            warn!(
                "output {} has an old or unreadable format; starting fresh: {reason}",
                output.display()
            );
            return (fresh, ResumeState::StaleUnreadable { reason });
        }
    };

    let wanted = archive_abs.display().to_string();
    if previous.scan_progress.last_pgn_filepath != wanted {
        info!(
            "output {} belongs to a different archive ({}); starting fresh",
            output.display(),
            previous.scan_progress.last_pgn_filepath
        );
        return (
            fresh,
            ResumeState::StaleDifferentArchive {
                previous: previous.scan_progress.last_pgn_filepath,
            },
        );
    }

    let state = ResumeState::Resumed {
        from_index: previous.games_to_skip(),
        loaded_blunders: previous.blunders.len(),
    };
    (previous, state)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drop_is_clamped() {
        assert_eq!(TierMeasurement::new(1.0, -1.0).p_win_drop, 1.0);
        assert_eq!(TierMeasurement::new(0.0, 2.0).p_win_drop, -1.0);
    }

    #[test]
    fn fresh_report_skips_nothing() {
        let report = ScanReport::fresh(Path::new("/tmp/a.pgn"));
        assert_eq!(report.games_to_skip(), 0);
        let raw = serde_json::to_value(&report).unwrap();
        assert_eq!(raw["scan_progress"]["last_game_index_processed"], -1);
        assert_eq!(raw["scan_progress"]["last_pgn_filepath"], "/tmp/a.pgn");
    }
}
