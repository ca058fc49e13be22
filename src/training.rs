use crate::{
    board::parse_position,
    config::Review,
    report::BlunderRecord,
    tracker::LearnedTracker,
};
use anyhow::{Context, Result, anyhow};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;
use tracing::{debug, info, warn};

const UCI_PATTERN: &str = r"^[a-h][1-8][a-h][1-8][qrbn]?$";

#[derive(Debug, Clone, PartialEq)]
pub struct ReviewSettings {
    pub threshold: f64,
    pub negligible_drop: f64,
    pub show_only_unsolved: bool,
}

impl ReviewSettings {
    pub fn from_config(cfg: &Review) -> Self {
        Self {
            threshold: cfg.threshold,
            negligible_drop: cfg.negligible_drop,
            show_only_unsolved: cfg.show_only_unsolved,
        }
    }
}

/// Why records were left out of the last filter pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FilterStats {
    pub malformed: u64,
    pub negligible_fake: u64,
    pub anomaly: u64,
    pub below_threshold: u64,
    pub solved: u64,
    pub found_top_move: u64,
    pub kept: u64,
}

#[derive(Deserialize)]
struct RawReport {
    #[serde(default)]
    blunders: Vec<Value>,
}

/// Filtered, cursor-addressable view over a scan report's blunders.
///
/// Records are validated once at load; the filter never touches the
/// review progress store except to read it.
pub struct BlunderDataManager {
    records: Vec<BlunderRecord>,
    malformed: u64,
    settings: ReviewSettings,
    training: Vec<usize>,
    cursor: Option<usize>,
    stats: FilterStats,
}

impl BlunderDataManager {
    pub fn load(path: &Path, settings: ReviewSettings, tracker: &LearnedTracker) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading blunder report: {}", path.display()))?;
        let report: RawReport = serde_json::from_str(&raw)
            .with_context(|| format!("parsing blunder report: {}", path.display()))?;
        info!("loaded {} blunder records from {}", report.blunders.len(), path.display());
        Self::from_values(report.blunders, settings, tracker)
    }

    pub fn from_values(
        values: Vec<Value>,
        settings: ReviewSettings,
        tracker: &LearnedTracker,
    ) -> Result<Self> {
        let uci = Regex::new(UCI_PATTERN)?;
        let mut records = Vec::with_capacity(values.len());
        let mut malformed = 0;
        for (i, value) in values.into_iter().enumerate() {
            match validate(value, &uci) {
                Ok(record) => records.push(record),
                Err(err) => {
                    malformed += 1;
                    debug!("record {i} malformed: {err:#}");
                }
            }
        }

        let mut mgr = Self {
            records,
            malformed,
            settings,
            training: Vec::new(),
            cursor: None,
            stats: FilterStats::default(),
        };
        mgr.apply_filter(tracker);
        Ok(mgr)
    }

    pub fn stats(&self) -> &FilterStats {
        &self.stats
    }

    pub fn len(&self) -> usize {
        self.training.len()
    }

    pub fn is_empty(&self) -> bool {
        self.training.is_empty()
    }

    /// Valid records loaded, before any filtering.
    pub fn loaded(&self) -> usize {
        self.records.len()
    }

    pub fn training_set(&self) -> impl Iterator<Item = &BlunderRecord> {
        self.training.iter().map(|&i| &self.records[i])
    }

    pub fn set_filter_mode(&mut self, show_only_unsolved: bool, tracker: &LearnedTracker) {
        if self.settings.show_only_unsolved == show_only_unsolved {
            return;
        }
        self.settings.show_only_unsolved = show_only_unsolved;
        self.apply_filter(tracker);
        info!(
            "show_only_unsolved={show_only_unsolved}; {} blunders available",
            self.training.len()
        );
    }

    pub fn set_threshold(&mut self, threshold: f64, tracker: &LearnedTracker) {
        if self.settings.threshold == threshold {
            return;
        }
        self.settings.threshold = threshold;
        self.apply_filter(tracker);
        info!("review threshold={threshold}; {} blunders available", self.training.len());
    }

    /// Re-run the filter against the tracker's current state.
    pub fn refresh(&mut self, tracker: &LearnedTracker) {
        self.apply_filter(tracker);
    }

    pub fn current(&self) -> Option<&BlunderRecord> {
        self.cursor
            .and_then(|c| self.training.get(c))
            .map(|&i| &self.records[i])
    }

    #[allow(clippy::should_implement_trait)]
    pub fn next(&mut self) -> Option<&BlunderRecord> {
        let n = self.training.len();
        if n == 0 {
            self.cursor = None;
            return None;
        }
        self.cursor = Some(self.cursor.map_or(0, |c| (c + 1) % n));
        self.current()
    }

    pub fn prev(&mut self) -> Option<&BlunderRecord> {
        let n = self.training.len();
        if n == 0 {
            self.cursor = None;
            return None;
        }
        self.cursor = Some(self.cursor.map_or(n - 1, |c| (c + n - 1) % n));
        self.current()
    }

    /// 1-based position of the cursor, 0 when nothing is selected.
    pub fn position_display(&self) -> usize {
        self.cursor.map_or(0, |c| c + 1)
    }

    /// A loaded record by position, whether or not it passed the filter.
    pub fn find(&self, position: &str) -> Option<&BlunderRecord> {
        self.records.iter().find(|r| r.position_before == position)
    }

    /// Record an attempt against the current item. False when there is none.
    pub fn record_attempt(
        &self,
        tracker: &mut LearnedTracker,
        attempted_move: &str,
        p_win_after: f64,
        solved: bool,
    ) -> bool {
        let Some(record) = self.current() else {
            return false;
        };
        tracker.record_attempt(
            &record.position_before,
            &record.blunder_move,
            record.p_win_drop(),
            attempted_move,
            p_win_after,
            solved,
        );
        true
    }

    fn apply_filter(&mut self, tracker: &LearnedTracker) {
        let mut stats = FilterStats {
            malformed: self.malformed,
            ..Default::default()
        };
        let mut training = Vec::new();

        for (i, record) in self.records.iter().enumerate() {
            let drop = record.p_win_drop();
            let top = record.tiers.cheap.top_move().map(|m| m.uci.as_str());

            if top == Some(record.blunder_move.as_str()) {
                if drop < self.settings.negligible_drop {
                    stats.negligible_fake += 1;
                } else {
                    stats.anomaly += 1;
                    warn!(
                        "data anomaly: blunder {} is the cheap tier's top move yet drop is {drop:.3} at {}",
                        record.blunder_move, record.position_before
                    );
                }
                continue;
            }

            if drop < self.settings.threshold {
                stats.below_threshold += 1;
                continue;
            }

            if self.settings.show_only_unsolved {
                if tracker.is_solved(&record.position_before) {
                    stats.solved += 1;
                    continue;
                }
                let found_top = match (tracker.status(&record.position_before), top) {
                    (Some(entry), Some(top)) => entry.tried(top),
                    _ => false,
                };
                if found_top {
                    stats.found_top_move += 1;
                    continue;
                }
            }

            training.push(i);
        }

        stats.kept = training.len() as u64;
        if training.is_empty() && !self.records.is_empty() {
            warn!("no blunders meet the current review criteria");
        }
        debug!(?stats, "filter pass");

        self.training = training;
        self.cursor = None;
        self.stats = stats;
    }
}

fn validate(value: Value, uci: &Regex) -> Result<BlunderRecord> {
    let record: BlunderRecord = serde_json::from_value(value)?;
    parse_position(&record.position_before)?;
    if !uci.is_match(&record.blunder_move) {
        return Err(anyhow!("blunder move is not UCI: {}", record.blunder_move));
    }
    if !record.p_win_drop().is_finite() {
        return Err(anyhow!("non-finite drop"));
    }
    Ok(record)
}
