//! Per-position review progress, persisted as a JSON object keyed by FEN.
//!
//! Mutations only mark the store dirty; `save` does the durable write.

use crate::util::{now_rfc3339, write_json};
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attempt {
    pub attempted_move: String,
    pub p_win_after: f64,
    pub solved_this_attempt: bool,
    pub timestamp: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LearnedEntry {
    #[serde(default)]
    pub attempts: Vec<Attempt>,
    #[serde(default)]
    pub is_marked_overall_solved: bool,
    #[serde(default)]
    pub last_attempt_timestamp: Option<String>,
    pub original_blunder_move: String,
    pub original_p_win_drop: f64,
}

impl LearnedEntry {
    /// Whether any attempt played exactly `uci`.
    pub fn tried(&self, uci: &str) -> bool {
        self.attempts.iter().any(|a| a.attempted_move == uci)
    }
}

pub struct LearnedTracker {
    path: PathBuf,
    entries: BTreeMap<String, LearnedEntry>,
    dirty: bool,
}

impl LearnedTracker {
    /// Load the store at `path`. A missing file gives an empty store; so
    /// does an unreadable one, which is left alone until the next save.
    pub fn open(path: &Path) -> Self {
        let entries = if path.exists() {
            match read_entries(path) {
                Ok(entries) => {
                    info!("loaded review progress for {} positions from {}", entries.len(), path.display());
                    entries
                }
                Err(err) => {
                    warn!("review progress {} unreadable; starting empty: {err:#}", path.display());
                    BTreeMap::new()
                }
            }
        } else {
            debug!("no review progress at {}", path.display());
            BTreeMap::new()
        };

        Self {
            path: path.to_path_buf(),
            entries,
            dirty: false,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn record_attempt(
        &mut self,
        position: &str,
        original_move: &str,
        original_drop: f64,
        attempted_move: &str,
        p_win_after: f64,
        solved_this_attempt: bool,
    ) {
        let now = now_rfc3339();
        let entry = self
            .entries
            .entry(position.to_string())
            .or_insert_with(|| LearnedEntry {
                attempts: Vec::new(),
                is_marked_overall_solved: false,
                last_attempt_timestamp: None,
                original_blunder_move: original_move.to_string(),
                original_p_win_drop: original_drop,
            });

        entry.attempts.push(Attempt {
            attempted_move: attempted_move.to_string(),
            p_win_after,
            solved_this_attempt,
            timestamp: now.clone(),
        });
        entry.last_attempt_timestamp = Some(now);

        if solved_this_attempt && !entry.is_marked_overall_solved {
            entry.is_marked_overall_solved = true;
            info!("position solved: {position}");
        }
        self.dirty = true;
        debug!("attempt {attempted_move} at {position} solved={solved_this_attempt}");
    }

    pub fn status(&self, position: &str) -> Option<&LearnedEntry> {
        self.entries.get(position)
    }

    pub fn is_solved(&self, position: &str) -> bool {
        self.status(position)
            .is_some_and(|e| e.is_marked_overall_solved)
    }

    /// Clear the solved mark for `position`; attempts are kept.
    pub fn reset_solved(&mut self, position: &str) {
        match self.entries.get_mut(position) {
            Some(entry) => {
                if entry.is_marked_overall_solved {
                    entry.is_marked_overall_solved = false;
                    self.dirty = true;
                    info!("solved mark cleared: {position}");
                }
            }
            None => warn!("reset requested for unknown position {position}"),
        }
    }

    /// Write the store if it changed. Returns whether a write happened.
    pub fn save(&mut self) -> Result<bool> {
        if !self.dirty {
            debug!("review progress unchanged; nothing to save");
            return Ok(false);
        }
        write_json(&self.path, &self.entries, true)?;
        self.dirty = false;
        info!("saved review progress for {} positions to {}", self.entries.len(), self.path.display());
        Ok(true)
    }
}

fn read_entries(path: &Path) -> Result<BTreeMap<String, LearnedEntry>> {
    use anyhow::Context;
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    let entries = serde_json::from_str(&raw)
        .with_context(|| format!("parsing {}", path.display()))?;
    Ok(entries)
}
