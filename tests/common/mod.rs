#![allow(dead_code)]

use anyhow::{Result, anyhow};
use blunder_check::{
    board::{fen_of, parse_uci},
    oracle::{Oracle, OracleDiag, ScoredMove},
    scanner::ScanSettings,
};
use shakmaty::{Chess, Position};
use std::cell::Cell;
use std::collections::HashMap;
use std::path::Path;

/// Oracle answering from a FEN-keyed table. Unknown positions get a single
/// neutral 0.5 move unless the oracle was built failing.
pub struct TableOracle {
    table: HashMap<String, Vec<ScoredMove>>,
    fail: bool,
    calls: Cell<usize>,
}

impl TableOracle {
    pub fn neutral() -> Self {
        Self {
            table: HashMap::new(),
            fail: false,
            calls: Cell::new(0),
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::neutral()
        }
    }

    pub fn with(mut self, fen: &str, moves: &[(&str, f64)]) -> Self {
        self.table
            .insert(fen.to_string(), moves.iter().map(|(u, p)| mv(u, *p)).collect());
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.get()
    }
}

impl Oracle for TableOracle {
    fn doctor(&self) -> Result<OracleDiag> {
        Ok(OracleDiag {
            ok: !self.fail,
            model: Some("table".into()),
            version: None,
            error: None,
        })
    }

    fn top_moves(&self, fen: &str, k: usize) -> Result<Vec<ScoredMove>> {
        self.calls.set(self.calls.get() + 1);
        if self.fail {
            return Err(anyhow!("oracle down"));
        }
        let moves = self
            .table
            .get(fen)
            .cloned()
            .unwrap_or_else(|| vec![mv("a2a3", 0.5)]);
        Ok(moves.into_iter().take(k).collect())
    }
}

pub fn mv(uci: &str, p_win: f64) -> ScoredMove {
    ScoredMove {
        uci: uci.into(),
        san: String::new(),
        p_win,
    }
}

/// FEN after playing `ucis` from the initial position.
pub fn fen_after(ucis: &[&str]) -> String {
    let mut pos = Chess::default();
    for uci in ucis {
        let m = parse_uci(&pos, uci).unwrap();
        pos.play_unchecked(m);
    }
    fen_of(&pos)
}

pub const BEFORE_G4: &[&str] = &["f2f3", "e7e5"];
pub const AFTER_G4: &[&str] = &["f2f3", "e7e5", "g2g4"];

pub fn fools_mate(white: &str, black: &str) -> String {
    format!(
        "[Event \"Casual\"]\n[White \"{white}\"]\n[Black \"{black}\"]\n[Date \"2024.01.02\"]\n[Result \"0-1\"]\n\n1. f3 e5 2. g4 Qh4# 0-1\n\n"
    )
}

pub fn quiet_game(white: &str, black: &str) -> String {
    format!(
        "[Event \"Casual\"]\n[White \"{white}\"]\n[Black \"{black}\"]\n[Date \"2024.01.03\"]\n[Result \"1/2-1/2\"]\n\n1. Nf3 Nf6 2. Ng1 Ng8 1/2-1/2\n\n"
    )
}

pub fn write_archive(path: &Path, games: &[String]) {
    std::fs::write(path, games.concat()).unwrap();
}

/// Cheap tier from the worked example: 0.80 before g4, 0.60 after it.
pub fn cheap_oracle() -> TableOracle {
    TableOracle::neutral()
        .with(
            &fen_after(BEFORE_G4),
            &[("d2d4", 0.80), ("b1c3", 0.78), ("e2e4", 0.70)],
        )
        .with(&fen_after(AFTER_G4), &[("d8h4", 0.40)])
}

/// Expensive tier from the worked example: 0.75 before g4, 0.55 after it.
pub fn expensive_oracle() -> TableOracle {
    TableOracle::neutral()
        .with(
            &fen_after(BEFORE_G4),
            &[("d2d4", 0.75), ("e2e4", 0.71), ("b1c3", 0.69)],
        )
        .with(&fen_after(AFTER_G4), &[("d8h4", 0.45)])
}

pub fn settings(player: &str) -> ScanSettings {
    ScanSettings {
        player: player.into(),
        threshold: 0.05,
        top_n: 3,
        checkpoint_every: 1,
        atomic_checkpoints: true,
    }
}

pub fn approx(a: f64, b: f64) -> bool {
    (a - b).abs() < 1e-9
}
