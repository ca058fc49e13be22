use crate::{
    archive::{Archive, PgnGame},
    board::{Repetitions, fen_of, p_win_after_move, ply_index, uci_of},
    config::Config,
    oracle::{Oracle, Tier, optimal_p_win, ranked_moves},
    report::{BlunderRecord, ResumeState, ScanReport, TierMeasurement, TierPair, load_for_resume},
    util::absolute,
};
use anyhow::{Context, Result, anyhow};
use serde::Serialize;
use shakmaty::{Chess, Color, Position};
use std::path::Path;
use std::time::Instant;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone)]
pub struct ScanSettings {
    pub player: String,
    pub threshold: f64,
    pub top_n: usize,
    pub checkpoint_every: u64,
    pub atomic_checkpoints: bool,
}

impl ScanSettings {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            player: cfg.scan.player.clone(),
            threshold: cfg.scan.threshold,
            top_n: cfg.scan.top_n.max(1),
            checkpoint_every: cfg.scan.checkpoint_every,
            atomic_checkpoints: cfg.scan.atomic_checkpoints,
        }
    }
}

/// Tallies of every skip and rejection made during one scan session.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ScanStats {
    pub games_read: u64,
    pub games_skipped_resume: u64,
    pub games_without_player: u64,
    pub games_failed: u64,
    pub moves_evaluated: u64,
    pub tier1_unavailable: u64,
    pub tier1_rejected: u64,
    pub tier2_unavailable: u64,
    pub tier2_rejected: u64,
    pub blunders_confirmed: u64,
    pub checkpoints_written: u64,
    pub checkpoint_failures: u64,
    pub resume: ResumeState,
}

pub struct ScanOutcome {
    pub report: ScanReport,
    pub stats: ScanStats,
    /// Set when reading the archive failed part way; `report` holds what was
    /// accumulated up to that point and has been written to the output.
    pub aborted: Option<String>,
}

pub struct Scanner<O: Oracle> {
    cheap: O,
    expensive: O,
    settings: ScanSettings,
}

impl<O: Oracle> Scanner<O> {
    pub fn new(cheap: O, expensive: O, settings: ScanSettings) -> Self {
        Self {
            cheap,
            expensive,
            settings,
        }
    }

    /// Scan `archive` for the tracked player's blunders, checkpointing to
    /// `output` and resuming from it when it belongs to the same archive.
    ///
    /// Only a failure to open the archive is returned as an error. Read
    /// failures later on end the scan with `aborted` set, as does a failed
    /// final write; the outcome still carries every confirmed record.
    pub fn scan(&self, archive_path: &Path, output: &Path) -> Result<ScanOutcome> {
        let started = Instant::now();
        let archive_abs = absolute(archive_path)?;
        let mut archive = Archive::open(&archive_abs)?;
        let (mut report, resume) = load_for_resume(output, &archive_abs);
        let mut stats = ScanStats {
            resume,
            ..Default::default()
        };

        info!(
            "scan archive={} output={} player={} threshold={} top_n={}",
            archive_abs.display(),
            output.display(),
            self.settings.player,
            self.settings.threshold,
            self.settings.top_n
        );

        if let ResumeState::Resumed {
            from_index,
            loaded_blunders,
        } = stats.resume
        {
            info!("resuming at game {from_index} with {loaded_blunders} stored blunders");
            match archive.skip_games(from_index) {
                Ok(skipped) if skipped == from_index => {
                    stats.games_skipped_resume = skipped;
                }
                Ok(skipped) => {
                    warn!(
                        "archive ended after {skipped} games while skipping {from_index}; restarting from game 0"
                    );
                    archive.rewind()?;
                    report = ScanReport::fresh(&archive_abs);
                    stats.resume = ResumeState::RestartedAfterTruncation {
                        expected_skip: from_index,
                        skipped,
                    };
                }
                Err(err) => {
                    error!("archive read failed while resuming: {err:#}");
                    return Ok(ScanOutcome {
                        report,
                        stats,
                        aborted: Some(format!("{err:#}")),
                    });
                }
            }
        }

        let mut aborted = None;
        loop {
            let game = match archive.next_game() {
                Ok(Some(game)) => game,
                Ok(None) => break,
                Err(err) => {
                    error!("archive read failed; keeping partial results: {err:#}");
                    aborted = Some(format!("{err:#}"));
                    break;
                }
            };
            stats.games_read += 1;

            let before = report.blunders.len();
            if let Err(err) = self.scan_game(&game, &mut report.blunders, &mut stats) {
                stats.games_failed += 1;
                warn!("game {} skipped: {err:#}", game.index);
            }
            let found = report.blunders.len() - before;
            if found > 0 {
                info!("game {} ({}): {found} blunder(s)", game.index, game.date_or_unknown());
            }

            report.scan_progress.last_game_index_processed = game.index as i64;

            let every = self.settings.checkpoint_every;
            if every > 0 && (game.index + 1) % every == 0 {
                self.checkpoint(&report, output, &mut stats);
                info!(
                    "checkpoint after game {} blunders={} elapsed={:.1}s",
                    game.index,
                    report.blunders.len(),
                    started.elapsed().as_secs_f64()
                );
            }
        }

        let written = report
            .write(output, self.settings.atomic_checkpoints)
            .with_context(|| format!("writing final report: {}", output.display()));
        match written {
            Ok(()) => stats.checkpoints_written += 1,
            Err(err) => {
                stats.checkpoint_failures += 1;
                error!("{err:#}; results kept in memory only");
                if aborted.is_none() {
                    aborted = Some(format!("{err:#}"));
                }
            }
        }

        info!(
            "scan finished games={} blunders_total={} new={} elapsed={:.1}s",
            stats.games_read,
            report.blunders.len(),
            stats.blunders_confirmed,
            started.elapsed().as_secs_f64()
        );

        Ok(ScanOutcome {
            report,
            stats,
            aborted,
        })
    }

    fn checkpoint(&self, report: &ScanReport, output: &Path, stats: &mut ScanStats) {
        match report.write(output, self.settings.atomic_checkpoints) {
            Ok(()) => stats.checkpoints_written += 1,
            Err(err) => {
                stats.checkpoint_failures += 1;
                warn!("checkpoint write failed: {err:#}");
            }
        }
    }

    /// Replay one game, appending confirmed blunders to `found` as they are
    /// seen so an error later in the game keeps them.
    fn scan_game(
        &self,
        game: &PgnGame,
        found: &mut Vec<BlunderRecord>,
        stats: &mut ScanStats,
    ) -> Result<()> {
        let Some(side) = game.side_of(&self.settings.player) else {
            stats.games_without_player += 1;
            debug!("game {}: tracked player not found", game.index);
            return Ok(());
        };

        let mut pos = game.start_position()?;
        let mut reps = Repetitions::new(&pos);
        let date = game.date_or_unknown();

        for san_plus in &game.moves {
            let m = san_plus.san.to_move(&pos).map_err(|e| {
                anyhow!(
                    "illegal move {san_plus} at ply {} in game {}: {e}",
                    ply_index(&pos),
                    game.index
                )
            })?;
            let mut after = pos.clone();
            after.play_unchecked(m.clone());
            let occurrences = reps.record(&after);

            if pos.turn() == side {
                stats.moves_evaluated += 1;
                if let Some(tiers) = self.confirm(&pos, &after, occurrences, stats) {
                    stats.blunders_confirmed += 1;
                    found.push(BlunderRecord {
                        game_date: date.clone(),
                        game_index: game.index,
                        ply_number: ply_index(&pos),
                        player_color: side.into(),
                        position_before: fen_of(&pos),
                        blunder_move: uci_of(&pos, &m),
                        blunder_move_notation: san_plus.to_string(),
                        tiers,
                    });
                }
            }

            pos = after;
        }
        Ok(())
    }

    /// Two-tier measurement of the move from `before` to `after`. The
    /// expensive tier is only consulted once the cheap one flags the move.
    fn confirm(
        &self,
        before: &Chess,
        after: &Chess,
        occurrences: u32,
        stats: &mut ScanStats,
    ) -> Option<TierPair> {
        let fen = fen_of(before);
        let mover = before.turn();

        let Some(mut cheap) = self.measure(&self.cheap, Tier::Cheap, &fen, after, mover, occurrences)
        else {
            stats.tier1_unavailable += 1;
            return None;
        };
        if cheap.p_win_drop < self.settings.threshold {
            stats.tier1_rejected += 1;
            return None;
        }

        let Some(mut expensive) =
            self.measure(&self.expensive, Tier::Expensive, &fen, after, mover, occurrences)
        else {
            stats.tier2_unavailable += 1;
            return None;
        };
        if expensive.p_win_drop < self.settings.threshold {
            stats.tier2_rejected += 1;
            debug!(
                "cheap drop {:.3} not confirmed (expensive {:.3}) at {fen}",
                cheap.p_win_drop, expensive.p_win_drop
            );
            return None;
        }

        let n = self.settings.top_n;
        cheap.top_moves_before = ranked_moves(&self.cheap, Tier::Cheap, &fen, n).unwrap_or_default();
        expensive.top_moves_before =
            ranked_moves(&self.expensive, Tier::Expensive, &fen, n).unwrap_or_default();

        Some(TierPair { cheap, expensive })
    }

    fn measure(
        &self,
        oracle: &O,
        tier: Tier,
        fen: &str,
        after: &Chess,
        mover: Color,
        occurrences: u32,
    ) -> Option<TierMeasurement> {
        let optimal = optimal_p_win(oracle, tier, fen)?;
        let actual = p_win_after_move(oracle, tier, after, mover, occurrences)?;
        Some(TierMeasurement::new(optimal, actual))
    }
}
