use crate::{
    attempt::judge_attempt,
    config::Config,
    oracle::{Oracle, python::PythonOracle},
    scanner::{ScanSettings, Scanner},
    tracker::LearnedTracker,
    training::{BlunderDataManager, ReviewSettings},
    util::ensure_dir,
};
use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, Layer, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "blunder-check")]
#[command(about = "Two-tier blunder scanner and review filter for PGN archives")]
pub struct Args {
    #[command(subcommand)]
    pub cmd: Command,

    /// Path to config TOML. If omitted, uses ./blunder-check.toml if present.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Override log level (trace/debug/info/warn/error).
    #[arg(long)]
    pub log_level: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start both oracles and report what they say about themselves.
    Doctor {},
    /// Scan an archive for the tracked player's blunders.
    Scan {
        archive: PathBuf,
        #[arg(long)]
        player: Option<String>,
        #[arg(long)]
        threshold: Option<f64>,
        #[arg(long)]
        top_n: Option<usize>,
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Print the filtered training set.
    Review {
        #[arg(long)]
        report: Option<PathBuf>,
        /// Include positions already solved.
        #[arg(long)]
        all: bool,
        #[arg(long)]
        threshold: Option<f64>,
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Judge and record a corrective move for a stored blunder.
    Attempt {
        #[arg(long)]
        position: String,
        #[arg(long = "move")]
        mv: String,
        #[arg(long)]
        report: Option<PathBuf>,
    },
    /// Print the review progress stored for a position.
    Status {
        #[arg(long)]
        position: String,
    },
    /// Clear the solved mark for a position.
    Reset {
        #[arg(long)]
        position: String,
    },
}

pub fn dispatch(args: Args) -> Result<()> {
    let cfg = match resolve_config_path(args.config.as_deref()) {
        Some(path) => Config::load(&path)?,
        None => Config::default(),
    };

    let log_path = resolve_log_path(&cfg);
    let _guard = init_logging(&args, &cfg, log_path.as_deref())?;

    match &args.cmd {
        Command::Doctor {} => doctor(&cfg),
        Command::Scan {
            archive,
            player,
            threshold,
            top_n,
            output,
        } => {
            let mut settings = ScanSettings::from_config(&cfg);
            if let Some(p) = player {
                settings.player = p.clone();
            }
            if let Some(t) = threshold {
                settings.threshold = *t;
            }
            if let Some(n) = top_n {
                settings.top_n = (*n).max(1);
            }
            let output = output
                .clone()
                .unwrap_or_else(|| PathBuf::from(&cfg.paths.report_path));
            scan(&cfg, settings, archive, &output)
        }
        Command::Review {
            report,
            all,
            threshold,
            limit,
        } => {
            let mut settings = ReviewSettings::from_config(&cfg.review);
            if *all {
                settings.show_only_unsolved = false;
            }
            if let Some(t) = threshold {
                settings.threshold = *t;
            }
            review(&cfg, settings, &report_path(&cfg, report.as_deref()), *limit)
        }
        Command::Attempt {
            position,
            mv,
            report,
        } => attempt(&cfg, position, mv, &report_path(&cfg, report.as_deref())),
        Command::Status { position } => status(&cfg, position),
        Command::Reset { position } => reset(&cfg, position),
    }
}

fn resolve_config_path(user: Option<&Path>) -> Option<PathBuf> {
    if let Some(p) = user {
        return Some(p.to_path_buf());
    }
    let default = PathBuf::from("blunder-check.toml");
    default.exists().then_some(default)
}

fn init_logging(args: &Args, cfg: &Config, file_path: Option<&Path>) -> Result<Option<WorkerGuard>> {
    let level = args
        .log_level
        .as_deref()
        .unwrap_or(cfg.logging.level.as_str());

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    // Stdout carries the JSON results; logs go to stderr.
    let stderr_layer = if cfg.logging.json {
        tracing_subscriber::fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_target(true)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(true)
            .boxed()
    };

    let (file_layer, guard) = if let Some(path) = file_path {
        let parent = path.parent().unwrap_or_else(|| Path::new("."));
        if !parent.as_os_str().is_empty() {
            ensure_dir(parent)?;
        }
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("open log file: {}", path.display()))?;
        let (non_blocking, guard) = tracing_appender::non_blocking(file);
        let layer = tracing_subscriber::fmt::layer()
            .with_writer(non_blocking)
            .with_ansi(false)
            .with_target(true)
            .boxed();
        (Some(layer), Some(guard))
    } else {
        (None, None)
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| anyhow!("failed to init logging: {e}"))?;

    Ok(guard)
}

fn resolve_log_path(cfg: &Config) -> Option<PathBuf> {
    if !cfg.logging.write_to_file {
        return None;
    }
    if !cfg.logging.file_path.is_empty() {
        return Some(PathBuf::from(&cfg.logging.file_path));
    }
    let report = Path::new(&cfg.paths.report_path);
    Some(report.with_file_name("blunder-check.log"))
}

fn report_path(cfg: &Config, user: Option<&Path>) -> PathBuf {
    user.map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(&cfg.paths.report_path))
}

fn print_json(cfg: &Config, value: &serde_json::Value) -> Result<()> {
    if cfg.global.print_summary {
        println!("{}", serde_json::to_string_pretty(value)?);
    }
    Ok(())
}

fn doctor(cfg: &Config) -> Result<()> {
    let mut tiers = serde_json::Map::new();
    for (label, model) in [
        ("cheap", &cfg.oracle.cheap.model),
        ("expensive", &cfg.oracle.expensive.model),
    ] {
        let oracle = PythonOracle::new(cfg, model)?;
        let diag = oracle.doctor()?;
        tiers.insert(label.to_string(), serde_json::to_value(&diag)?);
    }
    println!("{}", serde_json::to_string_pretty(&tiers)?);
    Ok(())
}

fn scan(cfg: &Config, settings: ScanSettings, archive: &Path, output: &Path) -> Result<()> {
    if settings.player.trim().is_empty() {
        return Err(anyhow!("no tracked player: pass --player or set [scan].player"));
    }
    if !archive.is_file() {
        return Err(anyhow!("archive does not exist: {}", archive.display()));
    }

    let cheap = PythonOracle::new(cfg, &cfg.oracle.cheap.model)?;
    let expensive = PythonOracle::new(cfg, &cfg.oracle.expensive.model)?;
    let scanner = Scanner::new(cheap, expensive, settings);
    let outcome = scanner.scan(archive, output)?;

    print_json(
        cfg,
        &serde_json::json!({
            "archive": outcome.report.scan_progress.last_pgn_filepath,
            "output": output,
            "last_game_index_processed": outcome.report.scan_progress.last_game_index_processed,
            "blunders_total": outcome.report.blunders.len(),
            "stats": outcome.stats,
            "status": if outcome.aborted.is_some() { "aborted" } else { "ok" },
        }),
    )?;

    match outcome.aborted {
        Some(reason) => Err(anyhow!(
            "scan incomplete; partial results for {}: {reason}",
            output.display()
        )),
        None => Ok(()),
    }
}

fn review(cfg: &Config, settings: ReviewSettings, report: &Path, limit: Option<usize>) -> Result<()> {
    let tracker = LearnedTracker::open(Path::new(&cfg.paths.progress_path));
    let mgr = BlunderDataManager::load(report, settings, &tracker)?;
    info!("{} of {} blunders selected for review", mgr.len(), mgr.loaded());

    let items: Vec<_> = mgr
        .training_set()
        .take(limit.unwrap_or(usize::MAX))
        .collect();
    print_json(
        cfg,
        &serde_json::json!({
            "report": report,
            "loaded": mgr.loaded(),
            "available": mgr.len(),
            "stats": mgr.stats(),
            "blunders": items,
        }),
    )
}

fn attempt(cfg: &Config, position: &str, mv: &str, report: &Path) -> Result<()> {
    let mut tracker = LearnedTracker::open(Path::new(&cfg.paths.progress_path));
    let settings = ReviewSettings::from_config(&cfg.review);
    let mgr = BlunderDataManager::load(report, settings, &tracker)?;
    let record = mgr
        .find(position)
        .ok_or_else(|| anyhow!("no stored blunder for position {position}"))?;

    let live = match PythonOracle::new(cfg, &cfg.oracle.cheap.model) {
        Ok(oracle) => Some(oracle),
        Err(err) => {
            warn!("live oracle unavailable: {err:#}");
            None
        }
    };
    let verdict = judge_attempt(
        record,
        mv,
        &cfg.review,
        live.as_ref().map(|o| o as &dyn Oracle),
    )?;

    tracker.record_attempt(
        &record.position_before,
        &record.blunder_move,
        record.p_win_drop(),
        &verdict.attempted_move,
        verdict.p_win_after,
        verdict.solved,
    );
    tracker.save()?;

    print_json(
        cfg,
        &serde_json::json!({
            "verdict": verdict,
            "entry": tracker.status(position),
        }),
    )
}

fn status(cfg: &Config, position: &str) -> Result<()> {
    let tracker = LearnedTracker::open(Path::new(&cfg.paths.progress_path));
    print_json(
        cfg,
        &serde_json::json!({
            "position": position,
            "solved": tracker.is_solved(position),
            "entry": tracker.status(position),
        }),
    )
}

fn reset(cfg: &Config, position: &str) -> Result<()> {
    let mut tracker = LearnedTracker::open(Path::new(&cfg.paths.progress_path));
    tracker.reset_solved(position);
    let saved = tracker.save()?;
    print_json(
        cfg,
        &serde_json::json!({
            "position": position,
            "solved": tracker.is_solved(position),
            "saved": saved,
        }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn every_subcommand_has_help_text() {
        let cmd = Args::command();
        for sub in cmd.get_subcommands() {
            let about = sub.get_about().map(|a| a.to_string()).unwrap_or_default();
            assert!(!about.is_empty(), "{} has no help text", sub.get_name());
        }
        let status = cmd.find_subcommand("status").unwrap();
        let about = status.get_about().unwrap().to_string();
        assert!(about.starts_with("Print the review progress stored for a position"));
    }

    #[test]
    fn status_requires_a_position() {
        assert!(Args::try_parse_from(["blunder-check", "status"]).is_err());
        let fen = "8/8/8/8/8/8/8/K6k w - - 0 1";
        let args = Args::try_parse_from(["blunder-check", "status", "--position", fen]).unwrap();
        assert!(matches!(args.cmd, Command::Status { .. }));
    }
}
