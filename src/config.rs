use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub global: Global,
    #[serde(default)]
    pub paths: Paths,
    #[serde(default)]
    pub scan: Scan,
    #[serde(default)]
    pub review: Review,
    #[serde(default)]
    pub oracle: Oracle,
    #[serde(default)]
    pub logging: Logging,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading config: {}", path.display()))?;
        let cfg: Config = toml::from_str(&raw).with_context(|| "parsing TOML")?;
        Ok(cfg)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Global {
    pub print_summary: bool,
}
impl Default for Global {
    fn default() -> Self {
        Self {
            print_summary: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Paths {
    pub report_path: String,
    pub progress_path: String,
}
impl Default for Paths {
    fn default() -> Self {
        Self {
            report_path: "blunders_report.json".into(),
            progress_path: "learned_blunders_progress.json".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scan {
    /// Name matched against the White/Black headers. Empty means "must be given on the CLI".
    pub player: String,
    pub threshold: f64,
    pub top_n: usize,
    pub checkpoint_every: u64,
    pub atomic_checkpoints: bool,
}
impl Default for Scan {
    fn default() -> Self {
        Self {
            player: "".into(),
            threshold: 0.05,
            top_n: 3,
            checkpoint_every: 10,
            atomic_checkpoints: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Review {
    pub threshold: f64,
    pub negligible_drop: f64,
    pub solved_tolerance: f64,
    pub show_only_unsolved: bool,
    pub precomputed_match_depth: usize,
}
impl Default for Review {
    fn default() -> Self {
        Self {
            threshold: 0.10,
            negligible_drop: 0.01,
            solved_tolerance: 0.03,
            show_only_unsolved: true,
            precomputed_match_depth: 3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Oracle {
    pub python_exe: String,
    pub script: String,
    pub pin_scripts_dir: bool,
    pub startup_timeout_seconds: u64,
    pub query_timeout_seconds: u64,
    #[serde(default)]
    pub env: std::collections::BTreeMap<String, String>,
    #[serde(default = "OracleTier::cheap")]
    pub cheap: OracleTier,
    #[serde(default = "OracleTier::expensive")]
    pub expensive: OracleTier,
}
impl Default for Oracle {
    fn default() -> Self {
        Self {
            python_exe: "python3".into(),
            script: "scripts/oracle_server.py".into(),
            pin_scripts_dir: true,
            startup_timeout_seconds: 300,
            query_timeout_seconds: 60,
            env: Default::default(),
            cheap: OracleTier::cheap(),
            expensive: OracleTier::expensive(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OracleTier {
    pub model: String,
}
impl OracleTier {
    fn cheap() -> Self {
        Self { model: "9M".into() }
    }

    fn expensive() -> Self {
        Self {
            model: "136M".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Logging {
    pub level: String,
    pub json: bool,
    pub write_to_file: bool,
    pub file_path: String,
}
impl Default for Logging {
    fn default() -> Self {
        Self {
            level: "info".into(),
            json: false,
            write_to_file: false,
            file_path: "".into(),
        }
    }
}
