use serde::{Deserialize, Serialize};

/// One legal move as ranked by an oracle, scored for the side to move.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredMove {
    #[serde(rename = "move")]
    pub uci: String,
    #[serde(rename = "notation", default)]
    pub san: String,
    pub p_win: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OracleDiag {
    pub ok: bool,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
pub enum OracleRequest<'a> {
    Ping,
    TopMoves { fen: &'a str, k: usize },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OracleReply {
    pub ok: bool,
    #[serde(default)]
    pub moves: Vec<ScoredMove>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}
