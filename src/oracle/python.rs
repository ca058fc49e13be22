use super::{
    Oracle,
    types::{OracleDiag, OracleReply, OracleRequest, ScoredMove},
};
use crate::config::Config;
use anyhow::{Context, Result, anyhow};
use std::cell::RefCell;
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, Command, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Oracle backed by a long-lived python child speaking line-delimited JSON.
///
/// The child is spawned lazily and respawned after it dies or times out.
pub struct PythonOracle {
    model: String,
    python_exe: PathBuf,
    script: PathBuf,
    env: Vec<(String, String)>,
    startup_timeout: Duration,
    query_timeout: Duration,
    session: RefCell<Option<Session>>,
}

struct Session {
    child: Child,
    stdin: ChildStdin,
    replies: Receiver<std::io::Result<String>>,
}

impl Drop for Session {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

impl PythonOracle {
    pub fn new(cfg: &Config, model: &str) -> Result<Self> {
        let script = PathBuf::from(&cfg.oracle.script);
        if cfg.oracle.pin_scripts_dir {
            let cwd = std::env::current_dir().with_context(|| "current_dir")?;
            let canon = script
                .canonicalize()
                .with_context(|| format!("canonicalize oracle script: {}", script.display()))?;
            if !canon.starts_with(&cwd) {
                return Err(anyhow!(
                    "oracle script is outside cwd while pin_scripts_dir=true: {}",
                    canon.display()
                ));
            }
        }
        if !script.exists() {
            return Err(anyhow!("missing oracle script: {}", script.display()));
        }

        Ok(Self {
            model: model.to_string(),
            python_exe: resolve_python_exe(&cfg.oracle.python_exe),
            script,
            env: cfg
                .oracle
                .env
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            startup_timeout: Duration::from_secs(cfg.oracle.startup_timeout_seconds.max(1)),
            query_timeout: Duration::from_secs(cfg.oracle.query_timeout_seconds.max(1)),
            session: RefCell::new(None),
        })
    }

    fn spawn(&self) -> Result<Session> {
        info!("starting oracle model={} script={}", self.model, self.script.display());
        let mut cmd = Command::new(&self.python_exe);
        cmd.arg(&self.script).arg("--model").arg(&self.model);
        cmd.stdin(Stdio::piped());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        for (k, v) in &self.env {
            cmd.env(k, v);
        }

        let mut child = cmd
            .spawn()
            .with_context(|| format!("spawning python: {}", self.script.display()))?;
        let stdin = child.stdin.take().ok_or_else(|| anyhow!("no stdin"))?;
        let stdout = child.stdout.take().ok_or_else(|| anyhow!("no stdout"))?;

        // Drain both pipes on their own threads so a chatty child can't block
        // on a full buffer while we wait for a reply.
        if let Some(stderr) = child.stderr.take() {
            let model = self.model.clone();
            std::thread::spawn(move || {
                for line in BufReader::new(stderr).lines().map_while(|l| l.ok()) {
                    debug!("oracle[{model}] stderr: {}", line.trim_end());
                }
            });
        }

        let (tx, replies) = mpsc::channel();
        std::thread::spawn(move || {
            let mut reader = BufReader::new(stdout);
            loop {
                let mut line = String::new();
                match reader.read_line(&mut line) {
                    Ok(0) => break,
                    Ok(_) => {
                        if tx.send(Ok(line)).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        let _ = tx.send(Err(e));
                        break;
                    }
                }
            }
        });

        let mut session = Session {
            child,
            stdin,
            replies,
        };
        let hello = exchange(&mut session, &OracleRequest::Ping, self.startup_timeout)
            .with_context(|| format!("oracle {} did not answer the startup ping", self.model))?;
        if !hello.ok {
            return Err(anyhow!(
                "oracle {} failed to start: {}",
                self.model,
                hello.error.unwrap_or_default()
            ));
        }
        Ok(session)
    }

    fn request(&self, req: &OracleRequest<'_>) -> Result<OracleReply> {
        let mut slot = self.session.borrow_mut();
        if slot.is_none() {
            *slot = Some(self.spawn()?);
        }
        let Some(session) = slot.as_mut() else {
            return Err(anyhow!("oracle session missing"));
        };

        match exchange(session, req, self.query_timeout) {
            Ok(reply) => Ok(reply),
            Err(err) => {
                // Drop (and kill) the child; the next request starts a fresh one.
                warn!("oracle {} reset after failure: {err:#}", self.model);
                *slot = None;
                Err(err)
            }
        }
    }
}

fn exchange(session: &mut Session, req: &OracleRequest<'_>, timeout: Duration) -> Result<OracleReply> {
    let mut line = serde_json::to_string(req)?;
    line.push('\n');
    session
        .stdin
        .write_all(line.as_bytes())
        .with_context(|| "writing oracle request")?;
    session.stdin.flush().with_context(|| "flushing oracle request")?;

    let raw = match session.replies.recv_timeout(timeout) {
        Ok(Ok(raw)) => raw,
        Ok(Err(e)) => return Err(anyhow!("reading oracle reply: {e}")),
        Err(RecvTimeoutError::Timeout) => {
            return Err(anyhow!("oracle exceeded timeout ({:?})", timeout));
        }
        Err(RecvTimeoutError::Disconnected) => {
            let status = session.child.try_wait().ok().flatten();
            return Err(anyhow!("oracle process exited (status: {:?})", status));
        }
    };

    let reply: OracleReply = serde_json::from_str(raw.trim())
        .with_context(|| format!("parsing oracle JSON reply: {}", raw.trim()))?;
    Ok(reply)
}

fn resolve_python_exe(raw: &str) -> PathBuf {
    let raw = raw.trim();
    if raw.is_empty() || raw.eq_ignore_ascii_case("auto") {
        if let Ok(env_val) = std::env::var("BLUNDER_CHECK_PYTHON") {
            let p = expand_tilde(&env_val);
            if p.exists() {
                return p;
            }
        }
        return PathBuf::from("python3");
    }
    expand_tilde(raw)
}

fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home).join(rest);
        }
    }
    PathBuf::from(path)
}

impl Oracle for PythonOracle {
    fn doctor(&self) -> Result<OracleDiag> {
        let reply = self.request(&OracleRequest::Ping)?;
        Ok(OracleDiag {
            ok: reply.ok,
            model: reply.model.or_else(|| Some(self.model.clone())),
            version: reply.version,
            error: reply.error,
        })
    }

    fn top_moves(&self, fen: &str, k: usize) -> Result<Vec<ScoredMove>> {
        let reply = self.request(&OracleRequest::TopMoves { fen, k })?;
        if !reply.ok {
            let msg = reply
                .error
                .unwrap_or_else(|| "top_moves failed".to_string());
            return Err(anyhow!("oracle {}: {msg}", self.model));
        }
        Ok(reply.moves)
    }
}
