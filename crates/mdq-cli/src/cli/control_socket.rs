//! Control socket: server (during `mdq run`) and client (for the other commands).
//!
//! Protocol: one command per line, one reply line per command. Commands are
//! `cancel <id>`, `pause`, `resume`, `concurrency <n>`, `retry <id>`,
//! `remove <id>` and `reload`. Replies start with `ok` or `error`.

use anyhow::{anyhow, bail, Result};
use mdq_core::job_db::JobId;
use mdq_core::Engine;
use std::fmt;
use std::io::ErrorKind;
use std::path::Path;
use std::str::SplitWhitespace;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlCommand {
    Cancel(JobId),
    Pause,
    Resume,
    Concurrency(usize),
    Retry(JobId),
    Remove(JobId),
    Reload,
}

impl ControlCommand {
    pub fn parse(line: &str) -> Result<Self> {
        let mut parts = line.split_whitespace();
        let verb = parts.next().ok_or_else(|| anyhow!("empty command"))?;
        let cmd = match verb {
            "cancel" => Self::Cancel(next_arg(&mut parts, verb, "job id")?.parse()?),
            "retry" => Self::Retry(next_arg(&mut parts, verb, "job id")?.parse()?),
            "remove" => Self::Remove(next_arg(&mut parts, verb, "job id")?.parse()?),
            "concurrency" => Self::Concurrency(next_arg(&mut parts, verb, "limit")?.parse()?),
            "pause" => Self::Pause,
            "resume" => Self::Resume,
            "reload" => Self::Reload,
            other => bail!("unknown command {other:?}"),
        };
        if parts.next().is_some() {
            bail!("{verb}: too many arguments");
        }
        Ok(cmd)
    }

    /// Applies the command to the engine and returns the reply text.
    pub async fn apply(self, engine: &Engine) -> Result<String> {
        let reply = match self {
            Self::Cancel(id) => {
                if engine.cancel(id)? {
                    format!("cancelling job {id}")
                } else {
                    format!("job {id} is not queued or running")
                }
            }
            Self::Pause => {
                engine.set_paused(true);
                "paused".to_string()
            }
            Self::Resume => {
                engine.set_paused(false);
                "resumed".to_string()
            }
            Self::Concurrency(n) => format!("concurrency {}", engine.set_concurrency(n)),
            Self::Retry(id) => {
                engine.retry(id).await?;
                format!("job {id} queued for retry")
            }
            Self::Remove(id) => {
                engine.delete(id).await?;
                format!("removed job {id}")
            }
            Self::Reload => {
                let added = engine.reload().await?;
                format!("{} new job(s)", added.len())
            }
        };
        Ok(reply)
    }
}

fn next_arg<'a>(parts: &mut SplitWhitespace<'a>, verb: &str, what: &str) -> Result<&'a str> {
    parts
        .next()
        .ok_or_else(|| anyhow!("{verb}: missing {what}"))
}

impl fmt::Display for ControlCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cancel(id) => write!(f, "cancel {id}"),
            Self::Pause => f.write_str("pause"),
            Self::Resume => f.write_str("resume"),
            Self::Concurrency(n) => write!(f, "concurrency {n}"),
            Self::Retry(id) => write!(f, "retry {id}"),
            Self::Remove(id) => write!(f, "remove {id}"),
            Self::Reload => f.write_str("reload"),
        }
    }
}

async fn handle_line(engine: &Engine, line: &str) -> String {
    let result = match ControlCommand::parse(line) {
        Ok(cmd) => {
            tracing::debug!(command = %cmd, "control command");
            cmd.apply(engine).await
        }
        Err(e) => Err(e),
    };
    match result {
        Ok(reply) => format!("ok {reply}"),
        Err(e) => format!("error {e:#}"),
    }
}

/// Binds `path` and spawns a task that applies each received command to `engine`.
pub fn spawn_control_listener(
    engine: Arc<Engine>,
    path: impl AsRef<Path>,
) -> Result<tokio::task::JoinHandle<()>> {
    let path = path.as_ref();
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)?;
    }
    let _ = std::fs::remove_file(path);
    let listener = UnixListener::bind(path)?;

    let handle = tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((stream, _)) => {
                    let engine = Arc::clone(&engine);
                    tokio::spawn(async move {
                        let (read, mut write) = stream.into_split();
                        let mut lines = BufReader::new(read).lines();
                        while let Ok(Some(line)) = lines.next_line().await {
                            if line.trim().is_empty() {
                                continue;
                            }
                            let reply = handle_line(&engine, &line).await;
                            if write.write_all(format!("{reply}\n").as_bytes()).await.is_err() {
                                break;
                            }
                        }
                    });
                }
                Err(e) => tracing::debug!("control socket accept: {}", e),
            }
        }
    });
    Ok(handle)
}

/// Sends one command and returns the engine's reply.
/// `Ok(None)` when no engine is listening on `socket_path`.
pub async fn send(socket_path: &Path, cmd: ControlCommand) -> Result<Option<String>> {
    let stream = match UnixStream::connect(socket_path).await {
        Ok(s) => s,
        Err(e) if matches!(e.kind(), ErrorKind::NotFound | ErrorKind::ConnectionRefused) => {
            return Ok(None)
        }
        Err(e) => return Err(e.into()),
    };
    let (read, mut write) = stream.into_split();
    write.write_all(format!("{cmd}\n").as_bytes()).await?;
    let reply = BufReader::new(read)
        .lines()
        .next_line()
        .await?
        .ok_or_else(|| anyhow!("engine closed the control socket without replying"))?;
    match reply.strip_prefix("error ") {
        Some(msg) => bail!("{msg}"),
        None => Ok(Some(reply.strip_prefix("ok ").unwrap_or(&reply).to_string())),
    }
}

/// Like [`send`] on the default socket path.
pub async fn send_default(cmd: ControlCommand) -> Result<Option<String>> {
    let path = mdq_core::control::default_control_socket_path()?;
    send(&path, cmd).await
}
