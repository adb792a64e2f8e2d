//! Subprocess supervisor: runs the external downloader for one job.
//!
//! Streams stdout into progress samples, keeps a bounded stderr tail for the
//! error message, kills the process tree on cancellation, and performs exactly
//! one terminal status write per run.

mod command;
mod kill;
mod progress;
mod stderr_tail;

pub use command::{build as build_invocation, Invocation};
pub use kill::terminate_tree;
pub use progress::{name_from_path, parse_destination, parse_progress_line};

use stderr_tail::StderrTail;

use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader, Split};
use tokio::process::Command;
use tokio::time::Instant;

use crate::config::MdqConfig;
use crate::control::{JobControl, RunToken};
use crate::job_db::{Job, JobId, JobStatus};
use crate::store::JobStore;

/// Error message written when a run ends by user cancellation.
pub const CANCELLED_MESSAGE: &str = "cancelled by user";

/// How long to keep reading output after the process exits. Bounds the wait
/// when an orphaned helper still holds the pipes open.
const STREAM_DRAIN_GRACE: Duration = Duration::from_secs(2);

/// Static inputs for building invocations.
#[derive(Debug, Clone)]
pub struct SupervisorSettings {
    /// Downloader executable.
    pub program: PathBuf,
    pub download_dir: PathBuf,
    pub ffmpeg_location: Option<PathBuf>,
    pub extra_args: Vec<String>,
    /// Size of the stderr tail kept for error messages.
    pub stderr_tail_chars: usize,
}

impl SupervisorSettings {
    pub fn from_config(cfg: &MdqConfig) -> Self {
        Self {
            program: cfg.downloader.clone(),
            download_dir: cfg.effective_download_dir(),
            ffmpeg_location: cfg.ffmpeg_location.clone(),
            extra_args: cfg.extra_args.clone(),
            stderr_tail_chars: cfg.stderr_tail_chars,
        }
    }
}

/// How a run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Finished,
    Failed(String),
    Cancelled,
}

/// What the process did, before cancellation is taken into account.
#[derive(Debug)]
enum ProcessResult {
    Exited {
        status: ExitStatus,
        stderr: String,
        produced: Option<String>,
    },
    LaunchFailed(String),
    WaitFailed(String),
}

#[derive(Debug)]
pub struct Supervisor {
    store: JobStore,
    control: Arc<JobControl>,
    settings: SupervisorSettings,
}

impl Supervisor {
    pub fn new(store: JobStore, control: Arc<JobControl>, settings: SupervisorSettings) -> Self {
        Self {
            store,
            control,
            settings,
        }
    }

    pub fn settings(&self) -> &SupervisorSettings {
        &self.settings
    }

    /// Runs one queued job to a terminal status.
    ///
    /// The job's token must be registered in the shared [`JobControl`]; it is
    /// released here on every exit path.
    pub async fn run(&self, job: &Job, token: RunToken) -> RunOutcome {
        let id = job.id;
        let invocation = command::build(&self.settings, job);

        if let Err(e) = self
            .store
            .update_status(id, JobStatus::Downloading, None)
            .await
        {
            tracing::error!(job_id = id, "cannot start download: {e}");
            return self.fail_start(id, e.to_string(), &token).await;
        }
        tracing::info!(job_id = id, url = %job.source_url, "download started");

        let result = self.drive(id, &invocation, &token).await;
        self.finish(job, result, &token).await
    }

    async fn drive(
        &self,
        id: JobId,
        invocation: &Invocation,
        token: &RunToken,
    ) -> ProcessResult {
        let mut cmd = Command::new(&invocation.program);
        cmd.args(&invocation.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        cmd.process_group(0);

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                return ProcessResult::LaunchFailed(format!(
                    "failed to launch {}: {e}",
                    invocation.program.display()
                ))
            }
        };
        let pid = child.id();
        tracing::debug!(job_id = id, pid, "downloader spawned");

        let mut stdout = child.stdout.take().map(|s| BufReader::new(s).split(b'\n'));
        let mut stderr = child.stderr.take().map(|s| BufReader::new(s).split(b'\n'));
        let mut tail = StderrTail::new(self.settings.stderr_tail_chars);
        let mut produced: Option<String> = None;
        let mut kill_requested = false;
        let mut exit: Option<std::io::Result<ExitStatus>> = None;
        let mut drain_deadline: Option<Instant> = None;

        loop {
            if exit.is_some() && stdout.is_none() && stderr.is_none() {
                break;
            }
            tokio::select! {
                line = next_line(id, "stdout", &mut stdout), if stdout.is_some() => match line {
                    Some(line) => self.on_stdout(id, &line, &mut produced),
                    None => stdout = None,
                },
                line = next_line(id, "stderr", &mut stderr), if stderr.is_some() => match line {
                    Some(line) => {
                        tracing::debug!(job_id = id, "downloader: {line}");
                        tail.push(&line);
                    }
                    None => stderr = None,
                },
                _ = token.cancelled(), if !kill_requested && exit.is_none() => {
                    kill_requested = true;
                    schedule_terminate(id, pid);
                }
                status = child.wait(), if exit.is_none() => {
                    exit = Some(status);
                    drain_deadline = Some(Instant::now() + STREAM_DRAIN_GRACE);
                }
                _ = sleep_until_opt(drain_deadline), if drain_deadline.is_some() => {
                    tracing::warn!(job_id = id, "downloader output still open after exit; detaching");
                    break;
                }
            }
        }

        match exit {
            Some(Ok(status)) => ProcessResult::Exited {
                status,
                stderr: tail.as_str().to_string(),
                produced,
            },
            Some(Err(e)) => ProcessResult::WaitFailed(format!("waiting for downloader: {e}")),
            None => ProcessResult::WaitFailed("downloader exit status unavailable".to_string()),
        }
    }

    fn on_stdout(&self, id: JobId, line: &str, produced: &mut Option<String>) {
        if let Some(progress) = parse_progress_line(line) {
            self.store.update_progress(id, progress);
        } else if let Some(path) = parse_destination(line) {
            *produced = Some(path);
        }
    }

    /// The `queued -> downloading` write failed: the run never started. Still
    /// ends the job with one terminal write, best effort.
    async fn fail_start(&self, id: JobId, msg: String, token: &RunToken) -> RunOutcome {
        let owned = self.control.release(id, token);
        let (outcome, message) = if !owned || token.is_cancelled() {
            (RunOutcome::Cancelled, CANCELLED_MESSAGE.to_string())
        } else {
            (RunOutcome::Failed(msg.clone()), msg)
        };
        if let Err(e) = self
            .store
            .update_status(id, JobStatus::Error, Some(message))
            .await
        {
            tracing::error!(job_id = id, "terminal status write failed: {e}");
        }
        outcome
    }

    /// Releases the token and writes the single terminal status.
    async fn finish(&self, job: &Job, result: ProcessResult, token: &RunToken) -> RunOutcome {
        let id = job.id;
        // Whoever removes the registry entry first decides: if a cancel took it,
        // this run reports cancellation; once released here, later cancels are no-ops.
        let owned = self.control.release(id, token);
        let cancelled = !owned || token.is_cancelled();

        let outcome = if cancelled {
            RunOutcome::Cancelled
        } else {
            match result {
                ProcessResult::Exited {
                    status, produced, ..
                } if status.success() => {
                    if command::uses_placeholder(job) {
                        self.backfill_name(id, produced.as_deref()).await;
                    }
                    RunOutcome::Finished
                }
                ProcessResult::Exited { status, stderr, .. } => {
                    if stderr.is_empty() {
                        RunOutcome::Failed(format!("downloader exited with {status}"))
                    } else {
                        RunOutcome::Failed(stderr)
                    }
                }
                ProcessResult::LaunchFailed(msg) | ProcessResult::WaitFailed(msg) => {
                    RunOutcome::Failed(msg)
                }
            }
        };

        let (status, message) = match &outcome {
            RunOutcome::Finished => (JobStatus::Finished, None),
            RunOutcome::Failed(msg) => (JobStatus::Error, Some(msg.clone())),
            RunOutcome::Cancelled => (JobStatus::Error, Some(CANCELLED_MESSAGE.to_string())),
        };
        match self.store.update_status(id, status, message).await {
            Ok(_) => match &outcome {
                RunOutcome::Finished => tracing::info!(job_id = id, "download finished"),
                RunOutcome::Cancelled => tracing::info!(job_id = id, "download cancelled"),
                RunOutcome::Failed(msg) => tracing::warn!(job_id = id, "download failed: {msg}"),
            },
            Err(e) => tracing::error!(job_id = id, "terminal status write failed: {e}"),
        }
        outcome
    }

    async fn backfill_name(&self, id: JobId, produced: Option<&str>) {
        let Some(name) = produced.and_then(name_from_path) else {
            tracing::debug!(job_id = id, "no produced file name reported");
            return;
        };
        if let Err(e) = self.store.fill_display_name(id, &name).await {
            tracing::warn!(job_id = id, "could not record display name: {e}");
        }
    }
}

/// Next line from an optional stream; pending forever when the stream is gone.
/// `None` only at end of stream or on a read error, never for undecodable bytes.
async fn next_line<R: AsyncRead + Unpin>(
    job_id: JobId,
    stream: &'static str,
    lines: &mut Option<Split<BufReader<R>>>,
) -> Option<String> {
    let Some(lines) = lines else {
        return std::future::pending().await;
    };
    match lines.next_segment().await {
        Ok(Some(raw)) => Some(decode_line(&raw)),
        Ok(None) => None,
        Err(e) => {
            tracing::warn!(job_id, stream, "reading downloader output: {e}");
            None
        }
    }
}

/// File names and titles need not be UTF-8; invalid bytes become U+FFFD.
fn decode_line(raw: &[u8]) -> String {
    let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
    String::from_utf8_lossy(raw).into_owned()
}

async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(d) => tokio::time::sleep_until(d).await,
        None => std::future::pending().await,
    }
}

/// Kills the process tree off the caller's stack: a failure in termination is
/// logged and never propagates into the run.
fn schedule_terminate(job_id: JobId, pid: Option<u32>) {
    let Some(pid) = pid else {
        return;
    };
    tokio::spawn(async move {
        match tokio::task::spawn_blocking(move || terminate_tree(pid)).await {
            Ok(Ok(())) => tracing::debug!(job_id, pid, "downloader tree terminated"),
            Ok(Err(e)) => tracing::warn!(job_id, pid, "terminate downloader: {e}"),
            Err(e) => tracing::warn!(job_id, pid, "terminate task failed: {e}"),
        }
    });
}
