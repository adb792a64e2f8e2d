//! `mdq run` – run the engine: reconcile, download queued jobs, serve the control socket.

use anyhow::Result;
use mdq_core::config::MdqConfig;
use mdq_core::job_db::{JobDb, JobStatus};
use mdq_core::store::LiveEntry;
use mdq_core::Engine;
use std::sync::Arc;
use std::time::Duration;

use crate::cli::control_socket;

const PROGRESS_INTERVAL: Duration = Duration::from_secs(1);

pub async fn run_engine(db: JobDb, cfg: &MdqConfig, jobs: Option<usize>, watch: bool) -> Result<()> {
    let download_dir = cfg.ensure_download_dir()?;
    tracing::info!(dir = %download_dir.display(), "download folder");

    let engine = Arc::new(Engine::start(cfg, db).await?);
    let report = engine.startup_report();
    if !report.failed.is_empty() {
        println!(
            "Marked {} interrupted job(s) as failed: {:?}",
            report.failed.len(),
            report.failed
        );
    }
    if let Some(n) = jobs {
        let applied = engine.set_concurrency(n);
        if applied != n {
            println!("Concurrency capped at {applied}.");
        }
    }

    let socket_path = mdq_core::control::default_control_socket_path()?;
    let listener = match control_socket::spawn_control_listener(Arc::clone(&engine), &socket_path) {
        Ok(handle) => {
            tracing::debug!(path = %socket_path.display(), "control socket listening");
            Some(handle)
        }
        Err(e) => {
            tracing::warn!(path = %socket_path.display(), "control socket unavailable: {e:#}");
            None
        }
    };

    let mut ticker = tokio::time::interval(PROGRESS_INTERVAL);
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                println!();
                println!("Interrupted; cancelling running jobs.");
                engine.shutdown().await;
                break;
            }
            _ = engine.wait_idle(), if !watch => break,
            _ = ticker.tick() => print_live(&engine.live()),
        }
    }

    if let Some(handle) = listener {
        handle.abort();
        let _ = std::fs::remove_file(&socket_path);
    }

    let all = engine.jobs();
    let count = |status| all.iter().filter(|s| s.job.status == status).count();
    println!(
        "Done: {} finished, {} failed, {} pending.",
        count(JobStatus::Finished),
        count(JobStatus::Error),
        count(JobStatus::Pending)
    );
    Ok(())
}

fn print_live(entries: &[LiveEntry]) {
    for e in entries {
        if let Some(line) = format_live(e) {
            println!("{line}");
        }
    }
}

/// One progress line per active job; `None` for jobs still waiting.
fn format_live(e: &LiveEntry) -> Option<String> {
    let name = e.display_name.as_deref().unwrap_or("(title pending)");
    match e.status {
        JobStatus::Downloading => {
            let mut line = format!("  [{}] {:>5.1}%  {}", e.id, e.percent, name);
            if let Some(speed) = &e.speed {
                line.push_str(&format!("  {speed}"));
            }
            if let Some(eta) = &e.eta {
                line.push_str(&format!("  ETA {eta}"));
            }
            if let Some(frag) = e.fragment {
                line.push_str(&format!("  (frag {}/{})", frag.current, frag.total));
            }
            Some(line)
        }
        JobStatus::Finished => Some(format!("  [{}] done    {}", e.id, name)),
        _ => None,
    }
}
