//! Integration test: the full engine against a stub downloader script.
//!
//! Each test gets its own database and download folder in a temp dir. The stub
//! (see `common::stub_tool`) decides success, failure or hanging from the URL.

#![cfg(unix)]

mod common;

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use mdq_core::config::MdqConfig;
use mdq_core::intake::IncomingJob;
use mdq_core::job_db::{JobDb, JobId, JobStatus, NewJob};
use mdq_core::reconcile::RESTART_MESSAGE;
use mdq_core::store::JobEvent;
use mdq_core::supervisor::CANCELLED_MESSAGE;
use mdq_core::Engine;
use tempfile::{tempdir, TempDir};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::time::timeout;

const WAIT: Duration = Duration::from_secs(15);

struct Harness {
    _dir: TempDir,
    db_path: PathBuf,
    download_dir: PathBuf,
    cfg: MdqConfig,
}

impl Harness {
    fn new(concurrency: usize) -> Self {
        let dir = tempdir().unwrap();
        let download_dir = dir.path().join("downloads");
        std::fs::create_dir_all(&download_dir).unwrap();
        let db_path = dir.path().join("jobs.db");
        let cfg = MdqConfig {
            downloader: common::stub_tool::path().to_path_buf(),
            download_dir: Some(download_dir.clone()),
            database_path: Some(db_path.clone()),
            default_concurrency: concurrency,
            max_concurrency: 3,
            ..MdqConfig::default()
        };
        Self {
            _dir: dir,
            db_path,
            download_dir,
            cfg,
        }
    }

    async fn db(&self) -> JobDb {
        JobDb::open_at(&self.db_path).await.unwrap()
    }

    async fn engine(&self) -> Engine {
        Engine::start(&self.cfg, self.db().await).await.unwrap()
    }
}

async fn enqueue(engine: &Engine, urls: &[&str]) -> Vec<JobId> {
    let items: Vec<IncomingJob> = urls.iter().map(|u| IncomingJob::new(*u)).collect();
    engine
        .enqueue(&items)
        .await
        .unwrap()
        .into_iter()
        .map(|j| j.id)
        .collect()
}

async fn idle(engine: &Engine) {
    timeout(WAIT, engine.wait_idle())
        .await
        .expect("engine did not go idle");
}

async fn wait_for_status(rx: &mut broadcast::Receiver<JobEvent>, id: JobId, want: JobStatus) {
    timeout(WAIT, async {
        loop {
            match rx.recv().await {
                Ok(JobEvent::Status { id: got, status, .. }) if got == id && status == want => {
                    return
                }
                Ok(_) | Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => panic!("event stream closed"),
            }
        }
    })
    .await
    .unwrap_or_else(|_| panic!("job {id} never reached {want}"));
}

fn drain(rx: &mut broadcast::Receiver<JobEvent>) -> Vec<JobEvent> {
    let mut out = Vec::new();
    loop {
        match rx.try_recv() {
            Ok(ev) => out.push(ev),
            Err(broadcast::error::TryRecvError::Lagged(n)) => panic!("lagged by {n}"),
            Err(_) => return out,
        }
    }
}

/// Highest number of jobs simultaneously `downloading`, replayed from events.
fn peak_downloading(events: &[JobEvent]) -> usize {
    let mut active = HashSet::new();
    let mut peak = 0;
    for ev in events {
        if let JobEvent::Status { id, status, .. } = ev {
            if *status == JobStatus::Downloading {
                active.insert(*id);
            } else {
                active.remove(id);
            }
            peak = peak.max(active.len());
        }
    }
    peak
}

fn status_of(engine: &Engine, id: JobId) -> JobStatus {
    engine.job(id).expect("job exists").job.status
}

#[tokio::test]
async fn three_jobs_with_concurrency_one_run_one_at_a_time() {
    let h = Harness::new(1);
    let engine = h.engine().await;
    let mut rx = engine.subscribe();

    let ids = enqueue(
        &engine,
        &[
            "https://v.example/slow-1",
            "https://v.example/slow-2",
            "https://v.example/slow-3",
        ],
    )
    .await;
    idle(&engine).await;

    let events = drain(&mut rx);
    assert_eq!(peak_downloading(&events), 1);
    for id in ids {
        assert_eq!(status_of(&engine, id), JobStatus::Finished);
    }
    assert_eq!(common::stub_tool::calls(&h.download_dir).len(), 3);
}

#[tokio::test]
async fn concurrency_limit_bounds_downloading_jobs() {
    let h = Harness::new(2);
    let engine = h.engine().await;
    let mut rx = engine.subscribe();

    let urls: Vec<String> = (0..5).map(|i| format!("https://v.example/slow-{i}")).collect();
    let urls: Vec<&str> = urls.iter().map(String::as_str).collect();
    let ids = enqueue(&engine, &urls).await;
    idle(&engine).await;

    assert!(peak_downloading(&drain(&mut rx)) <= 2);
    for id in ids {
        assert_eq!(status_of(&engine, id), JobStatus::Finished);
    }
}

#[tokio::test]
async fn cancel_while_downloading_records_cancellation() {
    let h = Harness::new(1);
    let engine = h.engine().await;
    let mut rx = engine.subscribe();

    let id = enqueue(&engine, &["https://v.example/hang"]).await[0];
    wait_for_status(&mut rx, id, JobStatus::Downloading).await;
    assert!(engine.is_live(id));

    assert!(engine.cancel(id).unwrap());
    idle(&engine).await;

    let job = engine.job(id).unwrap().job;
    assert_eq!(job.status, JobStatus::Error);
    assert_eq!(job.error_message.as_deref(), Some(CANCELLED_MESSAGE));
    assert!(!engine.is_live(id));
    assert!(!engine.cancel(id).unwrap(), "second cancel is a no-op");
}

#[tokio::test]
async fn failing_downloader_surfaces_stderr() {
    let h = Harness::new(1);
    let engine = h.engine().await;

    let id = enqueue(&engine, &["https://v.example/fail"]).await[0];
    idle(&engine).await;

    let job = engine.job(id).unwrap().job;
    assert_eq!(job.status, JobStatus::Error);
    assert!(job.error_message.unwrap().contains("network"));
    assert_eq!(job.finished_at, None);
}

#[tokio::test]
async fn missing_downloader_fails_the_job() {
    let mut h = Harness::new(1);
    h.cfg.downloader = PathBuf::from("/nonexistent/downloader");
    let engine = h.engine().await;

    let id = enqueue(&engine, &["https://v.example/a"]).await[0];
    idle(&engine).await;

    let job = engine.job(id).unwrap().job;
    assert_eq!(job.status, JobStatus::Error);
    assert!(job.error_message.unwrap().contains("failed to launch"));
}

#[tokio::test]
async fn retry_runs_the_same_job_again() {
    let h = Harness::new(1);
    let engine = h.engine().await;

    let id = enqueue(&engine, &["https://v.example/fail-then-retry"]).await[0];
    idle(&engine).await;
    assert_eq!(status_of(&engine, id), JobStatus::Error);

    let mut rx = engine.subscribe();
    engine.retry(id).await.unwrap();
    idle(&engine).await;

    let statuses: Vec<JobStatus> = drain(&mut rx)
        .into_iter()
        .filter_map(|ev| match ev {
            JobEvent::Status { id: got, status, .. } if got == id => Some(status),
            _ => None,
        })
        .collect();
    assert_eq!(
        statuses,
        vec![
            JobStatus::Pending,
            JobStatus::Queued,
            JobStatus::Downloading,
            JobStatus::Error
        ]
    );
    assert_eq!(common::stub_tool::calls(&h.download_dir).len(), 2);
    assert_eq!(engine.jobs().len(), 1);
}

#[tokio::test]
async fn retry_rejects_jobs_that_did_not_fail() {
    let h = Harness::new(1);
    let engine = h.engine().await;
    let id = enqueue(&engine, &["https://v.example/ok"]).await[0];
    idle(&engine).await;

    assert!(matches!(
        engine.retry(id).await,
        Err(mdq_core::Error::InvalidTransition { .. })
    ));
    assert_eq!(status_of(&engine, id), JobStatus::Finished);
}

#[tokio::test]
async fn pause_holds_queued_jobs_until_resume() {
    let h = Harness::new(2);
    let engine = h.engine().await;
    let mut rx = engine.subscribe();
    engine.set_paused(true);

    let ids = enqueue(&engine, &["https://v.example/p1", "https://v.example/p2"]).await;
    tokio::time::sleep(Duration::from_millis(300)).await;

    for &id in &ids {
        assert_eq!(status_of(&engine, id), JobStatus::Queued);
    }
    assert!(!drain(&mut rx).iter().any(|ev| matches!(
        ev,
        JobEvent::Status {
            status: JobStatus::Downloading,
            ..
        }
    )));

    engine.set_paused(false);
    idle(&engine).await;
    for id in ids {
        assert_eq!(status_of(&engine, id), JobStatus::Finished);
    }
}

#[tokio::test]
async fn startup_fails_orphans_and_resumes_pending() {
    let h = Harness::new(1);
    let db = h.db().await;
    let orphan = db.insert(&NewJob::new("https://v.example/orphan")).await.unwrap();
    let queued = db.insert(&NewJob::new("https://v.example/queued")).await.unwrap();
    let pending = db.insert(&NewJob::new("https://v.example/pending")).await.unwrap();
    db.update_status(orphan.id, JobStatus::Downloading, None, orphan.created_at, None)
        .await
        .unwrap();
    db.update_status(queued.id, JobStatus::Queued, None, queued.created_at, None)
        .await
        .unwrap();

    let engine = Engine::start(&h.cfg, db).await.unwrap();
    assert_eq!(engine.startup_report().failed, vec![orphan.id, queued.id]);
    idle(&engine).await;

    for id in [orphan.id, queued.id] {
        let job = engine.job(id).unwrap().job;
        assert_eq!(job.status, JobStatus::Error);
        assert_eq!(job.error_message.as_deref(), Some(RESTART_MESSAGE));
    }
    assert_eq!(status_of(&engine, pending.id), JobStatus::Finished);
}

#[tokio::test]
async fn progress_arrives_in_order_before_the_terminal_write() {
    let h = Harness::new(1);
    let engine = h.engine().await;
    let mut rx = engine.subscribe();

    let id = enqueue(&engine, &["https://v.example/ordered"]).await[0];
    idle(&engine).await;

    let mut percents = Vec::new();
    let mut finished_seen = false;
    for ev in drain(&mut rx) {
        match ev {
            JobEvent::Progress { id: got, progress } if got == id => {
                assert!(!finished_seen, "progress after terminal write");
                percents.push(progress.percent);
            }
            JobEvent::Status {
                id: got,
                status: JobStatus::Finished,
                ..
            } if got == id => finished_seen = true,
            _ => {}
        }
    }
    assert!(finished_seen);
    assert_eq!(percents, vec![25.0, 50.0, 75.0, 100.0]);
}

#[tokio::test]
async fn racing_cancel_and_completion_write_one_terminal_status() {
    let h = Harness::new(3);
    let engine = h.engine().await;
    let mut rx = engine.subscribe();

    let urls: Vec<String> = (0..6).map(|i| format!("https://v.example/race-{i}")).collect();
    let urls: Vec<&str> = urls.iter().map(String::as_str).collect();
    let ids = enqueue(&engine, &urls).await;

    // Cancel each job as soon as it is seen downloading; some runs finish first.
    let mut terminal: HashMap<JobId, usize> = HashMap::new();
    timeout(WAIT, async {
        while terminal.len() < ids.len() {
            match rx.recv().await {
                Ok(JobEvent::Status { id, status, .. }) => match status {
                    JobStatus::Downloading => {
                        engine.cancel(id).unwrap();
                    }
                    JobStatus::Finished | JobStatus::Error => {
                        *terminal.entry(id).or_default() += 1;
                    }
                    _ => {}
                },
                Ok(_) => {}
                Err(e) => panic!("event stream: {e}"),
            }
        }
    })
    .await
    .expect("all jobs reach a terminal status");
    idle(&engine).await;

    for ev in drain(&mut rx) {
        if let JobEvent::Status { id, status, .. } = ev {
            if status.is_terminal() {
                *terminal.entry(id).or_default() += 1;
            }
        }
    }
    for id in ids {
        assert_eq!(terminal.get(&id), Some(&1), "job {id}");
        assert!(!engine.is_live(id));
        let job = engine.job(id).unwrap().job;
        if job.status == JobStatus::Error {
            assert_eq!(job.error_message.as_deref(), Some(CANCELLED_MESSAGE));
        }
    }
}

#[tokio::test]
async fn unnamed_job_takes_the_produced_file_name() {
    let h = Harness::new(2);
    let engine = h.engine().await;

    let named = IncomingJob {
        name: Some("My Clip".to_string()),
        ..IncomingJob::new("https://v.example/named")
    };
    let jobs = engine
        .enqueue(&[IncomingJob::new("https://v.example/unnamed"), named])
        .await
        .unwrap();
    idle(&engine).await;

    let unnamed = engine.job(jobs[0].id).unwrap().job;
    assert_eq!(unnamed.display_name.as_deref(), Some("Stub Title"));
    let named = engine.job(jobs[1].id).unwrap().job;
    assert_eq!(named.display_name.as_deref(), Some("My Clip"));

    let calls = common::stub_tool::calls(&h.download_dir);
    assert!(calls.iter().any(|c| c.contains("%(title)s.%(ext)s")));
    assert!(calls.iter().any(|c| c.contains("My Clip.%(ext)s")));
}

#[tokio::test]
async fn non_utf8_output_does_not_break_the_run() {
    let h = Harness::new(1);
    let engine = h.engine().await;
    let mut rx = engine.subscribe();

    let id = enqueue(&engine, &["https://v.example/latin1"]).await[0];
    idle(&engine).await;

    let job = engine.job(id).unwrap().job;
    assert_eq!(job.status, JobStatus::Finished, "error: {:?}", job.error_message);
    assert_eq!(job.display_name.as_deref(), Some("Caf\u{FFFD}"));

    let progress = drain(&mut rx)
        .into_iter()
        .filter(|ev| matches!(ev, JobEvent::Progress { id: got, .. } if *got == id))
        .count();
    assert_eq!(progress, 11);
}

#[tokio::test]
async fn invocation_carries_quality_and_fixed_flags() {
    let h = Harness::new(1);
    let engine = h.engine().await;
    let audio = IncomingJob {
        quality: Some("audio".to_string()),
        ..IncomingJob::new("https://v.example/song")
    };
    engine.enqueue(&[audio]).await.unwrap();
    idle(&engine).await;

    let calls = common::stub_tool::calls(&h.download_dir);
    assert_eq!(calls.len(), 1);
    let call = &calls[0];
    assert!(call.starts_with("https://v.example/song "));
    assert!(call.contains("-f bestaudio"));
    assert!(call.contains("--newline --no-playlist"));
}

#[tokio::test]
async fn duplicate_url_rejects_the_batch() {
    let h = Harness::new(1);
    let engine = h.engine().await;
    engine.set_paused(true);
    enqueue(&engine, &["https://v.example/dup"]).await;

    let err = engine
        .enqueue(&[
            IncomingJob::new("https://v.example/new"),
            IncomingJob::new("https://v.example/dup"),
        ])
        .await
        .unwrap_err();
    assert!(matches!(err, mdq_core::Error::DuplicateUrl(_)));
    assert_eq!(engine.jobs().len(), 1);

    engine.shutdown().await;
}

#[tokio::test]
async fn delete_cancels_a_running_job_first() {
    let h = Harness::new(1);
    let engine = h.engine().await;
    let mut rx = engine.subscribe();

    let id = enqueue(&engine, &["https://v.example/hang-delete"]).await[0];
    wait_for_status(&mut rx, id, JobStatus::Downloading).await;

    timeout(WAIT, engine.delete(id))
        .await
        .expect("delete finished")
        .unwrap();
    assert!(engine.job(id).is_none());
    assert!(matches!(
        engine.delete(id).await,
        Err(mdq_core::Error::NotFound(_))
    ));
    idle(&engine).await;
}

#[tokio::test]
async fn concurrency_is_capped_by_config() {
    let h = Harness::new(1);
    let engine = h.engine().await;
    assert_eq!(engine.set_concurrency(10), 3);
    assert_eq!(engine.set_concurrency(0), 1);
    assert_eq!(engine.concurrency(), 1);
}

#[tokio::test]
async fn reload_picks_up_jobs_added_by_another_process() {
    let h = Harness::new(1);
    let engine = h.engine().await;

    let other = h.db().await;
    let added = other
        .insert(&NewJob::new("https://v.example/from-cli"))
        .await
        .unwrap();

    assert_eq!(engine.reload().await.unwrap(), vec![added.id]);
    idle(&engine).await;
    assert_eq!(status_of(&engine, added.id), JobStatus::Finished);
}

#[tokio::test]
async fn live_feed_keeps_recently_finished_jobs() {
    let mut h = Harness::new(1);
    h.cfg.live_window_secs = 60;
    let engine = h.engine().await;
    let id = enqueue(&engine, &["https://v.example/live"]).await[0];
    idle(&engine).await;

    let live = engine.live();
    assert_eq!(live.len(), 1);
    assert_eq!(live[0].id, id);
    assert_eq!(live[0].status, JobStatus::Finished);
    assert_eq!(live[0].percent, 100.0);

    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_secs() as i64;
    assert!(engine.store().live_view(now + 120, 60).is_empty());
}
