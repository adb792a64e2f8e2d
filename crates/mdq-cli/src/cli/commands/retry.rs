//! `mdq retry <id>` – reset a failed job to pending.
//!
//! Goes through the running engine when there is one so the job starts right
//! away; otherwise the reset is written to the database for the next `mdq run`.

use anyhow::Result;
use mdq_core::config::MdqConfig;
use mdq_core::job_db::{JobId, JobStatus};
use mdq_core::store::JobStore;

use crate::cli::control_socket::{self, ControlCommand};
use crate::cli::open_db;

pub async fn run_retry(cfg: &MdqConfig, id: JobId) -> Result<()> {
    if let Some(reply) = control_socket::send_default(ControlCommand::Retry(id)).await? {
        println!("{reply}");
        return Ok(());
    }
    let store = JobStore::load(open_db(cfg).await?).await?;
    store.update_status(id, JobStatus::Pending, None).await?;
    println!("Job {id} reset to pending; it runs on the next `mdq run`.");
    Ok(())
}
