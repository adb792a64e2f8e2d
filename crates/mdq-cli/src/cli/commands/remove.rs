//! `mdq remove <id>` – delete a job. Downloaded files are left alone.

use anyhow::Result;
use mdq_core::config::MdqConfig;
use mdq_core::job_db::JobId;
use mdq_core::store::JobStore;

use crate::cli::control_socket::{self, ControlCommand};
use crate::cli::open_db;

pub async fn run_remove(cfg: &MdqConfig, id: JobId) -> Result<()> {
    if let Some(reply) = control_socket::send_default(ControlCommand::Remove(id)).await? {
        println!("{reply}");
        return Ok(());
    }
    let store = JobStore::load(open_db(cfg).await?).await?;
    store.remove(id).await?;
    println!("Removed job {id}");
    Ok(())
}
