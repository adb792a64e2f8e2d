//! `mdq cancel <id>` – cancel a job in the running engine.

use anyhow::{bail, Result};
use mdq_core::job_db::JobId;

use crate::cli::control_socket::{self, ControlCommand};

pub async fn run_cancel(id: JobId) -> Result<()> {
    match control_socket::send_default(ControlCommand::Cancel(id)).await? {
        Some(reply) => println!("{reply}"),
        None => bail!("no running engine; nothing to cancel (start one with `mdq run`)"),
    }
    Ok(())
}
