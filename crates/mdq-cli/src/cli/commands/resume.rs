//! `mdq resume` – let the running engine start queued jobs again.

use anyhow::{bail, Result};

use crate::cli::control_socket::{self, ControlCommand};

pub async fn run_resume() -> Result<()> {
    match control_socket::send_default(ControlCommand::Resume).await? {
        Some(reply) => println!("{reply}"),
        None => bail!("no running engine to resume"),
    }
    Ok(())
}
