//! `mdq pause` – stop the running engine from starting new jobs.

use anyhow::{bail, Result};

use crate::cli::control_socket::{self, ControlCommand};

pub async fn run_pause() -> Result<()> {
    match control_socket::send_default(ControlCommand::Pause).await? {
        Some(reply) => println!("{reply}"),
        None => bail!("no running engine to pause"),
    }
    Ok(())
}
