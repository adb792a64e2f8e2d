//! `mdq concurrency <n>` – change the running engine's download limit.

use anyhow::{bail, Result};

use crate::cli::control_socket::{self, ControlCommand};

pub async fn run_concurrency(n: usize) -> Result<()> {
    match control_socket::send_default(ControlCommand::Concurrency(n)).await? {
        Some(reply) => println!("{reply}"),
        None => bail!("no running engine; use `mdq run --jobs {n}` instead"),
    }
    Ok(())
}
