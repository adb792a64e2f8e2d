//! `mdq add <url>...` – validate and store new jobs; wake a running engine.

use anyhow::Result;
use mdq_core::intake::{self, IncomingJob};
use mdq_core::job_db::JobDb;

use crate::cli::control_socket::{self, ControlCommand};

#[derive(Debug, Clone, Default)]
pub struct AddArgs {
    pub urls: Vec<String>,
    pub name: Option<String>,
    pub quality: Option<String>,
    pub append_title: bool,
}

impl AddArgs {
    fn incoming(&self) -> Vec<IncomingJob> {
        self.urls
            .iter()
            .map(|url| IncomingJob {
                url: url.clone(),
                name: self.name.clone(),
                append_title: self.append_title,
                quality: self.quality.clone(),
            })
            .collect()
    }
}

pub async fn run_add(db: &JobDb, args: AddArgs) -> Result<()> {
    let jobs = intake::prepare(&args.incoming())?;
    let stored = db.insert_many(&jobs).await?;
    for job in &stored {
        println!("Added job {} for URL: {}", job.id, job.source_url);
    }

    match control_socket::send_default(ControlCommand::Reload).await {
        Ok(Some(_)) => println!("Queued in the running engine."),
        Ok(None) => println!("Run `mdq run` to start downloading."),
        Err(e) => tracing::warn!("could not notify running engine: {e:#}"),
    }
    Ok(())
}
