//! CLI for the MDQ media download queue.

mod commands;
mod control_socket;

use anyhow::Result;
use clap::{Parser, Subcommand};
use mdq_core::config;
use mdq_core::job_db::{JobDb, JobId};

use commands::{
    run_add, run_cancel, run_concurrency, run_engine, run_pause, run_remove, run_resume,
    run_retry, run_status, AddArgs,
};

/// Top-level CLI for the MDQ media download queue.
#[derive(Debug, Parser)]
#[command(name = "mdq")]
#[command(about = "MDQ: queue media downloads and run them through yt-dlp", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Debug, Subcommand)]
pub enum CliCommand {
    /// Add one or more download jobs.
    Add {
        /// Media page URLs (http or https).
        #[arg(required = true)]
        urls: Vec<String>,
        /// Output name (without extension). Defaults to the media title.
        #[arg(long)]
        name: Option<String>,
        /// Quality tier: highest, lowest, audio, or a height such as 720p.
        #[arg(long, short = 'q')]
        quality: Option<String>,
        /// Append the media title to the given name.
        #[arg(long)]
        append_title: bool,
    },

    /// Show status of all jobs.
    Status,

    /// Run the engine until every queued job is done.
    Run {
        /// Run up to N jobs concurrently (default from config).
        #[arg(long, value_name = "N")]
        jobs: Option<usize>,
        /// Keep running after the queue drains and wait for new jobs.
        #[arg(long)]
        watch: bool,
    },

    /// Cancel a queued or downloading job in the running engine.
    Cancel {
        /// Job identifier.
        id: JobId,
    },

    /// Stop starting new jobs; running downloads continue.
    Pause,

    /// Start queued jobs again after a pause.
    Resume,

    /// Change how many jobs may download at once.
    Concurrency {
        /// New limit (at least 1, capped by max_concurrency).
        n: usize,
    },

    /// Reset a failed job and queue it again.
    Retry {
        /// Job identifier.
        id: JobId,
    },

    /// Remove a job. A running job is cancelled first.
    Remove {
        /// Job identifier.
        id: JobId,
    },
}

impl CliCommand {
    pub async fn run_from_args() -> Result<()> {
        let cli = Cli::parse();
        let cfg = config::load_or_init()?;
        tracing::debug!("loaded config: {:?}", cfg);

        match cli.command {
            CliCommand::Add {
                urls,
                name,
                quality,
                append_title,
            } => {
                let db = open_db(&cfg).await?;
                let args = AddArgs {
                    urls,
                    name,
                    quality,
                    append_title,
                };
                run_add(&db, args).await?
            }
            CliCommand::Status => run_status(&open_db(&cfg).await?).await?,
            CliCommand::Run { jobs, watch } => {
                let db = open_db(&cfg).await?;
                run_engine(db, &cfg, jobs, watch).await?
            }
            CliCommand::Cancel { id } => run_cancel(id).await?,
            CliCommand::Pause => run_pause().await?,
            CliCommand::Resume => run_resume().await?,
            CliCommand::Concurrency { n } => run_concurrency(n).await?,
            CliCommand::Retry { id } => run_retry(&cfg, id).await?,
            CliCommand::Remove { id } => run_remove(&cfg, id).await?,
        }

        Ok(())
    }
}

pub(crate) async fn open_db(cfg: &config::MdqConfig) -> Result<JobDb> {
    let path = cfg.effective_database_path()?;
    Ok(JobDb::open_at(&path).await?)
}

#[cfg(test)]
mod tests;
