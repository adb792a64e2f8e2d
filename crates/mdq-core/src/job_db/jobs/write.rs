//! Job write operations: insert, status, name, delete.

use sqlx::{Executor, Sqlite};

use super::super::db::{unix_timestamp, JobDb};
use super::super::types::{Job, JobId, JobStatus, NewJob};
use crate::error::{Error, Result};

/// Maps a unique-index violation on `source_url` to a typed duplicate error.
fn map_insert_error(err: sqlx::Error, url: &str) -> Error {
    match &err {
        sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
            Error::DuplicateUrl(url.to_string())
        }
        _ => Error::Database(err),
    }
}

async fn insert_row<'e, E>(executor: E, job: &NewJob, now: i64) -> Result<Job>
where
    E: Executor<'e, Database = Sqlite>,
{
    let status = JobStatus::Pending;
    let id = sqlx::query(
        r#"
        INSERT INTO jobs (
            source_url, display_name, quality, append_title,
            status, error_message, created_at, updated_at, finished_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, NULL, ?6, ?7, NULL)
        "#,
    )
    .bind(&job.source_url)
    .bind(&job.display_name)
    .bind(job.quality.to_string())
    .bind(job.append_title)
    .bind(status.as_str())
    .bind(now)
    .bind(now)
    .execute(executor)
    .await
    .map_err(|e| map_insert_error(e, &job.source_url))?
    .last_insert_rowid();

    Ok(Job {
        id,
        source_url: job.source_url.clone(),
        display_name: job.display_name.clone(),
        quality: job.quality,
        append_title: job.append_title,
        status,
        error_message: None,
        created_at: now,
        updated_at: now,
        finished_at: None,
    })
}

impl JobDb {
    /// Insert a new job in `pending`.
    pub async fn insert(&self, job: &NewJob) -> Result<Job> {
        insert_row(&self.pool, job, unix_timestamp()).await
    }

    /// Insert a batch atomically: a duplicate anywhere rolls back the whole batch.
    pub async fn insert_many(&self, jobs: &[NewJob]) -> Result<Vec<Job>> {
        let now = unix_timestamp();
        let mut tx = self.pool.begin().await?;
        let mut out = Vec::with_capacity(jobs.len());
        for job in jobs {
            out.push(insert_row(&mut *tx, job, now).await?);
        }
        tx.commit().await?;
        Ok(out)
    }

    /// Write status, error message and timestamps for an existing job.
    ///
    /// Transition validation is the store's job; this is a plain write.
    pub async fn update_status(
        &self,
        id: JobId,
        status: JobStatus,
        error_message: Option<&str>,
        updated_at: i64,
        finished_at: Option<i64>,
    ) -> Result<()> {
        let r = sqlx::query(
            r#"
            UPDATE jobs
            SET status = ?1,
                error_message = ?2,
                updated_at = ?3,
                finished_at = ?4
            WHERE id = ?5
            "#,
        )
        .bind(status.as_str())
        .bind(error_message)
        .bind(updated_at)
        .bind(finished_at)
        .bind(id)
        .execute(&self.pool)
        .await?;
        if r.rows_affected() == 0 {
            return Err(Error::NotFound(id));
        }
        Ok(())
    }

    pub async fn update_display_name(&self, id: JobId, name: &str) -> Result<()> {
        let now = unix_timestamp();
        let r = sqlx::query(
            r#"
            UPDATE jobs
            SET display_name = ?1,
                updated_at = ?2
            WHERE id = ?3
            "#,
        )
        .bind(name)
        .bind(now)
        .bind(id)
        .execute(&self.pool)
        .await?;
        if r.rows_affected() == 0 {
            return Err(Error::NotFound(id));
        }
        Ok(())
    }

    /// Permanently remove a job row. Downloaded files are left alone.
    pub async fn delete(&self, id: JobId) -> Result<()> {
        let r = sqlx::query(
            r#"
            DELETE FROM jobs
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .execute(&self.pool)
        .await?;
        if r.rows_affected() == 0 {
            return Err(Error::NotFound(id));
        }
        Ok(())
    }
}
