//! Job read operations.

use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use super::super::db::JobDb;
use super::super::types::{Job, JobId, JobStatus};
use crate::error::Result;
use crate::quality::Quality;

const SELECT_COLUMNS: &str = r#"
    SELECT
        id, source_url, display_name, quality, append_title,
        status, error_message, created_at, updated_at, finished_at
    FROM jobs
"#;

fn job_from_row(row: &SqliteRow) -> Job {
    let quality: String = row.get("quality");
    let status: String = row.get("status");
    Job {
        id: row.get("id"),
        source_url: row.get("source_url"),
        display_name: row.get("display_name"),
        // Rows are written with `Quality`'s Display form; only hand-edited data misses.
        quality: Quality::parse(&quality).unwrap_or(Quality::Highest),
        append_title: row.get("append_title"),
        status: JobStatus::from_str(&status),
        error_message: row.get("error_message"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
        finished_at: row.get("finished_at"),
    }
}

impl JobDb {
    /// All jobs in insertion order (oldest first).
    pub async fn select_all(&self) -> Result<Vec<Job>> {
        let sql = format!("{SELECT_COLUMNS} ORDER BY id ASC");
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
        Ok(rows.iter().map(job_from_row).collect())
    }

    pub async fn get(&self, id: JobId) -> Result<Option<Job>> {
        let sql = format!("{SELECT_COLUMNS} WHERE id = ?1");
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(job_from_row))
    }
}
