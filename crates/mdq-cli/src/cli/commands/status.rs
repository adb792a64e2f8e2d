//! `mdq status` – show status of all jobs.

use anyhow::Result;
use mdq_core::job_db::JobDb;

pub async fn run_status(db: &JobDb) -> Result<()> {
    let jobs = db.select_all().await?;
    if jobs.is_empty() {
        println!("No jobs in database.");
        return Ok(());
    }
    println!(
        "{:<6} {:<12} {:<8} {:<28} {}",
        "ID", "STATUS", "QUALITY", "NAME", "URL"
    );
    for j in jobs {
        let name = j.display_name.as_deref().unwrap_or("-");
        println!(
            "{:<6} {:<12} {:<8} {:<28} {}",
            j.id,
            j.status.as_str(),
            j.quality.to_string(),
            truncate(name, 28),
            j.source_url
        );
        if let Some(err) = &j.error_message {
            println!("       error: {}", err.lines().last().unwrap_or(err));
        }
    }
    Ok(())
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let mut out: String = s.chars().take(max.saturating_sub(1)).collect();
    out.push('…');
    out
}
