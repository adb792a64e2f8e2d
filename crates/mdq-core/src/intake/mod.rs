//! Job intake: validates user input and turns it into [`NewJob`] records.
//!
//! A batch is accepted or rejected as a whole. Error messages name the
//! 1-based position of the offending entry.

mod sanitize;

pub use sanitize::sanitize_display_name;

use url::Url;

use crate::error::{Error, Result};
use crate::job_db::NewJob;
use crate::quality::Quality;

/// Longest accepted display name, in characters, after sanitization.
pub const MAX_NAME_CHARS: usize = 200;

/// One job as submitted by a user.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IncomingJob {
    pub url: String,
    pub name: Option<String>,
    pub append_title: bool,
    /// Quality tier text; `None` means highest.
    pub quality: Option<String>,
}

impl IncomingJob {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }
}

/// Validates a batch and returns the records to insert.
pub fn prepare(items: &[IncomingJob]) -> Result<Vec<NewJob>> {
    if items.is_empty() {
        return Err(Error::Invalid("no jobs given".to_string()));
    }
    items
        .iter()
        .enumerate()
        .map(|(i, item)| prepare_one(i + 1, item))
        .collect()
}

fn prepare_one(index: usize, item: &IncomingJob) -> Result<NewJob> {
    let source_url = validate_url(index, &item.url)?;

    let quality = match item.quality.as_deref().map(str::trim) {
        None | Some("") => Quality::Highest,
        Some(tier) => Quality::parse(tier).ok_or_else(|| {
            Error::Invalid(format!("job {index}: unknown quality {tier:?}"))
        })?,
    };

    let display_name = match item.name.as_deref() {
        None => None,
        Some(raw) => {
            let name = sanitize_display_name(raw);
            if name.chars().count() > MAX_NAME_CHARS {
                return Err(Error::Invalid(format!(
                    "job {index}: name longer than {MAX_NAME_CHARS} characters"
                )));
            }
            (!name.is_empty()).then_some(name)
        }
    };

    Ok(NewJob {
        source_url,
        display_name,
        quality,
        append_title: item.append_title,
    })
}

fn validate_url(index: usize, raw: &str) -> Result<String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(Error::Invalid(format!("job {index}: url is empty")));
    }
    let url = Url::parse(raw)
        .map_err(|e| Error::Invalid(format!("job {index}: invalid url {raw:?}: {e}")))?;
    match url.scheme() {
        "http" | "https" => {}
        other => {
            return Err(Error::Invalid(format!(
                "job {index}: unsupported url scheme {other:?}"
            )))
        }
    }
    if url.host_str().is_none() {
        return Err(Error::Invalid(format!("job {index}: url has no host")));
    }
    Ok(raw.to_string())
}
