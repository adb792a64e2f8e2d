//! Parsing of downloader stdout: progress samples and produced file names.
//!
//! Expects the line-per-update format the downloader prints with `--newline`:
//!
//! ```text
//! [download]  12.5% of ~  50.23MiB at    2.00MiB/s ETA 00:22 (frag 3/24)
//! [download] 100% of   10.00MiB in 00:00:05 at 2.00MiB/s
//! ```

use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;

use crate::job_db::{Fragment, Progress};

static PROGRESS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^\[download\]\s+(?P<percent>\d+(?:\.\d+)?)%(?:\s+of\s+~?\s*(?P<size>\S+))?(?:\s+in\s+\S+)?(?:\s+at\s+(?P<speed>Unknown\s+\S+|\S+))?(?:\s+ETA\s+(?P<eta>\S+))?(?:\s+\(frag\s+(?P<frag_cur>\d+)/(?P<frag_total>\d+)\))?",
    )
    .expect("valid regex")
});

static DESTINATION_RES: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"^\[download\] Destination: (?P<path>.+)$",
        r#"^\[Merger\] Merging formats into "(?P<path>.+)"$"#,
        r"^\[ExtractAudio\] Destination: (?P<path>.+)$",
        r"^\[download\] (?P<path>.+) has already been downloaded",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("valid regex"))
    .collect()
});

/// Extracts a progress sample; `None` for any other line.
pub fn parse_progress_line(line: &str) -> Option<Progress> {
    let caps = PROGRESS_RE.captures(line.trim_end())?;
    let percent: f64 = caps.name("percent")?.as_str().parse().ok()?;
    let text = |name: &str| caps.name(name).map(|m| m.as_str().to_string());
    let fragment = match (caps.name("frag_cur"), caps.name("frag_total")) {
        (Some(cur), Some(total)) => Some(Fragment {
            current: cur.as_str().parse().ok()?,
            total: total.as_str().parse().ok()?,
        }),
        _ => None,
    };
    Some(Progress {
        percent: percent.clamp(0.0, 100.0),
        size: text("size"),
        speed: text("speed"),
        eta: text("eta"),
        fragment,
    })
}

/// Path of a file the downloader reports writing, if the line announces one.
pub fn parse_destination(line: &str) -> Option<String> {
    let line = line.trim_end();
    DESTINATION_RES
        .iter()
        .find_map(|re| re.captures(line))
        .and_then(|caps| caps.name("path").map(|m| m.as_str().to_string()))
}

/// File stem of a produced path, used as the job's display name.
pub fn name_from_path(path: &str) -> Option<String> {
    Path::new(path)
        .file_stem()
        .map(|s| s.to_string_lossy().trim().to_string())
        .filter(|s| !s.is_empty())
}
