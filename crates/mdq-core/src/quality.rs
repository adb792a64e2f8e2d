//! Quality tier to downloader format selection.
//!
//! Pure mapping, no I/O. The supervisor turns the result into `-f` / `-S`
//! arguments for the downloader.

use std::fmt;

/// Requested quality tier for a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Quality {
    /// Best combined video+audio.
    Highest,
    /// Smallest rendition, chosen by sort order rather than a hard filter.
    Lowest,
    /// Best audio-only stream.
    Audio,
    /// Best format no taller than the given height (e.g. `1080p`).
    Height(u32),
}

impl Quality {
    /// Parses a tier name. Accepts `highest`/`best`, `lowest`/`worst`, `audio`
    /// and `<height>p`. Case-insensitive.
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim().to_ascii_lowercase();
        match s.as_str() {
            "highest" | "best" => Some(Quality::Highest),
            "lowest" | "worst" => Some(Quality::Lowest),
            "audio" => Some(Quality::Audio),
            other => other
                .strip_suffix('p')
                .and_then(|h| h.parse::<u32>().ok())
                .filter(|h| *h > 0)
                .map(Quality::Height),
        }
    }
}

impl fmt::Display for Quality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Quality::Highest => f.write_str("highest"),
            Quality::Lowest => f.write_str("lowest"),
            Quality::Audio => f.write_str("audio"),
            Quality::Height(h) => write!(f, "{h}p"),
        }
    }
}

/// Format selector and sort criteria for one invocation.
/// Both `None` means no restriction (downloader default).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FormatSelection {
    pub format: Option<String>,
    pub sort: Option<String>,
}

impl FormatSelection {
    /// Command-line arguments in downloader syntax.
    pub fn to_args(&self) -> Vec<String> {
        let mut args = Vec::new();
        if let Some(f) = &self.format {
            args.push("-f".to_string());
            args.push(f.clone());
        }
        if let Some(s) = &self.sort {
            args.push("-S".to_string());
            args.push(s.clone());
        }
        args
    }
}

/// Maps a tier to its format selection.
pub fn map_quality(quality: Quality) -> FormatSelection {
    match quality {
        Quality::Highest => FormatSelection {
            format: Some("bestvideo*+bestaudio/best".to_string()),
            sort: None,
        },
        // A hard low-quality `-f` makes some HLS streams fail to resolve; sort instead.
        Quality::Lowest => FormatSelection {
            format: None,
            sort: Some("+res,+br,+size".to_string()),
        },
        Quality::Audio => FormatSelection {
            format: Some("bestaudio".to_string()),
            sort: None,
        },
        Quality::Height(h) => FormatSelection {
            format: Some(format!("best[height<={h}]")),
            sort: None,
        },
    }
}

/// Like [`map_quality`] for a raw tier string; unrecognized tiers are unrestricted.
pub fn map_tier(tier: &str) -> FormatSelection {
    Quality::parse(tier).map(map_quality).unwrap_or_default()
}
