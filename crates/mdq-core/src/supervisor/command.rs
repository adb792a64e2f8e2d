//! Downloader invocation:
//! `<tool> <url> [-f fmt] [-S sort] -o <template> --newline --no-playlist`.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use crate::job_db::Job;
use crate::quality::map_quality;

use super::SupervisorSettings;

/// Output name used when the job has no display name yet.
pub const TITLE_PLACEHOLDER: &str = "%(title)s";

/// Program and arguments for one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: PathBuf,
    pub args: Vec<OsString>,
}

/// True when the job will be saved under the downloader's title template.
pub fn uses_placeholder(job: &Job) -> bool {
    job.display_name
        .as_deref()
        .map_or(true, |n| n.trim().is_empty())
}

/// `<dir>/<name>.%(ext)s`, falling back to the title placeholder.
pub fn output_template(dir: &Path, display_name: Option<&str>) -> PathBuf {
    let stem = display_name
        .filter(|n| !n.trim().is_empty())
        .unwrap_or(TITLE_PLACEHOLDER);
    dir.join(format!("{stem}.%(ext)s"))
}

pub fn build(settings: &SupervisorSettings, job: &Job) -> Invocation {
    let mut args: Vec<OsString> = vec![job.source_url.clone().into()];
    args.extend(map_quality(job.quality).to_args().into_iter().map(OsString::from));
    args.push("-o".into());
    args.push(output_template(&settings.download_dir, job.display_name.as_deref()).into());
    args.push("--newline".into());
    args.push("--no-playlist".into());
    if let Some(ffmpeg) = &settings.ffmpeg_location {
        args.push("--ffmpeg-location".into());
        args.push(ffmpeg.clone().into());
    }
    args.extend(settings.extra_args.iter().map(OsString::from));
    Invocation {
        program: settings.program.clone(),
        args,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job_db::JobStatus;
    use crate::quality::Quality;

    fn job(name: Option<&str>, quality: Quality) -> Job {
        Job {
            id: 1,
            source_url: "https://video.example/watch?v=xyz".to_string(),
            display_name: name.map(str::to_string),
            quality,
            append_title: false,
            status: JobStatus::Queued,
            error_message: None,
            created_at: 0,
            updated_at: 0,
            finished_at: None,
        }
    }

    fn settings() -> SupervisorSettings {
        SupervisorSettings {
            program: PathBuf::from("yt-dlp"),
            download_dir: PathBuf::from("/srv/media"),
            ffmpeg_location: None,
            extra_args: Vec::new(),
            stderr_tail_chars: 1000,
        }
    }

    fn strings(inv: &Invocation) -> Vec<String> {
        inv.args
            .iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn named_job_with_height_tier() {
        let inv = build(&settings(), &job(Some("My Clip"), Quality::Height(1080)));
        assert_eq!(inv.program, PathBuf::from("yt-dlp"));
        assert_eq!(
            strings(&inv),
            vec![
                "https://video.example/watch?v=xyz",
                "-f",
                "best[height<=1080]",
                "-o",
                "/srv/media/My Clip.%(ext)s",
                "--newline",
                "--no-playlist",
            ]
        );
    }

    #[test]
    fn unnamed_job_uses_title_placeholder() {
        let j = job(None, Quality::Lowest);
        assert!(uses_placeholder(&j));
        let args = strings(&build(&settings(), &j));
        assert_eq!(&args[1..3], &["-S", "+res,+br,+size"]);
        assert_eq!(args[4], "/srv/media/%(title)s.%(ext)s");
        assert!(uses_placeholder(&job(Some("  "), Quality::Audio)));
    }

    #[test]
    fn ffmpeg_and_extra_args_are_appended() {
        let mut s = settings();
        s.ffmpeg_location = Some(PathBuf::from("/usr/bin/ffmpeg"));
        s.extra_args = vec!["--restrict-filenames".to_string()];
        let args = strings(&build(&s, &job(Some("a"), Quality::Audio)));
        assert_eq!(
            &args[args.len() - 3..],
            &["--ffmpeg-location", "/usr/bin/ffmpeg", "--restrict-filenames"]
        );
    }
}
