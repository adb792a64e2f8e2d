use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

/// Download folder used when neither the config nor the environment names one.
const DEFAULT_DOWNLOAD_DIR: &str = "downloads";

/// Global configuration loaded from `~/.config/mdq/config.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MdqConfig {
    /// Downloader executable (path or name on `PATH`).
    pub downloader: PathBuf,
    /// Optional ffmpeg location passed through to the downloader.
    pub ffmpeg_location: Option<PathBuf>,
    /// Where downloaded files are written. Relative paths resolve against the
    /// working directory.
    pub download_dir: Option<PathBuf>,
    /// Job database file. Defaults to `~/.local/state/mdq/jobs.db`.
    pub database_path: Option<PathBuf>,
    /// Parallel downloads at startup.
    pub default_concurrency: usize,
    /// Upper bound for runtime concurrency changes.
    pub max_concurrency: usize,
    /// Bytes of downloader stderr kept for error messages.
    pub stderr_tail_chars: usize,
    /// How long finished jobs stay in the live feed.
    pub live_window_secs: i64,
    /// Extra arguments appended to every downloader invocation.
    pub extra_args: Vec<String>,
}

impl Default for MdqConfig {
    fn default() -> Self {
        Self {
            downloader: PathBuf::from("yt-dlp"),
            ffmpeg_location: None,
            download_dir: None,
            database_path: None,
            default_concurrency: 1,
            max_concurrency: 3,
            stderr_tail_chars: 1000,
            live_window_secs: 2,
            extra_args: Vec::new(),
        }
    }
}

impl MdqConfig {
    /// Applies `MDQ_*` environment overrides, then normalizes limits.
    ///
    /// `lookup` is `std::env::var` in production; tests pass a map.
    pub fn apply_env<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(dir) = lookup("MDQ_DOWNLOAD_PATH").filter(|s| !s.is_empty()) {
            self.download_dir = Some(PathBuf::from(dir));
        }
        if let Some(path) = lookup("MDQ_DATABASE_PATH").filter(|s| !s.is_empty()) {
            self.database_path = Some(PathBuf::from(path));
        }
        if let Some(n) = lookup("MDQ_MAX_CONCURRENCY").and_then(|s| s.trim().parse().ok()) {
            self.max_concurrency = n;
        }
        if let Some(n) = lookup("MDQ_DEFAULT_CONCURRENCY").and_then(|s| s.trim().parse().ok()) {
            self.default_concurrency = n;
        }
        self.normalized()
    }

    /// `max_concurrency >= 1` and `1 <= default_concurrency <= max_concurrency`.
    pub fn normalized(mut self) -> Self {
        self.max_concurrency = self.max_concurrency.max(1);
        self.default_concurrency = self.default_concurrency.clamp(1, self.max_concurrency);
        self
    }

    pub fn effective_download_dir(&self) -> PathBuf {
        self.download_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DOWNLOAD_DIR))
    }

    /// Configured database path or the XDG default.
    pub fn effective_database_path(&self) -> Result<PathBuf> {
        match &self.database_path {
            Some(p) => Ok(p.clone()),
            None => Ok(crate::job_db::JobDb::default_path()?),
        }
    }

    /// Creates the download directory if missing.
    pub fn ensure_download_dir(&self) -> Result<PathBuf> {
        let dir = self.effective_download_dir();
        if !dir.exists() {
            fs::create_dir_all(&dir)
                .with_context(|| format!("create download dir {}", dir.display()))?;
            tracing::info!("download folder created: {}", dir.display());
        }
        Ok(dir)
    }
}

pub fn config_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("mdq")?;
    Ok(xdg_dirs.place_config_file("config.toml")?)
}

/// Load configuration from disk, creating a default file if none exists.
/// Environment overrides are applied on top.
pub fn load_or_init() -> Result<MdqConfig> {
    let path = config_path()?;
    let cfg = if !path.exists() {
        let default_cfg = MdqConfig::default();
        let toml = toml::to_string_pretty(&default_cfg)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, toml)?;
        tracing::info!("created default config at {}", path.display());
        default_cfg
    } else {
        let data = fs::read_to_string(&path)
            .with_context(|| format!("read config {}", path.display()))?;
        toml::from_str(&data).with_context(|| format!("parse config {}", path.display()))?
    };
    Ok(cfg.apply_env(|k| std::env::var(k).ok()))
}
