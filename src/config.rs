// Daemon configuration.
//
// The pot provider URL is required and only comes from the environment.
// Everything else has a default and can be overridden from a TOML settings
// file, found via YTCD_CONFIG or at /etc/ytcd/ytcd.toml.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use serde::Deserialize;

pub const POT_PROVIDER_URL_VAR: &str = "YTCD_BGUTIL_YTDLP_POT_PROVIDER_URL";
pub const CONFIG_PATH_VAR: &str = "YTCD_CONFIG";
pub const DEFAULT_CONFIG_PATH: &str = "/etc/ytcd/ytcd.toml";

/// Longest pot provider URL accepted. Real ones look like `http://pot-provider:4416`.
pub const MAX_POT_PROVIDER_URL_LEN: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    pub channels_file: PathBuf,
    pub archive_file: PathBuf,
    pub videos_dir: PathBuf,
    pub downloader: String,
    pub verbose: bool,
    pub ping_timeout_ms: u64,
    pub ping_retry_ms: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            channels_file: PathBuf::from("/etc/ytcd/channels.txt"),
            archive_file: PathBuf::from("/var/lib/ytcd/data/archive.txt"),
            videos_dir: PathBuf::from("/var/lib/ytcd/videos"),
            downloader: "yt-dlp".to_string(),
            verbose: false,
            ping_timeout_ms: 1000,
            ping_retry_ms: 1000,
        }
    }
}

impl Settings {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings file {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("Failed to parse settings TOML {}", path.display()))
    }

    pub fn ping_timeout(&self) -> Duration {
        Duration::from_millis(self.ping_timeout_ms)
    }

    pub fn ping_retry(&self) -> Duration {
        Duration::from_millis(self.ping_retry_ms)
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    /// Base URL of the bgutil pot provider, without a trailing slash.
    pub pot_provider_url: String,
    pub settings: Settings,
}

impl Config {
    /// `<url>/ping`, the liveness endpoint pinged at startup.
    pub fn ping_url(&self) -> String {
        format!("{}/ping", self.pot_provider_url)
    }
}

/// Load configuration from the process environment.
pub fn load_config() -> anyhow::Result<Config> {
    load_config_with(|name| std::env::var(name).ok())
}

/// Same as [`load_config`], reading variables through `lookup`.
pub fn load_config_with<F>(lookup: F) -> anyhow::Result<Config>
where
    F: Fn(&str) -> Option<String>,
{
    let pot_provider_url = validate_pot_provider_url(lookup(POT_PROVIDER_URL_VAR))?;

    let settings = match lookup(CONFIG_PATH_VAR).filter(|p| !p.is_empty()) {
        Some(path) => Settings::load_from_file(&path)?,
        None if Path::new(DEFAULT_CONFIG_PATH).exists() => {
            Settings::load_from_file(DEFAULT_CONFIG_PATH)?
        }
        None => Settings::default(),
    };

    Ok(Config {
        pot_provider_url,
        settings,
    })
}

fn validate_pot_provider_url(value: Option<String>) -> anyhow::Result<String> {
    let url = match value {
        Some(v) if !v.is_empty() => v,
        _ => anyhow::bail!("Environment variable {} must be set", POT_PROVIDER_URL_VAR),
    };
    if url.len() > MAX_POT_PROVIDER_URL_LEN {
        anyhow::bail!("URL is too long: {}", url);
    }
    let trimmed = url.trim_end_matches('/');
    if trimmed.is_empty() {
        anyhow::bail!("Environment variable {} must be a URL, got {:?}", POT_PROVIDER_URL_VAR, url);
    }
    Ok(trimmed.to_string())
}
