//! Ferry configuration stored at `~/.config/ferry/config.toml`.
//!
//! Loaded once at startup and passed down; nothing else reads the file or the
//! environment variables it honors.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

/// Overrides the config file location.
pub const CONFIG_PATH_ENV: &str = "FERRY_CONFIG";
/// Overrides `api.base_url`.
pub const API_URL_ENV: &str = "FERRY_API_URL";
/// Overrides `api.token`.
pub const TOKEN_ENV: &str = "FERRY_TOKEN";

/// Ferry configuration (TOML).
///
/// Missing fields take their defaults, so an empty file is valid.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(default)]
pub struct FerryConfig {
    pub api: ApiConfig,
    pub bundle: BundleConfig,
    pub diff: DiffConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ApiConfig {
    pub base_url: String,
    /// Bearer token sent with API requests. Obtained out of band.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.ferry.dev".to_string(),
            token: None,
        }
    }
}

/// How long to wait for the remote to finish packaging a bundle.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct BundleConfig {
    pub poll_attempts: u32,
    pub poll_interval_secs: u64,
    pub download_timeout_secs: u64,
}

impl Default for BundleConfig {
    fn default() -> Self {
        Self {
            poll_attempts: 10,
            poll_interval_secs: 3,
            download_timeout_secs: 300,
        }
    }
}

impl BundleConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn download_timeout(&self) -> Duration {
        Duration::from_secs(self.download_timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct DiffConfig {
    /// Largest `git diff` output buffered before falling back to stats.
    pub output_limit_bytes: usize,
    pub timeout_secs: u64,
}

impl Default for DiffConfig {
    fn default() -> Self {
        Self {
            output_limit_bytes: 5_000_000,
            timeout_secs: 120,
        }
    }
}

impl DiffConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl FerryConfig {
    pub fn validate(&self) -> Result<()> {
        let base = self.api.base_url.trim();
        if !(base.starts_with("http://") || base.starts_with("https://")) {
            return Err(anyhow!(
                "api.base_url must be an http(s) URL, got '{}'",
                self.api.base_url
            ));
        }
        if self.bundle.poll_attempts == 0 {
            return Err(anyhow!("bundle.poll_attempts must be > 0"));
        }
        if self.bundle.download_timeout_secs == 0 {
            return Err(anyhow!("bundle.download_timeout_secs must be > 0"));
        }
        if self.diff.output_limit_bytes == 0 {
            return Err(anyhow!("diff.output_limit_bytes must be > 0"));
        }
        if self.diff.timeout_secs == 0 {
            return Err(anyhow!("diff.timeout_secs must be > 0"));
        }
        Ok(())
    }

    /// Apply `FERRY_API_URL` / `FERRY_TOKEN` on top of file values.
    pub fn with_env_overrides(
        mut self,
        api_url: Option<String>,
        token: Option<String>,
    ) -> Self {
        if let Some(url) = api_url.filter(|u| !u.trim().is_empty()) {
            self.api.base_url = url.trim().to_string();
        }
        if let Some(token) = token.filter(|t| !t.trim().is_empty()) {
            self.api.token = Some(token.trim().to_string());
        }
        self
    }
}

/// Resolve the config path: `$FERRY_CONFIG`, else `<home>/.config/ferry/config.toml`.
pub fn default_config_path() -> Result<PathBuf> {
    if let Some(path) = std::env::var_os(CONFIG_PATH_ENV) {
        return Ok(PathBuf::from(path));
    }
    let home = home::home_dir().ok_or_else(|| anyhow!("cannot determine home directory"))?;
    Ok(home.join(".config").join("ferry").join("config.toml"))
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `FerryConfig::default()`.
pub fn load_config(path: &Path) -> Result<FerryConfig> {
    if !path.exists() {
        let cfg = FerryConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: FerryConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("invalid config {}", path.display()))?;
    Ok(cfg)
}

/// Load config from the default location with environment overrides applied.
pub fn load_effective_config() -> Result<(PathBuf, FerryConfig)> {
    let path = default_config_path()?;
    let cfg = load_config(&path)?.with_env_overrides(
        std::env::var(API_URL_ENV).ok(),
        std::env::var(TOKEN_ENV).ok(),
    );
    cfg.validate()?;
    Ok((path, cfg))
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &FerryConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    write_atomic(path, &buf)
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("config path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let tmp_path = path.with_extension("toml.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp config {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace config {}", path.display()))?;
    Ok(())
}
