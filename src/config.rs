//! TOML configuration.
//!
//! Only `[watch]` is required; every other section falls back to defaults
//! that match a single-host deployment with tesseract and poppler installed.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub watch: WatchConfig,
    #[serde(default)]
    pub ocr: OcrConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct WatchConfig {
    pub root: PathBuf,
    #[serde(default = "default_rescan_interval_secs")]
    pub rescan_interval_secs: u64,
    /// Debounce window for watcher events; a path is processed once it has
    /// been quiet this long.
    #[serde(default = "default_settle_delay_ms")]
    pub settle_delay_ms: u64,
    #[serde(default)]
    pub follow_symlinks: bool,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
}

fn default_rescan_interval_secs() -> u64 {
    5
}
fn default_settle_delay_ms() -> u64 {
    1000
}

impl WatchConfig {
    pub fn rescan_interval(&self) -> Duration {
        Duration::from_secs(self.rescan_interval_secs)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct OcrConfig {
    #[serde(default = "default_language")]
    pub language: String,
    #[serde(default = "default_dpi")]
    pub dpi: u32,
    #[serde(default = "default_tesseract_cmd")]
    pub tesseract_cmd: String,
    #[serde(default = "default_pdftoppm_cmd")]
    pub pdftoppm_cmd: String,
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            language: default_language(),
            dpi: default_dpi(),
            tesseract_cmd: default_tesseract_cmd(),
            pdftoppm_cmd: default_pdftoppm_cmd(),
            max_concurrent: default_max_concurrent(),
        }
    }
}

fn default_language() -> String {
    "spa".to_string()
}
fn default_dpi() -> u32 {
    150
}
fn default_tesseract_cmd() -> String {
    "tesseract".to_string()
}
fn default_pdftoppm_cmd() -> String {
    "pdftoppm".to_string()
}
fn default_max_concurrent() -> usize {
    2
}

#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    #[serde(default = "default_backend")]
    pub backend: String,
    #[serde(default = "default_store_path")]
    pub path: PathBuf,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_index")]
    pub index: String,
    #[serde(default = "default_ready_attempts")]
    pub ready_attempts: u32,
    #[serde(default = "default_ready_interval_secs")]
    pub ready_interval_secs: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            path: default_store_path(),
            url: None,
            index: default_index(),
            ready_attempts: default_ready_attempts(),
            ready_interval_secs: default_ready_interval_secs(),
        }
    }
}

fn default_backend() -> String {
    "sqlite".to_string()
}
fn default_store_path() -> PathBuf {
    PathBuf::from("./data/scandex.sqlite")
}
fn default_index() -> String {
    "documents".to_string()
}
fn default_ready_attempts() -> u32 {
    30
}
fn default_ready_interval_secs() -> u64 {
    2
}

impl StoreConfig {
    pub fn ready_interval(&self) -> Duration {
        Duration::from_secs(self.ready_interval_secs)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:8000".to_string()
}

impl Config {
    /// All-defaults configuration watching `root`, with the in-memory store.
    pub fn minimal(root: impl Into<PathBuf>) -> Self {
        Self {
            watch: WatchConfig {
                root: root.into(),
                rescan_interval_secs: default_rescan_interval_secs(),
                settle_delay_ms: default_settle_delay_ms(),
                follow_symlinks: false,
                exclude_globs: Vec::new(),
            },
            ocr: OcrConfig::default(),
            store: StoreConfig {
                backend: "memory".to_string(),
                ..StoreConfig::default()
            },
            server: ServerConfig::default(),
        }
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    if config.watch.rescan_interval_secs == 0 {
        anyhow::bail!("watch.rescan_interval_secs must be > 0");
    }
    if config.watch.settle_delay_ms == 0 {
        anyhow::bail!("watch.settle_delay_ms must be > 0");
    }

    if config.ocr.dpi == 0 {
        anyhow::bail!("ocr.dpi must be > 0");
    }
    if config.ocr.max_concurrent == 0 {
        anyhow::bail!("ocr.max_concurrent must be > 0");
    }

    if config.store.ready_attempts == 0 {
        anyhow::bail!("store.ready_attempts must be > 0");
    }
    if config.store.index.trim().is_empty() {
        anyhow::bail!("store.index must not be empty");
    }

    match config.store.backend.as_str() {
        "sqlite" | "memory" => {}
        "elasticsearch" => {
            if config.store.url.is_none() {
                anyhow::bail!("store.url must be specified when backend is 'elasticsearch'");
            }
        }
        other => anyhow::bail!(
            "Unknown store backend: '{}'. Must be sqlite, elasticsearch, or memory.",
            other
        ),
    }

    Ok(())
}
