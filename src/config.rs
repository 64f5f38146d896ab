use anyhow::{Context, Result};
use faceverify_vision::{snapshot::DEFAULT_JPEG_QUALITY, Constraints};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

pub static CONFIG_PATH: Lazy<&'static Path> = Lazy::new(|| {
    Path::new(
        option_env!("FACEVERIFY_CONFIG_PATH").unwrap_or("/usr/local/etc/faceverify/config.toml"),
    )
});

pub const DEFAULT_FACEBOX: &str = "http://localhost:8080";
pub const DEFAULT_SNAPSHOT_INTERVAL: Duration = Duration::from_millis(1000);

/// On-disk configuration. Omitted keys take their defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Base URL of the Facebox service.
    pub facebox: String,
    /// Milliseconds between the end of one capture cycle and the next.
    pub snapshot_interval: u64,
    /// Capture device path.
    pub camera: String,
    pub max_width: u32,
    pub max_height: u32,
    pub jpeg_quality: u8,
}

impl Default for Config {
    fn default() -> Self {
        let constraints = Constraints::default();
        Self {
            facebox: DEFAULT_FACEBOX.to_string(),
            snapshot_interval: DEFAULT_SNAPSHOT_INTERVAL.as_millis() as u64,
            camera: "/dev/video0".to_string(),
            max_width: constraints.max_width,
            max_height: constraints.max_height,
            jpeg_quality: DEFAULT_JPEG_QUALITY,
        }
    }
}

impl Config {
    pub fn options(&self) -> Options {
        Options::new(
            &self.facebox,
            Duration::from_millis(self.snapshot_interval),
            Some(self.camera.clone()).filter(|c| !c.is_empty()),
        )
        .constraints(Constraints {
            max_width: self.max_width,
            max_height: self.max_height,
        })
        .jpeg_quality(self.jpeg_quality)
    }
}

/// Immutable settings of one capture-and-verify loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Options {
    pub facebox: String,
    pub snapshot_interval: Duration,
    pub video: Option<String>,
    pub constraints: Constraints,
    pub jpeg_quality: u8,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            facebox: DEFAULT_FACEBOX.to_string(),
            snapshot_interval: DEFAULT_SNAPSHOT_INTERVAL,
            video: None,
            constraints: Constraints::default(),
            jpeg_quality: DEFAULT_JPEG_QUALITY,
        }
    }
}

impl Options {
    /// An empty URL or a zero interval counts as omitted.
    pub fn new(facebox: &str, snapshot_interval: Duration, video: Option<String>) -> Self {
        let facebox = facebox.trim().trim_end_matches('/');
        Self {
            facebox: if facebox.is_empty() {
                DEFAULT_FACEBOX.to_string()
            } else {
                facebox.to_string()
            },
            snapshot_interval: if snapshot_interval.is_zero() {
                DEFAULT_SNAPSHOT_INTERVAL
            } else {
                snapshot_interval
            },
            video,
            ..Self::default()
        }
    }

    pub fn constraints(mut self, constraints: Constraints) -> Self {
        let defaults = Constraints::default();
        self.constraints = Constraints {
            max_width: if constraints.max_width == 0 {
                defaults.max_width
            } else {
                constraints.max_width
            },
            max_height: if constraints.max_height == 0 {
                defaults.max_height
            } else {
                constraints.max_height
            },
        };
        self
    }

    pub fn jpeg_quality(mut self, quality: u8) -> Self {
        self.jpeg_quality = if quality == 0 {
            DEFAULT_JPEG_QUALITY
        } else {
            quality.min(100)
        };
        self
    }
}

pub fn load_config(path: Option<&Path>) -> Result<Config> {
    let path = path.unwrap_or(&CONFIG_PATH);
    if !path.exists() {
        return Ok(Config::default());
    }
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading config at {}", path.display()))?;
    toml::from_str(&raw).with_context(|| format!("parsing config {}", path.display()))
}

pub fn save_config(cfg: &Config, path: Option<&Path>) -> Result<()> {
    let path = path.unwrap_or(&CONFIG_PATH);
    let data = toml::to_string_pretty(cfg)?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, data)?;
    Ok(())
}
