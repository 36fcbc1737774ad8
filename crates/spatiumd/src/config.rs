//! Runtime configuration for the daemon.
//!
//! Loaded from `config.json` in the data directory (written with defaults on
//! first run), then overridden by `SPATIUM_ADDR` / `SPATIUM_FPS`.

use serde::{Deserialize, Serialize};
use spatium::chart::{AxisUnit, ChartConfig};
use spatium::session::SessionConfig;
use spatium_games::FoodGridParams;
use std::fs;
use std::path::{Path, PathBuf};

pub const ENV_ADDR: &str = "SPATIUM_ADDR";
pub const ENV_FPS: &str = "SPATIUM_FPS";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot access {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("invalid value {value:?} for {var}")]
    InvalidEnv { var: &'static str, value: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub listen_addr: String,
    /// Playback frames per second; 0 plays as fast as ticks arrive.
    pub target_fps: u32,
    /// Period of the session's tick clock.
    pub tick_ms: u64,
    /// Steps requested per `step_batch`.
    pub batch_size: u32,
    /// Unplayed steps above which no more batches are requested.
    pub max_backlog: usize,
    pub max_points: usize,
    pub annotation_axis: AxisUnit,
    pub marker_height: f64,
    /// Start playback as soon as the engine is ready.
    pub autostart: bool,
    /// Engine parameters, passed through verbatim.
    pub engine: serde_json::Value,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        let chart = ChartConfig::default();
        Self {
            listen_addr: "127.0.0.1:9877".to_string(),
            target_fps: 10,
            tick_ms: 4,
            batch_size: 64,
            max_backlog: 4096,
            max_points: chart.max_points,
            annotation_axis: chart.axis,
            marker_height: chart.marker_height,
            autostart: true,
            engine: serde_json::to_value(FoodGridParams::default())
                .unwrap_or_else(|_| serde_json::json!({})),
        }
    }
}

impl RuntimeConfig {
    /// Read `path`, or create it with defaults if it does not exist yet.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let io_err = |source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        };
        if !path.exists() {
            let config = Self::default();
            let text = serde_json::to_string_pretty(&config).map_err(|source| {
                ConfigError::Parse {
                    path: path.to_path_buf(),
                    source,
                }
            })?;
            fs::write(path, text).map_err(io_err)?;
            return Ok(config);
        }
        let text = fs::read_to_string(path).map_err(io_err)?;
        serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides(|var| std::env::var(var).ok())
    }

    fn apply_overrides(
        &mut self,
        lookup: impl Fn(&'static str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(addr) = lookup(ENV_ADDR) {
            if addr.trim().is_empty() {
                return Err(ConfigError::InvalidEnv {
                    var: ENV_ADDR,
                    value: addr,
                });
            }
            self.listen_addr = addr.trim().to_string();
        }
        if let Some(fps) = lookup(ENV_FPS) {
            self.target_fps = fps
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidEnv {
                    var: ENV_FPS,
                    value: fps,
                })?;
        }
        Ok(())
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            fps: self.target_fps,
            chart: ChartConfig {
                max_points: self.max_points.max(1),
                axis: self.annotation_axis,
                marker_height: self.marker_height,
                ..ChartConfig::default()
            },
        }
    }
}
