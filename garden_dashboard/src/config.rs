//! Dashboard settings.
//!
//! A builtin default is compiled in from `data/dashboard_config.json`. A file
//! passed with `--config` (or named by `GARDEN_DASHBOARD_CONFIG`) replaces it;
//! individual CLI flags are applied on top by `main`.

use std::{
    env, fs, io,
    path::{Path, PathBuf},
    time::Duration,
};

use garden_runtime::{SyncConfig, DEFAULT_MAX_CELLS};
use serde::Deserialize;
use thiserror::Error;

pub const BUILTIN_DASHBOARD_CONFIG: &str = include_str!("data/dashboard_config.json");
pub const CONFIG_PATH_ENV: &str = "GARDEN_DASHBOARD_CONFIG";

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct DashboardConfig {
    pub base_url: String,
    pub request_timeout_ms: u64,
    pub sync: SyncSettings,
    pub ui: UiSettings,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080/api".to_string(),
            request_timeout_ms: 3_000,
            sync: SyncSettings::default(),
            ui: UiSettings::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct SyncSettings {
    pub status_interval_ms: u64,
    pub parcel_interval_ms: u64,
    pub discard_stale_responses: bool,
    pub max_grid_cells: usize,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            status_interval_ms: 1_000,
            parcel_interval_ms: 5_000,
            discard_stale_responses: false,
            max_grid_cells: DEFAULT_MAX_CELLS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct UiSettings {
    /// Terminal columns per grid cell, borders included.
    pub cell_width: u16,
    pub cell_height: u16,
    pub max_logs: usize,
    pub redraw_interval_ms: u64,
}

impl Default for UiSettings {
    fn default() -> Self {
        Self {
            cell_width: 14,
            cell_height: 4,
            max_logs: 8,
            redraw_interval_ms: 100,
        }
    }
}

#[derive(Debug, Error)]
pub enum DashboardConfigError {
    #[error("failed to parse dashboard config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("failed to read dashboard config from {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl DashboardConfig {
    pub fn builtin() -> Self {
        match Self::from_json_str(BUILTIN_DASHBOARD_CONFIG) {
            Ok(config) => config,
            Err(err) => {
                tracing::warn!(
                    target: "garden::config",
                    error = %err,
                    "dashboard_config.builtin_invalid"
                );
                Self::default()
            }
        }
    }

    pub fn from_json_str(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn from_file(path: &Path) -> Result<Self, DashboardConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| DashboardConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = DashboardConfig::from_json_str(&contents)?;
        Ok(config)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn redraw_interval(&self) -> Duration {
        Duration::from_millis(self.ui.redraw_interval_ms.max(1))
    }

    pub fn sync_config(&self) -> SyncConfig {
        SyncConfig {
            status_interval: Duration::from_millis(self.sync.status_interval_ms),
            parcel_interval: Duration::from_millis(self.sync.parcel_interval_ms),
            discard_stale_responses: self.sync.discard_stale_responses,
            max_grid_cells: self.sync.max_grid_cells,
        }
    }
}

/// Resolve the config file: explicit path first, then the environment. A file
/// that cannot be loaded falls back to the builtin settings.
pub fn load_dashboard_config(explicit: Option<&Path>) -> (DashboardConfig, Option<PathBuf>) {
    let path = explicit
        .map(Path::to_path_buf)
        .or_else(|| env::var_os(CONFIG_PATH_ENV).map(PathBuf::from));

    if let Some(path) = path {
        match DashboardConfig::from_file(&path) {
            Ok(config) => {
                tracing::info!(
                    target: "garden::config",
                    path = %path.display(),
                    "dashboard_config.loaded=file"
                );
                return (config, Some(path));
            }
            Err(err) => {
                tracing::warn!(
                    target: "garden::config",
                    path = %path.display(),
                    error = %err,
                    "dashboard_config.load_failed"
                );
            }
        }
    }

    tracing::info!(target: "garden::config", "dashboard_config.loaded=builtin");
    (DashboardConfig::builtin(), None)
}
