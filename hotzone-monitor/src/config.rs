//! Monitor configuration.
//!
//! Stored as camelCase JSON. Lookup order: the `--config` path, then
//! `config.json` in the platform configuration directory, then built-in
//! defaults. A missing file yields defaults; a malformed one is an error.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use hotzone_core::alert::DEFAULT_REALERT_INTERVAL_MS;
use hotzone_core::background::DEFAULT_NOTIFICATION_COOLDOWN_MS;
use hotzone_core::{DistanceMode, ProximitySettings};
use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::error::MonitorError;

const CONFIG_FILE_NAME: &str = "config.json";

/// Upper bound for any timer period or cooldown: one day
pub const MAX_INTERVAL_MS: u64 = 24 * 60 * 60 * 1000;

pub fn get_project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("org", "hotzone", "hotzone-monitor")
}

/// Path of the config file in the platform configuration directory
pub fn default_config_path() -> Option<PathBuf> {
    get_project_dirs().map(|dirs| dirs.config_dir().join(CONFIG_FILE_NAME))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MonitorConfig {
    /// Warning cutoff around zones, meters
    pub warning_radius_m: f64,
    /// Warning cutoff around incident points, meters
    pub point_warning_radius_m: f64,
    /// Distance outside a zone still treated as critical, meters
    pub critical_radius_m: f64,
    /// Foreground re-alert interval while critical
    pub realert_interval_ms: u64,
    /// Period of the background evaluation trigger
    pub background_interval_ms: u64,
    /// Minimum gap between repeated background critical notifications
    pub notification_cooldown_ms: u64,
    /// Only evaluate zones with a vertex this close to the position.
    /// `null` disables the filter.
    pub proximity_filter_km: Option<f64>,
    pub distance_mode: DistanceMode,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        MonitorConfig {
            warning_radius_m: 500.0,
            point_warning_radius_m: 1000.0,
            critical_radius_m: 0.0,
            realert_interval_ms: DEFAULT_REALERT_INTERVAL_MS,
            background_interval_ms: 5_000,
            notification_cooldown_ms: DEFAULT_NOTIFICATION_COOLDOWN_MS,
            proximity_filter_km: Some(100.0),
            distance_mode: DistanceMode::Vertex,
        }
    }
}

impl MonitorConfig {
    /// Load from `path`, or from the default location when `None`
    pub fn load(path: Option<&Path>) -> Result<Self, MonitorError> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => match default_config_path() {
                Some(path) => path,
                None => {
                    debug!("No configuration directory, using defaults");
                    return Ok(Self::default());
                }
            },
        };

        let config = match fs::read_to_string(&path) {
            Ok(text) => {
                let config: MonitorConfig =
                    serde_json::from_str(&text).map_err(|e| MonitorError::json(&path, e))?;
                info!("Loaded configuration from {}", path.display());
                config
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                info!("No configuration at {}, using defaults", path.display());
                Self::default()
            }
            Err(e) => return Err(MonitorError::io(&path, e)),
        };

        config.validate()?;
        Ok(config)
    }

    /// Write as pretty JSON, creating parent directories
    pub fn save(&self, path: &Path) -> Result<(), MonitorError> {
        self.validate()?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| MonitorError::io(parent, e))?;
        }
        let json = serde_json::to_string_pretty(self).map_err(|e| MonitorError::json(path, e))?;
        fs::write(path, json).map_err(|e| MonitorError::io(path, e))?;
        debug!("Saved configuration to {}", path.display());
        Ok(())
    }

    pub fn validate(&self) -> Result<(), MonitorError> {
        let radii = [
            ("warningRadiusM", self.warning_radius_m),
            ("pointWarningRadiusM", self.point_warning_radius_m),
            ("criticalRadiusM", self.critical_radius_m),
        ];
        for (name, value) in radii {
            if !value.is_finite() || value < 0.0 {
                return Err(MonitorError::InvalidConfig(format!(
                    "{} must be a non-negative number, got {}",
                    name, value
                )));
            }
        }

        let intervals = [
            ("realertIntervalMs", self.realert_interval_ms),
            ("backgroundIntervalMs", self.background_interval_ms),
            ("notificationCooldownMs", self.notification_cooldown_ms),
        ];
        for (name, value) in intervals {
            if value == 0 {
                return Err(MonitorError::InvalidConfig(format!("{} must be non-zero", name)));
            }
            if value > MAX_INTERVAL_MS {
                return Err(MonitorError::InvalidConfig(format!(
                    "{} must be at most {} ms, got {}",
                    name, MAX_INTERVAL_MS, value
                )));
            }
        }

        if let Some(km) = self.proximity_filter_km {
            if !km.is_finite() || km <= 0.0 {
                return Err(MonitorError::InvalidConfig(format!(
                    "proximityFilterKm must be positive, got {}",
                    km
                )));
            }
        }
        Ok(())
    }

    pub fn proximity_settings(&self) -> ProximitySettings {
        ProximitySettings {
            critical_radius_m: self.critical_radius_m,
            warning_radius_m: self.warning_radius_m,
            point_warning_radius_m: self.point_warning_radius_m,
            distance_mode: self.distance_mode,
        }
    }

    pub fn realert_interval(&self) -> Duration {
        Duration::from_millis(self.realert_interval_ms)
    }

    pub fn background_interval(&self) -> Duration {
        Duration::from_millis(self.background_interval_ms)
    }
}
