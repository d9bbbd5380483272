//! # Deployment Configuration
//!
//! A deployment is a directory holding `blackseed.toml` and the fitted model it
//! points to. The model path is always relative to that directory so the same
//! bundle can be moved between machines; absolute paths are rejected.
//!
//! The root defaults to the directory containing the running executable and can
//! be overridden from the command line or the `BLACKSEED_ROOT` variable.

use crate::classify::ThresholdTable;
use crate::scorer::default_management_adjustment;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const CONFIG_FILE_NAME: &str = "blackseed.toml";
pub const ROOT_ENV_VAR: &str = "BLACKSEED_ROOT";

pub const DEFAULT_MAX_HEAT_HOURS: f64 = 3000.0;
pub const DEFAULT_MAX_SPORE_COUNT: f64 = 1_000_000.0;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read configuration file '{path}': {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to parse configuration file '{path}': {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("Failed to serialize configuration: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("Could not determine the deployment root from the running executable: {0}")]
    NoDeploymentRoot(std::io::Error),
    #[error(
        "model_path '{0}' is absolute. Model paths must be relative to the deployment root."
    )]
    AbsoluteModelPath(PathBuf),
    #[error("Model file '{0}' does not exist.")]
    ModelNotFound(PathBuf),
    #[error(
        "Threshold breakpoints must satisfy 0 <= medium < high < critical <= 1 (got critical={critical}, high={high}, medium={medium})."
    )]
    InvalidBreakpoints { critical: f64, high: f64, medium: f64 },
    #[error("{name} must be finite and positive, but was {value}.")]
    InvalidCeiling { name: &'static str, value: f64 },
    #[error("Management adjustment for '{label}' must be finite and non-negative, but was {factor}.")]
    InvalidAdjustment { label: String, factor: f64 },
    #[error("Input bound '{name}' must be finite and positive, but was {value}.")]
    InvalidBound { name: &'static str, value: f64 },
}

/// Ceilings beyond which the model is not consulted. Absent means disabled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CeilingConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature_ceiling: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spore_ceiling: Option<f64>,
}

/// Upper bounds on accepted inputs. Lower bounds are always zero.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct InputBounds {
    #[serde(default = "default_max_heat_hours")]
    pub max_heat_hours: f64,
    #[serde(default = "default_max_spore_count")]
    pub max_spore_count: f64,
}

fn default_max_heat_hours() -> f64 {
    DEFAULT_MAX_HEAT_HOURS
}

fn default_max_spore_count() -> f64 {
    DEFAULT_MAX_SPORE_COUNT
}

impl Default for InputBounds {
    fn default() -> Self {
        Self {
            max_heat_hours: DEFAULT_MAX_HEAT_HOURS,
            max_spore_count: DEFAULT_MAX_SPORE_COUNT,
        }
    }
}

/// Everything the predictor needs besides the fitted model itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictorSettings {
    pub threshold_table: ThresholdTable,
    #[serde(default)]
    pub overrides: CeilingConfig,
    #[serde(default = "default_management_adjustment")]
    pub management_adjustment: BTreeMap<String, f64>,
    #[serde(default)]
    pub bounds: InputBounds,
}

impl PredictorSettings {
    /// Settings with the given table, no ceilings, default adjustment and bounds.
    pub fn new(threshold_table: ThresholdTable) -> Self {
        Self {
            threshold_table,
            overrides: CeilingConfig::default(),
            management_adjustment: default_management_adjustment(),
            bounds: InputBounds::default(),
        }
    }

    pub fn with_ceilings(mut self, temperature: Option<f64>, spores: Option<f64>) -> Self {
        self.overrides = CeilingConfig {
            temperature_ceiling: temperature,
            spore_ceiling: spores,
        };
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.threshold_table.validate()?;

        for (name, value) in [
            ("temperature_ceiling", self.overrides.temperature_ceiling),
            ("spore_ceiling", self.overrides.spore_ceiling),
        ] {
            if let Some(value) = value {
                if !(value.is_finite() && value > 0.0) {
                    return Err(ConfigError::InvalidCeiling { name, value });
                }
            }
        }

        for (label, &factor) in &self.management_adjustment {
            if !(factor.is_finite() && factor >= 0.0) {
                return Err(ConfigError::InvalidAdjustment {
                    label: label.clone(),
                    factor,
                });
            }
        }

        for (name, value) in [
            ("max_heat_hours", self.bounds.max_heat_hours),
            ("max_spore_count", self.bounds.max_spore_count),
        ] {
            if !(value.is_finite() && value > 0.0) {
                return Err(ConfigError::InvalidBound { name, value });
            }
        }
        Ok(())
    }
}

/// Contents of `blackseed.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeploymentConfig {
    pub model_path: PathBuf,
    #[serde(flatten)]
    pub settings: PredictorSettings,
}

/// A validated deployment: its root directory and parsed configuration.
#[derive(Debug, Clone)]
pub struct Deployment {
    pub root: PathBuf,
    pub config: DeploymentConfig,
}

impl Deployment {
    /// Resolves the deployment root: an explicit override wins, otherwise the
    /// directory of the running executable.
    pub fn locate_root(explicit: Option<&Path>) -> Result<PathBuf, ConfigError> {
        if let Some(root) = explicit {
            return Ok(root.to_path_buf());
        }
        let exe = std::env::current_exe().map_err(ConfigError::NoDeploymentRoot)?;
        exe.parent().map(Path::to_path_buf).ok_or_else(|| {
            ConfigError::NoDeploymentRoot(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "executable has no parent directory",
            ))
        })
    }

    /// Reads and validates `blackseed.toml` under `root`, including the existence
    /// of the model file it names.
    pub fn load(root: &Path) -> Result<Self, ConfigError> {
        let path = root.join(CONFIG_FILE_NAME);
        let text = fs::read_to_string(&path).map_err(|source| ConfigError::Io {
            path: path.clone(),
            source,
        })?;
        let config: DeploymentConfig =
            toml::from_str(&text).map_err(|source| ConfigError::Parse {
                path: path.clone(),
                source,
            })?;

        if config.model_path.is_absolute() {
            return Err(ConfigError::AbsoluteModelPath(config.model_path));
        }
        config.settings.validate()?;

        let deployment = Self {
            root: root.to_path_buf(),
            config,
        };
        let model_path = deployment.model_path();
        if !model_path.is_file() {
            return Err(ConfigError::ModelNotFound(model_path));
        }
        log::info!(
            "Deployment root {} (threshold table {}, model {})",
            deployment.root.display(),
            deployment.config.settings.threshold_table.name(),
            model_path.display()
        );
        Ok(deployment)
    }

    /// Writes `blackseed.toml` under `root`.
    pub fn write_config(root: &Path, config: &DeploymentConfig) -> Result<PathBuf, ConfigError> {
        let path = root.join(CONFIG_FILE_NAME);
        let text = toml::to_string_pretty(config)?;
        fs::write(&path, text).map_err(|source| ConfigError::Io {
            path: path.clone(),
            source,
        })?;
        Ok(path)
    }

    pub fn model_path(&self) -> PathBuf {
        self.root.join(&self.config.model_path)
    }
}
