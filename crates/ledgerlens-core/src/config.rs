//! Engine configuration
//!
//! Config is loaded with a two-layer resolution:
//! 1. Check for override in data dir (~/.local/share/ledgerlens/config/engine.toml)
//! 2. Fall back to embedded defaults (compiled into binary)
//!
//! Keys missing from an override keep their default values.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};

/// Embedded default config (compiled into binary)
const DEFAULT_CONFIG: &str = include_str!("../../../config/engine.toml");

/// Categorizer settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CategorizerConfig {
    /// Rule-labeled rows required before the learned layer is trained
    pub min_labeled_rows: usize,
    /// Fraction of labeled rows held out for evaluation
    pub test_size: f64,
    /// Vocabulary cap for the TF-IDF vectorizer
    pub max_vocabulary: usize,
    /// Trees in the random forest
    pub n_estimators: usize,
    pub seed: u64,
}

impl Default for CategorizerConfig {
    fn default() -> Self {
        Self {
            min_labeled_rows: 5,
            test_size: 0.2,
            max_vocabulary: 1000,
            n_estimators: 100,
            seed: 42,
        }
    }
}

/// Anomaly detector settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnomalyConfig {
    /// Expected outlier fraction
    pub contamination: f64,
    /// Trees in the isolation forest
    pub n_estimators: usize,
    /// Sub-sample size per tree
    pub max_samples: usize,
    pub seed: u64,
}

impl Default for AnomalyConfig {
    fn default() -> Self {
        Self {
            contamination: 0.05,
            n_estimators: 100,
            max_samples: 256,
            seed: 42,
        }
    }
}

/// Expense predictor settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForecastConfig {
    /// Fewer days of history than this and training is refused
    pub min_history_days: usize,
    /// Days of history needed before the seasonal model is attempted
    pub seasonal_min_days: usize,
    pub horizon_days: usize,
    /// Trailing window of the moving-average fallback
    pub average_window: usize,
    /// Per-day multiplicative noise range of the fallback forecast
    pub noise_low: f64,
    pub noise_high: f64,
    /// Heuristic band around fallback points
    pub band_lower: f64,
    pub band_upper: f64,
    /// Iteration cap for the seasonal fit
    pub max_iterations: usize,
    pub seed: u64,
}

impl Default for ForecastConfig {
    fn default() -> Self {
        Self {
            min_history_days: 14,
            seasonal_min_days: 21,
            horizon_days: 30,
            average_window: 30,
            noise_low: 0.8,
            noise_high: 1.2,
            band_lower: 0.8,
            band_upper: 1.2,
            max_iterations: 2000,
            seed: 42,
        }
    }
}

/// Full engine configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub categorizer: CategorizerConfig,
    pub anomaly: AnomalyConfig,
    pub forecast: ForecastConfig,
}

impl EngineConfig {
    /// Load from the default override location, falling back to embedded defaults
    pub fn load() -> Result<Self> {
        load_config(None)
    }

    /// Load from an explicit override path (embedded defaults if it does not exist)
    pub fn load_from(path: &Path) -> Result<Self> {
        load_config(Some(path))
    }

    /// Parse config from TOML content
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: EngineConfig = toml::from_str(content)
            .map_err(|e| Error::InvalidData(format!("Invalid config TOML: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        let c = &self.categorizer;
        if !(c.test_size > 0.0 && c.test_size < 1.0) {
            return Err(Error::InvalidData(format!(
                "categorizer.test_size must be in (0, 1), got {}",
                c.test_size
            )));
        }
        if c.n_estimators == 0 || c.max_vocabulary == 0 {
            return Err(Error::InvalidData(
                "categorizer.n_estimators and max_vocabulary must be positive".into(),
            ));
        }

        let a = &self.anomaly;
        if !(a.contamination > 0.0 && a.contamination <= 0.5) {
            return Err(Error::InvalidData(format!(
                "anomaly.contamination must be in (0, 0.5], got {}",
                a.contamination
            )));
        }
        if a.n_estimators == 0 || a.max_samples == 0 {
            return Err(Error::InvalidData(
                "anomaly.n_estimators and max_samples must be positive".into(),
            ));
        }

        let f = &self.forecast;
        if f.horizon_days == 0 || f.average_window == 0 || f.min_history_days == 0 {
            return Err(Error::InvalidData(
                "forecast.horizon_days, average_window and min_history_days must be positive"
                    .into(),
            ));
        }
        if f.noise_low > f.noise_high || f.noise_low < 0.0 {
            return Err(Error::InvalidData(format!(
                "forecast noise range [{}, {}] is invalid",
                f.noise_low, f.noise_high
            )));
        }
        if f.band_lower > 1.0 || f.band_upper < 1.0 || f.band_lower < 0.0 {
            return Err(Error::InvalidData(format!(
                "forecast band [{}, {}] must bracket 1.0",
                f.band_lower, f.band_upper
            )));
        }
        Ok(())
    }
}

/// Root of the platform data directory for Ledgerlens
pub fn data_dir() -> Option<PathBuf> {
    dirs::data_local_dir().map(|d| d.join("ledgerlens"))
}

/// Default config override path
pub fn default_config_path() -> Option<PathBuf> {
    data_dir().map(|d| d.join("config").join("engine.toml"))
}

/// Default location of the categorizer's learned-layer artifact
pub fn default_model_path() -> Option<PathBuf> {
    data_dir().map(|d| d.join("models").join("categorizer.json"))
}

/// Load configuration (override first, then default)
fn load_config(override_path: Option<&Path>) -> Result<EngineConfig> {
    let path = match override_path {
        Some(p) => Some(p.to_path_buf()),
        None => default_config_path(),
    };

    let content = match path {
        Some(ref p) if p.exists() => {
            debug!("Loading engine config from {}", p.display());
            fs::read_to_string(p)
                .map_err(|e| Error::InvalidData(format!("Failed to read config: {}", e)))?
        }
        _ => DEFAULT_CONFIG.to_string(),
    };

    EngineConfig::from_toml(&content)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_embedded_config_matches_defaults() {
        let config = EngineConfig::from_toml(DEFAULT_CONFIG).unwrap();
        assert_eq!(config, EngineConfig::default());
    }

    #[test]
    fn test_partial_override_keeps_defaults() {
        let config = EngineConfig::from_toml(
            r#"
[anomaly]
contamination = 0.1

[forecast]
horizon_days = 14
"#,
        )
        .unwrap();

        assert_eq!(config.anomaly.contamination, 0.1);
        assert_eq!(config.anomaly.n_estimators, 100);
        assert_eq!(config.forecast.horizon_days, 14);
        assert_eq!(config.forecast.min_history_days, 14);
        assert_eq!(config.categorizer, CategorizerConfig::default());
    }

    #[test]
    fn test_invalid_contamination_rejected() {
        let err = EngineConfig::from_toml("[anomaly]\ncontamination = 0.9\n").unwrap_err();
        assert!(matches!(err, Error::InvalidData(_)));
    }

    #[test]
    fn test_malformed_toml_rejected() {
        assert!(EngineConfig::from_toml("[forecast\nhorizon_days = ").is_err());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[categorizer]\nseed = 7").unwrap();

        let config = EngineConfig::load_from(file.path()).unwrap();
        assert_eq!(config.categorizer.seed, 7);
    }

    #[test]
    fn test_missing_override_uses_embedded() {
        let dir = tempfile::tempdir().unwrap();
        let config = EngineConfig::load_from(&dir.path().join("nope.toml")).unwrap();
        assert_eq!(config, EngineConfig::default());
    }
}
