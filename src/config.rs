use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EngineConfig {
    pub prior_alpha: f64,
    pub prior_beta: f64,
    pub fatigue_decay: f64,
    pub fatigue_gain: f64,
    pub uncertainty_stop: f64,
    pub fatigue_stop: f64,
    pub exploration_weight: f64,
    pub difficulty_bucket_size: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            prior_alpha: 2.0,
            prior_beta: 2.0,
            fatigue_decay: 0.97,
            fatigue_gain: 0.12,
            uncertainty_stop: 0.04,
            fatigue_stop: 0.7,
            exploration_weight: 0.5,
            difficulty_bucket_size: 1.0,
        }
    }
}

impl EngineConfig {
    /// Defaults overlaid with any `SCREENING_*` variables that are set.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        override_from_env("SCREENING_PRIOR_ALPHA", &mut config.prior_alpha)?;
        override_from_env("SCREENING_PRIOR_BETA", &mut config.prior_beta)?;
        override_from_env("SCREENING_FATIGUE_DECAY", &mut config.fatigue_decay)?;
        override_from_env("SCREENING_FATIGUE_GAIN", &mut config.fatigue_gain)?;
        override_from_env("SCREENING_UNCERTAINTY_STOP", &mut config.uncertainty_stop)?;
        override_from_env("SCREENING_FATIGUE_STOP", &mut config.fatigue_stop)?;
        override_from_env("SCREENING_EXPLORATION_WEIGHT", &mut config.exploration_weight)?;
        override_from_env(
            "SCREENING_DIFFICULTY_BUCKET_SIZE",
            &mut config.difficulty_bucket_size,
        )?;

        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        positive("prior_alpha", self.prior_alpha)?;
        positive("prior_beta", self.prior_beta)?;
        if !(self.fatigue_decay > 0.0 && self.fatigue_decay <= 1.0) {
            return Err(ConfigError::OutOfRange {
                field: "fatigue_decay",
                expected: "in (0, 1]",
                value: self.fatigue_decay,
            });
        }
        non_negative("fatigue_gain", self.fatigue_gain)?;
        non_negative("uncertainty_stop", self.uncertainty_stop)?;
        non_negative("fatigue_stop", self.fatigue_stop)?;
        non_negative("exploration_weight", self.exploration_weight)?;
        positive("difficulty_bucket_size", self.difficulty_bucket_size)?;
        Ok(())
    }
}

fn override_from_env(var: &'static str, target: &mut f64) -> Result<(), ConfigError> {
    if let Ok(raw) = std::env::var(var) {
        *target = raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidEnv { var, value: raw.clone() })?;
    }
    Ok(())
}

fn positive(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::OutOfRange {
            field,
            expected: "finite and > 0",
            value,
        })
    }
}

fn non_negative(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(ConfigError::OutOfRange {
            field,
            expected: "finite and >= 0",
            value,
        })
    }
}

/// Process-level settings for the replay binary.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub log_level: String,
    pub script_path: Option<String>,
}

impl RuntimeConfig {
    pub fn from_env() -> Self {
        let log_level = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
        let script_path = std::env::args()
            .nth(1)
            .or_else(|| std::env::var("SCREENING_SCRIPT").ok());

        Self {
            log_level,
            script_path,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.prior_alpha, 2.0);
        assert_eq!(config.fatigue_decay, 0.97);
        assert_eq!(config.exploration_weight, 0.5);
    }

    #[test]
    fn test_rejects_decay_outside_unit_interval() {
        for decay in [0.0, -0.5, 1.01, f64::NAN] {
            let config = EngineConfig {
                fatigue_decay: decay,
                ..Default::default()
            };
            assert!(
                matches!(
                    config.validate(),
                    Err(ConfigError::OutOfRange { field: "fatigue_decay", .. })
                ),
                "decay {decay} should be rejected"
            );
        }
        let config = EngineConfig {
            fatigue_decay: 1.0,
            ..Default::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_rejects_bad_priors_and_bucket() {
        let config = EngineConfig {
            prior_alpha: 0.0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = EngineConfig {
            difficulty_bucket_size: 0.0,
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("difficulty_bucket_size"));
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: EngineConfig =
            serde_json::from_str(r#"{"priorAlpha": 1.0, "fatigueStop": 0.9}"#).unwrap();
        assert_eq!(config.prior_alpha, 1.0);
        assert_eq!(config.fatigue_stop, 0.9);
        assert_eq!(config.prior_beta, 2.0);
        assert_eq!(config.difficulty_bucket_size, 1.0);
    }
}
