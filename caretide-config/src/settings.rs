// Settings loading and validation
//
// Loading hierarchy: env > file > defaults

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

use crate::env::apply_env_overrides;

/// Errors raised while loading or validating runtime settings
#[derive(Error, Debug)]
pub enum SettingsError {
    /// Settings file could not be read
    #[error("I/O error: {0}")]
    Io(String),

    /// Settings file is not valid TOML
    #[error("Parse error: {0}")]
    Parse(String),

    /// An environment override or file value is out of range
    #[error("Invalid setting {name}: {reason}")]
    Invalid { name: String, reason: String },
}

/// Runtime settings shared by the matching engine and the expirer
///
/// Every field has a service default and can be overridden by the
/// environment variable named in its doc comment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeSettings {
    /// Proposal time-to-live in minutes when the matching configuration
    /// does not set one (`PROPOSAL_DEFAULT_TTL_MINUTES`)
    pub proposal_default_ttl_minutes: i64,
    /// Wall-clock budget for a single match attempt in milliseconds
    /// (`MATCHER_PER_SHIFT_BUDGET_MS`)
    pub matcher_per_shift_budget_ms: u64,
    /// Sweep interval for the proposal expirer in seconds
    /// (`EXPIRER_INTERVAL_SECONDS`)
    pub expirer_interval_seconds: u64,
    /// Minimum overall score for proposal emission when the configuration
    /// does not set one (`MATCH_DEFAULT_MIN_SCORE`)
    pub match_default_min_score: u8,
    /// Proposal fan-out cap when the configuration does not set one
    /// (`MATCH_DEFAULT_MAX_PROPOSALS`)
    pub match_default_max_proposals: usize,
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        Self {
            proposal_default_ttl_minutes: 120,
            matcher_per_shift_budget_ms: 5000,
            expirer_interval_seconds: 60,
            match_default_min_score: 50,
            match_default_max_proposals: 5,
        }
    }
}

impl RuntimeSettings {
    /// Check cross-field constraints
    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.proposal_default_ttl_minutes <= 0 {
            return Err(SettingsError::Invalid {
                name: "proposal_default_ttl_minutes".to_string(),
                reason: "must be positive".to_string(),
            });
        }
        if self.matcher_per_shift_budget_ms == 0 {
            return Err(SettingsError::Invalid {
                name: "matcher_per_shift_budget_ms".to_string(),
                reason: "must be positive".to_string(),
            });
        }
        if self.expirer_interval_seconds == 0 {
            return Err(SettingsError::Invalid {
                name: "expirer_interval_seconds".to_string(),
                reason: "must be positive".to_string(),
            });
        }
        if self.match_default_min_score > 100 {
            return Err(SettingsError::Invalid {
                name: "match_default_min_score".to_string(),
                reason: "must be within 0..=100".to_string(),
            });
        }
        if self.match_default_max_proposals == 0 {
            return Err(SettingsError::Invalid {
                name: "match_default_max_proposals".to_string(),
                reason: "must be positive".to_string(),
            });
        }
        Ok(())
    }
}

/// Load settings from an optional TOML file, then apply environment
/// overrides and validate
pub fn load_settings(file: Option<&Path>) -> Result<RuntimeSettings, SettingsError> {
    let mut settings = match file {
        Some(path) if path.exists() => load_from_file(path)?,
        _ => RuntimeSettings::default(),
    };

    apply_env_overrides(&mut settings)?;
    settings.validate()?;

    Ok(settings)
}

/// Load settings from a TOML file
pub fn load_from_file(path: &Path) -> Result<RuntimeSettings, SettingsError> {
    let content =
        std::fs::read_to_string(path).map_err(|e| SettingsError::Io(e.to_string()))?;

    toml::from_str(&content).map_err(|e| SettingsError::Parse(e.to_string()))
}
