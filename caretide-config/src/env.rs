// Environment variable overrides
//
// Each setting maps to one fully spelled-out variable; overrides beat both
// file values and defaults. A set-but-unparsable variable is an error, not
// a silent fallback.

use std::env;
use std::str::FromStr;

use crate::settings::{RuntimeSettings, SettingsError};

/// Environment variable for the default proposal TTL in minutes
pub const PROPOSAL_DEFAULT_TTL_MINUTES: &str = "PROPOSAL_DEFAULT_TTL_MINUTES";
/// Environment variable for the per-shift match budget in milliseconds
pub const MATCHER_PER_SHIFT_BUDGET_MS: &str = "MATCHER_PER_SHIFT_BUDGET_MS";
/// Environment variable for the expirer sweep interval in seconds
pub const EXPIRER_INTERVAL_SECONDS: &str = "EXPIRER_INTERVAL_SECONDS";
/// Environment variable for the default minimum proposal score
pub const MATCH_DEFAULT_MIN_SCORE: &str = "MATCH_DEFAULT_MIN_SCORE";
/// Environment variable for the default proposal fan-out cap
pub const MATCH_DEFAULT_MAX_PROPOSALS: &str = "MATCH_DEFAULT_MAX_PROPOSALS";

/// Apply environment variable overrides onto loaded settings
pub fn apply_env_overrides(settings: &mut RuntimeSettings) -> Result<(), SettingsError> {
    if let Some(value) = parse_var(PROPOSAL_DEFAULT_TTL_MINUTES)? {
        settings.proposal_default_ttl_minutes = value;
    }
    if let Some(value) = parse_var(MATCHER_PER_SHIFT_BUDGET_MS)? {
        settings.matcher_per_shift_budget_ms = value;
    }
    if let Some(value) = parse_var(EXPIRER_INTERVAL_SECONDS)? {
        settings.expirer_interval_seconds = value;
    }
    if let Some(value) = parse_var(MATCH_DEFAULT_MIN_SCORE)? {
        settings.match_default_min_score = value;
    }
    if let Some(value) = parse_var(MATCH_DEFAULT_MAX_PROPOSALS)? {
        settings.match_default_max_proposals = value;
    }
    Ok(())
}

fn parse_var<T: FromStr>(name: &str) -> Result<Option<T>, SettingsError>
where
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| SettingsError::Invalid {
                name: name.to_string(),
                reason: format!("cannot parse {:?}: {}", raw, e),
            }),
        Err(_) => Ok(None),
    }
}
