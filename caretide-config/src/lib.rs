// caretide-config - Runtime settings for the matching services
// TOML-based settings with environment variable overrides

pub mod env;
pub mod settings;

pub use env::apply_env_overrides;
pub use settings::{load_settings, RuntimeSettings, SettingsError};
