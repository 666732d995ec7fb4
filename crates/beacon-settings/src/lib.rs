//! # beacon-settings
//!
//! Layered configuration for the beacon gateway.
//!
//! Settings are loaded from four layers (in priority order, lowest first):
//! 1. **Compiled defaults**: [`Settings::default()`]
//! 2. **JSON file**: passed with `--config` or `BEACON_CONFIG`
//! 3. **Environment variables**: `BEACON_SECTION__KEY`
//! 4. **Command-line flags**: [`SettingsOverrides`]

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{load_settings, load_settings_with, validate, SettingsOverrides, ENV_PREFIX};
pub use types::{LogFormat, LoggingSettings, ServerSettings, Settings};
