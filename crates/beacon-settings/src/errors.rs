//! Settings error types.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur when loading or validating settings.
#[derive(Debug, Error)]
pub enum SettingsError {
    /// An explicitly requested settings file does not exist.
    #[error("settings file not found: {}", .0.display())]
    MissingFile(PathBuf),
    /// A source could not be read or a value had the wrong type.
    #[error("failed to extract settings: {0}")]
    Extract(#[from] Box<figment::Error>),
    /// A settings value was invalid (e.g., out of range).
    #[error("invalid settings value: {0}")]
    InvalidValue(String),
}

impl From<figment::Error> for SettingsError {
    fn from(err: figment::Error) -> Self {
        Self::Extract(Box::new(err))
    }
}

/// Result type for settings operations.
pub type Result<T> = std::result::Result<T, SettingsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_display() {
        let err = SettingsError::MissingFile(PathBuf::from("/nope/beacon.json"));
        assert_eq!(err.to_string(), "settings file not found: /nope/beacon.json");
    }

    #[test]
    fn invalid_value_display() {
        let err = SettingsError::InvalidValue("port out of range".to_string());
        assert_eq!(err.to_string(), "invalid settings value: port out of range");
    }

    #[test]
    fn figment_error_from_conversion() {
        let err: SettingsError = figment::Error::from("boom".to_string()).into();
        assert!(matches!(err, SettingsError::Extract(_)));
        assert!(err.to_string().contains("boom"));
    }
}
