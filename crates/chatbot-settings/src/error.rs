//! Error types for the settings system

use thiserror::Error;

/// Errors that can occur when working with settings
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SettingsError {
    /// Setting not found
    #[error("setting not found: {0}")]
    NotFound(String),

    /// Type mismatch when reading a value
    #[error("type mismatch for '{name}': expected {expected}, got {actual}")]
    TypeMismatch {
        name: String,
        expected: &'static str,
        actual: &'static str,
    },

    /// Invalid value for the setting
    #[error("invalid value for setting '{name}': {reason}")]
    InvalidValue { name: String, reason: String },

    /// Payload could not be decoded
    #[error("deserialization error: {0}")]
    Deserialization(String),
}

impl SettingsError {
    /// Create an invalid value error
    pub fn invalid(name: impl Into<String>, reason: impl Into<String>) -> Self {
        SettingsError::InvalidValue {
            name: name.into(),
            reason: reason.into(),
        }
    }
}

impl From<serde_json::Error> for SettingsError {
    fn from(err: serde_json::Error) -> Self {
        SettingsError::Deserialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = SettingsError::NotFound("points_cmd".to_string());
        assert_eq!(err.to_string(), "setting not found: points_cmd");

        let err = SettingsError::invalid("drain_cap", "must be at least 1");
        assert_eq!(
            err.to_string(),
            "invalid value for setting 'drain_cap': must be at least 1"
        );
    }
}
