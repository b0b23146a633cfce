//! Error types for configuration operations.
//!
//! # Design
//!
//! - Constant messages; the offending field and value travel as context.
//! - Patch decoding keeps the serde error as the source.

use thiserror::Error;

/// Primary error type for configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Field contained an invalid value.
    #[error("invalid configuration field")]
    InvalidField {
        /// Field that failed validation.
        field: &'static str,
        /// Machine-readable reason for the failure.
        reason: &'static str,
        /// Offending value when available.
        value: Option<String>,
    },
    /// Configuration patch body could not be decoded.
    #[error("malformed configuration patch")]
    MalformedPatch {
        /// Underlying JSON error.
        source: serde_json::Error,
    },
}

impl ConfigError {
    pub(crate) fn invalid(field: &'static str, reason: &'static str, value: impl ToString) -> Self {
        Self::InvalidField {
            field,
            reason,
            value: Some(value.to_string()),
        }
    }

    /// Field name associated with the error, when one applies.
    #[must_use]
    pub const fn field(&self) -> Option<&'static str> {
        match self {
            Self::InvalidField { field, .. } => Some(field),
            Self::MalformedPatch { .. } => None,
        }
    }
}

/// Convenience alias for configuration results.
pub type ConfigResult<T> = Result<T, ConfigError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn invalid_field_carries_context() {
        let err = ConfigError::invalid("poll_interval_secs", "must_be_positive", 0);
        assert_eq!(err.to_string(), "invalid configuration field");
        assert_eq!(err.field(), Some("poll_interval_secs"));
        assert!(matches!(
            err,
            ConfigError::InvalidField { value: Some(ref v), .. } if v == "0"
        ));
    }

    #[test]
    fn malformed_patch_preserves_source() {
        let Err(source) = serde_json::from_str::<serde_json::Value>("{") else {
            panic!("expected invalid json");
        };
        let err = ConfigError::MalformedPatch { source };
        assert!(err.source().is_some());
        assert!(err.field().is_none());
    }
}
