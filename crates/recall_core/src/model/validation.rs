//! Validation errors raised before any state mutation.

use std::error::Error;
use std::fmt::{Display, Formatter};

/// Input rejected before it could touch persisted state.
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationError {
    /// Rating value outside `1..=4`.
    InvalidRating(u8),
    /// Requested retention outside the open interval `(0.5, 0.995)`.
    RetentionOutOfRange(f64),
    /// Header level outside `1..=6`.
    HeaderLevelOutOfRange(u8),
    /// Profile name not present in the settings.
    UnknownProfile(String),
    /// Profile or settings field with an unusable value.
    InvalidSetting { field: &'static str, message: String },
}

impl Display for ValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidRating(value) => {
                write!(f, "invalid rating `{value}`; expected 1 (again) to 4 (easy)")
            }
            Self::RetentionOutOfRange(value) => write!(
                f,
                "requested retention {value} must be greater than 0.5 and less than 0.995"
            ),
            Self::HeaderLevelOutOfRange(value) => {
                write!(f, "header level {value} must be between 1 and 6")
            }
            Self::UnknownProfile(name) => write!(f, "unknown deck profile `{name}`"),
            Self::InvalidSetting { field, message } => write!(f, "invalid `{field}`: {message}"),
        }
    }
}

impl Error for ValidationError {}

/// Checks a requested-retention target.
pub fn validate_retention(value: f64) -> Result<f64, ValidationError> {
    if value.is_finite() && value > 0.5 && value < 0.995 {
        Ok(value)
    } else {
        Err(ValidationError::RetentionOutOfRange(value))
    }
}

/// Checks a markdown header level.
pub fn validate_header_level(value: u8) -> Result<u8, ValidationError> {
    if (1..=6).contains(&value) {
        Ok(value)
    } else {
        Err(ValidationError::HeaderLevelOutOfRange(value))
    }
}
