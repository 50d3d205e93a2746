//! Error types shared by the engine and the file-backed harness.

use thiserror::Error;

use crate::month::YearMonth;

/// Main error type for roll-up and projection operations.
#[derive(Debug, Error)]
pub enum EacError {
    /// A plan line referenced a catalog key that is not in the rate snapshot.
    #[error("no {category} rate for reference '{key}'")]
    Lookup { category: String, key: String },

    /// The revenue method name is not one the engine recognizes.
    #[error("unrecognized revenue method '{method}'")]
    Policy { method: String },

    /// An input value failed validation.
    #[error("invalid {field}{}: {reason}", month_suffix(.month))]
    Validation {
        field: String,
        reason: String,
        month: Option<YearMonth>,
    },

    /// Configuration file errors
    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl EacError {
    pub fn lookup(category: impl Into<String>, key: impl Into<String>) -> Self {
        Self::Lookup {
            category: category.into(),
            key: key.into(),
        }
    }

    pub fn policy(method: impl Into<String>) -> Self {
        Self::Policy {
            method: method.into(),
        }
    }

    /// Create a validation error for a field, without month context
    pub fn validation(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            reason: reason.into(),
            month: None,
        }
    }

    /// A computed amount no longer fits a `Decimal`.
    pub fn out_of_range(field: impl Into<String>) -> Self {
        Self::validation(field, "result out of range")
    }

    /// Attach the month a validation failure belongs to.
    pub fn in_month(self, at: YearMonth) -> Self {
        match self {
            Self::Validation { field, reason, .. } => Self::Validation {
                field,
                reason,
                month: Some(at),
            },
            other => other,
        }
    }

    pub fn is_lookup(&self) -> bool {
        matches!(self, Self::Lookup { .. })
    }
}

fn month_suffix(month: &Option<YearMonth>) -> String {
    match month {
        Some(m) => format!(" for {m}"),
        None => String::new(),
    }
}

/// Result type alias using the crate error type
pub type Result<T> = std::result::Result<T, EacError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_message_names_field_and_month() {
        let err = EacError::validation("quantity", "must not be negative")
            .in_month(YearMonth::new(2025, 3).unwrap());
        assert_eq!(
            err.to_string(),
            "invalid quantity for 2025-03: must not be negative"
        );
    }

    #[test]
    fn lookup_message_names_category_and_key() {
        let err = EacError::lookup("materials", "SKU-9");
        assert_eq!(err.to_string(), "no materials rate for reference 'SKU-9'");
        assert!(err.is_lookup());
    }
}
