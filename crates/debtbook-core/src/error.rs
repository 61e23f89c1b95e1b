//! Error taxonomy surfaced to callers of the repository.
//!
//! Presentation code reacts only to these variants, never to raw transport
//! errors. Local validation failures never reach the transport.

use thiserror::Error;

/// A single per-field validation failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    pub field: &'static str,
    pub message: String,
}

impl FieldError {
    pub fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for FieldError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Why a write was refused without (or despite) talking to the backend.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConflictReason {
    #[error("contact still has {count} unresolved debts")]
    HasActiveDebts { count: usize },

    #[error("debt is already settled")]
    DebtSettled,
}

#[derive(Debug, Error)]
pub enum LedgerError {
    /// Local validation failed; the transport was never called.
    #[error("validation failed on {} field(s)", fields.len())]
    ValidationFailed { fields: Vec<FieldError> },

    #[error("record not found")]
    NotFound,

    #[error("{0}")]
    Conflict(ConflictReason),

    #[error("transport error: {message}")]
    Transport { message: String },

    #[error("{message}")]
    Unknown { message: String },
}

impl LedgerError {
    pub(crate) fn transport(message: impl Into<String>) -> Self {
        LedgerError::Transport {
            message: message.into(),
        }
    }

    pub(crate) fn unknown(message: impl Into<String>) -> Self {
        LedgerError::Unknown {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conflict_message_includes_count() {
        let err = LedgerError::Conflict(ConflictReason::HasActiveDebts { count: 3 });
        assert_eq!(err.to_string(), "contact still has 3 unresolved debts");
    }

    #[test]
    fn test_validation_message_counts_fields() {
        let err = LedgerError::ValidationFailed {
            fields: vec![
                FieldError::new("full_name", "too short"),
                FieldError::new("phone_number", "too few digits"),
            ],
        };
        assert_eq!(err.to_string(), "validation failed on 2 field(s)");
    }
}
