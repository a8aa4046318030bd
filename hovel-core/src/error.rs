//! Error types for the hovel core library.

use thiserror::Error;

/// Top-level error type for all hovel operations.
#[derive(Error, Debug)]
pub enum HovelError {
    /// The operation referenced an owner or id with no entity behind it.
    #[error("{kind} not found: {key}")]
    NotFound {
        /// Entity kind ("house", "npc", ...).
        kind: &'static str,
        /// The key that was looked up.
        key: String,
    },

    /// Malformed or out-of-range request.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// An entity with the same unique key already exists.
    #[error("{kind} already exists: {key}")]
    AlreadyExists {
        /// Entity kind.
        kind: &'static str,
        /// The conflicting key.
        key: String,
    },

    /// The action is on cooldown.
    #[error("On cooldown, try again in {remaining_secs}s")]
    Cooldown {
        /// Seconds until the action is available again.
        remaining_secs: u64,
    },

    /// Not enough spare parts for an upgrade.
    #[error("Not enough parts: need {needed}, have {available}")]
    InsufficientParts {
        /// Parts required.
        needed: i64,
        /// Parts on hand.
        available: i64,
    },

    /// The entity exists but is switched off.
    #[error("Inactive: {0}")]
    Inactive(String),

    /// Persistence operation failed.
    #[error("Store error: {0}")]
    Store(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Generic I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl HovelError {
    /// Shorthand for [`HovelError::NotFound`].
    pub fn not_found(kind: &'static str, key: impl ToString) -> Self {
        Self::NotFound {
            kind,
            key: key.to_string(),
        }
    }

    /// Whether this error should be shown to the user verbatim.
    ///
    /// Store, config and I/O failures are internal and get logged instead.
    #[must_use]
    pub fn is_user_facing(&self) -> bool {
        !matches!(self, Self::Store(_) | Self::Config(_) | Self::Io(_))
    }
}

impl From<rusqlite::Error> for HovelError {
    fn from(err: rusqlite::Error) -> Self {
        Self::Store(err.to_string())
    }
}

impl From<tokio::task::JoinError> for HovelError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::Store(format!("store task aborted: {err}"))
    }
}

/// Convenience Result type alias.
pub type Result<T> = std::result::Result<T, HovelError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_errors_are_internal() {
        assert!(!HovelError::Store("disk full".into()).is_user_facing());
        assert!(HovelError::not_found("house", "u1").is_user_facing());
        assert!(HovelError::Cooldown { remaining_secs: 30 }.is_user_facing());
    }

    #[test]
    fn not_found_message_names_the_key() {
        let err = HovelError::not_found("npc", 42);
        assert_eq!(err.to_string(), "npc not found: 42");
    }
}
