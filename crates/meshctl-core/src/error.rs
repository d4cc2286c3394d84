//! Error types for meshctl-core.

use thiserror::Error;

use crate::flags::FlagKind;

/// Result type alias using meshctl-core Error
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types for meshctl operations
#[derive(Error, Debug)]
pub enum Error {
    // Flag errors
    #[error("flag --{name} declared by {owner} collides with the flag already defined by {existing_owner}")]
    FlagCollision {
        name: String,
        owner: String,
        existing_owner: String,
    },

    #[error("unknown flag: --{0}")]
    UnknownFlag(String),

    #[error("invalid value for --{name}: {message}")]
    InvalidFlagValue { name: String, message: String },

    #[error("flag --{name} is a {actual} flag, not {expected}")]
    FlagTypeMismatch {
        name: String,
        expected: FlagKind,
        actual: FlagKind,
    },

    // Registration errors
    #[error("connectivity test already registered: {0}")]
    DuplicateTest(String),

    #[error("sysdump task already registered: {0}")]
    DuplicateTask(String),

    #[error("invalid test filter {pattern:?}: {source}")]
    InvalidFilter {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    // Sysdump errors
    #[error("path escapes the sysdump directory: {0}")]
    PathEscapesDump(String),

    #[error("sysdump directory already exists: {}", .0.display())]
    DumpExists(std::path::PathBuf),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Create an invalid flag value error
    pub fn invalid_value(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidFlagValue {
            name: name.into(),
            message: message.into(),
        }
    }

    /// Check if this error is a flag collision
    pub fn is_collision(&self) -> bool {
        matches!(self, Self::FlagCollision { .. })
    }
}
