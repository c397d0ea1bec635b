//! Error types for chorm

use thiserror::Error;

/// Result type alias for chorm operations
pub type ChormResult<T> = Result<T, ChormError>;

/// Error types for repository and transport operations
#[derive(Debug, Error)]
pub enum ChormError {
    /// Malformed or empty input, non-scalar parameter, non-awaitable query
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Required configuration value missing from the environment
    #[error("Config not found: {0}")]
    ConfigNotFound(String),

    /// Entity type or table could not be resolved
    #[error("Entity not found: {0}")]
    EntityNotFound(String),

    /// Declared column absent from normalized data
    #[error(
        "Mapping error: unable to normalize entity `{entity}` because its property `{column}` is not passed in items"
    )]
    Mapping { entity: String, column: String },

    /// Entity to row conversion failed
    #[error("Normalization error: {0}")]
    Normalization(String),

    /// Row to entity conversion failed
    #[error("Denormalization error: {message}")]
    Denormalization {
        message: String,
        #[source]
        source: Option<serde_json::Error>,
    },

    /// Connectivity or protocol failure talking to the server
    #[error("Transport error: {message}")]
    Transport {
        message: String,
        #[source]
        source: Option<std::io::Error>,
    },

    /// A collaborator capability is missing
    #[error("Not implemented: {0}")]
    NotImplemented(String),

    /// Polling was cancelled by the caller
    #[error("Cancelled: {0}")]
    Cancelled(String),
}

impl ChormError {
    /// Create a bad request error
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest(message.into())
    }

    /// Create a config-not-found error for an environment key
    pub fn config_not_found(key: &str) -> Self {
        Self::ConfigNotFound(format!("{key} parameter has been omitted in configuration."))
    }

    /// Create a mapping error for a specific entity column
    pub fn mapping(entity: impl Into<String>, column: impl Into<String>) -> Self {
        Self::Mapping {
            entity: entity.into(),
            column: column.into(),
        }
    }

    /// Create a normalization error
    pub fn normalization(message: impl Into<String>) -> Self {
        Self::Normalization(message.into())
    }

    /// Wrap a serde error raised while building entities from rows
    pub fn denormalization(err: serde_json::Error) -> Self {
        Self::Denormalization {
            message: err.to_string(),
            source: Some(err),
        }
    }

    /// Create a transport error without an underlying cause
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            source: None,
        }
    }

    /// Wrap an I/O failure from the underlying connection
    pub fn transport_io(message: impl Into<String>, err: std::io::Error) -> Self {
        Self::Transport {
            message: format!("{}: {}", message.into(), err),
            source: Some(err),
        }
    }

    /// Check if this is a bad request error
    pub fn is_bad_request(&self) -> bool {
        matches!(self, Self::BadRequest(_))
    }

    /// Check if this is a config-not-found error
    pub fn is_config_not_found(&self) -> bool {
        matches!(self, Self::ConfigNotFound(_))
    }

    /// Check if this is a mapping error
    pub fn is_mapping(&self) -> bool {
        matches!(self, Self::Mapping { .. })
    }

    /// Check if this is a normalization error
    pub fn is_normalization(&self) -> bool {
        matches!(self, Self::Normalization(_))
    }

    /// Check if this is a denormalization error
    pub fn is_denormalization(&self) -> bool {
        matches!(self, Self::Denormalization { .. })
    }

    /// Check if this is a transport error
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport { .. })
    }

    /// Check if this is a cancellation
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled(_))
    }
}
