//! Error types and handling for the torus library

use thiserror::Error;

/// Result type alias for torus operations
pub type Result<T> = std::result::Result<T, TorusError>;

/// Boxed error produced by user event handlers.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Main error type for the torus library
#[derive(Error, Debug)]
pub enum TorusError {
    /// The ring does not have enough free slots for the requested claim
    #[error("Insufficient capacity in ring buffer")]
    InsufficientCapacity,

    /// Cooperative cancellation was signalled through the barrier
    #[error("Barrier alerted")]
    Alert,

    /// A timeout wait strategy reached its deadline
    #[error("Operation timed out")]
    Timeout,

    /// Invalid configuration parameter
    #[error("Invalid configuration: {message}")]
    InvalidConfig {
        /// Error message describing the configuration issue
        message: String,
    },

    /// The event processor was started while already running
    #[error("Event processor is already running")]
    AlreadyRunning,

    /// Error returned by a user event handler
    #[error("Handler error: {0}")]
    Handler(HandlerError),
}

impl TorusError {
    /// Create a new configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }

    /// Wrap a user handler error
    pub fn handler(err: impl Into<HandlerError>) -> Self {
        Self::Handler(err.into())
    }

    /// Check if this error is recoverable by retrying
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::InsufficientCapacity | Self::Timeout)
    }

    /// Check if this error is the cooperative cancellation sentinel
    pub fn is_alert(&self) -> bool {
        matches!(self, Self::Alert)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = TorusError::config("test message");
        assert!(matches!(err, TorusError::InvalidConfig { .. }));
        assert!(!err.is_recoverable());
    }

    #[test]
    fn test_error_classification() {
        assert!(TorusError::InsufficientCapacity.is_recoverable());
        assert!(TorusError::Timeout.is_recoverable());
        assert!(!TorusError::Alert.is_recoverable());
        assert!(TorusError::Alert.is_alert());
        assert!(!TorusError::AlreadyRunning.is_alert());
    }

    #[test]
    fn test_handler_error_wrapping() {
        let err = TorusError::handler("slot rejected");
        assert!(matches!(err, TorusError::Handler(_)));
        assert!(err.to_string().contains("slot rejected"));
    }
}
