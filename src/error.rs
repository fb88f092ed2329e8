use thiserror::Error;

/// Outcome of an awaited wait operation
pub type WaitResult<T> = Result<T, WaitError>;

/// Failure reported through an awaited result instead of escaping a
/// resumption path
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WaitError {
    /// No qualifying event arrived within the configured timeout
    #[error("operation timed out")]
    TimedOut,

    /// The watched object was dropped before or while waiting
    #[error("watched object was dropped")]
    ObjectDropped,

    /// The device reached a state from which the awaited condition is
    /// unreachable
    #[error("connection closed")]
    ConnectionClosed,

    /// The remote side answered the call with an error
    #[error("remote call failed ({condition}): {message}")]
    Remote {
        /// Machine-readable error name reported by the remote peer
        condition: String,
        /// Human-readable detail
        message: String,
    },
}

impl WaitError {
    /// Shorthand for building a remote-failure value
    pub fn remote(condition: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Remote {
            condition: condition.into(),
            message: message.into(),
        }
    }
}

impl From<WaitError> for std::io::Error {
    fn from(error: WaitError) -> Self {
        let kind = match &error {
            WaitError::TimedOut => std::io::ErrorKind::TimedOut,
            WaitError::ObjectDropped => std::io::ErrorKind::NotConnected,
            WaitError::ConnectionClosed => std::io::ErrorKind::ConnectionReset,
            WaitError::Remote { .. } => std::io::ErrorKind::Other,
        };

        Self::new(kind, error)
    }
}
