//! Unified error type for application-level failures.

use thiserror::Error;

/// Application-level error shared by the configuration layer and the
/// worker binary.
///
/// Job and render failures have their own richer enums in `mosaic-jobs`
/// and `mosaic-render`; they are folded into this type only at the
/// process boundary.
#[derive(Error, Debug)]
pub enum MosaicError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl MosaicError {
    /// Creates a configuration error.
    #[must_use]
    pub fn configuration<T: Into<String>>(message: T) -> Self {
        Self::Configuration(message.into())
    }

    /// Creates an internal error.
    #[must_use]
    pub fn internal<T: Into<String>>(message: T) -> Self {
        Self::Internal(message.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configuration_display() {
        let err = MosaicError::configuration("queue.capacity must be greater than zero");
        assert_eq!(
            err.to_string(),
            "Configuration error: queue.capacity must be greater than zero"
        );
    }

    #[test]
    fn test_internal_display() {
        let err = MosaicError::internal("subscriber already set");
        assert!(matches!(err, MosaicError::Internal(_)));
        assert_eq!(err.to_string(), "Internal error: subscriber already set");
    }
}
