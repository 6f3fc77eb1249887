//! Error types for the pod control plane.

/// Top-level error type for podwarden.
///
/// Variants split into two families: construction-time outcomes
/// ([`Config`](Self::Config), [`Unsupported`](Self::Unsupported)) that must
/// abort startup, and runtime faults that are logged and retried.
#[derive(Debug, thiserror::Error)]
pub enum PodError {
    /// Invalid configuration (window ordering, thresholds, unknown labels).
    #[error("config error: {0}")]
    Config(String),

    /// Configuration requests behavior the control plane does not support.
    #[error("unsupported configuration: {0}")]
    Unsupported(String),

    /// Persisted state could not be read or written.
    #[error("state error: {0}")]
    State(String),

    /// A scheduled task body failed.
    #[error("task error: {0}")]
    Task(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl PodError {
    /// Returns `true` for errors that must stop the pod before the loop starts.
    pub fn is_config(&self) -> bool {
        matches!(self, Self::Config(_) | Self::Unsupported(_))
    }
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, PodError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_config() {
        let err = PodError::Config("phase window start must precede end".into());
        assert_eq!(
            err.to_string(),
            "config error: phase window start must precede end"
        );
    }

    #[test]
    fn display_unsupported() {
        let err = PodError::Unsupported("midnight-crossing window".into());
        assert_eq!(
            err.to_string(),
            "unsupported configuration: midnight-crossing window"
        );
    }

    #[test]
    fn config_family_is_fatal() {
        assert!(PodError::Config("x".into()).is_config());
        assert!(PodError::Unsupported("x".into()).is_config());
        assert!(!PodError::State("x".into()).is_config());
        assert!(!PodError::Task("x".into()).is_config());
    }

    #[test]
    fn io_error_converts() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: PodError = io.into();
        assert!(matches!(err, PodError::Io(_)));
        assert!(!err.is_config());
    }
}
