//! Remote session error types.

use std::io::ErrorKind;

/// Errors produced by a [`RemoteSession`](crate::RemoteSession).
#[derive(Debug, thiserror::Error)]
pub enum RemoteError {
    #[error("{path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid remote path: {0}")]
    InvalidPath(String),

    #[error("connection failed: {0}")]
    Connect(String),

    #[error("session closed")]
    SessionClosed,

    #[error("protocol error: {0}")]
    Protocol(String),
}

impl RemoteError {
    /// Wraps an I/O error with the remote path it concerns.
    pub fn io(path: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Returns the I/O error kind, if this is an I/O error.
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            Self::Io { source, .. } => Some(source.kind()),
            _ => None,
        }
    }

    /// True when the path does not exist on the remote side.
    pub fn is_not_found(&self) -> bool {
        self.kind() == Some(ErrorKind::NotFound)
    }

    /// True when repeating the same operation may succeed.
    ///
    /// Missing paths, permission problems, bad input and a dead session
    /// will fail identically on every attempt.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Io { source, .. } => !matches!(
                source.kind(),
                ErrorKind::NotFound
                    | ErrorKind::PermissionDenied
                    | ErrorKind::AlreadyExists
                    | ErrorKind::InvalidInput
                    | ErrorKind::Unsupported
                    | ErrorKind::NotADirectory
                    | ErrorKind::IsADirectory
            ),
            Self::InvalidPath(_) | Self::Connect(_) | Self::SessionClosed => false,
            Self::Protocol(_) => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn permanent_io_kinds_are_fatal() {
        for kind in [
            ErrorKind::NotFound,
            ErrorKind::PermissionDenied,
            ErrorKind::AlreadyExists,
            ErrorKind::InvalidInput,
            ErrorKind::NotADirectory,
        ] {
            let err = RemoteError::io("/x", std::io::Error::from(kind));
            assert!(!err.is_retryable(), "{kind:?} should be fatal");
        }
    }

    #[test]
    fn transient_io_kinds_are_retryable() {
        for kind in [
            ErrorKind::ConnectionReset,
            ErrorKind::TimedOut,
            ErrorKind::BrokenPipe,
            ErrorKind::Interrupted,
            ErrorKind::Other,
        ] {
            let err = RemoteError::io("/x", std::io::Error::from(kind));
            assert!(err.is_retryable(), "{kind:?} should be retryable");
        }
    }

    #[test]
    fn session_closed_is_fatal() {
        assert!(!RemoteError::SessionClosed.is_retryable());
        assert!(RemoteError::Protocol("bad packet".into()).is_retryable());
    }

    #[test]
    fn not_found_detection() {
        let err = RemoteError::io("/missing", std::io::Error::from(ErrorKind::NotFound));
        assert!(err.is_not_found());
        assert!(!RemoteError::SessionClosed.is_not_found());
        assert_eq!(err.to_string(), "/missing: entity not found");
    }
}
