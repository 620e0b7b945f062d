//! Error kinds shared across the engine layers.

use crate::{Path, PathError, Status};

/// Engine errors.
///
/// Every expected failure is a variant here; escaping panics are reserved
/// for broken invariants. `to_status` defines how each kind crosses the
/// response path when a handler or the dispatch boundary reports it.
#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    /// Path resolution failed.
    #[error("not found: {path}")]
    NotFound { path: Path },

    /// A sibling with this name already exists. Carries the existing
    /// node's location so the caller learns the first create's path.
    #[error("conflict: {existing} already exists")]
    Conflict { existing: Path },

    /// Malformed input for the target handler.
    #[error("bad request: {message}")]
    BadRequest { message: String },

    /// Disallowed structural operation, e.g. removing the root.
    #[error("forbidden: {message}")]
    Forbidden { message: String },

    /// No response arrived within the configured deadline.
    #[error("timed out after {millis} ms")]
    Timeout { millis: u64 },

    /// Opaque lower-layer delivery failure.
    #[error("transport error: {message}")]
    Transport { message: String },

    /// Local contract violation (programmer error), e.g. `send()` on a
    /// client never opened. Never crosses the wire.
    #[error("invalid state: {message}")]
    InvalidState { message: String },

    /// Path validation error.
    #[error(transparent)]
    Path(#[from] PathError),
}

impl Error {
    pub fn transport(message: impl Into<String>) -> Self {
        Error::Transport {
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Error::BadRequest {
            message: message.into(),
        }
    }

    pub fn invalid_state(message: impl Into<String>) -> Self {
        Error::InvalidState {
            message: message.into(),
        }
    }

    /// The response status this error resolves to at the dispatch boundary.
    pub fn to_status(&self) -> Status {
        match self {
            Error::NotFound { .. } => Status::NotFound,
            Error::Conflict { .. } => Status::BadRequest,
            Error::BadRequest { .. } | Error::Path(_) => Status::BadRequest,
            Error::Forbidden { .. } => Status::Forbidden,
            Error::Timeout { .. } => Status::GatewayTimeout,
            Error::Transport { .. } => Status::InternalServerError,
            Error::InvalidState { .. } => Status::InternalServerError,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::path;

    #[test]
    fn conflict_carries_existing_location() {
        let err = Error::Conflict {
            existing: path!("apps/counter"),
        };
        assert!(err.to_string().contains("/apps/counter"));
        assert_eq!(err.to_status(), Status::BadRequest);
    }

    #[test]
    fn status_mapping() {
        let not_found = Error::NotFound {
            path: path!("missing"),
        };
        assert_eq!(not_found.to_status(), Status::NotFound);
        assert_eq!(
            Error::Forbidden {
                message: "remove root".into()
            }
            .to_status(),
            Status::Forbidden
        );
        assert_eq!(
            Error::Timeout { millis: 50 }.to_status(),
            Status::GatewayTimeout
        );
        assert_eq!(
            Error::transport("peer gone").to_status(),
            Status::InternalServerError
        );
    }

    #[test]
    fn path_errors_convert() {
        let err: Error = Path::parse("a/b c").unwrap_err().into();
        assert_eq!(err.to_status(), Status::BadRequest);
    }
}
