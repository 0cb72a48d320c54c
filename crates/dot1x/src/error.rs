//! Unified error type for dot1x.

use dot1x_session::SessionError;
use dot1x_types::{CorrelationId, SessionKey, TypesError};

/// Top-level error that wraps all crate-specific errors.
///
/// When using the `dot1x` facade you deal with this single error type
/// instead of importing errors from each sub-crate. `#[from]` generates
/// the `From` impls so `?` converts sub-crate errors automatically.
#[derive(Debug, thiserror::Error)]
pub enum Dot1xError {
    /// A value-level error (malformed MAC, out-of-range id).
    #[error(transparent)]
    Types(#[from] TypesError),

    /// A session-level error (duplicate key, missing sink, closed registry).
    #[error(transparent)]
    Session(#[from] SessionError),

    /// No session is registered under the key a packet arrived for.
    #[error("no session for {0}")]
    UnknownSession(SessionKey),

    /// A server reply carried an id no session is waiting on.
    #[error("no session waiting on correlation id {0}")]
    UnknownCorrelationId(CorrelationId),

    /// The service configuration could not be parsed.
    #[error("invalid configuration: {0}")]
    Config(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_types_error() {
        let err = TypesError::InvalidMac("zz".into());
        let dot1x_err: Dot1xError = err.into();
        assert!(matches!(dot1x_err, Dot1xError::Types(_)));
        assert!(dot1x_err.to_string().contains("zz"));
    }

    #[test]
    fn test_from_session_error() {
        let err = SessionError::SinkNotRegistered;
        let dot1x_err: Dot1xError = err.into();
        assert!(matches!(dot1x_err, Dot1xError::Session(_)));
        assert_eq!(dot1x_err.to_string(), "no event sink registered");
    }

    #[test]
    fn test_from_json_error() {
        let err = serde_json::from_str::<u32>("nope").unwrap_err();
        let dot1x_err: Dot1xError = err.into();
        assert!(matches!(dot1x_err, Dot1xError::Config(_)));
    }

    #[test]
    fn test_unknown_correlation_id_message() {
        let err = Dot1xError::UnknownCorrelationId(CorrelationId(17));
        assert_eq!(err.to_string(), "no session waiting on correlation id 17");
    }
}
