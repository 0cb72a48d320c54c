//! Error types for the value layer.

/// Errors that can occur when building dot1x value types from raw input.
///
/// `#[derive(thiserror::Error)]` generates the `std::error::Error` impl;
/// each `#[error("...")]` is the human-readable message that ends up in
/// logs.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TypesError {
    /// The string is not a colon- or dash-separated 6-byte MAC address.
    #[error("invalid MAC address: {0}")]
    InvalidMac(String),

    /// The value falls outside the range reserved for session exchanges.
    ///
    /// Identifiers 0 and 1 (and 255) never belong to a session.
    #[error("correlation id {0} is outside the session range 2..=254")]
    CorrelationIdOutOfRange(u8),
}
