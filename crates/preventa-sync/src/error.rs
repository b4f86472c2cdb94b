//! # Sync Error Types
//!
//! Error types for sync operations and for the remote backend boundary.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Sync Error Categories                             │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────┐ │
//! │  │  Configuration  │  │   Connection    │  │     Encoding            │ │
//! │  │                 │  │                 │  │                         │ │
//! │  │  InvalidConfig  │  │ ConnectionFailed│  │  SerializationFailed    │ │
//! │  │  MissingDeviceId│  │  Disconnected   │  │  DeserializationFailed  │ │
//! │  │  InvalidUrl     │  │  Timeout, Tls,  │  │                         │ │
//! │  │  ConfigLoad/Save│  │  WebSocketError │  │                         │ │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────────────┘ │
//! │                                                                         │
//! │  DatabaseError (Local Store)      Remote(RemoteError) (see below)      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! [`RemoteError`] is what a [`crate::remote::RemoteBackend`] returns. The
//! engine treats `Conflict` on insert as "already accepted", so an upload
//! that died half way can simply be repeated.

use thiserror::Error;

/// Result type alias for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Result type alias for remote backend calls.
pub type RemoteResult<T> = Result<T, RemoteError>;

// =============================================================================
// Remote Errors
// =============================================================================

/// Failure reported by a remote backend call.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RemoteError {
    /// The backend could not be reached.
    #[error("Network error: {0}")]
    Network(String),

    /// No answer within the request timeout.
    #[error("Request timed out after {0} seconds")]
    Timeout(u64),

    /// The backend refused the record (validation, permissions, ...).
    #[error("Rejected by backend: {0}")]
    Rejected(String),

    /// A record with the same id already exists remotely.
    #[error("Duplicate record: {0}")]
    Conflict(String),

    /// The answer could not be understood.
    #[error("Protocol error: {0}")]
    Protocol(String),
}

impl RemoteError {
    /// Returns true for a duplicate-id answer.
    pub fn is_conflict(&self) -> bool {
        matches!(self, RemoteError::Conflict(_))
    }

    /// Returns true if the backend was unreachable rather than unwilling.
    pub fn is_transient(&self) -> bool {
        matches!(self, RemoteError::Network(_) | RemoteError::Timeout(_))
    }
}

// =============================================================================
// Sync Errors
// =============================================================================

/// Sync error type covering all possible sync failures.
#[derive(Debug, Error)]
pub enum SyncError {
    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// Invalid sync configuration.
    #[error("Invalid sync configuration: {0}")]
    InvalidConfig(String),

    /// Missing device ID (required for sync).
    #[error("Device ID not configured. Run initial setup first.")]
    MissingDeviceId,

    /// Invalid backend URL.
    #[error("Invalid remote URL: {0}")]
    InvalidUrl(String),

    /// Failed to load config file.
    #[error("Failed to load config: {0}")]
    ConfigLoadFailed(String),

    /// Failed to save config file.
    #[error("Failed to save config: {0}")]
    ConfigSaveFailed(String),

    // =========================================================================
    // Connection Errors
    // =========================================================================
    /// Failed to establish WebSocket connection.
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// WebSocket disconnected unexpectedly.
    #[error("Disconnected from remote backend")]
    Disconnected,

    /// Connection timeout.
    #[error("Connection timeout after {0} seconds")]
    Timeout(u64),

    /// TLS/SSL error.
    #[error("TLS error: {0}")]
    TlsError(String),

    /// WebSocket protocol error.
    #[error("WebSocket error: {0}")]
    WebSocketError(String),

    // =========================================================================
    // Encoding Errors
    // =========================================================================
    /// Failed to serialize a message or record.
    #[error("Serialization failed: {0}")]
    SerializationFailed(String),

    /// Failed to decode a message or a downloaded record.
    #[error("Deserialization failed: {0}")]
    DeserializationFailed(String),

    // =========================================================================
    // Database / Remote Errors
    // =========================================================================
    /// Local Store operation failed.
    #[error("Database error: {0}")]
    DatabaseError(String),

    /// Remote backend call failed.
    #[error(transparent)]
    Remote(#[from] RemoteError),
}

// =============================================================================
// Error Conversions
// =============================================================================

impl From<preventa_db::DbError> for SyncError {
    fn from(err: preventa_db::DbError) -> Self {
        SyncError::DatabaseError(err.to_string())
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        if err.is_data() || err.is_syntax() || err.is_eof() {
            SyncError::DeserializationFailed(err.to_string())
        } else {
            SyncError::SerializationFailed(err.to_string())
        }
    }
}

impl From<url::ParseError> for SyncError {
    fn from(err: url::ParseError) -> Self {
        SyncError::InvalidUrl(err.to_string())
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for SyncError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        use tokio_tungstenite::tungstenite::Error as WsError;
        match err {
            WsError::ConnectionClosed => SyncError::Disconnected,
            WsError::AlreadyClosed => SyncError::Disconnected,
            WsError::Protocol(p) => SyncError::WebSocketError(p.to_string()),
            WsError::Io(io) => SyncError::ConnectionFailed(io.to_string()),
            WsError::Tls(tls) => SyncError::TlsError(tls.to_string()),
            other => SyncError::WebSocketError(other.to_string()),
        }
    }
}

impl From<std::io::Error> for SyncError {
    fn from(err: std::io::Error) -> Self {
        SyncError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::de::Error> for SyncError {
    fn from(err: toml::de::Error) -> Self {
        SyncError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::ser::Error> for SyncError {
    fn from(err: toml::ser::Error) -> Self {
        SyncError::ConfigSaveFailed(err.to_string())
    }
}

// =============================================================================
// Error Categorization (for retry logic)
// =============================================================================

impl SyncError {
    /// Returns true if this error is recoverable and the operation can be retried.
    ///
    /// ## Retryable Errors
    /// - Connection failures (network issues)
    /// - Timeouts
    /// - Temporary disconnections
    ///
    /// ## Non-Retryable Errors
    /// - Configuration errors
    /// - Records the backend rejected
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::ConnectionFailed(_)
            | SyncError::Disconnected
            | SyncError::Timeout(_)
            | SyncError::WebSocketError(_) => true,
            SyncError::Remote(remote) => remote.is_transient(),
            _ => false,
        }
    }

    /// Returns true if this error indicates a configuration problem.
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            SyncError::InvalidConfig(_)
                | SyncError::MissingDeviceId
                | SyncError::InvalidUrl(_)
                | SyncError::ConfigLoadFailed(_)
                | SyncError::ConfigSaveFailed(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_errors() {
        assert!(SyncError::ConnectionFailed("network error".into()).is_retryable());
        assert!(SyncError::Disconnected.is_retryable());
        assert!(SyncError::Timeout(30).is_retryable());
        assert!(SyncError::Remote(RemoteError::Timeout(5)).is_retryable());

        assert!(!SyncError::InvalidConfig("bad config".into()).is_retryable());
        assert!(!SyncError::MissingDeviceId.is_retryable());
        assert!(!SyncError::Remote(RemoteError::Rejected("bad total".into())).is_retryable());
    }

    #[test]
    fn test_socket_errors_are_connection_errors() {
        use tokio_tungstenite::tungstenite::Error as WsError;

        let closed = SyncError::from(WsError::ConnectionClosed);
        assert!(matches!(closed, SyncError::Disconnected));
        assert!(closed.is_retryable());

        let io = SyncError::from(WsError::Io(std::io::Error::from(std::io::ErrorKind::ConnectionRefused)));
        assert!(matches!(io, SyncError::ConnectionFailed(_)));
        assert!(!io.is_config_error());
    }

    #[test]
    fn test_remote_error_kinds() {
        assert!(RemoteError::Conflict("orders/o-1".into()).is_conflict());
        assert!(!RemoteError::Rejected("orders/o-1".into()).is_conflict());
        assert!(RemoteError::Network("refused".into()).is_transient());
        assert!(!RemoteError::Protocol("garbage".into()).is_transient());
    }

    #[test]
    fn test_json_decode_errors_are_deserialization() {
        let err = serde_json::from_str::<u32>("\"nope\"").unwrap_err();
        assert!(matches!(SyncError::from(err), SyncError::DeserializationFailed(_)));
    }

    #[test]
    fn test_remote_error_display_is_transparent() {
        let err = SyncError::from(RemoteError::Rejected("orders/o-1: total mismatch".into()));
        assert_eq!(err.to_string(), "Rejected by backend: orders/o-1: total mismatch");
    }
}
