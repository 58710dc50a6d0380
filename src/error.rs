//! Crate-level error types for remote calls and console construction.

/// Error produced by a remote API call.
///
/// Every store operation that talks to the backend surfaces one of these.
/// Stores never put the error object itself into observable state; they
/// store the string from [`ApiError::user_message`] and propagate the
/// typed value to the caller.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// The request never produced an HTTP response.
    ///
    /// Connection refused, DNS failure, TLS failure, or the client-side
    /// timeout ceiling. The response body was never seen.
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The backend answered with a non-success status.
    ///
    /// `message` is extracted from the response body (`message` field,
    /// then `title`, then the canonical status reason, then a generic
    /// fallback) and is safe to show to a user.
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// The response body did not match the declared payload shape.
    ///
    /// Distinct from [`ApiError::Transport`]: the server answered, but
    /// with JSON this client does not recognize.
    #[error("malformed response: {0}")]
    Schema(#[from] serde_json::Error),

    /// The owning store was closed while the request was in flight,
    /// or before it was issued. Never recorded in store state.
    #[error("operation cancelled: store is closed")]
    Cancelled,
}

impl ApiError {
    /// The human-readable string placed in a store's `error` field.
    pub fn user_message(&self) -> String {
        match self {
            ApiError::Transport(_) => {
                "No response from server. Please check your connection.".to_string()
            }
            ApiError::Api { message, .. } => message.clone(),
            ApiError::Schema(_) => {
                "Received an unexpected response from the server.".to_string()
            }
            ApiError::Cancelled => "Request was cancelled.".to_string(),
        }
    }

    /// True when this is an HTTP-level error with the given status code.
    pub fn is_status(&self, status: u16) -> bool {
        matches!(self, ApiError::Api { status: s, .. } if *s == status)
    }
}

/// Error produced while building a [`Console`](crate::Console) or its
/// HTTP client.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The configured base URL could not be parsed.
    #[error("invalid base URL {value:?}: {reason}")]
    InvalidBaseUrl { value: String, reason: String },

    /// The underlying HTTP client could not be constructed.
    #[error("failed to build HTTP client: {0}")]
    Http(#[source] reqwest::Error),

    /// The session storage directory could not be created or opened.
    #[error("session storage unavailable: {0}")]
    Storage(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_error_display_includes_status_and_message() {
        let err = ApiError::Api {
            status: 404,
            message: "Account not found".into(),
        };
        assert_eq!(err.to_string(), "API error (404): Account not found");
    }

    #[test]
    fn api_error_user_message_passes_through_api_message() {
        let err = ApiError::Api {
            status: 500,
            message: "Internal Server Error".into(),
        };
        assert_eq!(err.user_message(), "Internal Server Error");
    }

    #[test]
    fn schema_error_user_message_is_fixed_string() {
        let parse_err =
            serde_json::from_str::<serde_json::Value>("not json").expect_err("should not parse");
        let err = ApiError::Schema(parse_err);
        assert_eq!(
            err.user_message(),
            "Received an unexpected response from the server."
        );
    }

    #[test]
    fn is_status_matches_only_api_variant() {
        let api = ApiError::Api {
            status: 401,
            message: "Unauthorized".into(),
        };
        assert!(api.is_status(401));
        assert!(!api.is_status(403));
        assert!(!ApiError::Cancelled.is_status(401));
    }

    #[test]
    fn config_error_invalid_base_url_display() {
        let err = ConfigError::InvalidBaseUrl {
            value: "not a url".into(),
            reason: "relative URL without a base".into(),
        };
        assert!(err.to_string().contains("not a url"));
        assert!(err.to_string().contains("relative URL without a base"));
    }

    #[test]
    fn config_error_storage_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "access denied");
        let err = ConfigError::from(io_err);
        assert!(err.to_string().contains("access denied"));
    }

    // Verify `Send + Sync` bounds are satisfied so errors can cross thread
    // boundaries, which is required for use with `tokio` tasks.
    const _: () = {
        #[allow(dead_code)]
        fn assert_send_sync<T: Send + Sync>() {}

        #[allow(dead_code)]
        fn check() {
            assert_send_sync::<ApiError>();
            assert_send_sync::<ConfigError>();
        }
    };
}
