//! Classification of failures reported by the remote work-item service.

/// A failed remote call, classified by what the caller should do next.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RemoteError {
    /// Request timed out
    #[error("request timed out: {0}")]
    Timeout(String),

    /// Connection reset or refused
    #[error("connection failed: {0}")]
    Connection(String),

    /// Host name did not resolve
    #[error("DNS lookup failed: {0}")]
    Dns(String),

    /// Non-success HTTP status not covered by a more specific kind
    #[error("HTTP {status}: {message}")]
    Http {
        /// Status code
        status: u16,
        /// Response message
        message: String,
    },

    /// Credentials missing, expired or lacking permission
    #[error("not authorized: {0}")]
    Unauthorized(String),

    /// The service rejected the request as invalid
    #[error("rejected by service: {0}")]
    Validation(String),

    /// Anything else
    #[error("{0}")]
    Other(String),
}

impl RemoteError {
    /// Whether repeating the call might succeed.
    ///
    /// Timeouts, connection and DNS failures and HTTP 429/502/503/504 are
    /// transient. Authorization and validation failures need the user to
    /// act and are never retried; neither is anything unclassified.
    pub fn is_retryable(&self) -> bool {
        match self {
            RemoteError::Timeout(_) | RemoteError::Connection(_) | RemoteError::Dns(_) => true,
            RemoteError::Http { status, .. } => matches!(status, 429 | 502 | 503 | 504),
            RemoteError::Unauthorized(_) | RemoteError::Validation(_) | RemoteError::Other(_) => {
                false
            }
        }
    }

    /// Build from an HTTP status and message.
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        match status {
            401 | 403 => RemoteError::Unauthorized(message),
            400 | 422 => RemoteError::Validation(message),
            408 => RemoteError::Timeout(message),
            _ => RemoteError::Http { status, message },
        }
    }

    /// Classify a free-form error message.
    ///
    /// Collaborators that only surface text (error strings from an HTTP
    /// client or a CLI) are mapped onto kinds by well-known markers.
    pub fn classify(message: impl Into<String>) -> Self {
        let message = message.into();
        let lower = message.to_lowercase();

        if ["etimedout", "timed out", "timeout"].iter().any(|m| lower.contains(m)) {
            return RemoteError::Timeout(message);
        }
        if ["econnreset", "econnrefused", "connection reset", "connection refused", "socket hang up"]
            .iter()
            .any(|m| lower.contains(m))
        {
            return RemoteError::Connection(message);
        }
        if ["enotfound", "eai_again", "dns"].iter().any(|m| lower.contains(m)) {
            return RemoteError::Dns(message);
        }
        if let Some(status) = find_status_code(&lower) {
            return RemoteError::from_status(status, message);
        }
        if ["unauthorized", "forbidden", "authentication", "permission denied"]
            .iter()
            .any(|m| lower.contains(m))
        {
            return RemoteError::Unauthorized(message);
        }
        if ["validation", "invalid"].iter().any(|m| lower.contains(m)) {
            return RemoteError::Validation(message);
        }
        RemoteError::Other(message)
    }
}

/// First standalone three-digit 4xx/5xx number in `text`.
fn find_status_code(text: &str) -> Option<u16> {
    text.split(|c: char| !c.is_ascii_digit())
        .filter(|token| token.len() == 3)
        .filter_map(|token| token.parse::<u16>().ok())
        .find(|code| (400..600).contains(code))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_kinds_are_retryable() {
        assert!(RemoteError::Timeout("t".into()).is_retryable());
        assert!(RemoteError::Connection("c".into()).is_retryable());
        assert!(RemoteError::Dns("d".into()).is_retryable());
        for status in [429, 502, 503, 504] {
            assert!(RemoteError::from_status(status, "x").is_retryable(), "{}", status);
        }
    }

    #[test]
    fn test_user_action_kinds_are_not_retryable() {
        assert!(!RemoteError::from_status(401, "x").is_retryable());
        assert!(!RemoteError::from_status(403, "x").is_retryable());
        assert!(!RemoteError::from_status(400, "x").is_retryable());
        assert!(!RemoteError::from_status(404, "x").is_retryable());
        assert!(!RemoteError::from_status(500, "x").is_retryable());
        assert!(!RemoteError::Other("x".into()).is_retryable());
    }

    #[test]
    fn test_classify_messages() {
        assert!(matches!(RemoteError::classify("connect ETIMEDOUT 10.0.0.1:443"), RemoteError::Timeout(_)));
        assert!(matches!(RemoteError::classify("read ECONNRESET"), RemoteError::Connection(_)));
        assert!(matches!(RemoteError::classify("getaddrinfo ENOTFOUND dev.azure.com"), RemoteError::Dns(_)));
        assert!(matches!(
            RemoteError::classify("Request failed with status 503"),
            RemoteError::Http { status: 503, .. }
        ));
        assert!(matches!(RemoteError::classify("HTTP 401"), RemoteError::Unauthorized(_)));
        assert!(matches!(RemoteError::classify("Authentication required"), RemoteError::Unauthorized(_)));
        assert!(matches!(RemoteError::classify("Invalid field value"), RemoteError::Validation(_)));
        assert!(matches!(RemoteError::classify("something odd"), RemoteError::Other(_)));
    }

    #[test]
    fn test_classify_keeps_message_verbatim() {
        let err = RemoteError::classify("read ECONNRESET");
        assert_eq!(err.to_string(), "connection failed: read ECONNRESET");
    }

    #[test]
    fn test_status_code_needs_standalone_number() {
        assert_eq!(find_status_code("work item 12345 failed"), None);
        assert_eq!(find_status_code("status=429 retry"), Some(429));
    }
}
