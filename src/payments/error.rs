use std::fmt;
use thiserror::Error;

pub type GatewayResult<T> = Result<T, GatewayError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    Timeout,
    Connect,
    Body,
    Request,
}

/// Where a gateway failure came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatewayErrorCode {
    Transport(TransportKind),
    Http(u16),
    EmptyBody,
    Decode,
}

impl fmt::Display for GatewayErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GatewayErrorCode::Http(status) => write!(f, "{}", status),
            GatewayErrorCode::Transport(TransportKind::Timeout) => f.write_str("transport_timeout"),
            GatewayErrorCode::Transport(TransportKind::Connect) => f.write_str("transport_connect"),
            GatewayErrorCode::Transport(TransportKind::Body) => f.write_str("transport_body"),
            GatewayErrorCode::Transport(TransportKind::Request) => f.write_str("transport_request"),
            GatewayErrorCode::EmptyBody => f.write_str("empty_body"),
            GatewayErrorCode::Decode => f.write_str("decode"),
        }
    }
}

/// Normalized failure of a call to the Daraja gateway.
///
/// `provider_code` carries the gateway's own error code (for example
/// `404.001.03`) when the error body exposed one.
#[derive(Debug, Clone, Error)]
#[error("{message} (code {code})")]
pub struct GatewayError {
    pub message: String,
    pub code: GatewayErrorCode,
    pub provider_code: Option<String>,
}

impl GatewayError {
    pub fn transport(err: &reqwest::Error) -> Self {
        let kind = if err.is_timeout() {
            TransportKind::Timeout
        } else if err.is_connect() {
            TransportKind::Connect
        } else if err.is_body() || err.is_decode() {
            TransportKind::Body
        } else {
            TransportKind::Request
        };

        Self {
            message: format!("transport error: {}", err),
            code: GatewayErrorCode::Transport(kind),
            provider_code: None,
        }
    }

    pub fn http(status: u16, message: impl Into<String>, provider_code: Option<String>) -> Self {
        Self {
            message: message.into(),
            code: GatewayErrorCode::Http(status),
            provider_code,
        }
    }

    pub fn empty_body(endpoint: &str) -> Self {
        Self {
            message: format!("empty response body from {}", endpoint),
            code: GatewayErrorCode::EmptyBody,
            provider_code: None,
        }
    }

    pub fn decode(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code: GatewayErrorCode::Decode,
            provider_code: None,
        }
    }

    /// Response code recorded on a ledger entry when the call failed.
    pub fn response_code(&self) -> String {
        self.provider_code
            .clone()
            .unwrap_or_else(|| self.code.to_string())
    }

    pub fn is_retryable(&self) -> bool {
        match self.code {
            GatewayErrorCode::Transport(TransportKind::Timeout)
            | GatewayErrorCode::Transport(TransportKind::Connect) => true,
            GatewayErrorCode::Transport(_) => false,
            GatewayErrorCode::Http(status) => status == 429 || status >= 500,
            GatewayErrorCode::EmptyBody => true,
            GatewayErrorCode::Decode => false,
        }
    }
}

#[derive(Debug, Clone, Error)]
pub enum CredentialError {
    #[error("Security credential unavailable: {0}")]
    Unavailable(String),

    #[error("Failed to encrypt initiator password: {0}")]
    Encryption(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_code_prefers_provider_code() {
        let err = GatewayError::http(400, "Invalid Access Token", Some("404.001.03".to_string()));
        assert_eq!(err.response_code(), "404.001.03");

        let err = GatewayError::http(503, "Service Unavailable", None);
        assert_eq!(err.response_code(), "503");

        assert_eq!(GatewayError::empty_body("oauth").response_code(), "empty_body");
    }

    #[test]
    fn test_retryable_flags_are_set() {
        assert!(GatewayError::http(500, "busy", None).is_retryable());
        assert!(GatewayError::http(429, "slow down", None).is_retryable());
        assert!(!GatewayError::http(400, "bad request", None).is_retryable());
        assert!(!GatewayError::decode("garbage").is_retryable());
    }

    #[test]
    fn test_display_includes_code() {
        let err = GatewayError::http(500, "busy", None);
        assert_eq!(err.to_string(), "busy (code 500)");
    }
}
