//! Gateway-wide error taxonomy.

use thiserror::Error;

/// Errors a provider adapter, the connection pool, the queue, or the
/// gateway front-end may raise. Workers use the variant to decide whether a
/// failure is worth retrying (see [`GatewayError::is_retryable`]).
#[derive(Debug, Error, Clone)]
pub enum GatewayError {
    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("unauthorized")]
    Unauthorized,

    #[error("rate limited{}", retry_after_ms.map(|ms| format!(", retry after {ms}ms")).unwrap_or_default())]
    RateLimited { retry_after_ms: Option<u64> },

    #[error("transient upstream failure: {0}")]
    Transient(String),

    #[error("permanent upstream failure: {0}")]
    Permanent(String),

    #[error("circuit breaker open for {0}")]
    BreakerOpen(String),

    #[error("resource exhausted: {0}")]
    ResourceExhausted(String),

    #[error("request cancelled")]
    Cancelled,

    #[error("request timed out")]
    Timeout,

    #[error("internal error: {0}")]
    Internal(String),
}

impl GatewayError {
    /// Whether a worker should retry this failure (bounded by `GatewaySettings::retry_attempts`).
    pub fn is_retryable(&self) -> bool {
        matches!(self, GatewayError::Transient(_) | GatewayError::RateLimited { .. })
    }

    /// Short machine-readable tag used in the HTTP error body and in metrics.
    pub fn class(&self) -> &'static str {
        match self {
            GatewayError::BadRequest(_) => "bad_request",
            GatewayError::Unauthorized => "unauthorized",
            GatewayError::RateLimited { .. } => "rate_limited",
            GatewayError::Transient(_) => "transient",
            GatewayError::Permanent(_) => "permanent",
            GatewayError::BreakerOpen(_) => "breaker_open",
            GatewayError::ResourceExhausted(_) => "resource_exhausted",
            GatewayError::Cancelled => "cancelled",
            GatewayError::Timeout => "timeout",
            GatewayError::Internal(_) => "internal",
        }
    }

    /// HTTP status code the front-end should map this error to.
    pub fn status_code(&self) -> u16 {
        match self {
            GatewayError::BadRequest(_) => 400,
            GatewayError::Unauthorized => 401,
            GatewayError::RateLimited { .. } => 429,
            GatewayError::Transient(_) => 502,
            GatewayError::Permanent(_) => 422,
            GatewayError::BreakerOpen(_) => 503,
            GatewayError::ResourceExhausted(_) => 503,
            GatewayError::Cancelled => 499,
            GatewayError::Timeout => 504,
            GatewayError::Internal(_) => 500,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_and_rate_limited_are_retryable() {
        assert!(GatewayError::Transient("boom".into()).is_retryable());
        assert!(GatewayError::RateLimited { retry_after_ms: Some(500) }.is_retryable());
    }

    #[test]
    fn permanent_and_auth_are_not_retryable() {
        assert!(!GatewayError::Permanent("bad model".into()).is_retryable());
        assert!(!GatewayError::Unauthorized.is_retryable());
        assert!(!GatewayError::BreakerOpen("primary".into()).is_retryable());
    }

    #[test]
    fn status_codes_match_class() {
        assert_eq!(GatewayError::BadRequest("x".into()).status_code(), 400);
        assert_eq!(GatewayError::BreakerOpen("primary".into()).status_code(), 503);
        assert_eq!(GatewayError::Timeout.status_code(), 504);
    }
}
