use thiserror::Error;

/// The pipeline stage an error originated from.
///
/// Every hop failure aborts the whole token pipeline; the hop tag is what
/// lets the warehouse client report *which* exchange failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Hop {
    /// STS AssumeRole against AWS.
    AssumeRole,
    /// SigV4 signing of the GetCallerIdentity request.
    Signing,
    /// Federated token exchange against the Google STS endpoint.
    TokenExchange,
    /// Service account impersonation via the IAM credentials endpoint.
    Impersonation,
}

impl std::fmt::Display for Hop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Hop::AssumeRole => "assume-role",
            Hop::Signing => "signing",
            Hop::TokenExchange => "token exchange",
            Hop::Impersonation => "impersonation",
        };
        f.write_str(name)
    }
}

/// Errors raised while producing a federated access token.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Missing or malformed configuration (bad role ARN, bad impersonation URL).
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Transport-level failure talking to an external endpoint.
    #[error("{hop} request failed: {source}")]
    Network {
        hop: Hop,
        #[source]
        source: reqwest::Error,
    },

    /// An external endpoint answered with a non-success status.
    ///
    /// The body is carried verbatim so server-side denial reasons survive
    /// into the caller's logs.
    #[error("{hop} returned HTTP {status}: {body}")]
    ExternalService { hop: Hop, status: u16, body: String },

    /// SigV4 computation error. Should not occur for well-formed inputs.
    #[error("signing error: {0}")]
    Signing(String),

    /// STS AssumeRole failed; wraps the SDK error rendered with full context.
    #[error("assume-role error: {0}")]
    AssumeRole(String),

    /// Response body did not deserialize into the expected shape.
    #[error("deserialization error: {0}")]
    Deserialize(#[from] serde_json::Error),
}

impl AuthError {
    pub(crate) fn network(hop: Hop, source: reqwest::Error) -> Self {
        AuthError::Network { hop, source }
    }

    /// Returns `true` if the error is potentially recoverable by retrying.
    ///
    /// This subsystem never retries internally; the classification is for the
    /// consuming warehouse client's retry policy.
    pub fn is_retryable(&self) -> bool {
        match self {
            AuthError::Network { source, .. } => source.is_timeout() || source.is_connect(),
            AuthError::ExternalService { status, .. } => *status == 429 || *status >= 500,
            AuthError::Configuration(_)
            | AuthError::Signing(_)
            | AuthError::AssumeRole(_)
            | AuthError::Deserialize(_) => false,
        }
    }

    /// Returns the HTTP status if this is an external-service error.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            AuthError::ExternalService { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Returns the hop the error originated from, when known.
    pub fn hop(&self) -> Option<Hop> {
        match self {
            AuthError::Network { hop, .. } | AuthError::ExternalService { hop, .. } => Some(*hop),
            AuthError::Signing(_) => Some(Hop::Signing),
            AuthError::AssumeRole(_) => Some(Hop::AssumeRole),
            AuthError::Configuration(_) | AuthError::Deserialize(_) => None,
        }
    }
}

/// A specialized Result type for federation operations.
pub type Result<T> = std::result::Result<T, AuthError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn external_service_error_display() {
        let err = AuthError::ExternalService {
            hop: Hop::TokenExchange,
            status: 401,
            body: "denied".to_string(),
        };
        assert_eq!(err.to_string(), "token exchange returned HTTP 401: denied");
    }

    #[test]
    fn external_service_error_accessors() {
        let err = AuthError::ExternalService {
            hop: Hop::Impersonation,
            status: 403,
            body: "forbidden".to_string(),
        };
        assert_eq!(err.status_code(), Some(403));
        assert_eq!(err.hop(), Some(Hop::Impersonation));
    }

    #[test]
    fn configuration_error_display() {
        let err = AuthError::Configuration("role_arn is required".to_string());
        assert_eq!(err.to_string(), "configuration error: role_arn is required");
        assert!(err.status_code().is_none());
        assert!(err.hop().is_none());
    }

    #[test]
    fn assume_role_error_display() {
        let err = AuthError::AssumeRole("AccessDenied: not authorized".to_string());
        assert_eq!(
            err.to_string(),
            "assume-role error: AccessDenied: not authorized"
        );
        assert_eq!(err.hop(), Some(Hop::AssumeRole));
    }

    #[test]
    fn retryability_classification() {
        let throttled = AuthError::ExternalService {
            hop: Hop::TokenExchange,
            status: 429,
            body: String::new(),
        };
        assert!(throttled.is_retryable());

        let server_error = AuthError::ExternalService {
            hop: Hop::Impersonation,
            status: 502,
            body: String::new(),
        };
        assert!(server_error.is_retryable());

        let unauthorized = AuthError::ExternalService {
            hop: Hop::TokenExchange,
            status: 401,
            body: String::new(),
        };
        assert!(!unauthorized.is_retryable());

        assert!(!AuthError::Configuration("x".into()).is_retryable());
        assert!(!AuthError::Signing("x".into()).is_retryable());
        assert!(!AuthError::AssumeRole("x".into()).is_retryable());
    }

    #[test]
    fn hop_display_names() {
        assert_eq!(Hop::AssumeRole.to_string(), "assume-role");
        assert_eq!(Hop::Signing.to_string(), "signing");
        assert_eq!(Hop::TokenExchange.to_string(), "token exchange");
        assert_eq!(Hop::Impersonation.to_string(), "impersonation");
    }
}
