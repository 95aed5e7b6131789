//! OAuth 2.0 token exchange (RFC 8693) of the signed AWS request for a
//! short-lived Google federated access token.

use serde::Deserialize;
use tracing::debug;

use crate::error::{AuthError, Hop, Result};
use crate::sign::SignedRequest;
use crate::token::FederatedToken;

pub(crate) const TOKEN_EXCHANGE_GRANT_TYPE: &str =
    "urn:ietf:params:oauth:grant-type:token-exchange";
pub(crate) const ACCESS_TOKEN_TYPE: &str = "urn:ietf:params:oauth:token-type:access_token";
pub(crate) const AWS4_SUBJECT_TOKEN_TYPE: &str = "urn:ietf:params:aws:token-type:aws4_request";

#[derive(Debug, Deserialize)]
struct TokenExchangeResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
    token_type: String,
    #[serde(default)]
    #[allow(dead_code)]
    issued_token_type: Option<String>,
}

/// Exchanges a signed GetCallerIdentity descriptor for a federated token.
pub struct FederatedTokenExchanger {
    http: reqwest::Client,
    token_url: String,
    audience: String,
    scope: String,
}

impl FederatedTokenExchanger {
    /// Creates an exchanger against `token_url`, requesting `scopes` on the
    /// federated token (space-joined per the OAuth scope syntax).
    pub fn new(
        http: reqwest::Client,
        token_url: impl Into<String>,
        audience: impl Into<String>,
        scopes: &[String],
    ) -> Self {
        Self {
            http,
            token_url: token_url.into(),
            audience: audience.into(),
            scope: scopes.join(" "),
        }
    }

    /// POSTs the token-exchange grant and parses the federated token.
    ///
    /// Non-200 responses surface as [`AuthError::ExternalService`] with the
    /// status and body carried verbatim.
    pub async fn exchange(&self, signed: &SignedRequest) -> Result<FederatedToken> {
        let subject_token = signed.subject_token()?;
        let form = [
            ("grant_type", TOKEN_EXCHANGE_GRANT_TYPE),
            ("audience", self.audience.as_str()),
            ("scope", self.scope.as_str()),
            ("requested_token_type", ACCESS_TOKEN_TYPE),
            ("subject_token_type", AWS4_SUBJECT_TOKEN_TYPE),
            ("subject_token", subject_token.as_str()),
        ];

        debug!(token_url = %self.token_url, audience = %self.audience, "exchanging signed AWS request for federated token");

        let response = self
            .http
            .post(&self.token_url)
            .form(&form)
            .send()
            .await
            .map_err(|e| AuthError::network(Hop::TokenExchange, e))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| AuthError::network(Hop::TokenExchange, e))?;

        if status != reqwest::StatusCode::OK {
            return Err(AuthError::ExternalService {
                hop: Hop::TokenExchange,
                status: status.as_u16(),
                body: text,
            });
        }

        let parsed: TokenExchangeResponse = serde_json::from_str(&text)?;
        Ok(FederatedToken {
            value: parsed.access_token,
            token_type: parsed.token_type,
            expires_in: parsed.expires_in,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserialize_full_response() {
        let json = r#"{
            "access_token": "federated-token",
            "expires_in": 3600,
            "token_type": "Bearer",
            "issued_token_type": "urn:ietf:params:oauth:token-type:access_token"
        }"#;
        let resp: TokenExchangeResponse = serde_json::from_str(json).unwrap();
        assert_eq!(resp.access_token, "federated-token");
        assert_eq!(resp.expires_in, Some(3600));
        assert_eq!(resp.token_type, "Bearer");
    }

    #[test]
    fn deserialize_without_expires_in() {
        let json = r#"{"access_token": "t", "token_type": "Bearer"}"#;
        let resp: TokenExchangeResponse = serde_json::from_str(json).unwrap();
        assert_eq!(resp.expires_in, None);
    }

    #[test]
    fn deserialize_missing_access_token_fails() {
        let json = r#"{"token_type": "Bearer"}"#;
        assert!(serde_json::from_str::<TokenExchangeResponse>(json).is_err());
    }

    #[test]
    fn scopes_are_space_joined() {
        let exchanger = FederatedTokenExchanger::new(
            reqwest::Client::new(),
            "https://sts.googleapis.com/v1/token",
            "aud",
            &["a".to_string(), "b".to_string()],
        );
        assert_eq!(exchanger.scope, "a b");
    }
}
