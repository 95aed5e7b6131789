//! Service account impersonation: exchanges a federated token for an access
//! token minted for a specific target service account.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{AuthError, Hop, Result};
use crate::token::{AccessToken, FederatedToken};

const IMPERSONATION_URL_MARKER: &str = "serviceAccounts/";
const IMPERSONATION_URL_SUFFIX: &str = ":generateAccessToken";

/// Default lifetime requested for the impersonated token.
pub const DEFAULT_IMPERSONATION_LIFETIME_SECS: u64 = 3600;

#[derive(Serialize)]
struct GenerateAccessTokenRequest<'a> {
    scope: &'a [String],
    lifetime: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateAccessTokenResponse {
    access_token: String,
    /// RFC 3339 instant.
    expire_time: String,
}

/// Derives the target service account email from a
/// `.../serviceAccounts/<email>:generateAccessToken` URL.
pub(crate) fn service_account_email(url: &str) -> Result<String> {
    let after_marker = url
        .rsplit_once(IMPERSONATION_URL_MARKER)
        .map(|(_, rest)| rest)
        .ok_or_else(|| {
            AuthError::Configuration(format!(
                "impersonation URL '{}' does not contain '{}'",
                url, IMPERSONATION_URL_MARKER
            ))
        })?;
    let email = after_marker
        .strip_suffix(IMPERSONATION_URL_SUFFIX)
        .ok_or_else(|| {
            AuthError::Configuration(format!(
                "impersonation URL '{}' does not end with '{}'",
                url, IMPERSONATION_URL_SUFFIX
            ))
        })?;
    if email.is_empty() {
        return Err(AuthError::Configuration(format!(
            "impersonation URL '{}' has an empty service account email",
            url
        )));
    }
    Ok(email.to_string())
}

/// Exchanges a federated token for an impersonated service account token.
pub struct ServiceAccountImpersonator {
    http: reqwest::Client,
    url: String,
    email: String,
    scopes: Vec<String>,
    lifetime_secs: u64,
}

impl ServiceAccountImpersonator {
    /// Creates an impersonator for the given `:generateAccessToken` URL.
    ///
    /// Fails with a configuration error when the URL does not match the
    /// expected pattern.
    pub fn new(
        http: reqwest::Client,
        url: impl Into<String>,
        scopes: &[String],
        lifetime_secs: u64,
    ) -> Result<Self> {
        let url = url.into();
        let email = service_account_email(&url)?;
        Ok(Self {
            http,
            url,
            email,
            scopes: scopes.to_vec(),
            lifetime_secs,
        })
    }

    /// The target service account email derived from the URL.
    pub fn service_account(&self) -> &str {
        &self.email
    }

    /// POSTs the generateAccessToken request authenticated with the
    /// federated token and parses the impersonated access token.
    pub async fn impersonate(&self, federated: &FederatedToken) -> Result<AccessToken> {
        debug!(service_account = %self.email, "impersonating target service account");

        let body = GenerateAccessTokenRequest {
            scope: &self.scopes,
            lifetime: format!("{}s", self.lifetime_secs),
        };

        let response = self
            .http
            .post(&self.url)
            .bearer_auth(&federated.value)
            .json(&body)
            .send()
            .await
            .map_err(|e| AuthError::network(Hop::Impersonation, e))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| AuthError::network(Hop::Impersonation, e))?;

        if !status.is_success() {
            return Err(AuthError::ExternalService {
                hop: Hop::Impersonation,
                status: status.as_u16(),
                body: text,
            });
        }

        let parsed: GenerateAccessTokenResponse = serde_json::from_str(&text)?;
        let expires_at = DateTime::parse_from_rfc3339(&parsed.expire_time)
            .map_err(|e| {
                AuthError::Configuration(format!(
                    "impersonation response has invalid expireTime '{}': {}",
                    parsed.expire_time, e
                ))
            })?
            .with_timezone(&Utc);

        Ok(AccessToken {
            value: parsed.access_token,
            expires_at,
        })
    }
}
