use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;

/// Temporary AWS credentials used to sign the GetCallerIdentity request.
///
/// The `Debug` implementation redacts `secret_access_key` and `session_token`
/// to prevent accidental leakage in logs.
#[derive(Clone)]
pub struct AwsCredentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: Option<String>,
    /// UTC instant after which the credentials are no longer valid.
    pub expiration: DateTime<Utc>,
}

impl AwsCredentials {
    /// Checks if the credentials have expired.
    pub fn is_expired(&self) -> bool {
        Utc::now() >= self.expiration
    }

    /// Returns the remaining time until expiration, or `None` if already
    /// expired.
    pub fn time_to_expiry(&self) -> Option<std::time::Duration> {
        let diff = self.expiration - Utc::now();
        if diff.num_seconds() > 0 {
            return Some(std::time::Duration::from_secs(diff.num_seconds() as u64));
        }
        None
    }
}

impl std::fmt::Debug for AwsCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AwsCredentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"****")
            .field(
                "session_token",
                &self.session_token.as_ref().map(|_| "****"),
            )
            .field("expiration", &self.expiration)
            .finish()
    }
}

/// Produces the AWS credentials the signer operates on.
///
/// Implementations must hand out credentials valid for at least the
/// configured refresh threshold; a credential is never returned already
/// expired.
#[async_trait]
pub trait AwsCredentialSource: Send + Sync {
    /// Resolve credentials, refreshing any internal cache if needed.
    async fn credentials(&self) -> Result<AwsCredentials>;

    /// The AWS region the credentials are scoped to.
    fn region(&self) -> &str;

    /// Releases cached secret material and any owned network resources.
    async fn close(&self);
}

/// Credential source backed by a fixed access key pair (non-role-chained
/// mode). Static keys carry no session token and do not expire; a far-future
/// expiration keeps the caching invariants trivially satisfied.
pub struct StaticKeySource {
    credentials: AwsCredentials,
    region: String,
}

impl StaticKeySource {
    pub fn new(
        access_key_id: impl Into<String>,
        secret_access_key: impl Into<String>,
        region: impl Into<String>,
    ) -> Self {
        Self {
            credentials: AwsCredentials {
                access_key_id: access_key_id.into(),
                secret_access_key: secret_access_key.into(),
                session_token: None,
                expiration: DateTime::<Utc>::MAX_UTC,
            },
            region: region.into(),
        }
    }
}

#[async_trait]
impl AwsCredentialSource for StaticKeySource {
    async fn credentials(&self) -> Result<AwsCredentials> {
        Ok(self.credentials.clone())
    }

    fn region(&self) -> &str {
        &self.region
    }

    async fn close(&self) {}
}
