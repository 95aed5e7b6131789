//! AWS IAM role assumption with in-memory caching.
//!
//! The base credential chain (environment variables, IRSA web identity, ECS
//! task role) is the AWS SDK's default provider chain; this module only adds
//! the AssumeRole hop, the expiry-threshold cache and the single critical
//! section around check-then-refresh.

use async_trait::async_trait;
use aws_config::Region;
use aws_smithy_types::error::display::DisplayErrorContext;
use chrono::{DateTime, Utc};
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::debug;

use crate::config::FederationConfig;
use crate::credential::{AwsCredentialSource, AwsCredentials};
use crate::error::{AuthError, Result};

/// The raw AssumeRole call, separated from the caching policy so tests can
/// substitute a fake.
#[async_trait]
pub trait AssumeRoleApi: Send + Sync {
    async fn assume_role(
        &self,
        role_arn: &str,
        session_name: &str,
        duration_secs: i32,
    ) -> Result<AwsCredentials>;
}

/// Production AssumeRole implementation delegating to `aws-sdk-sts`, with the
/// SDK's default provider chain supplying the base credentials.
pub struct StsAssumeRole {
    client: aws_sdk_sts::Client,
}

impl StsAssumeRole {
    /// Builds an STS client for `region` on top of the ambient credential
    /// chain.
    pub async fn new(region: &str) -> Self {
        let sdk_config = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(Region::new(region.to_string()))
            .load()
            .await;
        Self {
            client: aws_sdk_sts::Client::new(&sdk_config),
        }
    }
}

#[async_trait]
impl AssumeRoleApi for StsAssumeRole {
    async fn assume_role(
        &self,
        role_arn: &str,
        session_name: &str,
        duration_secs: i32,
    ) -> Result<AwsCredentials> {
        let output = self
            .client
            .assume_role()
            .role_arn(role_arn)
            .role_session_name(session_name)
            .duration_seconds(duration_secs)
            .send()
            .await
            .map_err(|e| AuthError::AssumeRole(DisplayErrorContext(&e).to_string()))?;

        let creds = output
            .credentials()
            .ok_or_else(|| AuthError::AssumeRole("STS response missing credentials".into()))?;

        let expiration = creds.expiration();
        let expiration =
            DateTime::<Utc>::from_timestamp(expiration.secs(), expiration.subsec_nanos())
                .ok_or_else(|| {
                    AuthError::AssumeRole("STS returned an out-of-range expiration".into())
                })?;

        Ok(AwsCredentials {
            access_key_id: creds.access_key_id().to_string(),
            secret_access_key: creds.secret_access_key().to_string(),
            session_token: Some(creds.session_token().to_string()),
            expiration,
        })
    }
}

/// Caching credential source that assumes an IAM role and refreshes the
/// cached credentials strictly before they expire.
pub struct AssumedRoleSource {
    api: Box<dyn AssumeRoleApi>,
    role_arn: String,
    session_name: String,
    region: String,
    session_duration: Duration,
    refresh_threshold: Duration,
    cache: Mutex<Option<AwsCredentials>>,
}

impl AssumedRoleSource {
    /// Wraps an AssumeRole implementation with the caching policy from
    /// `config`. The config must have passed [`FederationConfig::validate`].
    pub fn new(api: Box<dyn AssumeRoleApi>, config: &FederationConfig) -> Self {
        Self {
            api,
            role_arn: config.role_arn.clone(),
            session_name: config.session_name.clone(),
            region: config.region.clone(),
            session_duration: Duration::from_secs(config.session_duration_secs),
            refresh_threshold: config.refresh_threshold(),
            cache: Mutex::new(None),
        }
    }

    /// Builds the production source: SDK-backed AssumeRole over the ambient
    /// credential chain.
    pub async fn from_config(config: &FederationConfig) -> Self {
        let api = StsAssumeRole::new(&config.region).await;
        Self::new(Box::new(api), config)
    }
}

#[async_trait]
impl AwsCredentialSource for AssumedRoleSource {
    /// Returns cached credentials while they remain valid past the refresh
    /// threshold, otherwise performs one AssumeRole call and replaces the
    /// cache atomically.
    ///
    /// The lock is held across the whole check-then-refresh sequence so
    /// concurrent callers observing an expiring credential cannot trigger
    /// overlapping AssumeRole calls.
    async fn credentials(&self) -> Result<AwsCredentials> {
        let mut cache = self.cache.lock().await;

        if let Some(cached) = cache.as_ref() {
            let refresh_at = cached.expiration
                - chrono::Duration::from_std(self.refresh_threshold)
                    .map_err(|e| AuthError::Configuration(format!("refresh threshold: {}", e)))?;
            if Utc::now() < refresh_at {
                return Ok(cached.clone());
            }
            debug!(
                role_arn = %self.role_arn,
                expiration = %cached.expiration,
                "cached AWS credentials within refresh threshold, re-assuming role"
            );
        } else {
            debug!(role_arn = %self.role_arn, "no cached AWS credentials, assuming role");
        }

        // No fallback to stale credentials: any AssumeRole error propagates.
        let fresh = self
            .api
            .assume_role(
                &self.role_arn,
                &self.session_name,
                self.session_duration.as_secs() as i32,
            )
            .await?;
        *cache = Some(fresh.clone());
        Ok(fresh)
    }

    fn region(&self) -> &str {
        &self.region
    }

    /// Discards the cached secret material. The underlying STS client and
    /// its connection pool are released when the source is dropped.
    async fn close(&self) {
        let mut cache = self.cache.lock().await;
        *cache = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Fake AssumeRole that counts calls and hands out credentials with a
    /// configurable lifetime.
    struct FakeApi {
        calls: AtomicUsize,
        lifetime: chrono::Duration,
    }

    impl FakeApi {
        fn new(lifetime: chrono::Duration) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                lifetime,
            }
        }
    }

    #[async_trait]
    impl AssumeRoleApi for FakeApi {
        async fn assume_role(
            &self,
            _role_arn: &str,
            _session_name: &str,
            _duration_secs: i32,
        ) -> Result<AwsCredentials> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(AwsCredentials {
                access_key_id: format!("AKIAFAKE{}", n),
                secret_access_key: "secret".to_string(),
                session_token: Some("token".to_string()),
                expiration: Utc::now() + self.lifetime,
            })
        }
    }

    struct FailingApi;

    #[async_trait]
    impl AssumeRoleApi for FailingApi {
        async fn assume_role(&self, _: &str, _: &str, _: i32) -> Result<AwsCredentials> {
            Err(AuthError::AssumeRole("AccessDenied".into()))
        }
    }

    fn test_config() -> FederationConfig {
        FederationConfig::new(
            "arn:aws:iam::123456789012:role/test-role",
            "us-east-1",
            "test-audience",
        )
    }

    fn source_with(api: impl AssumeRoleApi + 'static) -> AssumedRoleSource {
        AssumedRoleSource::new(Box::new(api), &test_config())
    }

    #[tokio::test]
    async fn first_call_assumes_role() {
        let source = source_with(FakeApi::new(chrono::Duration::hours(1)));
        let creds = source.credentials().await.unwrap();
        assert_eq!(creds.access_key_id, "AKIAFAKE0");
        assert_eq!(creds.session_token.as_deref(), Some("token"));
        assert_eq!(source.region(), "us-east-1");
    }

    #[tokio::test]
    async fn cached_outside_threshold_is_reused() {
        // Expires in 6 minutes with a 5 minute threshold: no second call.
        let source = source_with(FakeApi::new(chrono::Duration::minutes(6)));
        let first = source.credentials().await.unwrap();
        let second = source.credentials().await.unwrap();
        assert_eq!(first.access_key_id, "AKIAFAKE0");
        assert_eq!(second.access_key_id, "AKIAFAKE0");
    }

    #[tokio::test]
    async fn cached_within_threshold_triggers_one_refresh() {
        // Expires in 4 minutes with a 5 minute threshold: exactly one
        // re-assume per call that observes the expiring credential.
        let source = source_with(FakeApi::new(chrono::Duration::minutes(4)));
        let first = source.credentials().await.unwrap();
        let second = source.credentials().await.unwrap();
        assert_eq!(first.access_key_id, "AKIAFAKE0");
        assert_eq!(second.access_key_id, "AKIAFAKE1");
    }

    #[tokio::test]
    async fn assume_role_failure_propagates_without_stale_fallback() {
        let source = source_with(FailingApi);
        let err = source.credentials().await.unwrap_err();
        assert!(matches!(err, AuthError::AssumeRole(_)));
    }

    #[tokio::test]
    async fn close_discards_cache() {
        let source = source_with(FakeApi::new(chrono::Duration::hours(1)));
        let first = source.credentials().await.unwrap();
        assert_eq!(first.access_key_id, "AKIAFAKE0");

        source.close().await;

        // Cache was cleared, so the next call re-assumes.
        let second = source.credentials().await.unwrap();
        assert_eq!(second.access_key_id, "AKIAFAKE1");
    }

    #[tokio::test]
    async fn concurrent_callers_share_one_assume_role() {
        use std::sync::Arc;

        let source = Arc::new(source_with(FakeApi::new(chrono::Duration::hours(1))));
        let mut handles = Vec::new();
        for _ in 0..8 {
            let source = Arc::clone(&source);
            handles.push(tokio::spawn(
                async move { source.credentials().await.unwrap() },
            ));
        }
        for handle in handles {
            let creds = handle.await.unwrap();
            assert_eq!(creds.access_key_id, "AKIAFAKE0");
        }
    }
}
