//! The credential pipeline: role assumption → SigV4 signing → token
//! exchange → optional impersonation, composed into one refreshable
//! bearer-credential object.

use chrono::{Duration, Utc};
use tokio::sync::Mutex;
use tracing::debug;

use crate::assume::AssumedRoleSource;
use crate::config::FederationConfig;
use crate::credential::{AwsCredentialSource, StaticKeySource};
use crate::error::{AuthError, Result};
use crate::exchange::FederatedTokenExchanger;
use crate::impersonate::{DEFAULT_IMPERSONATION_LIFETIME_SECS, ServiceAccountImpersonator};
use crate::sign::sign_get_caller_identity;
use crate::token::AccessToken;

/// Scope required on the federated token when it is only used to call the
/// IAM credentials endpoint for impersonation. The user-configured scopes
/// then apply to the impersonated token instead.
const IAM_SCOPE: &str = "https://www.googleapis.com/auth/iam";

/// Lifetime assumed for a federated token whose exchange response did not
/// report `expires_in`.
pub const DEFAULT_FEDERATED_LIFETIME_SECS: u64 = 3600;

enum Mode {
    Direct,
    Impersonated(ServiceAccountImpersonator),
}

/// Runs the full federation pipeline and produces access tokens.
///
/// The mode (direct vs. impersonated) is fixed at construction from the
/// configuration. The whole pipeline runs under one lock so a shared broker
/// never issues redundant concurrent exchange or impersonation calls.
pub struct TokenBroker {
    source: Box<dyn AwsCredentialSource>,
    exchanger: FederatedTokenExchanger,
    audience: String,
    mode: Mode,
    gate: Mutex<()>,
}

impl TokenBroker {
    /// Builds the production broker: validates the configuration, selects the
    /// AWS credential source (assumed role or static keys) and wires the
    /// exchange and impersonation hops.
    pub async fn from_config(config: FederationConfig) -> Result<Self> {
        config.validate()?;
        let source: Box<dyn AwsCredentialSource> = if config.uses_static_keys() {
            // validate() guarantees both key halves are present here.
            let access_key_id = config.aws_access_key_id.clone().ok_or_else(|| {
                AuthError::Configuration("aws_access_key_id is required".into())
            })?;
            let secret = config.aws_secret_access_key.clone().ok_or_else(|| {
                AuthError::Configuration("aws_secret_access_key is required".into())
            })?;
            Box::new(StaticKeySource::new(
                access_key_id,
                secret,
                config.region.as_str(),
            ))
        } else {
            Box::new(AssumedRoleSource::from_config(&config).await)
        };
        Self::with_source(source, &config)
    }

    /// Builds a broker over an externally supplied AWS credential source.
    pub fn with_source(
        source: Box<dyn AwsCredentialSource>,
        config: &FederationConfig,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| AuthError::Configuration(format!("failed to build HTTP client: {}", e)))?;

        let mode = match &config.service_account_impersonation_url {
            Some(url) => Mode::Impersonated(ServiceAccountImpersonator::new(
                http.clone(),
                url.as_str(),
                &config.scopes,
                DEFAULT_IMPERSONATION_LIFETIME_SECS,
            )?),
            None => Mode::Direct,
        };

        // With impersonation in play the federated token only needs the IAM
        // scope; the user scopes are minted onto the impersonated token.
        let exchange_scopes: Vec<String> = match &mode {
            Mode::Impersonated(_) => vec![IAM_SCOPE.to_string()],
            Mode::Direct => config.scopes.clone(),
        };
        let exchanger = FederatedTokenExchanger::new(
            http,
            config.token_url.as_str(),
            config.audience.as_str(),
            &exchange_scopes,
        );

        Ok(Self {
            source,
            exchanger,
            audience: config.audience.clone(),
            mode,
            gate: Mutex::new(()),
        })
    }

    /// Runs the full pipeline and returns a fresh access token.
    ///
    /// Any hop failure aborts the call; no token assembled from a failed hop
    /// is ever returned. Only the AWS hop is cached internally, so a returned
    /// token is never close to the AWS-hop expiry boundary.
    pub async fn access_token(&self) -> Result<AccessToken> {
        let _guard = self.gate.lock().await;

        let credentials = self.source.credentials().await?;
        let signed = sign_get_caller_identity(
            &credentials,
            self.source.region(),
            &self.audience,
            Utc::now(),
        )?;
        let federated = self.exchanger.exchange(&signed).await?;

        match &self.mode {
            Mode::Direct => {
                let lifetime = federated
                    .expires_in
                    .unwrap_or(DEFAULT_FEDERATED_LIFETIME_SECS);
                debug!(lifetime_secs = lifetime, "issued direct federated token");
                Ok(AccessToken {
                    value: federated.value,
                    expires_at: Utc::now() + Duration::seconds(lifetime as i64),
                })
            }
            Mode::Impersonated(impersonator) => {
                let token = impersonator.impersonate(&federated).await?;
                debug!(
                    service_account = %impersonator.service_account(),
                    expires_at = %token.expires_at,
                    "issued impersonated access token"
                );
                Ok(token)
            }
        }
    }

    /// Releases the AWS hop's cached secret material.
    pub async fn close(&self) {
        self.source.close().await;
    }
}

/// Refreshable bearer credential consumed by the warehouse client.
///
/// A thin adapter composed over [`TokenBroker`] rather than an extension of
/// it: the warehouse client only sees `current_token` and `refresh`.
pub struct FederatedCredential {
    broker: TokenBroker,
    current: Mutex<Option<AccessToken>>,
}

impl FederatedCredential {
    /// Builds the credential from configuration.
    pub async fn from_config(config: FederationConfig) -> Result<Self> {
        Ok(Self::new(TokenBroker::from_config(config).await?))
    }

    /// Wraps an existing broker.
    pub fn new(broker: TokenBroker) -> Self {
        Self {
            broker,
            current: Mutex::new(None),
        }
    }

    /// The most recently issued token, if any. The caller decides when it is
    /// too stale and calls [`refresh`](Self::refresh).
    pub async fn current_token(&self) -> Option<AccessToken> {
        self.current.lock().await.clone()
    }

    /// Re-runs the full pipeline and stores the fresh token.
    pub async fn refresh(&self) -> Result<AccessToken> {
        let token = self.broker.access_token().await?;
        let mut current = self.current.lock().await;
        *current = Some(token.clone());
        Ok(token)
    }

    /// Releases cached credential material in every hop.
    pub async fn close(&self) {
        self.broker.close().await;
        let mut current = self.current.lock().await;
        *current = None;
    }
}
