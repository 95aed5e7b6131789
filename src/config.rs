use std::sync::OnceLock;
use std::time::Duration;

use regex::Regex;
use serde::Deserialize;

use crate::error::{AuthError, Result};

/// Default Google STS token exchange endpoint.
pub const DEFAULT_TOKEN_URL: &str = "https://sts.googleapis.com/v1/token";

/// Default scope requested on the final access token.
pub const DEFAULT_SCOPE: &str = "https://www.googleapis.com/auth/cloud-platform";

/// Default margin before AWS credential expiry at which a refresh is forced.
pub const DEFAULT_REFRESH_THRESHOLD: Duration = Duration::from_secs(300);

/// Default AssumeRole session duration.
pub const DEFAULT_SESSION_DURATION: Duration = Duration::from_secs(3600);

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Cached regex for AWS role ARN validation.
///
/// ARN format: `arn:aws:iam::{account-id}:role/{role-name}` where account-id
/// is exactly 12 digits and role-name is 1-64 chars (path segments allowed).
static ROLE_ARN_REGEX: OnceLock<Regex> = OnceLock::new();

fn role_arn_regex() -> &'static Regex {
    ROLE_ARN_REGEX.get_or_init(|| {
        Regex::new(r"^arn:aws:iam::\d{12}:role/[a-zA-Z0-9+=,.@_/-]{1,64}$")
            .expect("invalid ROLE_ARN_REGEX pattern")
    })
}

fn default_token_url() -> String {
    DEFAULT_TOKEN_URL.to_string()
}

fn default_scopes() -> Vec<String> {
    vec![DEFAULT_SCOPE.to_string()]
}

fn default_session_name() -> String {
    "gcp-wif-session".to_string()
}

fn default_refresh_threshold_secs() -> u64 {
    DEFAULT_REFRESH_THRESHOLD.as_secs()
}

fn default_session_duration_secs() -> u64 {
    DEFAULT_SESSION_DURATION.as_secs()
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT.as_secs()
}

/// Configuration for the AWS → Google Cloud federation pipeline.
///
/// Binds directly from a JSON document in the external-account config shape,
/// or is assembled programmatically with the `with_*` setters.
#[derive(Debug, Clone, Deserialize)]
pub struct FederationConfig {
    /// ARN of the AWS IAM role to assume.
    #[serde(default)]
    pub role_arn: String,

    /// Session name recorded in CloudTrail for the assumed role.
    #[serde(default = "default_session_name")]
    pub session_name: String,

    /// AWS region used for the STS endpoint and the SigV4 credential scope.
    #[serde(default)]
    pub region: String,

    /// Workload identity pool provider resource the signature is bound to.
    #[serde(default)]
    pub audience: String,

    /// When set, the federated token is exchanged for an impersonated
    /// service account token via this `:generateAccessToken` URL.
    #[serde(default)]
    pub service_account_impersonation_url: Option<String>,

    /// Token exchange endpoint.
    #[serde(default = "default_token_url")]
    pub token_url: String,

    /// Scopes requested on the final access token.
    #[serde(default = "default_scopes")]
    pub scopes: Vec<String>,

    /// Direct access key for the non-role-chained mode. When both key fields
    /// are present, AssumeRole is skipped entirely.
    #[serde(default)]
    pub aws_access_key_id: Option<String>,

    /// Direct secret key for the non-role-chained mode.
    #[serde(default)]
    pub aws_secret_access_key: Option<String>,

    /// Margin before AWS credential expiry at which a refresh is forced.
    #[serde(default = "default_refresh_threshold_secs")]
    pub refresh_threshold_secs: u64,

    /// AssumeRole session duration in seconds.
    #[serde(default = "default_session_duration_secs")]
    pub session_duration_secs: u64,

    /// HTTP request timeout in seconds for the exchange and impersonation hops.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for FederationConfig {
    fn default() -> Self {
        Self {
            role_arn: String::new(),
            session_name: default_session_name(),
            region: String::new(),
            audience: String::new(),
            service_account_impersonation_url: None,
            token_url: default_token_url(),
            scopes: default_scopes(),
            aws_access_key_id: None,
            aws_secret_access_key: None,
            refresh_threshold_secs: default_refresh_threshold_secs(),
            session_duration_secs: default_session_duration_secs(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl FederationConfig {
    /// Creates a configuration from the required fields, leaving the rest at
    /// their defaults.
    pub fn new(
        role_arn: impl Into<String>,
        region: impl Into<String>,
        audience: impl Into<String>,
    ) -> Self {
        Self {
            role_arn: role_arn.into(),
            region: region.into(),
            audience: audience.into(),
            ..Self::default()
        }
    }

    /// Parses a configuration from a JSON document of recognized options.
    pub fn from_json(value: serde_json::Value) -> Result<Self> {
        serde_json::from_value(value)
            .map_err(|e| AuthError::Configuration(format!("invalid federation config: {}", e)))
    }

    /// Sets a custom session name.
    pub fn with_session_name(mut self, name: impl Into<String>) -> Self {
        self.session_name = name.into();
        self
    }

    /// Enables the impersonation hop with the given `:generateAccessToken` URL.
    pub fn with_impersonation_url(mut self, url: impl Into<String>) -> Self {
        self.service_account_impersonation_url = Some(url.into());
        self
    }

    /// Overrides the token exchange endpoint.
    pub fn with_token_url(mut self, url: impl Into<String>) -> Self {
        self.token_url = url.into();
        self
    }

    /// Overrides the scopes requested on the final token.
    pub fn with_scopes<I, S>(mut self, scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.scopes = scopes.into_iter().map(|s| s.into()).collect();
        self
    }

    /// Supplies a direct access key pair, bypassing role assumption.
    pub fn with_static_keys(
        mut self,
        access_key_id: impl Into<String>,
        secret_access_key: impl Into<String>,
    ) -> Self {
        self.aws_access_key_id = Some(access_key_id.into());
        self.aws_secret_access_key = Some(secret_access_key.into());
        self
    }

    /// Sets the refresh threshold for the cached AWS credentials.
    pub fn with_refresh_threshold(mut self, threshold: Duration) -> Self {
        self.refresh_threshold_secs = threshold.as_secs();
        self
    }

    /// Sets the AssumeRole session duration.
    pub fn with_session_duration(mut self, duration: Duration) -> Self {
        self.session_duration_secs = duration.as_secs();
        self
    }

    /// Sets the HTTP request timeout for the exchange and impersonation hops.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_secs = timeout.as_secs();
        self
    }

    /// Returns `true` when a direct access key pair is configured.
    pub fn uses_static_keys(&self) -> bool {
        self.aws_access_key_id.is_some() && self.aws_secret_access_key.is_some()
    }

    pub(crate) fn refresh_threshold(&self) -> Duration {
        Duration::from_secs(self.refresh_threshold_secs)
    }

    pub(crate) fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Validates required fields and the role ARN shape.
    pub fn validate(&self) -> Result<()> {
        if self.region.is_empty() {
            return Err(AuthError::Configuration("region is required".into()));
        }
        if self.audience.is_empty() {
            return Err(AuthError::Configuration("audience is required".into()));
        }
        if self.token_url.is_empty() {
            return Err(AuthError::Configuration("token_url is required".into()));
        }
        if self.aws_access_key_id.is_some() != self.aws_secret_access_key.is_some() {
            return Err(AuthError::Configuration(
                "aws_access_key_id and aws_secret_access_key must be set together".into(),
            ));
        }
        if !self.uses_static_keys() {
            if self.role_arn.is_empty() {
                return Err(AuthError::Configuration(
                    "role_arn is required unless static keys are configured".into(),
                ));
            }
            if !role_arn_regex().is_match(&self.role_arn) {
                return Err(AuthError::Configuration(format!(
                    "invalid role_arn '{}'. Expected: arn:aws:iam::{{12 digit account id}}:role/{{role name}}",
                    self.role_arn
                )));
            }
        }
        Ok(())
    }
}
