//! AWS → Google Cloud workload identity federation for data-loading clients.
//!
//! Converts an AWS IAM role, hop by hop, into a bearer access token accepted
//! by Google Cloud APIs, without storing a long-lived service account key:
//!
//! 1. [`AssumedRoleSource`] — assume the IAM role via STS, with caching and
//!    refresh strictly before expiry
//! 2. [`sign::SignedRequest`] — SigV4-sign a fixed STS `GetCallerIdentity`
//!    call bound to the federation audience
//! 3. [`FederatedTokenExchanger`] — exchange the signed request for a
//!    federated access token
//! 4. [`ServiceAccountImpersonator`] — optionally exchange the federated
//!    token for an impersonated service account token
//!
//! [`TokenBroker`] composes the hops; [`FederatedCredential`] is the
//! refreshable bearer credential a warehouse client consumes.
//!
//! # Quick Start
//!
//! ```no_run
//! use rs_gcp_wif::{FederatedCredential, FederationConfig};
//!
//! # async fn example() -> rs_gcp_wif::Result<()> {
//! let config = FederationConfig::new(
//!     "arn:aws:iam::123456789012:role/warehouse-loader",
//!     "us-east-1",
//!     "//iam.googleapis.com/projects/123456789012/locations/global/workloadIdentityPools/pool/providers/aws",
//! )
//! .with_impersonation_url(
//!     "https://iamcredentials.googleapis.com/v1/projects/-/serviceAccounts/loader@example.iam.gserviceaccount.com:generateAccessToken",
//! );
//!
//! let credential = FederatedCredential::from_config(config).await?;
//! let token = credential.refresh().await?;
//! println!("token expires at {}", token.expires_at);
//! # Ok(())
//! # }
//! ```

pub mod assume;
pub mod config;
pub mod credential;
pub mod error;
pub mod exchange;
pub mod federation;
pub mod impersonate;
pub mod sign;
pub mod token;

pub use assume::{AssumeRoleApi, AssumedRoleSource, StsAssumeRole};
pub use config::FederationConfig;
pub use credential::{AwsCredentialSource, AwsCredentials, StaticKeySource};
pub use error::{AuthError, Hop, Result};
pub use exchange::FederatedTokenExchanger;
pub use federation::{FederatedCredential, TokenBroker};
pub use impersonate::ServiceAccountImpersonator;
pub use token::{AccessToken, FederatedToken};

// Compile-time assertions: key types must be Send + Sync for use across threads.
const _: () = {
    const fn assert_send_sync<T: Send + Sync>() {}
    let _ = assert_send_sync::<TokenBroker>;
    let _ = assert_send_sync::<FederatedCredential>;
    let _ = assert_send_sync::<AuthError>;
    let _ = assert_send_sync::<AwsCredentials>;
    let _ = assert_send_sync::<AccessToken>;
};
