//! Live federation test using real AWS and Google Cloud resources.
//!
//! Ignored by default. Run with:
//! ```bash
//! # AWS base credentials come from the ambient chain (env/IRSA/ECS).
//! export GCP_WIF_ROLE_ARN=arn:aws:iam::123456789012:role/your-role
//! export GCP_WIF_REGION=us-east-1
//! export GCP_WIF_AUDIENCE=//iam.googleapis.com/projects/.../providers/...
//! # Optional:
//! export GCP_WIF_IMPERSONATION_URL=https://iamcredentials.googleapis.com/v1/projects/-/serviceAccounts/...:generateAccessToken
//!
//! cargo test --test live -- --ignored --nocapture
//! ```

use rs_gcp_wif::{FederatedCredential, FederationConfig};

fn env(name: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| panic!("{} environment variable not set", name))
}

fn live_config() -> FederationConfig {
    let mut config = FederationConfig::new(
        env("GCP_WIF_ROLE_ARN"),
        env("GCP_WIF_REGION"),
        env("GCP_WIF_AUDIENCE"),
    );
    if let Ok(url) = std::env::var("GCP_WIF_IMPERSONATION_URL") {
        config = config.with_impersonation_url(url);
    }
    config
}

#[tokio::test]
#[ignore = "requires real AWS and Google Cloud resources"]
async fn live_refresh_produces_valid_token() {
    let credential = FederatedCredential::from_config(live_config())
        .await
        .expect("failed to build credential");

    let token = credential.refresh().await.expect("refresh failed");

    println!("=== Federated Access Token ===");
    println!("expires_at: {}", token.expires_at);
    println!("time_to_expiry: {:?}", token.time_to_expiry());

    assert!(!token.value.is_empty(), "token value should not be empty");
    assert!(!token.is_expired(), "fresh token should not be expired");

    // A second refresh re-runs the pipeline but reuses the cached AWS hop.
    let again = credential.refresh().await.expect("second refresh failed");
    assert!(!again.is_expired());

    credential.close().await;
}
