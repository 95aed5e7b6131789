use chrono::{DateTime, Utc};

/// Short-lived token returned by the Google STS token exchange.
///
/// Used exactly once: either promoted to the final [`AccessToken`] (direct
/// mode) or presented as the bearer credential for the impersonation hop.
#[derive(Clone)]
pub struct FederatedToken {
    pub value: String,
    pub token_type: String,
    /// Lifetime reported by the exchange endpoint, when present.
    pub expires_in: Option<u64>,
}

impl std::fmt::Debug for FederatedToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FederatedToken")
            .field("value", &"****")
            .field("token_type", &self.token_type)
            .field("expires_in", &self.expires_in)
            .finish()
    }
}

/// The final bearer token handed to the warehouse client.
#[derive(Clone)]
pub struct AccessToken {
    pub value: String,
    /// UTC instant after which the token must be refreshed.
    pub expires_at: DateTime<Utc>,
}

impl AccessToken {
    /// Checks if the token has expired.
    pub fn is_expired(&self) -> bool {
        Utc::now() >= self.expires_at
    }

    /// Returns the remaining time until expiration, or `None` if already
    /// expired.
    pub fn time_to_expiry(&self) -> Option<std::time::Duration> {
        let diff = self.expires_at - Utc::now();
        if diff.num_seconds() > 0 {
            return Some(std::time::Duration::from_secs(diff.num_seconds() as u64));
        }
        None
    }
}

impl std::fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessToken")
            .field("value", &"****")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn federated_token_debug_redacts_value() {
        let token = FederatedToken {
            value: "ya29.secret-token".to_string(),
            token_type: "Bearer".to_string(),
            expires_in: Some(3600),
        };
        let debug = format!("{:?}", token);
        assert!(!debug.contains("ya29.secret-token"));
        assert!(debug.contains("Bearer"));
        assert!(debug.contains("3600"));
    }

    #[test]
    fn access_token_debug_redacts_value() {
        let token = AccessToken {
            value: "ya29.final-token".to_string(),
            expires_at: Utc::now(),
        };
        let debug = format!("{:?}", token);
        assert!(!debug.contains("ya29.final-token"));
        assert!(debug.contains("****"));
    }

    #[test]
    fn access_token_expiry() {
        let live = AccessToken {
            value: "t".to_string(),
            expires_at: Utc::now() + Duration::minutes(10),
        };
        assert!(!live.is_expired());
        assert!(live.time_to_expiry().unwrap().as_secs() > 500);

        let stale = AccessToken {
            value: "t".to_string(),
            expires_at: Utc::now() - Duration::seconds(1),
        };
        assert!(stale.is_expired());
        assert!(stale.time_to_expiry().is_none());
    }
}
