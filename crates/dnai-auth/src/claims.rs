//! JWT Claims structure
//!
//! Access tokens are issued by the hosted auth service; this is the subset
//! of its claims the backend relies on.

use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Default audience of hosted-auth access tokens
pub const DEFAULT_AUDIENCE: &str = "authenticated";

/// JWT Claims
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Claims {
    /// Subject (user id)
    pub sub: Uuid,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,

    /// Postgres role the token maps to, normally `authenticated`
    #[serde(default)]
    pub role: String,

    /// Audience
    pub aud: String,

    /// Auth session the token belongs to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,

    /// Issued at (Unix timestamp)
    pub iat: i64,

    /// Expiration time (Unix timestamp)
    pub exp: i64,
}

impl Claims {
    /// Create new claims for a user; expiration is set by `JwtService`
    ///
    /// # Examples
    ///
    /// ```
    /// use dnai_auth::Claims;
    /// use uuid::Uuid;
    ///
    /// let id = Uuid::new_v4();
    /// let claims = Claims::new(id, Some("ops@example.com"));
    /// assert_eq!(claims.sub, id);
    /// assert_eq!(claims.aud, "authenticated");
    /// ```
    pub fn new(user_id: Uuid, email: Option<&str>) -> Self {
        Self {
            sub: user_id,
            email: email.map(str::to_string),
            role: DEFAULT_AUDIENCE.to_string(),
            aud: DEFAULT_AUDIENCE.to_string(),
            session_id: None,
            iat: Utc::now().timestamp(),
            exp: 0,
        }
    }

    /// Create new claims with custom expiration duration
    pub fn with_expiration(user_id: Uuid, email: Option<&str>, expires_in_secs: i64) -> Self {
        let mut claims = Self::new(user_id, email);
        claims.exp = (Utc::now() + Duration::seconds(expires_in_secs)).timestamp();
        claims
    }

    pub fn is_expired(&self) -> bool {
        self.exp <= Utc::now().timestamp()
    }

    pub fn user_id(&self) -> Uuid {
        self.sub
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_claims_with_expiration() {
        let id = Uuid::new_v4();
        let claims = Claims::with_expiration(id, None, 3600);
        assert_eq!(claims.user_id(), id);
        assert!(!claims.is_expired());

        let now = Utc::now().timestamp();
        assert!(claims.exp > now);
        assert!(claims.exp <= now + 3600);
    }

    #[test]
    fn test_expired_claims() {
        let mut claims = Claims::new(Uuid::new_v4(), None);
        claims.exp = (Utc::now() - Duration::hours(1)).timestamp();
        assert!(claims.is_expired());
    }

    #[test]
    fn test_deserialize_hosted_token_payload() {
        let payload = serde_json::json!({
            "sub": "6f1c2b1e-0d4a-4c55-9d6c-2f6a1c7e9b10",
            "email": "agent@example.com",
            "role": "authenticated",
            "aud": "authenticated",
            "session_id": "a2b1",
            "iat": 1_700_000_000,
            "exp": 1_700_003_600,
            "app_metadata": { "provider": "email" }
        });

        let claims: Claims = serde_json::from_value(payload).unwrap();
        assert_eq!(claims.email.as_deref(), Some("agent@example.com"));
        assert_eq!(claims.session_id.as_deref(), Some("a2b1"));
        assert_eq!(claims.exp, 1_700_003_600);
    }
}
