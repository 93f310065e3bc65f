//! JWT token validation service
//!
//! Validates HS256 access tokens signed with the hosted auth service's JWT
//! secret. Token creation is kept for tests and local tooling.

use crate::claims::Claims;
use chrono::{Duration, Utc};
use dnai_core::error::AppError;
use jsonwebtoken::{
    decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use tracing::{debug, error, warn};

/// JWT Service for token creation and validation
#[derive(Clone)]
pub struct JwtService {
    audience: String,

    /// Default token expiration time in seconds
    expiration_secs: i64,

    encoding_key: EncodingKey,

    decoding_key: DecodingKey,
}

impl JwtService {
    /// Create a new JWT service
    ///
    /// # Examples
    ///
    /// ```
    /// use dnai_auth::JwtService;
    ///
    /// let jwt_service = JwtService::new("my-secret-key", "authenticated", 3600);
    /// ```
    pub fn new(secret: &str, audience: &str, expiration_secs: i64) -> Self {
        Self {
            audience: audience.to_string(),
            expiration_secs,
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
        }
    }

    /// Create a signed token from claims.
    ///
    /// A zero `exp` is replaced with now plus the default expiration.
    pub fn create_token(&self, claims: &Claims) -> Result<String, AppError> {
        let mut token_claims = claims.clone();

        if token_claims.exp == 0 {
            let exp = Utc::now() + Duration::seconds(self.expiration_secs);
            token_claims.exp = exp.timestamp();
        }

        debug!(user_id = %token_claims.sub, exp = %token_claims.exp, "Creating JWT token");

        encode(&Header::new(Algorithm::HS256), &token_claims, &self.encoding_key).map_err(|e| {
            error!(error = %e, "Failed to create JWT token");
            AppError::InvalidToken(format!("Token creation failed: {}", e))
        })
    }

    /// Validate a JWT token and extract claims
    ///
    /// # Errors
    ///
    /// Returns:
    /// - `AppError::TokenExpired` if the token has expired
    /// - `AppError::InvalidToken` if the signature, audience or payload is wrong
    ///
    /// # Examples
    ///
    /// ```
    /// use dnai_auth::{Claims, JwtService};
    /// use uuid::Uuid;
    ///
    /// let jwt_service = JwtService::new("secret", "authenticated", 3600);
    /// let user_id = Uuid::new_v4();
    /// let token = jwt_service.create_token(&Claims::new(user_id, None))?;
    /// let decoded = jwt_service.validate_token(&token)?;
    /// assert_eq!(decoded.sub, user_id);
    /// # Ok::<(), dnai_core::error::AppError>(())
    /// ```
    pub fn validate_token(&self, token: &str) -> Result<Claims, AppError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_audience(&[&self.audience]);
        validation.leeway = 0;

        let token_data = decode::<Claims>(token, &self.decoding_key, &validation).map_err(|e| {
            if matches!(e.kind(), ErrorKind::ExpiredSignature) {
                warn!("Token expired");
                return AppError::TokenExpired;
            }

            warn!(error = %e, "Invalid token");
            AppError::InvalidToken(format!("Token validation failed: {}", e))
        })?;

        let claims = token_data.claims;
        debug!(user_id = %claims.sub, "Token validated successfully");

        Ok(claims)
    }

    pub fn expiration_secs(&self) -> i64 {
        self.expiration_secs
    }
}

impl std::fmt::Debug for JwtService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtService")
            .field("audience", &self.audience)
            .field("expiration_secs", &self.expiration_secs)
            .field("secret", &"[REDACTED]")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    const TEST_SECRET: &str = "test-secret-key-for-jwt-testing-12345";

    fn service() -> JwtService {
        JwtService::new(TEST_SECRET, "authenticated", 3600)
    }

    #[test]
    fn test_create_and_validate_token() {
        let user_id = Uuid::new_v4();
        let claims = Claims::new(user_id, Some("owner@example.com"));

        let token = service().create_token(&claims).unwrap();
        let decoded = service().validate_token(&token).unwrap();

        assert_eq!(decoded.sub, user_id);
        assert_eq!(decoded.email.as_deref(), Some("owner@example.com"));
        assert!(decoded.exp > Utc::now().timestamp());
    }

    #[test]
    fn test_expired_token() {
        let claims = Claims::with_expiration(Uuid::new_v4(), None, -10);
        let token = service().create_token(&claims).unwrap();

        let result = service().validate_token(&token);
        assert!(matches!(result, Err(AppError::TokenExpired)));
    }

    #[test]
    fn test_invalid_token() {
        let result = service().validate_token("invalid.token.here");
        assert!(matches!(result, Err(AppError::InvalidToken(_))));
    }

    #[test]
    fn test_token_with_different_secret() {
        let other = JwtService::new("another-secret", "authenticated", 3600);
        let token = other.create_token(&Claims::new(Uuid::new_v4(), None)).unwrap();

        let result = service().validate_token(&token);
        assert!(matches!(result, Err(AppError::InvalidToken(_))));
    }

    #[test]
    fn test_wrong_audience_rejected() {
        let mut claims = Claims::new(Uuid::new_v4(), None);
        claims.aud = "anon".to_string();
        let token = service().create_token(&claims).unwrap();

        let result = service().validate_token(&token);
        assert!(matches!(result, Err(AppError::InvalidToken(_))));
    }

    #[test]
    fn test_debug_impl_hides_secret() {
        let debug_str = format!("{:?}", service());

        assert!(debug_str.contains("JwtService"));
        assert!(debug_str.contains("[REDACTED]"));
        assert!(!debug_str.contains(TEST_SECRET));
    }
}
