//! Actix-web request extractors for authenticated users

use crate::jwt::JwtService;
use crate::Claims;
use actix_web::{dev::Payload, web, FromRequest, HttpRequest};
use dnai_core::error::AppError;
use futures::future::{ready, Ready};
use tracing::{debug, warn};
use uuid::Uuid;

/// Extract the bearer token from the request.
///
/// Checks the Authorization header first, then a cookie named "token".
fn extract_token_from_request(req: &HttpRequest) -> Option<String> {
    if let Some(auth_header) = req.headers().get("Authorization") {
        if let Ok(auth_str) = auth_header.to_str() {
            if let Some(token) = auth_str.strip_prefix("Bearer ") {
                return Some(token.trim().to_string());
            }
        }
    }

    req.cookie("token").map(|cookie| cookie.value().to_string())
}

/// Authenticated user extractor
///
/// Every data access is scoped to `user_id`.
///
/// # Examples
///
/// ```no_run
/// use actix_web::HttpResponse;
/// use dnai_auth::middleware::AuthenticatedUser;
///
/// async fn protected_handler(user: AuthenticatedUser) -> HttpResponse {
///     HttpResponse::Ok().json(serde_json::json!({ "user_id": user.user_id }))
/// }
/// ```
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub user_id: Uuid,

    pub email: Option<String>,

    /// Full claims from the JWT token
    pub claims: Claims,
}

impl FromRequest for AuthenticatedUser {
    type Error = actix_web::Error;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        let Some(jwt_service) = req.app_data::<web::Data<JwtService>>() else {
            warn!("JwtService not found in app data");
            return ready(Err(AppError::Unauthorized(
                "Authentication service not configured".to_string(),
            )
            .into()));
        };

        let Some(token) = extract_token_from_request(req) else {
            debug!("No authentication token found in request");
            return ready(Err(AppError::Unauthorized(
                "No authentication token provided".to_string(),
            )
            .into()));
        };

        match jwt_service.validate_token(&token) {
            Ok(claims) => {
                debug!(user_id = %claims.sub, "User authenticated successfully");

                ready(Ok(AuthenticatedUser {
                    user_id: claims.sub,
                    email: claims.email.clone(),
                    claims,
                }))
            }
            Err(e) => {
                warn!(error = %e, "Token validation failed");
                ready(Err(e.into()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::{http::StatusCode, test, web, App, HttpResponse};

    const SECRET: &str = "middleware-test-secret";

    async fn whoami(user: AuthenticatedUser) -> HttpResponse {
        HttpResponse::Ok().body(user.user_id.to_string())
    }

    fn jwt() -> JwtService {
        JwtService::new(SECRET, "authenticated", 3600)
    }

    #[actix_rt::test]
    async fn test_bearer_token_accepted() {
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(jwt()))
                .route("/me", web::get().to(whoami)),
        )
        .await;

        let user_id = Uuid::new_v4();
        let token = jwt().create_token(&Claims::new(user_id, None)).unwrap();

        let req = test::TestRequest::get()
            .uri("/me")
            .insert_header(("Authorization", format!("Bearer {}", token)))
            .to_request();
        let body = test::call_and_read_body(&app, req).await;

        assert_eq!(body, user_id.to_string().as_bytes());
    }

    #[actix_rt::test]
    async fn test_missing_token_rejected() {
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(jwt()))
                .route("/me", web::get().to(whoami)),
        )
        .await;

        let req = test::TestRequest::get().uri("/me").to_request();
        let resp = test::call_service(&app, req).await;

        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }

    #[actix_rt::test]
    async fn test_token_cookie_accepted() {
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(jwt()))
                .route("/me", web::get().to(whoami)),
        )
        .await;

        let token = jwt().create_token(&Claims::new(Uuid::new_v4(), None)).unwrap();
        let req = test::TestRequest::get()
            .uri("/me")
            .cookie(actix_web::cookie::Cookie::new("token", token))
            .to_request();
        let resp = test::call_service(&app, req).await;

        assert_eq!(resp.status(), StatusCode::OK);
    }
}
