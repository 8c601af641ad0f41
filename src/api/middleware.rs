//! Request authorization: bearer-token validation and role gating.
//!
//! `require_auth` attaches the verified [`Claims`] to the request extensions;
//! role checks and handlers read them from there. Claims are a point-in-time
//! snapshot of the user's role, refreshed only on token refresh or login.

use axum::{
    async_trait,
    extract::{FromRequestParts, Request, State},
    http::request::Parts,
    middleware::Next,
    response::Response,
};
use std::sync::Arc;

use crate::auth::{AuthError, Claims};
use crate::db::Role;
use crate::AppState;

use super::error::ApiError;

/// Extract the bearer token from the Authorization header
fn bearer_token(headers: &axum::http::HeaderMap) -> Option<&str> {
    headers
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .filter(|t| !t.is_empty())
}

/// Middleware that rejects requests without a valid access token.
///
/// Expired tokens are surfaced with the distinct `token_expired` code so
/// clients know to refresh rather than re-login.
pub async fn require_auth(
    State(state): State<Arc<AppState>>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = bearer_token(request.headers()).ok_or(AuthError::Unauthenticated)?;

    let claims = state.auth.tokens().verify_access_token(token)?;
    request.extensions_mut().insert(claims);

    Ok(next.run(request).await)
}

/// Best-effort variant of `require_auth`: attaches claims when a valid token
/// is present and silently continues otherwise.
pub async fn optional_auth(
    State(state): State<Arc<AppState>>,
    mut request: Request,
    next: Next,
) -> Response {
    if let Some(token) = bearer_token(request.headers()) {
        if let Ok(claims) = state.auth.tokens().verify_access_token(token) {
            tracing::debug!(user_id = %claims.sub, "Authenticated caller on public route");
            request.extensions_mut().insert(claims);
        }
    }
    next.run(request).await
}

/// Role gate; must run after `require_auth`.
pub async fn require_role(
    allowed: &[Role],
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let claims = request
        .extensions()
        .get::<Claims>()
        .ok_or(AuthError::Unauthenticated)?;

    if !allowed.contains(&claims.role) {
        return Err(ApiError::forbidden("Insufficient permissions"));
    }

    Ok(next.run(request).await)
}

pub async fn require_admin(request: Request, next: Next) -> Result<Response, ApiError> {
    require_role(&[Role::Admin], request, next).await
}

/// Extractor for the claims attached by `require_auth`
#[async_trait]
impl<S> FromRequestParts<S> for Claims
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Claims>()
            .cloned()
            .ok_or_else(|| ApiError::from(AuthError::Unauthenticated))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{AuthService, AuthSettings, TokenIssuer};
    use crate::config::Config;
    use crate::mailer::LogMailer;
    use crate::store::{MemoryStore, NewUser, UserStore};
    use axum::{
        body::Body,
        http::{header, HeaderMap, Request},
        routing::get,
        Router,
    };
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    #[test]
    fn test_bearer_token_extraction() {
        let mut headers = HeaderMap::new();
        assert!(bearer_token(&headers).is_none());

        headers.insert("Authorization", "Bearer abc123".parse().unwrap());
        assert_eq!(bearer_token(&headers), Some("abc123"));

        headers.insert("Authorization", "Basic abc123".parse().unwrap());
        assert!(bearer_token(&headers).is_none());

        headers.insert("Authorization", "Bearer ".parse().unwrap());
        assert!(bearer_token(&headers).is_none());
    }

    // Handler that reports whether optional_auth attached claims
    async fn whoami(claims: Option<Claims>) -> String {
        claims.map(|c| c.sub).unwrap_or_default()
    }

    #[tokio::test]
    async fn test_optional_auth_attaches_claims_when_token_is_valid() {
        let store = Arc::new(MemoryStore::new());
        let user = store
            .create_user(NewUser {
                email: "a@x.test".to_string(),
                password_hash: "hash".to_string(),
                name: "A".to_string(),
                role: Role::Viewer,
                email_verified: true,
            })
            .await
            .unwrap();

        let tokens = TokenIssuer::new(b"mw-test-secret", 15, 7);
        let token = tokens.issue_access_token(&user).unwrap();
        let auth = AuthService::new(
            store,
            tokens,
            Arc::new(LogMailer::new("http://localhost:3000".to_string())),
            AuthSettings {
                registration_enabled: false,
                admin_email: None,
                admin_password: None,
            },
        );
        let state = Arc::new(AppState {
            config: Config::default(),
            auth,
        });

        let router = Router::new()
            .route("/whoami", get(whoami))
            .layer(axum::middleware::from_fn_with_state(
                state.clone(),
                optional_auth,
            ))
            .with_state(state);

        // Valid bearer token attaches claims
        let response = router
            .clone()
            .oneshot(
                Request::get("/whoami")
                    .header(header::AUTHORIZATION, format!("Bearer {token}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(body, user.id.as_bytes());

        // No token and a garbage token both pass through without claims
        for request in [
            Request::get("/whoami").body(Body::empty()).unwrap(),
            Request::get("/whoami")
                .header(header::AUTHORIZATION, "Bearer not-a-jwt")
                .body(Body::empty())
                .unwrap(),
        ] {
            let response = router.clone().oneshot(request).await.unwrap();
            let body = response.into_body().collect().await.unwrap().to_bytes();
            assert!(body.is_empty());
        }
    }
}
