//! Authentication endpoints.
//!
//! The refresh token travels exclusively in an HTTP-only, SameSite=Strict
//! cookie scoped to the auth API path; the access token is returned in the
//! JSON body and is the client's responsibility to send as a bearer header.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::auth::{AuthError, Claims, SessionTokens};
use crate::db::UserResponse;
use crate::AppState;

use super::error::{ApiError, ValidationErrorBuilder};
use super::validation;

pub const REFRESH_COOKIE: &str = "inboxr_refresh";
const REFRESH_COOKIE_PATH: &str = "/api/auth";

fn refresh_cookie(token: String) -> Cookie<'static> {
    Cookie::build((REFRESH_COOKIE, token))
        .path(REFRESH_COOKIE_PATH)
        .http_only(true)
        .same_site(SameSite::Strict)
        .build()
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub name: String,
    #[serde(default)]
    pub role: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PublicRegisterRequest {
    pub email: String,
    pub password: String,
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct VerifyEmailQuery {
    #[serde(default)]
    pub token: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct VerifyEmailResponse {
    pub message: String,
    pub user: UserResponse,
}

#[derive(Debug, Serialize)]
pub struct RegistrationEnabledResponse {
    pub enabled: bool,
}

fn validate_registration(email: &str, password: &str, name: &str) -> Result<(), ApiError> {
    let mut builder = ValidationErrorBuilder::new();
    if let Err(e) = validation::validate_email(email) {
        builder.add("email", e);
    }
    if let Err(e) = validation::validate_password(password) {
        builder.add("password", e);
    }
    if let Err(e) = validation::validate_name(name) {
        builder.add("name", e);
    }
    builder.finish()
}

/// Login endpoint
///
/// POST /api/auth/login
pub async fn login(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Json(request): Json<LoginRequest>,
) -> Result<(CookieJar, Json<SessionTokens>), ApiError> {
    if request.email.is_empty() || request.password.is_empty() {
        return Err(ApiError::bad_request("Email and password are required"));
    }

    let session = state.auth.login(&request.email, &request.password).await?;
    let jar = jar.add(refresh_cookie(session.refresh_token.clone()));
    Ok((jar, Json(session)))
}

/// Rotate the refresh cookie and issue a new access token
///
/// POST /api/auth/refresh
pub async fn refresh(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
) -> Result<(CookieJar, Json<SessionTokens>), ApiError> {
    let token = jar
        .get(REFRESH_COOKIE)
        .map(|c| c.value().to_string())
        .unwrap_or_default();

    let session = state.auth.refresh(&token).await?;
    let jar = jar.add(refresh_cookie(session.refresh_token.clone()));
    Ok((jar, Json(session)))
}

/// End the current session; idempotent
///
/// POST /api/auth/logout
pub async fn logout(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
) -> Result<(CookieJar, Json<MessageResponse>), ApiError> {
    if let Some(cookie) = jar.get(REFRESH_COOKIE) {
        state.auth.logout(cookie.value()).await?;
    }
    let jar = jar.remove(refresh_cookie(String::new()));
    Ok((
        jar,
        Json(MessageResponse {
            message: "Logged out".to_string(),
        }),
    ))
}

/// Admin-issued registration
///
/// POST /api/auth/register
pub async fn register(
    State(state): State<Arc<AppState>>,
    claims: Claims,
    Json(request): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<UserResponse>), ApiError> {
    validate_registration(&request.email, &request.password, &request.name)?;

    let user = state
        .auth
        .register_admin(
            &claims,
            &request.email,
            &request.password,
            &request.name,
            request.role.as_deref(),
        )
        .await?;

    Ok((StatusCode::CREATED, Json(user)))
}

/// Self-registration: creates a pending verification and emails the link
///
/// POST /api/auth/register-public
pub async fn register_public(
    State(state): State<Arc<AppState>>,
    Json(request): Json<PublicRegisterRequest>,
) -> Result<(StatusCode, Json<MessageResponse>), ApiError> {
    validate_registration(&request.email, &request.password, &request.name)?;

    state
        .auth
        .register_public(&request.email, &request.password, &request.name)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(MessageResponse {
            message: "Verification email sent. Check your inbox to complete registration."
                .to_string(),
        }),
    ))
}

/// Complete a pending self-registration
///
/// GET /api/auth/verify-email?token=
pub async fn verify_email(
    State(state): State<Arc<AppState>>,
    Query(query): Query<VerifyEmailQuery>,
) -> Result<Json<VerifyEmailResponse>, ApiError> {
    let token = query
        .token
        .filter(|t| !t.is_empty())
        .ok_or_else(|| ApiError::bad_request("Verification token is required"))?;

    match state.auth.verify_email(&token).await {
        Ok(user) => Ok(Json(VerifyEmailResponse {
            message: "Email verified. You can now log in.".to_string(),
            user,
        })),
        // Bad verification links are client errors, not auth failures
        Err(err @ (AuthError::TokenNotFound | AuthError::TokenExpired)) => {
            Err(ApiError::from(err).with_status(StatusCode::BAD_REQUEST))
        }
        Err(err) => Err(err.into()),
    }
}

/// The caller's own account
///
/// GET /api/auth/me
pub async fn me(
    State(state): State<Arc<AppState>>,
    claims: Claims,
) -> Result<Json<UserResponse>, ApiError> {
    let user = state.auth.current_user(&claims).await?;
    Ok(Json(user))
}

/// Whether public self-registration is open
///
/// GET /api/auth/registration-enabled
pub async fn registration_enabled(
    State(state): State<Arc<AppState>>,
) -> Json<RegistrationEnabledResponse> {
    Json(RegistrationEnabledResponse {
        enabled: state.auth.registration_enabled(),
    })
}
