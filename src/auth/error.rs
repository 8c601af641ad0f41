//! Error taxonomy for the authentication core.
//!
//! Every variant maps to exactly one user-facing message; the HTTP status
//! mapping lives in `api::error`. `InvalidCredentials` is deliberately the
//! same error for "no such email" and "wrong password" so login failures
//! cannot be used to enumerate accounts.

use crate::store::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Invalid email or password")]
    InvalidCredentials,
    #[error("An account with this email already exists")]
    DuplicateEmail,
    #[error("Invalid role. Must be one of: admin, manager, viewer")]
    InvalidRole,
    #[error("Public registration is disabled")]
    RegistrationDisabled,
    #[error("Token has expired")]
    TokenExpired,
    #[error("Invalid token")]
    TokenInvalid,
    #[error("Token not found")]
    TokenNotFound,
    #[error("Missing refresh token")]
    MissingToken,
    #[error("Authentication required")]
    Unauthenticated,
    #[error("{0}")]
    Forbidden(String),
    #[error("User not found")]
    UserNotFound,
    #[error("Failed to send verification email")]
    EmailDeliveryFailed,
    #[error("Password hashing failed")]
    HashingError,
    #[error(transparent)]
    Store(#[from] StoreError),
}
