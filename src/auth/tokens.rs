//! Access, refresh and verification token issuance.
//!
//! Access tokens are self-contained signed JWTs: downstream request handling
//! never needs a store lookup, at the cost of being unrevocable until expiry.
//! Refresh and verification tokens are opaque random capability handles whose
//! state lives in the store.

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::db::{Role, User};

use super::error::AuthError;

/// Claims embedded in an access token. A point-in-time snapshot: role changes
/// only take effect for a principal on their next refresh or login.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// User id
    pub sub: String,
    pub email: String,
    pub role: Role,
    pub iat: usize,
    pub exp: usize,
}

#[derive(Clone)]
pub struct TokenIssuer {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    access_token_minutes: i64,
    refresh_token_days: i64,
}

impl TokenIssuer {
    pub fn new(secret: &[u8], access_token_minutes: i64, refresh_token_days: i64) -> Self {
        let mut validation = Validation::default();
        // Exact expiry boundary, no clock leeway
        validation.leeway = 0;
        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            validation,
            access_token_minutes,
            refresh_token_days,
        }
    }

    /// Sign a short-lived access token for the given user.
    pub fn issue_access_token(&self, user: &User) -> Result<String, AuthError> {
        self.issue_access_token_at(user, Utc::now())
    }

    pub(crate) fn issue_access_token_at(
        &self,
        user: &User,
        now: DateTime<Utc>,
    ) -> Result<String, AuthError> {
        let iat = now.timestamp() as usize;
        let exp = (now + Duration::minutes(self.access_token_minutes)).timestamp() as usize;
        let claims = Claims {
            sub: user.id.clone(),
            email: user.email.clone(),
            role: user.role,
            iat,
            exp,
        };
        encode(&Header::default(), &claims, &self.encoding_key)
            .map_err(|_| AuthError::TokenInvalid)
    }

    /// Validate signature and expiry. Expiry is a distinct error so callers
    /// can tell clients to refresh instead of re-login.
    pub fn verify_access_token(&self, token: &str) -> Result<Claims, AuthError> {
        match decode::<Claims>(token, &self.decoding_key, &self.validation) {
            Ok(data) => Ok(data.claims),
            Err(e) if matches!(e.kind(), jsonwebtoken::errors::ErrorKind::ExpiredSignature) => {
                Err(AuthError::TokenExpired)
            }
            Err(_) => Err(AuthError::TokenInvalid),
        }
    }

    /// Generate an opaque refresh token: 64 random bytes, hex-encoded.
    pub fn issue_refresh_token(&self) -> String {
        let bytes: [u8; 64] = rand::rng().random();
        hex::encode(bytes)
    }

    pub fn refresh_token_expiry(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now + Duration::days(self.refresh_token_days)
    }

    /// Generate an opaque email-verification token: 32 random bytes, hex-encoded.
    pub fn issue_verification_token(&self) -> String {
        let bytes: [u8; 32] = rand::rng().random();
        hex::encode(bytes)
    }

    /// Verification links are valid for a fixed 24 hours.
    pub fn verification_token_expiry(now: DateTime<Utc>) -> DateTime<Utc> {
        now + Duration::hours(24)
    }
}
