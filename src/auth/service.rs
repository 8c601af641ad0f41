//! Session lifecycle orchestration: login, refresh rotation, logout,
//! registration flows, first-admin bootstrap and token garbage collection.
//!
//! All cross-request coordination goes through the store's atomic single-row
//! operations; the service itself holds no mutable state. Log lines carry
//! identifiers and error kinds only, never raw passwords or token values.

use std::str::FromStr;
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tracing::{info, warn};

use crate::config::AuthConfig;
use crate::db::{is_expired, Role, UserResponse};
use crate::mailer::Mailer;
use crate::store::{NewUser, NewVerificationToken, StoreError, UserStore};

use super::error::AuthError;
use super::password::{hash_password, verify_password};
use super::tokens::{Claims, TokenIssuer};

/// Settings the service needs at runtime, extracted from [`AuthConfig`].
#[derive(Debug, Clone)]
pub struct AuthSettings {
    pub registration_enabled: bool,
    pub admin_email: Option<String>,
    pub admin_password: Option<String>,
}

impl From<&AuthConfig> for AuthSettings {
    fn from(config: &AuthConfig) -> Self {
        Self {
            registration_enabled: config.registration_enabled,
            admin_email: config.admin_email.clone(),
            admin_password: config.admin_password.clone(),
        }
    }
}

/// Result of a successful login or refresh. The refresh token goes into an
/// HTTP-only cookie by the transport layer and never into a response body.
#[derive(Debug, Clone, Serialize)]
pub struct SessionTokens {
    pub user: UserResponse,
    pub access_token: String,
    #[serde(skip)]
    pub refresh_token: String,
}

/// The unique email index is the last line of defense when two registrations
/// race past the existence precheck.
fn duplicate_email(err: StoreError) -> AuthError {
    match err {
        StoreError::Duplicate(_) => AuthError::DuplicateEmail,
        other => AuthError::Store(other),
    }
}

#[derive(Clone)]
pub struct AuthService {
    store: Arc<dyn UserStore>,
    tokens: TokenIssuer,
    mailer: Arc<dyn Mailer>,
    settings: AuthSettings,
}

impl AuthService {
    pub fn new(
        store: Arc<dyn UserStore>,
        tokens: TokenIssuer,
        mailer: Arc<dyn Mailer>,
        settings: AuthSettings,
    ) -> Self {
        Self {
            store,
            tokens,
            mailer,
            settings,
        }
    }

    pub fn tokens(&self) -> &TokenIssuer {
        &self.tokens
    }

    pub fn registration_enabled(&self) -> bool {
        self.settings.registration_enabled
    }

    /// Authenticate with email and password, starting a new session.
    ///
    /// Unknown email and wrong password are indistinguishable to the caller.
    pub async fn login(&self, email: &str, password: &str) -> Result<SessionTokens, AuthError> {
        let user = self
            .store
            .find_user_by_email(email)
            .await?
            .ok_or(AuthError::InvalidCredentials)?;

        if !verify_password(password, &user.password_hash) {
            warn!(user_id = %user.id, "Login failed: bad password");
            return Err(AuthError::InvalidCredentials);
        }

        let access_token = self.tokens.issue_access_token(&user)?;
        let refresh_token = self.tokens.issue_refresh_token();
        let expires_at = self.tokens.refresh_token_expiry(Utc::now()).to_rfc3339();
        self.store
            .save_refresh_token(&user.id, &refresh_token, &expires_at)
            .await?;

        info!(user_id = %user.id, "User logged in");

        Ok(SessionTokens {
            user: UserResponse::from(user),
            access_token,
            refresh_token,
        })
    }

    /// Rotate a refresh token: the presented token is consumed atomically and
    /// a fresh access/refresh pair is issued. A token can therefore be
    /// rotated at most once; replaying it after use fails with
    /// [`AuthError::TokenNotFound`].
    pub async fn refresh(&self, refresh_token: &str) -> Result<SessionTokens, AuthError> {
        if refresh_token.is_empty() {
            return Err(AuthError::MissingToken);
        }

        // Consume first: the row is gone no matter which error path follows,
        // so two racing calls can never both rotate the same token.
        let stored = self
            .store
            .consume_refresh_token(refresh_token)
            .await?
            .ok_or(AuthError::TokenNotFound)?;

        if is_expired(&stored.expires_at) {
            return Err(AuthError::TokenExpired);
        }

        // User may have been deleted while the session was live; the consumed
        // token stays deleted.
        let user = self
            .store
            .find_user_by_id(&stored.user_id)
            .await?
            .ok_or(AuthError::UserNotFound)?;

        let access_token = self.tokens.issue_access_token(&user)?;
        let new_refresh_token = self.tokens.issue_refresh_token();
        let expires_at = self.tokens.refresh_token_expiry(Utc::now()).to_rfc3339();
        self.store
            .save_refresh_token(&user.id, &new_refresh_token, &expires_at)
            .await?;

        Ok(SessionTokens {
            user: UserResponse::from(user),
            access_token,
            refresh_token: new_refresh_token,
        })
    }

    /// End the session owning this refresh token. Idempotent: an unknown or
    /// already-deleted token is not an error.
    pub async fn logout(&self, refresh_token: &str) -> Result<(), AuthError> {
        if !refresh_token.is_empty() {
            self.store.delete_refresh_token(refresh_token).await?;
        }
        Ok(())
    }

    /// Admin-issued registration. The acting principal's admin role is
    /// re-checked here even though the transport layer already gates the
    /// route.
    pub async fn register_admin(
        &self,
        acting: &Claims,
        email: &str,
        password: &str,
        name: &str,
        role: Option<&str>,
    ) -> Result<UserResponse, AuthError> {
        if acting.role != Role::Admin {
            return Err(AuthError::Forbidden(
                "Only admins can register users".to_string(),
            ));
        }

        let role = match role {
            Some(r) => Role::from_str(r).map_err(|_| AuthError::InvalidRole)?,
            None => Role::Viewer,
        };

        if self.store.find_user_by_email(email).await?.is_some() {
            return Err(AuthError::DuplicateEmail);
        }

        let password_hash = hash_password(password)?;
        let user = self
            .store
            .create_user(NewUser {
                email: email.to_string(),
                password_hash,
                name: name.to_string(),
                role,
                // Admin-issued accounts are pre-trusted; no email loop
                email_verified: true,
            })
            .await
            .map_err(duplicate_email)?;

        info!(user_id = %user.id, role = %user.role, admin_id = %acting.sub, "User registered by admin");

        Ok(UserResponse::from(user))
    }

    /// Self-registration, step one: stash the registration payload behind an
    /// emailed single-use verification token. The password is hashed here so
    /// the plaintext is never stored or re-transmitted.
    ///
    /// Repeated calls for the same email replace the pending token, so there
    /// is always at most one live verification link per address.
    pub async fn register_public(
        &self,
        email: &str,
        password: &str,
        name: &str,
    ) -> Result<(), AuthError> {
        if !self.settings.registration_enabled {
            return Err(AuthError::RegistrationDisabled);
        }

        // Checked against users, not pending verifications: an admin-created
        // account blocks self-registration with the same email.
        if self.store.find_user_by_email(email).await?.is_some() {
            return Err(AuthError::DuplicateEmail);
        }

        let password_hash = hash_password(password)?;
        let token = self.tokens.issue_verification_token();
        let expires_at = TokenIssuer::verification_token_expiry(Utc::now()).to_rfc3339();

        self.store
            .create_verification_token(NewVerificationToken {
                token: token.clone(),
                email: email.to_string(),
                name: name.to_string(),
                password_hash,
                expires_at,
            })
            .await?;

        if let Err(e) = self
            .mailer
            .send_verification_email(email, name, &token)
            .await
        {
            // The pending token stays valid, so the user can retry
            warn!(email = %email, error = %e, "Failed to send verification email");
            return Err(AuthError::EmailDeliveryFailed);
        }

        info!(email = %email, "Verification email dispatched");

        Ok(())
    }

    /// Self-registration, step two: exchange a verification token for a user
    /// account. The token is deleted on every exit path, making it single-use.
    pub async fn verify_email(&self, token: &str) -> Result<UserResponse, AuthError> {
        let pending = self
            .store
            .find_verification_token(token)
            .await?
            .ok_or(AuthError::TokenNotFound)?;

        if is_expired(&pending.expires_at) {
            self.store.delete_verification_token(token).await?;
            return Err(AuthError::TokenExpired);
        }

        // An admin may have created this account while verification was
        // pending; the stale payload must not overwrite it.
        if self
            .store
            .find_user_by_email(&pending.email)
            .await?
            .is_some()
        {
            self.store.delete_verification_token(token).await?;
            return Err(AuthError::DuplicateEmail);
        }

        let user = self
            .store
            .create_user(NewUser {
                email: pending.email,
                password_hash: pending.password_hash,
                name: pending.name,
                // Self-registered users are never auto-promoted
                role: Role::Viewer,
                email_verified: true,
            })
            .await
            .map_err(duplicate_email)?;
        self.store.delete_verification_token(token).await?;

        info!(user_id = %user.id, "Email verified, account created");

        Ok(UserResponse::from(user))
    }

    /// Seed the first admin account at process startup. No-op unless the user
    /// table is empty and both admin credentials are configured. Concurrent
    /// process starts must be serialized externally; the unique email index
    /// is the backstop.
    pub async fn bootstrap_initial_admin(&self) -> Result<(), AuthError> {
        let (email, password) = match (&self.settings.admin_email, &self.settings.admin_password) {
            (Some(email), Some(password)) => (email, password),
            _ => return Ok(()),
        };

        if self.store.get_user_count().await? > 0 {
            return Ok(());
        }

        let password_hash = hash_password(password)?;
        let user = self
            .store
            .create_user(NewUser {
                email: email.clone(),
                password_hash,
                name: "Administrator".to_string(),
                role: Role::Admin,
                email_verified: true,
            })
            .await?;

        info!(user_id = %user.id, "Bootstrapped initial admin account");

        Ok(())
    }

    /// Garbage-collect expired refresh tokens. Safe to run concurrently with
    /// anything: it only removes rows that are already unusable.
    pub async fn cleanup_expired_tokens(&self) -> Result<u64, AuthError> {
        let removed = self.store.delete_expired_refresh_tokens().await?;
        if removed > 0 {
            info!(removed, "Cleaned up expired refresh tokens");
        }
        Ok(removed)
    }

    pub async fn cleanup_expired_verification_tokens(&self) -> Result<u64, AuthError> {
        let removed = self.store.delete_expired_verification_tokens().await?;
        if removed > 0 {
            info!(removed, "Cleaned up expired verification tokens");
        }
        Ok(removed)
    }

    /// Look up the caller's own account from their token claims.
    pub async fn current_user(&self, claims: &Claims) -> Result<UserResponse, AuthError> {
        let user = self
            .store
            .find_user_by_id(&claims.sub)
            .await?
            .ok_or(AuthError::UserNotFound)?;
        Ok(UserResponse::from(user))
    }

    pub async fn list_users(&self) -> Result<Vec<UserResponse>, AuthError> {
        let users = self.store.get_all_users().await?;
        Ok(users.into_iter().map(UserResponse::from).collect())
    }

    /// Change a user's role. A caller may not change their own role, even as
    /// admin. Already-issued access tokens keep the old role claim until
    /// their next refresh or login.
    pub async fn update_user_role(
        &self,
        acting: &Claims,
        user_id: &str,
        role: &str,
    ) -> Result<(), AuthError> {
        if acting.sub == user_id {
            return Err(AuthError::Forbidden(
                "You cannot change your own role".to_string(),
            ));
        }
        let role = Role::from_str(role).map_err(|_| AuthError::InvalidRole)?;
        if !self.store.update_user_role(user_id, role).await? {
            return Err(AuthError::UserNotFound);
        }
        info!(user_id = %user_id, role = %role, admin_id = %acting.sub, "User role updated");
        Ok(())
    }

    pub async fn update_user_name(&self, user_id: &str, name: &str) -> Result<(), AuthError> {
        if !self.store.update_user_name(user_id, name).await? {
            return Err(AuthError::UserNotFound);
        }
        Ok(())
    }

    /// Delete a user and, by cascade, all their sessions. Self-deletion is
    /// rejected.
    pub async fn delete_user(&self, acting: &Claims, user_id: &str) -> Result<(), AuthError> {
        if acting.sub == user_id {
            return Err(AuthError::Forbidden(
                "You cannot delete your own account".to_string(),
            ));
        }
        if !self.store.delete_user(user_id).await? {
            return Err(AuthError::UserNotFound);
        }
        info!(user_id = %user_id, admin_id = %acting.sub, "User deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use parking_lot::Mutex;

    struct CaptureMailer {
        sent: Mutex<Vec<(String, String)>>,
    }

    impl CaptureMailer {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                sent: Mutex::new(Vec::new()),
            })
        }

        fn last_token(&self) -> Option<String> {
            self.sent.lock().last().map(|(_, token)| token.clone())
        }
    }

    #[async_trait::async_trait]
    impl Mailer for CaptureMailer {
        async fn send_verification_email(
            &self,
            to_email: &str,
            _name: &str,
            token: &str,
        ) -> anyhow::Result<()> {
            self.sent
                .lock()
                .push((to_email.to_string(), token.to_string()));
            Ok(())
        }
    }

    struct FailMailer;

    #[async_trait::async_trait]
    impl Mailer for FailMailer {
        async fn send_verification_email(
            &self,
            _to_email: &str,
            _name: &str,
            _token: &str,
        ) -> anyhow::Result<()> {
            Err(anyhow::anyhow!("smtp connection refused"))
        }
    }

    struct Harness {
        service: AuthService,
        store: Arc<MemoryStore>,
        mailer: Arc<CaptureMailer>,
    }

    fn harness_with(mailer: Arc<dyn Mailer>, registration_enabled: bool) -> (AuthService, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let service = AuthService::new(
            store.clone(),
            TokenIssuer::new(b"test-secret", 15, 7),
            mailer,
            AuthSettings {
                registration_enabled,
                admin_email: Some("admin@x.test".to_string()),
                admin_password: Some("Secret123".to_string()),
            },
        );
        (service, store)
    }

    fn harness() -> Harness {
        let mailer = CaptureMailer::new();
        let (service, store) = harness_with(mailer.clone(), true);
        Harness {
            service,
            store,
            mailer,
        }
    }

    fn admin_claims(user_id: &str) -> Claims {
        Claims {
            sub: user_id.to_string(),
            email: "admin@x.test".to_string(),
            role: Role::Admin,
            iat: 0,
            exp: usize::MAX,
        }
    }

    async fn bootstrap(h: &Harness) -> UserResponse {
        h.service.bootstrap_initial_admin().await.unwrap();
        h.service
            .store
            .find_user_by_email("admin@x.test")
            .await
            .unwrap()
            .map(UserResponse::from)
            .unwrap()
    }

    #[tokio::test]
    async fn test_bootstrap_creates_single_admin() {
        let h = harness();
        let admin = bootstrap(&h).await;
        assert_eq!(admin.role, Role::Admin);
        assert!(admin.email_verified);
        assert_eq!(h.store.get_user_count().await.unwrap(), 1);

        // Second run is a no-op
        h.service.bootstrap_initial_admin().await.unwrap();
        assert_eq!(h.store.get_user_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_bootstrap_noop_without_config() {
        let (service, store) = harness_with(CaptureMailer::new(), true);
        let service = AuthService::new(
            store.clone(),
            service.tokens.clone(),
            CaptureMailer::new(),
            AuthSettings {
                registration_enabled: true,
                admin_email: None,
                admin_password: None,
            },
        );
        service.bootstrap_initial_admin().await.unwrap();
        assert_eq!(store.get_user_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_login_success_and_failure_modes() {
        let h = harness();
        bootstrap(&h).await;

        let session = h.service.login("admin@x.test", "Secret123").await.unwrap();
        assert!(!session.access_token.is_empty());
        assert_eq!(session.refresh_token.len(), 128);
        assert_eq!(session.user.email, "admin@x.test");

        // Wrong password and unknown email fail identically
        let wrong = h.service.login("admin@x.test", "wrong").await.unwrap_err();
        let unknown = h.service.login("nobody@x.test", "Secret123").await.unwrap_err();
        assert!(matches!(wrong, AuthError::InvalidCredentials));
        assert!(matches!(unknown, AuthError::InvalidCredentials));
    }

    #[tokio::test]
    async fn test_refresh_rotates_and_rejects_replay() {
        let h = harness();
        bootstrap(&h).await;
        let session = h.service.login("admin@x.test", "Secret123").await.unwrap();
        let old_refresh = session.refresh_token.clone();

        let rotated = h.service.refresh(&old_refresh).await.unwrap();
        assert_ne!(rotated.refresh_token, old_refresh);
        assert!(!rotated.access_token.is_empty());

        // Old token is gone from the store; replay fails
        assert!(h
            .store
            .find_refresh_token(&old_refresh)
            .await
            .unwrap()
            .is_none());
        assert!(h
            .store
            .find_refresh_token(&rotated.refresh_token)
            .await
            .unwrap()
            .is_some());
        assert!(matches!(
            h.service.refresh(&old_refresh).await,
            Err(AuthError::TokenNotFound)
        ));
    }

    #[tokio::test]
    async fn test_refresh_rejects_missing_and_expired() {
        let h = harness();
        let admin = bootstrap(&h).await;

        assert!(matches!(
            h.service.refresh("").await,
            Err(AuthError::MissingToken)
        ));
        assert!(matches!(
            h.service.refresh("unknown").await,
            Err(AuthError::TokenNotFound)
        ));

        let past = (Utc::now() - chrono::Duration::hours(1)).to_rfc3339();
        h.store
            .save_refresh_token(&admin.id, "stale", &past)
            .await
            .unwrap();
        assert!(matches!(
            h.service.refresh("stale").await,
            Err(AuthError::TokenExpired)
        ));
        // Expired token was deleted on presentation
        assert!(h.store.find_refresh_token("stale").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_refresh_for_deleted_user_leaves_no_session() {
        let h = harness();
        let admin = bootstrap(&h).await;
        let claims = admin_claims(&admin.id);

        let other = h
            .service
            .register_admin(&claims, "u@x.test", "longenough1", "Uli", None)
            .await
            .unwrap();
        let session = h.service.login("u@x.test", "longenough1").await.unwrap();

        h.service.delete_user(&claims, &other.id).await.unwrap();
        assert!(matches!(
            h.service.refresh(&session.refresh_token).await,
            Err(AuthError::UserNotFound) | Err(AuthError::TokenNotFound)
        ));
        // Nothing was re-issued for the deleted user
        assert!(h
            .store
            .find_refresh_token(&session.refresh_token)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_logout_is_idempotent() {
        let h = harness();
        bootstrap(&h).await;
        let session = h.service.login("admin@x.test", "Secret123").await.unwrap();

        h.service.logout(&session.refresh_token).await.unwrap();
        assert!(h
            .store
            .find_refresh_token(&session.refresh_token)
            .await
            .unwrap()
            .is_none());
        // Repeating and unknown tokens both succeed
        h.service.logout(&session.refresh_token).await.unwrap();
        h.service.logout("never-existed").await.unwrap();
        h.service.logout("").await.unwrap();
    }

    #[tokio::test]
    async fn test_register_admin_validations() {
        let h = harness();
        let admin = bootstrap(&h).await;
        let claims = admin_claims(&admin.id);

        let created = h
            .service
            .register_admin(&claims, "m@x.test", "longenough1", "Mana", Some("manager"))
            .await
            .unwrap();
        assert_eq!(created.role, Role::Manager);
        assert!(created.email_verified);

        assert!(matches!(
            h.service
                .register_admin(&claims, "m@x.test", "longenough1", "Mana", None)
                .await,
            Err(AuthError::DuplicateEmail)
        ));
        assert!(matches!(
            h.service
                .register_admin(&claims, "o@x.test", "longenough1", "O", Some("owner"))
                .await,
            Err(AuthError::InvalidRole)
        ));

        let viewer_claims = Claims {
            role: Role::Viewer,
            ..claims.clone()
        };
        assert!(matches!(
            h.service
                .register_admin(&viewer_claims, "v@x.test", "longenough1", "V", None)
                .await,
            Err(AuthError::Forbidden(_))
        ));
    }

    #[tokio::test]
    async fn test_public_registration_end_to_end() {
        let h = harness();
        h.service
            .register_public("u@x.test", "longenough1", "Uli")
            .await
            .unwrap();
        let token = h.mailer.last_token().unwrap();
        assert_eq!(token.len(), 64);

        let user = h.service.verify_email(&token).await.unwrap();
        assert_eq!(user.role, Role::Viewer);
        assert!(user.email_verified);

        // Verification is single-use
        assert!(matches!(
            h.service.verify_email(&token).await,
            Err(AuthError::TokenNotFound)
        ));

        // Account now exists; the password round-trips through login
        let session = h.service.login("u@x.test", "longenough1").await.unwrap();
        assert_eq!(session.user.id, user.id);

        // Same email cannot register again once the user exists
        assert!(matches!(
            h.service
                .register_public("u@x.test", "longenough1", "Uli")
                .await,
            Err(AuthError::DuplicateEmail)
        ));
    }

    #[tokio::test]
    async fn test_public_registration_disabled() {
        let (service, _store) = harness_with(CaptureMailer::new(), false);
        assert!(matches!(
            service.register_public("u@x.test", "longenough1", "Uli").await,
            Err(AuthError::RegistrationDisabled)
        ));
    }

    #[tokio::test]
    async fn test_public_registration_replaces_pending_token() {
        let h = harness();
        h.service
            .register_public("u@x.test", "longenough1", "Uli")
            .await
            .unwrap();
        let first = h.mailer.last_token().unwrap();
        h.service
            .register_public("u@x.test", "longenough1", "Uli")
            .await
            .unwrap();
        let second = h.mailer.last_token().unwrap();
        assert_ne!(first, second);

        // Only the freshest link works
        assert!(matches!(
            h.service.verify_email(&first).await,
            Err(AuthError::TokenNotFound)
        ));
        assert!(h.service.verify_email(&second).await.is_ok());
    }

    #[tokio::test]
    async fn test_mailer_failure_surfaces_and_keeps_token() {
        let (service, store) = harness_with(Arc::new(FailMailer), true);
        assert!(matches!(
            service.register_public("u@x.test", "longenough1", "Uli").await,
            Err(AuthError::EmailDeliveryFailed)
        ));
        // The pending registration survived the failed send; no user yet
        assert_eq!(store.get_user_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_verify_email_expired_token_is_invalidated() {
        let h = harness();
        let past = (Utc::now() - chrono::Duration::hours(1)).to_rfc3339();
        h.store
            .create_verification_token(NewVerificationToken {
                token: "stale".to_string(),
                email: "u@x.test".to_string(),
                name: "Uli".to_string(),
                password_hash: "hash".to_string(),
                expires_at: past,
            })
            .await
            .unwrap();

        assert!(matches!(
            h.service.verify_email("stale").await,
            Err(AuthError::TokenExpired)
        ));
        // Second presentation finds nothing
        assert!(matches!(
            h.service.verify_email("stale").await,
            Err(AuthError::TokenNotFound)
        ));
    }

    #[tokio::test]
    async fn test_verify_email_yields_to_admin_created_account() {
        let h = harness();
        let admin = bootstrap(&h).await;
        let claims = admin_claims(&admin.id);

        h.service
            .register_public("u@x.test", "longenough1", "Uli")
            .await
            .unwrap();
        let token = h.mailer.last_token().unwrap();

        // Admin creates the same account out-of-band before verification
        h.service
            .register_admin(&claims, "u@x.test", "otherpass99", "Uli", Some("manager"))
            .await
            .unwrap();

        assert!(matches!(
            h.service.verify_email(&token).await,
            Err(AuthError::DuplicateEmail)
        ));
        // Token was consumed by the failed attempt
        assert!(matches!(
            h.service.verify_email(&token).await,
            Err(AuthError::TokenNotFound)
        ));
    }

    #[tokio::test]
    async fn test_role_change_is_a_snapshot() {
        let h = harness();
        let admin = bootstrap(&h).await;
        let claims = admin_claims(&admin.id);
        h.service
            .register_admin(&claims, "u@x.test", "longenough1", "Uli", Some("viewer"))
            .await
            .unwrap();

        let session = h.service.login("u@x.test", "longenough1").await.unwrap();
        let user_id = session.user.id.clone();

        h.service
            .update_user_role(&claims, &user_id, "manager")
            .await
            .unwrap();

        // The already-issued access token still carries the old role
        let stale = h
            .service
            .tokens()
            .verify_access_token(&session.access_token)
            .unwrap();
        assert_eq!(stale.role, Role::Viewer);

        // A refresh picks up the new role
        let rotated = h.service.refresh(&session.refresh_token).await.unwrap();
        let fresh = h
            .service
            .tokens()
            .verify_access_token(&rotated.access_token)
            .unwrap();
        assert_eq!(fresh.role, Role::Manager);
    }

    #[tokio::test]
    async fn test_self_protection_guards() {
        let h = harness();
        let admin = bootstrap(&h).await;
        let claims = admin_claims(&admin.id);

        assert!(matches!(
            h.service.update_user_role(&claims, &admin.id, "viewer").await,
            Err(AuthError::Forbidden(_))
        ));
        assert!(matches!(
            h.service.delete_user(&claims, &admin.id).await,
            Err(AuthError::Forbidden(_))
        ));
        // The account is untouched
        assert_eq!(h.service.current_user(&claims).await.unwrap().role, Role::Admin);
    }

    #[tokio::test]
    async fn test_cleanup_removes_only_expired() {
        let h = harness();
        let admin = bootstrap(&h).await;
        let past = (Utc::now() - chrono::Duration::days(1)).to_rfc3339();
        let future = (Utc::now() + chrono::Duration::days(1)).to_rfc3339();
        h.store.save_refresh_token(&admin.id, "old", &past).await.unwrap();
        h.store.save_refresh_token(&admin.id, "live", &future).await.unwrap();
        h.store
            .create_verification_token(NewVerificationToken {
                token: "old-v".to_string(),
                email: "a@x.test".to_string(),
                name: "A".to_string(),
                password_hash: "hash".to_string(),
                expires_at: past.clone(),
            })
            .await
            .unwrap();

        assert_eq!(h.service.cleanup_expired_tokens().await.unwrap(), 1);
        assert_eq!(
            h.service.cleanup_expired_verification_tokens().await.unwrap(),
            1
        );
        assert!(h.store.find_refresh_token("live").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_list_users_and_name_update() {
        let h = harness();
        let admin = bootstrap(&h).await;
        let claims = admin_claims(&admin.id);
        h.service
            .register_admin(&claims, "u@x.test", "longenough1", "Uli", None)
            .await
            .unwrap();

        let users = h.service.list_users().await.unwrap();
        assert_eq!(users.len(), 2);

        let target = users.iter().find(|u| u.email == "u@x.test").unwrap();
        h.service.update_user_name(&target.id, "Ulrike").await.unwrap();
        let reloaded = h
            .store
            .find_user_by_id(&target.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(reloaded.name, "Ulrike");

        assert!(matches!(
            h.service.update_user_name("missing", "X").await,
            Err(AuthError::UserNotFound)
        ));
    }
}
