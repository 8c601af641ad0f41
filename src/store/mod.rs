//! Persistence contract for users, refresh tokens and pending verifications.
//!
//! The auth service only talks to the [`UserStore`] trait. Two backends exist:
//! [`SqliteStore`] for the real deployment and [`MemoryStore`] as the
//! reference implementation used by tests.

mod memory;
mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use async_trait::async_trait;

use crate::db::{RefreshToken, Role, User, VerificationToken};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("duplicate {0}")]
    Duplicate(&'static str),
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

/// Payload for creating a user row.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub password_hash: String,
    pub name: String,
    pub role: Role,
    pub email_verified: bool,
}

/// Payload for creating a pending verification.
#[derive(Debug, Clone)]
pub struct NewVerificationToken {
    pub token: String,
    pub email: String,
    pub name: String,
    pub password_hash: String,
    pub expires_at: String,
}

#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError>;
    async fn find_user_by_id(&self, id: &str) -> Result<Option<User>, StoreError>;
    async fn create_user(&self, new_user: NewUser) -> Result<User, StoreError>;
    /// Returns true if a row changed.
    async fn update_user_role(&self, id: &str, role: Role) -> Result<bool, StoreError>;
    async fn update_user_name(&self, id: &str, name: &str) -> Result<bool, StoreError>;
    /// Deletes the user and, by cascade, all their refresh tokens.
    async fn delete_user(&self, id: &str) -> Result<bool, StoreError>;
    async fn get_user_count(&self) -> Result<i64, StoreError>;
    async fn get_all_users(&self) -> Result<Vec<User>, StoreError>;

    async fn save_refresh_token(
        &self,
        user_id: &str,
        token: &str,
        expires_at: &str,
    ) -> Result<(), StoreError>;
    async fn find_refresh_token(&self, token: &str) -> Result<Option<RefreshToken>, StoreError>;
    /// Atomically delete and return the token. At most one concurrent caller
    /// can ever observe a given row, which is what makes rotation single-use.
    async fn consume_refresh_token(
        &self,
        token: &str,
    ) -> Result<Option<RefreshToken>, StoreError>;
    async fn delete_refresh_token(&self, token: &str) -> Result<bool, StoreError>;
    async fn delete_user_refresh_tokens(&self, user_id: &str) -> Result<(), StoreError>;
    async fn delete_expired_refresh_tokens(&self) -> Result<u64, StoreError>;

    /// Replaces any existing pending verification for the same email.
    async fn create_verification_token(
        &self,
        new_token: NewVerificationToken,
    ) -> Result<(), StoreError>;
    async fn find_verification_token(
        &self,
        token: &str,
    ) -> Result<Option<VerificationToken>, StoreError>;
    async fn delete_verification_token(&self, token: &str) -> Result<bool, StoreError>;
    async fn delete_expired_verification_tokens(&self) -> Result<u64, StoreError>;
}
