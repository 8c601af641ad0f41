//! In-memory [`UserStore`] used as the reference backend in tests.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use uuid::Uuid;

use crate::db::{is_expired, now_rfc3339, RefreshToken, Role, User, VerificationToken};

use super::{NewUser, NewVerificationToken, StoreError, UserStore};

#[derive(Default)]
struct Inner {
    users: HashMap<String, User>,
    refresh_tokens: HashMap<String, RefreshToken>,
    verification_tokens: HashMap<String, VerificationToken>,
}

#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let inner = self.inner.lock();
        Ok(inner.users.values().find(|u| u.email == email).cloned())
    }

    async fn find_user_by_id(&self, id: &str) -> Result<Option<User>, StoreError> {
        Ok(self.inner.lock().users.get(id).cloned())
    }

    async fn create_user(&self, new_user: NewUser) -> Result<User, StoreError> {
        let mut inner = self.inner.lock();
        if inner.users.values().any(|u| u.email == new_user.email) {
            return Err(StoreError::Duplicate("email"));
        }
        let now = now_rfc3339();
        let user = User {
            id: Uuid::new_v4().to_string(),
            email: new_user.email,
            password_hash: new_user.password_hash,
            name: new_user.name,
            role: new_user.role,
            email_verified: new_user.email_verified,
            created_at: now.clone(),
            updated_at: now,
        };
        inner.users.insert(user.id.clone(), user.clone());
        Ok(user)
    }

    async fn update_user_role(&self, id: &str, role: Role) -> Result<bool, StoreError> {
        let mut inner = self.inner.lock();
        match inner.users.get_mut(id) {
            Some(user) => {
                user.role = role;
                user.updated_at = now_rfc3339();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn update_user_name(&self, id: &str, name: &str) -> Result<bool, StoreError> {
        let mut inner = self.inner.lock();
        match inner.users.get_mut(id) {
            Some(user) => {
                user.name = name.to_string();
                user.updated_at = now_rfc3339();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete_user(&self, id: &str) -> Result<bool, StoreError> {
        let mut inner = self.inner.lock();
        let existed = inner.users.remove(id).is_some();
        if existed {
            inner.refresh_tokens.retain(|_, t| t.user_id != id);
        }
        Ok(existed)
    }

    async fn get_user_count(&self) -> Result<i64, StoreError> {
        Ok(self.inner.lock().users.len() as i64)
    }

    async fn get_all_users(&self) -> Result<Vec<User>, StoreError> {
        let mut users: Vec<User> = self.inner.lock().users.values().cloned().collect();
        users.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(users)
    }

    async fn save_refresh_token(
        &self,
        user_id: &str,
        token: &str,
        expires_at: &str,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        inner.refresh_tokens.insert(
            token.to_string(),
            RefreshToken {
                token: token.to_string(),
                user_id: user_id.to_string(),
                expires_at: expires_at.to_string(),
                created_at: now_rfc3339(),
            },
        );
        Ok(())
    }

    async fn find_refresh_token(&self, token: &str) -> Result<Option<RefreshToken>, StoreError> {
        Ok(self.inner.lock().refresh_tokens.get(token).cloned())
    }

    async fn consume_refresh_token(
        &self,
        token: &str,
    ) -> Result<Option<RefreshToken>, StoreError> {
        Ok(self.inner.lock().refresh_tokens.remove(token))
    }

    async fn delete_refresh_token(&self, token: &str) -> Result<bool, StoreError> {
        Ok(self.inner.lock().refresh_tokens.remove(token).is_some())
    }

    async fn delete_user_refresh_tokens(&self, user_id: &str) -> Result<(), StoreError> {
        self.inner
            .lock()
            .refresh_tokens
            .retain(|_, t| t.user_id != user_id);
        Ok(())
    }

    async fn delete_expired_refresh_tokens(&self) -> Result<u64, StoreError> {
        let mut inner = self.inner.lock();
        let before = inner.refresh_tokens.len();
        inner.refresh_tokens.retain(|_, t| !is_expired(&t.expires_at));
        Ok((before - inner.refresh_tokens.len()) as u64)
    }

    async fn create_verification_token(
        &self,
        new_token: NewVerificationToken,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        // At most one pending verification per email
        inner
            .verification_tokens
            .retain(|_, t| t.email != new_token.email);
        inner.verification_tokens.insert(
            new_token.token.clone(),
            VerificationToken {
                token: new_token.token,
                email: new_token.email,
                name: new_token.name,
                password_hash: new_token.password_hash,
                expires_at: new_token.expires_at,
                created_at: now_rfc3339(),
            },
        );
        Ok(())
    }

    async fn find_verification_token(
        &self,
        token: &str,
    ) -> Result<Option<VerificationToken>, StoreError> {
        Ok(self.inner.lock().verification_tokens.get(token).cloned())
    }

    async fn delete_verification_token(&self, token: &str) -> Result<bool, StoreError> {
        Ok(self.inner.lock().verification_tokens.remove(token).is_some())
    }

    async fn delete_expired_verification_tokens(&self) -> Result<u64, StoreError> {
        let mut inner = self.inner.lock();
        let before = inner.verification_tokens.len();
        inner
            .verification_tokens
            .retain(|_, t| !is_expired(&t.expires_at));
        Ok((before - inner.verification_tokens.len()) as u64)
    }
}
