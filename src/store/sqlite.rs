//! SQLite-backed [`UserStore`].

use async_trait::async_trait;
use uuid::Uuid;

use crate::db::{now_rfc3339, DbPool, RefreshToken, Role, User, VerificationToken};

use super::{NewUser, NewVerificationToken, StoreError, UserStore};

pub struct SqliteStore {
    pool: DbPool,
}

impl SqliteStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserStore for SqliteStore {
    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let user = sqlx::query_as("SELECT * FROM users WHERE email = ?")
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    async fn find_user_by_id(&self, id: &str) -> Result<Option<User>, StoreError> {
        let user = sqlx::query_as("SELECT * FROM users WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    async fn create_user(&self, new_user: NewUser) -> Result<User, StoreError> {
        let now = now_rfc3339();
        let user = sqlx::query_as(
            "INSERT INTO users (id, email, password_hash, name, role, email_verified, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?) RETURNING *",
        )
        .bind(Uuid::new_v4().to_string())
        .bind(&new_user.email)
        .bind(&new_user.password_hash)
        .bind(&new_user.name)
        .bind(new_user.role)
        .bind(new_user.email_verified)
        .bind(&now)
        .bind(&now)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match &e {
            sqlx::Error::Database(db_err) if db_err.message().contains("UNIQUE constraint") => {
                StoreError::Duplicate("email")
            }
            _ => StoreError::Database(e),
        })?;
        Ok(user)
    }

    async fn update_user_role(&self, id: &str, role: Role) -> Result<bool, StoreError> {
        let result = sqlx::query("UPDATE users SET role = ?, updated_at = ? WHERE id = ?")
            .bind(role)
            .bind(now_rfc3339())
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn update_user_name(&self, id: &str, name: &str) -> Result<bool, StoreError> {
        let result = sqlx::query("UPDATE users SET name = ?, updated_at = ? WHERE id = ?")
            .bind(name)
            .bind(now_rfc3339())
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_user(&self, id: &str) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM users WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn get_user_count(&self) -> Result<i64, StoreError> {
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM users")
            .fetch_one(&self.pool)
            .await?;
        Ok(count.0)
    }

    async fn get_all_users(&self) -> Result<Vec<User>, StoreError> {
        let users = sqlx::query_as("SELECT * FROM users ORDER BY created_at")
            .fetch_all(&self.pool)
            .await?;
        Ok(users)
    }

    async fn save_refresh_token(
        &self,
        user_id: &str,
        token: &str,
        expires_at: &str,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO refresh_tokens (token, user_id, expires_at, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(token)
        .bind(user_id)
        .bind(expires_at)
        .bind(now_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_refresh_token(&self, token: &str) -> Result<Option<RefreshToken>, StoreError> {
        let row = sqlx::query_as("SELECT * FROM refresh_tokens WHERE token = ?")
            .bind(token)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    async fn consume_refresh_token(
        &self,
        token: &str,
    ) -> Result<Option<RefreshToken>, StoreError> {
        // Single-statement delete-and-return; two racing refresh calls can
        // never both obtain the row.
        let row = sqlx::query_as("DELETE FROM refresh_tokens WHERE token = ? RETURNING *")
            .bind(token)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    async fn delete_refresh_token(&self, token: &str) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM refresh_tokens WHERE token = ?")
            .bind(token)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_user_refresh_tokens(&self, user_id: &str) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM refresh_tokens WHERE user_id = ?")
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn delete_expired_refresh_tokens(&self) -> Result<u64, StoreError> {
        let result =
            sqlx::query("DELETE FROM refresh_tokens WHERE datetime(expires_at) <= datetime('now')")
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected())
    }

    async fn create_verification_token(
        &self,
        new_token: NewVerificationToken,
    ) -> Result<(), StoreError> {
        // Delete-then-insert must be atomic so a crash can't leave two live
        // tokens for one email.
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM verification_tokens WHERE email = ?")
            .bind(&new_token.email)
            .execute(&mut *tx)
            .await?;
        sqlx::query(
            "INSERT INTO verification_tokens (token, email, name, password_hash, expires_at, created_at) \
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&new_token.token)
        .bind(&new_token.email)
        .bind(&new_token.name)
        .bind(&new_token.password_hash)
        .bind(&new_token.expires_at)
        .bind(now_rfc3339())
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(())
    }

    async fn find_verification_token(
        &self,
        token: &str,
    ) -> Result<Option<VerificationToken>, StoreError> {
        let row = sqlx::query_as("SELECT * FROM verification_tokens WHERE token = ?")
            .bind(token)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    async fn delete_verification_token(&self, token: &str) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM verification_tokens WHERE token = ?")
            .bind(token)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_expired_verification_tokens(&self) -> Result<u64, StoreError> {
        let result = sqlx::query(
            "DELETE FROM verification_tokens WHERE datetime(expires_at) <= datetime('now')",
        )
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}
