use async_trait::async_trait;
use sqlx::PgPool;

use crate::database::models::{NewSession, Session};
use crate::database::{
    CONSTRAINT_SESSION_USER_FK, CONSTRAINT_TOKEN_HASH_UNIQUE, ERR_FOREIGN_KEY_VIOLATION,
    ERR_STRING_DATA_RIGHT_TRUNCATION, ERR_UNIQUE_VIOLATION, violation,
};
use crate::error::{AppError, AppResult};

/// 会话持久化接口
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn create(&self, session: NewSession) -> AppResult<Session>;

    /// 按令牌哈希查找，不存在时返回 `SessionNotFound`
    async fn get(&self, token_hash: &str) -> AppResult<Session>;

    /// 仅更新过期时间
    async fn update(&self, session: &Session) -> AppResult<()>;

    async fn delete(&self, session: &Session) -> AppResult<()>;

    async fn delete_by_user_id(&self, user_id: i64) -> AppResult<()>;
}

/// Postgres 会话存储
#[derive(Clone)]
pub struct PgSessionStore {
    pool: PgPool,
}

impl PgSessionStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SessionStore for PgSessionStore {
    async fn create(&self, session: NewSession) -> AppResult<Session> {
        sqlx::query_as::<_, Session>(
            r#"
            INSERT INTO sessions (user_id, token_hash, expires_at, created_at)
            VALUES ($1, $2, $3, $4)
            RETURNING id, user_id, token_hash, expires_at, created_at
            "#,
        )
        .bind(session.user_id)
        .bind(&session.token_hash)
        .bind(session.expires_at)
        .bind(session.created_at)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match violation(&e) {
            Some((code, constraint)) => match (code.as_str(), constraint.as_deref()) {
                (ERR_FOREIGN_KEY_VIOLATION, Some(CONSTRAINT_SESSION_USER_FK)) => {
                    AppError::UserNotFound
                }
                (ERR_UNIQUE_VIOLATION, Some(CONSTRAINT_TOKEN_HASH_UNIQUE)) => {
                    AppError::TokenConflict
                }
                (ERR_STRING_DATA_RIGHT_TRUNCATION, _) => AppError::ValueTooLong,
                _ => AppError::internal("failed to create session", e),
            },
            None => AppError::internal("failed to create session", e),
        })
    }

    async fn get(&self, token_hash: &str) -> AppResult<Session> {
        let session = sqlx::query_as::<_, Session>(
            r#"
            SELECT id, user_id, token_hash, expires_at, created_at
            FROM sessions
            WHERE token_hash = $1
            "#,
        )
        .bind(token_hash)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::internal("failed to load session by token hash", e))?;

        session.ok_or(AppError::SessionNotFound)
    }

    async fn update(&self, session: &Session) -> AppResult<()> {
        let result = sqlx::query("UPDATE sessions SET expires_at = $1 WHERE token_hash = $2")
            .bind(session.expires_at)
            .bind(&session.token_hash)
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::internal("failed to update session expiry", e))?;

        if result.rows_affected() == 0 {
            return Err(AppError::SessionNotFound);
        }
        Ok(())
    }

    async fn delete(&self, session: &Session) -> AppResult<()> {
        let result = sqlx::query("DELETE FROM sessions WHERE token_hash = $1")
            .bind(&session.token_hash)
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::internal("failed to delete session", e))?;

        if result.rows_affected() == 0 {
            return Err(AppError::SessionNotFound);
        }
        Ok(())
    }

    async fn delete_by_user_id(&self, user_id: i64) -> AppResult<()> {
        sqlx::query("DELETE FROM sessions WHERE user_id = $1")
            .bind(user_id)
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::internal("failed to delete sessions of user", e))?;
        Ok(())
    }
}
