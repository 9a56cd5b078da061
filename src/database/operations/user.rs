use async_trait::async_trait;
use sqlx::{PgExecutor, PgPool};

use crate::database::models::{NewUser, User};
use crate::database::{
    CONSTRAINT_EMAIL_UNIQUE, CONSTRAINT_USERNAME_UNIQUE, ERR_STRING_DATA_RIGHT_TRUNCATION,
    ERR_UNIQUE_VIOLATION, violation,
};
use crate::error::{AppError, AppResult};

/// 用户持久化接口
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn create(&self, user: NewUser) -> AppResult<User>;

    async fn get_by_email(&self, email: &str) -> AppResult<User>;

    async fn get_by_id(&self, user_id: i64) -> AppResult<User>;

    /// 粉丝数加减，结果不低于 0
    async fn increase_follower_count(&self, user_id: i64, delta: i64) -> AppResult<()>;

    /// 关注数加减，结果不低于 0
    async fn increase_following_count(&self, user_id: i64, delta: i64) -> AppResult<()>;
}

#[derive(Debug, Clone, Copy)]
enum Counter {
    Follower,
    Following,
}

impl Counter {
    // 单行原子更新，GREATEST 保证并发扣减时不会出现负数
    fn query(self) -> &'static str {
        match self {
            Counter::Follower => {
                "UPDATE users SET follower_count = GREATEST(0, follower_count + $1) WHERE id = $2"
            }
            Counter::Following => {
                "UPDATE users SET following_count = GREATEST(0, following_count + $1) WHERE id = $2"
            }
        }
    }
}

/// Postgres 用户存储
#[derive(Clone)]
pub struct PgUserStore {
    pool: PgPool,
}

impl PgUserStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// 在调用方的事务（或任意执行器）中更新粉丝数
    pub async fn increase_follower_count_with<'e, E>(
        executor: E,
        user_id: i64,
        delta: i64,
    ) -> AppResult<()>
    where
        E: PgExecutor<'e>,
    {
        apply_counter(executor, Counter::Follower, user_id, delta).await
    }

    /// 在调用方的事务（或任意执行器）中更新关注数
    pub async fn increase_following_count_with<'e, E>(
        executor: E,
        user_id: i64,
        delta: i64,
    ) -> AppResult<()>
    where
        E: PgExecutor<'e>,
    {
        apply_counter(executor, Counter::Following, user_id, delta).await
    }
}

const SELECT_USER: &str = r#"
    SELECT id, username, email, password_hash, created_at, follower_count, following_count
    FROM users
"#;

async fn apply_counter<'e, E>(executor: E, counter: Counter, user_id: i64, delta: i64) -> AppResult<()>
where
    E: PgExecutor<'e>,
{
    let result = sqlx::query(counter.query())
        .bind(delta)
        .bind(user_id)
        .execute(executor)
        .await
        .map_err(|e| AppError::internal(format!("failed to update {:?} count", counter), e))?;

    if result.rows_affected() == 0 {
        return Err(AppError::UserNotFound);
    }
    Ok(())
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn create(&self, user: NewUser) -> AppResult<User> {
        sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (username, email, password_hash)
            VALUES ($1, $2, $3)
            RETURNING id, username, email, password_hash, created_at, follower_count, following_count
            "#,
        )
        .bind(&user.username)
        .bind(&user.email)
        .bind(&user.password_hash)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match violation(&e) {
            Some((code, constraint)) => match (code.as_str(), constraint.as_deref()) {
                (ERR_UNIQUE_VIOLATION, Some(CONSTRAINT_USERNAME_UNIQUE)) => {
                    AppError::UsernameConflict
                }
                (ERR_UNIQUE_VIOLATION, Some(CONSTRAINT_EMAIL_UNIQUE)) => AppError::EmailConflict,
                (ERR_STRING_DATA_RIGHT_TRUNCATION, _) => AppError::ValueTooLong,
                _ => AppError::internal("failed to create user", e),
            },
            None => AppError::internal("failed to create user", e),
        })
    }

    async fn get_by_email(&self, email: &str) -> AppResult<User> {
        let user = sqlx::query_as::<_, User>(&format!("{} WHERE email = $1", SELECT_USER))
            .bind(email)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::internal("failed to load user by email", e))?;

        user.ok_or(AppError::UserNotFound)
    }

    async fn get_by_id(&self, user_id: i64) -> AppResult<User> {
        let user = sqlx::query_as::<_, User>(&format!("{} WHERE id = $1", SELECT_USER))
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::internal("failed to load user by id", e))?;

        user.ok_or(AppError::UserNotFound)
    }

    async fn increase_follower_count(&self, user_id: i64, delta: i64) -> AppResult<()> {
        Self::increase_follower_count_with(&self.pool, user_id, delta).await
    }

    async fn increase_following_count(&self, user_id: i64, delta: i64) -> AppResult<()> {
        Self::increase_following_count_with(&self.pool, user_id, delta).await
    }
}
