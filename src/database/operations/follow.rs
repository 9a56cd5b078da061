use async_trait::async_trait;
use sqlx::{PgExecutor, PgPool};

use crate::database::models::{Follow, Relationship};
use crate::database::operations::PgUserStore;
use crate::database::{
    CONSTRAINT_NO_SELF_FOLLOW, CONSTRAINT_UNIQUE_FOLLOW, ERR_CHECK_VIOLATION,
    ERR_FOREIGN_KEY_VIOLATION, ERR_UNIQUE_VIOLATION, violation,
};
use crate::error::{AppError, AppResult};

/// 关注关系持久化接口
#[async_trait]
pub trait FollowStore: Send + Sync {
    async fn create(&self, follower_id: i64, following_id: i64) -> AppResult<Follow>;

    /// `follower_id` 关注的所有边
    async fn get_followings(&self, follower_id: i64) -> AppResult<Vec<Follow>>;

    /// 关注 `following_id` 的所有边
    async fn get_followers(&self, following_id: i64) -> AppResult<Vec<Follow>>;

    /// 从 `user_a` 的视角查询两人关系
    async fn get_relationship(&self, user_a: i64, user_b: i64) -> AppResult<Relationship>;

    /// 删除一条边，返回是否确有删除
    async fn delete(&self, follower_id: i64, following_id: i64) -> AppResult<bool>;

    /// 同一事务内写入关系，关注者的关注数与被关注者的粉丝数各加一
    async fn create_with_counts(&self, follower_id: i64, following_id: i64) -> AppResult<Follow>;

    /// 同一事务内删除关系，确有删除时双方计数各减一
    async fn delete_with_counts(&self, follower_id: i64, following_id: i64) -> AppResult<bool>;
}

/// Postgres 关注关系存储
#[derive(Clone)]
pub struct PgFollowStore {
    pool: PgPool,
}

impl PgFollowStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl FollowStore for PgFollowStore {
    async fn create(&self, follower_id: i64, following_id: i64) -> AppResult<Follow> {
        insert_follow(&self.pool, follower_id, following_id).await
    }

    async fn get_followings(&self, follower_id: i64) -> AppResult<Vec<Follow>> {
        sqlx::query_as::<_, Follow>(
            "SELECT id, follower_id, following_id, created_at FROM follows WHERE follower_id = $1",
        )
        .bind(follower_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::internal("failed to load followings", e))
    }

    async fn get_followers(&self, following_id: i64) -> AppResult<Vec<Follow>> {
        sqlx::query_as::<_, Follow>(
            "SELECT id, follower_id, following_id, created_at FROM follows WHERE following_id = $1",
        )
        .bind(following_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::internal("failed to load followers", e))
    }

    async fn get_relationship(&self, user_a: i64, user_b: i64) -> AppResult<Relationship> {
        sqlx::query_as::<_, Relationship>(
            r#"
            SELECT
                EXISTS(SELECT 1 FROM follows WHERE follower_id = $1 AND following_id = $2) AS following,
                EXISTS(SELECT 1 FROM follows WHERE follower_id = $2 AND following_id = $1) AS followed_by
            "#,
        )
        .bind(user_a)
        .bind(user_b)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AppError::internal("failed to load relationship", e))
    }

    async fn delete(&self, follower_id: i64, following_id: i64) -> AppResult<bool> {
        delete_follow(&self.pool, follower_id, following_id).await
    }

    async fn create_with_counts(&self, follower_id: i64, following_id: i64) -> AppResult<Follow> {
        let mut tx = self.pool.begin().await.map_err(|e| AppError::internal("failed to begin transaction", e))?;

        let follow = insert_follow(&mut *tx, follower_id, following_id).await?;
        PgUserStore::increase_following_count_with(&mut *tx, follower_id, 1).await?;
        PgUserStore::increase_follower_count_with(&mut *tx, following_id, 1).await?;

        tx.commit().await.map_err(|e| AppError::internal("failed to commit follow", e))?;
        Ok(follow)
    }

    async fn delete_with_counts(&self, follower_id: i64, following_id: i64) -> AppResult<bool> {
        let mut tx = self.pool.begin().await.map_err(|e| AppError::internal("failed to begin transaction", e))?;

        if !delete_follow(&mut *tx, follower_id, following_id).await? {
            return Ok(false);
        }
        PgUserStore::increase_following_count_with(&mut *tx, follower_id, -1).await?;
        PgUserStore::increase_follower_count_with(&mut *tx, following_id, -1).await?;

        tx.commit().await.map_err(|e| AppError::internal("failed to commit unfollow", e))?;
        Ok(true)
    }
}

async fn insert_follow<'e, E>(executor: E, follower_id: i64, following_id: i64) -> AppResult<Follow>
where
    E: PgExecutor<'e>,
{
    sqlx::query_as::<_, Follow>(
        r#"
        INSERT INTO follows (follower_id, following_id)
        VALUES ($1, $2)
        RETURNING id, follower_id, following_id, created_at
        "#,
    )
    .bind(follower_id)
    .bind(following_id)
    .fetch_one(executor)
    .await
    .map_err(|e| match violation(&e) {
        Some((code, constraint)) => match (code.as_str(), constraint.as_deref()) {
            (ERR_UNIQUE_VIOLATION, Some(CONSTRAINT_UNIQUE_FOLLOW)) => AppError::AlreadyFollowing,
            (ERR_CHECK_VIOLATION, Some(CONSTRAINT_NO_SELF_FOLLOW)) => AppError::CannotFollowSelf,
            (ERR_FOREIGN_KEY_VIOLATION, _) => AppError::UserNotFound,
            _ => AppError::internal("failed to create follow", e),
        },
        None => AppError::internal("failed to create follow", e),
    })
}

async fn delete_follow<'e, E>(executor: E, follower_id: i64, following_id: i64) -> AppResult<bool>
where
    E: PgExecutor<'e>,
{
    let result = sqlx::query("DELETE FROM follows WHERE follower_id = $1 AND following_id = $2")
        .bind(follower_id)
        .bind(following_id)
        .execute(executor)
        .await
        .map_err(|e| AppError::internal("failed to delete follow", e))?;
    Ok(result.rows_affected() > 0)
}
