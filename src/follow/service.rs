use std::sync::Arc;

use crate::database::models::{Follow, Relationship};
use crate::database::repositories::{FollowRepository, UserRepository};
use crate::error::{AppError, AppResult};

/// 关注服务，负责关系变更与两侧计数同步
pub struct FollowService {
    follows: Arc<FollowRepository>,
    users: Arc<UserRepository>,
}

impl FollowService {
    pub fn new(follows: Arc<FollowRepository>, users: Arc<UserRepository>) -> Self {
        Self { follows, users }
    }

    /// 关注：关系与双方计数在同一事务中提交，提交后再同步计数缓存
    pub async fn follow(&self, follower_id: i64, following_id: i64) -> AppResult<Follow> {
        check_ids(follower_id, following_id)?;

        let follow = self.follows.create_with_counts(follower_id, following_id).await?;
        self.users.sync_following_count(follower_id, 1).await;
        self.users.sync_follower_count(following_id, 1).await;
        Ok(follow)
    }

    /// 取消关注，只有确实删除了关系才扣减计数
    pub async fn unfollow(&self, follower_id: i64, following_id: i64) -> AppResult<()> {
        check_ids(follower_id, following_id)?;

        if !self.follows.remove_follow_with_counts(follower_id, following_id).await? {
            tracing::debug!("User {} was not following {}", follower_id, following_id);
            return Ok(());
        }
        self.users.sync_following_count(follower_id, -1).await;
        self.users.sync_follower_count(following_id, -1).await;
        Ok(())
    }

    pub async fn relation(&self, user_a: i64, user_b: i64) -> AppResult<Relationship> {
        check_ids(user_a, user_b)?;
        self.follows.check_relation(user_a, user_b).await
    }

    pub async fn followings(&self, user_id: i64) -> AppResult<Vec<i64>> {
        check_ids(user_id, user_id)?;
        self.follows.get_followings(user_id).await
    }

    pub async fn followers(&self, user_id: i64) -> AppResult<Vec<i64>> {
        check_ids(user_id, user_id)?;
        self.follows.get_followers(user_id).await
    }
}

fn check_ids(a: i64, b: i64) -> AppResult<()> {
    if a <= 0 || b <= 0 {
        return Err(AppError::InvalidUserId);
    }
    Ok(())
}
