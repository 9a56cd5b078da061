use std::sync::Arc;
use std::time::Duration;

use crate::cache::operations::FollowCache;
use crate::database::models::{Follow, Relationship};
use crate::database::operations::FollowStore;
use crate::error::{AppError, AppResult};
use crate::utils::{BackgroundTasks, RequestCoalescer};

#[derive(Debug, Clone, Copy)]
enum Direction {
    Followings,
    Followers,
}

/// 关注关系存储库
///
/// 一条边对应两侧缓存集合：关注者的“我关注的人”与被关注者的“关注我的人”。
/// 两侧要么一起原地更新，要么一起失效。
pub struct FollowRepository {
    store: Arc<dyn FollowStore>,
    cache: Arc<dyn FollowCache>,
    relations: RequestCoalescer<Relationship>,
    followings: RequestCoalescer<Vec<i64>>,
    followers: RequestCoalescer<Vec<i64>>,
    background: BackgroundTasks,
}

impl FollowRepository {
    pub fn new(
        store: Arc<dyn FollowStore>,
        cache: Arc<dyn FollowCache>,
        background: BackgroundTasks,
    ) -> Self {
        Self {
            store,
            cache,
            relations: RequestCoalescer::new("follow-relation"),
            followings: RequestCoalescer::new("followings"),
            followers: RequestCoalescer::new("followers"),
            background,
        }
    }

    /// 限制调用方等待合并加载的时长
    pub fn with_wait_timeout(mut self, timeout: Duration) -> Self {
        self.relations = self.relations.with_wait_timeout(timeout);
        self.followings = self.followings.with_wait_timeout(timeout);
        self.followers = self.followers.with_wait_timeout(timeout);
        self
    }

    /// 建立关注关系
    pub async fn create(&self, follower_id: i64, following_id: i64) -> AppResult<Follow> {
        if follower_id == following_id {
            return Err(AppError::CannotFollowSelf);
        }

        let follow = self.store.create(follower_id, following_id).await?;
        tracing::info!("User {} followed {}", follower_id, following_id);
        self.record_edge(follower_id, following_id).await;
        Ok(follow)
    }

    /// 建立关注关系，双方计数在同一事务中更新
    pub async fn create_with_counts(&self, follower_id: i64, following_id: i64) -> AppResult<Follow> {
        if follower_id == following_id {
            return Err(AppError::CannotFollowSelf);
        }

        let follow = self.store.create_with_counts(follower_id, following_id).await?;
        tracing::info!("User {} followed {}", follower_id, following_id);
        self.record_edge(follower_id, following_id).await;
        Ok(follow)
    }

    // 提交后同步两侧集合：原地追加或成对失效
    async fn record_edge(&self, follower_id: i64, following_id: i64) {
        match self.cache.add(follower_id, following_id).await {
            Ok(true) => tracing::debug!("Follow cache updated in place: {} -> {}", follower_id, following_id),
            Ok(false) => tracing::debug!("Follow cache invalidated: {} -> {}", follower_id, following_id),
            Err(e) => {
                tracing::warn!("Follow cache update failed for {} -> {}: {}", follower_id, following_id, e);
                self.invalidate_pair(follower_id, following_id).await;
            }
        }
    }

    /// 从 `user_a` 的视角查询与 `user_b` 的关系
    pub async fn check_relation(&self, user_a: i64, user_b: i64) -> AppResult<Relationship> {
        if user_a == user_b {
            return Ok(Relationship::default());
        }

        match self.cache.get_relation(user_a, user_b).await {
            Ok(Some(relation)) => {
                tracing::debug!("Relation cache hit: {} / {}", user_a, user_b);
                return Ok(relation);
            }
            Ok(None) => tracing::debug!("Relation cache miss: {} / {}", user_a, user_b),
            Err(e) => tracing::warn!("Relation cache read failed for {} / {}: {}", user_a, user_b, e),
        }

        // (a, b) 与 (b, a) 共用一个键，只查询一次，再按调用方视角翻转
        let (low, high) = (user_a.min(user_b), user_a.max(user_b));
        let store = Arc::clone(&self.store);
        let relation = self
            .relations
            .do_once(format!("rel:{}:{}", low, high), move || async move {
                store.get_relationship(low, high).await
            })
            .await?;

        Ok(if user_a == low { relation } else { relation.reversed() })
    }

    /// `user_id` 关注的用户 ID
    pub async fn get_followings(&self, user_id: i64) -> AppResult<Vec<i64>> {
        self.load_ids(user_id, Direction::Followings).await
    }

    /// 关注 `user_id` 的用户 ID
    pub async fn get_followers(&self, user_id: i64) -> AppResult<Vec<i64>> {
        self.load_ids(user_id, Direction::Followers).await
    }

    /// 删除关注关系，随后成对失效两侧缓存。返回是否确有删除。
    pub async fn remove_follow(&self, follower_id: i64, following_id: i64) -> AppResult<bool> {
        if follower_id == following_id {
            return Ok(false);
        }

        let removed = self.store.delete(follower_id, following_id).await?;
        if removed {
            tracing::info!("User {} unfollowed {}", follower_id, following_id);
        }
        self.invalidate_pair(follower_id, following_id).await;
        Ok(removed)
    }

    /// 删除关注关系，确有删除时双方计数在同一事务中扣减
    pub async fn remove_follow_with_counts(&self, follower_id: i64, following_id: i64) -> AppResult<bool> {
        if follower_id == following_id {
            return Ok(false);
        }

        let removed = self.store.delete_with_counts(follower_id, following_id).await?;
        if removed {
            tracing::info!("User {} unfollowed {}", follower_id, following_id);
        }
        self.invalidate_pair(follower_id, following_id).await;
        Ok(removed)
    }

    async fn invalidate_pair(&self, follower_id: i64, following_id: i64) {
        if let Err(e) = self.cache.invalidate(follower_id, following_id).await {
            tracing::error!(
                "Failed to invalidate follow cache for {} -> {}: {}",
                follower_id,
                following_id,
                e
            );
        }
    }

    async fn load_ids(&self, user_id: i64, direction: Direction) -> AppResult<Vec<i64>> {
        let cached = match direction {
            Direction::Followings => self.cache.get_following_ids(user_id).await,
            Direction::Followers => self.cache.get_follower_ids(user_id).await,
        };
        match cached {
            Ok(ids) if !ids.is_empty() => {
                tracing::debug!("{:?} cache hit: {}", direction, user_id);
                return Ok(ids);
            }
            Ok(_) => tracing::debug!("{:?} cache miss: {}", direction, user_id),
            Err(e) => tracing::warn!("{:?} cache read failed for {}: {}", direction, user_id, e),
        }

        let (coalescer, key) = match direction {
            Direction::Followings => (&self.followings, format!("followings:{}", user_id)),
            Direction::Followers => (&self.followers, format!("followers:{}", user_id)),
        };
        let store = Arc::clone(&self.store);
        let cache = Arc::clone(&self.cache);
        let background = self.background.clone();

        coalescer
            .do_once(key, move || async move {
                let ids: Vec<i64> = match direction {
                    Direction::Followings => store
                        .get_followings(user_id)
                        .await?
                        .into_iter()
                        .map(|f| f.following_id)
                        .collect(),
                    Direction::Followers => store
                        .get_followers(user_id)
                        .await?
                        .into_iter()
                        .map(|f| f.follower_id)
                        .collect(),
                };

                let members = ids.clone();
                background.spawn("follow cache population", async move {
                    let result = match direction {
                        Direction::Followings => cache.add_followings(user_id, &members).await,
                        Direction::Followers => cache.add_followers(user_id, &members).await,
                    };
                    result.map_err(|e| {
                        AppError::internal(format!("{:?} cache population for {}", direction, user_id), e)
                    })
                });

                Ok(ids)
            })
            .await
    }
}
