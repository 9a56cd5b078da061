use std::sync::Arc;
use std::time::Duration;

use crate::cache::models::{CachedUser, UserCounters};
use crate::cache::operations::UserCache;
use crate::database::models::{NewUser, User};
use crate::database::operations::UserStore;
use crate::error::{AppError, AppResult};
use crate::utils::{BackgroundTasks, RequestCoalescer};

#[derive(Debug, Clone, Copy)]
enum Counter {
    Follower,
    Following,
}

/// 用户存储库：存储为准，缓存旁路
///
/// 缓存的任何错误只记录日志并按未命中处理，不会返回给调用方。
pub struct UserRepository {
    store: Arc<dyn UserStore>,
    cache: Arc<dyn UserCache>,
    by_id: RequestCoalescer<User>,
    by_email: RequestCoalescer<User>,
    existence: RequestCoalescer<bool>,
    background: BackgroundTasks,
}

impl UserRepository {
    pub fn new(
        store: Arc<dyn UserStore>,
        cache: Arc<dyn UserCache>,
        background: BackgroundTasks,
    ) -> Self {
        Self {
            store,
            cache,
            by_id: RequestCoalescer::new("user-by-id"),
            by_email: RequestCoalescer::new("user-by-email"),
            existence: RequestCoalescer::new("user-exists"),
            background,
        }
    }

    /// 限制调用方等待合并加载的时长
    pub fn with_wait_timeout(mut self, timeout: Duration) -> Self {
        self.by_id = self.by_id.with_wait_timeout(timeout);
        self.by_email = self.by_email.with_wait_timeout(timeout);
        self.existence = self.existence.with_wait_timeout(timeout);
        self
    }

    /// 创建用户，缓存在首次读取时填充
    pub async fn create(&self, user: NewUser) -> AppResult<User> {
        let user = self.store.create(user).await?;
        tracing::info!("Created user: {}", user.id);
        Ok(user)
    }

    /// 按 ID 查询，缓存未命中时合并并发加载，回写缓存不阻塞返回
    pub async fn get_by_id(&self, user_id: i64) -> AppResult<User> {
        match self.cache.get(user_id).await {
            Ok(Some((cached, counters))) => {
                tracing::debug!("User cache hit: {}", user_id);
                return Ok(cached.into_user(counters));
            }
            Ok(None) => tracing::debug!("User cache miss: {}", user_id),
            Err(e) => tracing::warn!("User cache read failed for {}: {}", user_id, e),
        }

        let store = Arc::clone(&self.store);
        let cache = Arc::clone(&self.cache);
        let background = self.background.clone();
        self.by_id
            .do_once(format!("user:{}", user_id), move || async move {
                let user = store.get_by_id(user_id).await?;
                write_back(&background, &cache, &user);
                Ok(user)
            })
            .await
    }

    /// 按邮箱查询，邮箱不作为缓存键，始终合并后访问存储
    pub async fn get_by_email(&self, email: &str) -> AppResult<User> {
        let store = Arc::clone(&self.store);
        let owned = email.to_string();
        self.by_email
            .do_once(format!("users:email:{}", email), move || async move {
                store.get_by_email(&owned).await
            })
            .await
    }

    /// 用户是否存在，不存在返回 `Ok(false)` 而不是错误
    pub async fn exists(&self, user_id: i64) -> AppResult<bool> {
        match self.cache.exists(user_id).await {
            Ok(true) => return Ok(true),
            Ok(false) => {}
            Err(e) => tracing::warn!("User cache exists check failed for {}: {}", user_id, e),
        }

        let store = Arc::clone(&self.store);
        let cache = Arc::clone(&self.cache);
        let background = self.background.clone();
        self.existence
            .do_once(format!("exists:{}", user_id), move || async move {
                match store.get_by_id(user_id).await {
                    Ok(user) => {
                        write_back(&background, &cache, &user);
                        Ok(true)
                    }
                    Err(e) if e.is_not_found() => Ok(false),
                    Err(e) => Err(e),
                }
            })
            .await
    }

    /// 粉丝数加减：先写存储，再尽力同步缓存
    pub async fn increase_follower_count(&self, user_id: i64, delta: i64) -> AppResult<()> {
        self.store.increase_follower_count(user_id, delta).await?;
        self.sync_counter(user_id, Counter::Follower, delta).await;
        Ok(())
    }

    /// 关注数加减：先写存储，再尽力同步缓存
    pub async fn increase_following_count(&self, user_id: i64, delta: i64) -> AppResult<()> {
        self.store.increase_following_count(user_id, delta).await?;
        self.sync_counter(user_id, Counter::Following, delta).await;
        Ok(())
    }

    /// 粉丝数已在外部事务中提交，只同步缓存
    pub async fn sync_follower_count(&self, user_id: i64, delta: i64) {
        self.sync_counter(user_id, Counter::Follower, delta).await;
    }

    /// 关注数已在外部事务中提交，只同步缓存
    pub async fn sync_following_count(&self, user_id: i64, delta: i64) {
        self.sync_counter(user_id, Counter::Following, delta).await;
    }

    // 缓存自增失败或结果为负时直接失效，不做修补
    async fn sync_counter(&self, user_id: i64, counter: Counter, delta: i64) {
        match self.cache.exists(user_id).await {
            Ok(false) => return,
            Ok(true) => {
                let result = match counter {
                    Counter::Follower => self.cache.incr_follower(user_id, delta).await,
                    Counter::Following => self.cache.incr_following(user_id, delta).await,
                };
                match result {
                    Ok(Some(value)) if value >= 0 => return,
                    Ok(None) => return,
                    Ok(Some(value)) => tracing::warn!(
                        "Cached {:?} count for user {} went negative ({}), invalidating",
                        counter,
                        user_id,
                        value
                    ),
                    Err(e) => tracing::warn!(
                        "Cached {:?} count increment failed for user {}: {}",
                        counter,
                        user_id,
                        e
                    ),
                }
            }
            Err(e) => tracing::warn!("User cache exists check failed for {}: {}", user_id, e),
        }

        if let Err(e) = self.cache.invalidate(user_id).await {
            tracing::error!("Failed to invalidate user cache for {}: {}", user_id, e);
        }
    }
}

fn write_back(background: &BackgroundTasks, cache: &Arc<dyn UserCache>, user: &User) {
    let cache = Arc::clone(cache);
    let cached = CachedUser::from(user);
    let counters = UserCounters::from(user);
    background.spawn("user cache write-back", async move {
        cache
            .add(&cached, counters)
            .await
            .map_err(|e| AppError::internal(format!("user cache write-back for {}", cached.id), e))
    });
}
