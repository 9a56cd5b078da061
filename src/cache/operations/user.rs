use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, RedisResult, Script};

use crate::cache::keys::user_keys::{self, FOLLOWER_FIELD, FOLLOWING_FIELD};
use crate::cache::models::user::{CachedUser, UserCounters};
use crate::cache::operations::{deserialization_error, serialization_error};
use crate::config::CacheSettings;
use crate::utils::{random_expiration, ttl_secs};

/// 计数键比资料键提前过期的时长，避免资料还在而计数长期陈旧
const COUNT_TTL_LEAD: Duration = Duration::from_secs(30 * 60);

// 只有计数哈希仍存在时才自增，避免 HINCRBY 凭空创建一个残缺的计数
const INCR_IF_EXISTS: &str = r#"
if redis.call('EXISTS', KEYS[1]) == 1 then
    return redis.call('HINCRBY', KEYS[1], ARGV[1], ARGV[2])
end
return false
"#;

/// 用户缓存接口
///
/// 资料与计数分两个键存放，但视为一个整体：只命中其一按未命中处理。
#[async_trait]
pub trait UserCache: Send + Sync {
    /// 写入资料与计数
    async fn add(&self, user: &CachedUser, counters: UserCounters) -> RedisResult<()>;

    /// 同时读取资料与计数，任一缺失返回 `None`
    async fn get(&self, user_id: i64) -> RedisResult<Option<(CachedUser, UserCounters)>>;

    /// 两个键都存在时返回 true
    async fn exists(&self, user_id: i64) -> RedisResult<bool>;

    /// 粉丝数自增，计数不存在时返回 `None`
    async fn incr_follower(&self, user_id: i64, delta: i64) -> RedisResult<Option<i64>>;

    /// 关注数自增，计数不存在时返回 `None`
    async fn incr_following(&self, user_id: i64, delta: i64) -> RedisResult<Option<i64>>;

    /// 删除资料与计数
    async fn invalidate(&self, user_id: i64) -> RedisResult<()>;
}

/// Redis 用户缓存
#[derive(Clone)]
pub struct RedisUserCache {
    conn: ConnectionManager,
    settings: CacheSettings,
}

impl RedisUserCache {
    pub fn new(conn: ConnectionManager, settings: CacheSettings) -> Self {
        Self { conn, settings }
    }

    async fn incr_field(&self, user_id: i64, field: &str, delta: i64) -> RedisResult<Option<i64>> {
        let mut conn = self.conn.clone();
        Script::new(INCR_IF_EXISTS)
            .key(user_keys::user_count_key(user_id))
            .arg(field)
            .arg(delta)
            .invoke_async(&mut conn)
            .await
    }
}

#[async_trait]
impl UserCache for RedisUserCache {
    async fn add(&self, user: &CachedUser, counters: UserCounters) -> RedisResult<()> {
        let mut conn = self.conn.clone();

        let data_key = user_keys::user_data_key(user.id);
        let count_key = user_keys::user_count_key(user.id);
        let json = serde_json::to_string(user).map_err(serialization_error)?;

        let data_ttl = random_expiration(self.settings.user_ttl, self.settings.user_jitter);
        let count_ttl = data_ttl.saturating_sub(COUNT_TTL_LEAD);

        let _: () = redis::pipe()
            .atomic()
            .set_ex(&data_key, json, ttl_secs(data_ttl))
            .ignore()
            .hset_multiple(
                &count_key,
                &[(FOLLOWER_FIELD, counters.follower), (FOLLOWING_FIELD, counters.following)],
            )
            .ignore()
            .expire(&count_key, ttl_secs(count_ttl) as i64)
            .ignore()
            .query_async(&mut conn)
            .await?;

        Ok(())
    }

    async fn get(&self, user_id: i64) -> RedisResult<Option<(CachedUser, UserCounters)>> {
        let mut conn = self.conn.clone();

        let (data, counts): (Option<String>, HashMap<String, i64>) = redis::pipe()
            .get(user_keys::user_data_key(user_id))
            .hgetall(user_keys::user_count_key(user_id))
            .query_async(&mut conn)
            .await?;

        let (Some(json), Some(&follower), Some(&following)) = (
            data,
            counts.get(FOLLOWER_FIELD),
            counts.get(FOLLOWING_FIELD),
        ) else {
            return Ok(None);
        };

        let user: CachedUser = serde_json::from_str(&json).map_err(deserialization_error)?;
        Ok(Some((user, UserCounters { follower, following })))
    }

    async fn exists(&self, user_id: i64) -> RedisResult<bool> {
        let mut conn = self.conn.clone();
        let count: i64 = conn
            .exists(&[user_keys::user_data_key(user_id), user_keys::user_count_key(user_id)])
            .await?;
        Ok(count == 2)
    }

    async fn incr_follower(&self, user_id: i64, delta: i64) -> RedisResult<Option<i64>> {
        self.incr_field(user_id, FOLLOWER_FIELD, delta).await
    }

    async fn incr_following(&self, user_id: i64, delta: i64) -> RedisResult<Option<i64>> {
        self.incr_field(user_id, FOLLOWING_FIELD, delta).await
    }

    async fn invalidate(&self, user_id: i64) -> RedisResult<()> {
        let mut conn = self.conn.clone();
        let _: () = conn
            .del(&[user_keys::user_data_key(user_id), user_keys::user_count_key(user_id)])
            .await?;
        Ok(())
    }
}
