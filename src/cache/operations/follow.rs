use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, RedisResult, Script};

use crate::cache::keys::follow_keys;
use crate::config::CacheSettings;
use crate::database::models::Relationship;
use crate::utils::{random_expiration, ttl_secs};

// 两侧集合都已缓存时原地追加，否则两侧一起删除，不允许只修补一边
const ADD_EDGE_OR_INVALIDATE: &str = r#"
if redis.call('EXISTS', KEYS[1]) == 1 and redis.call('EXISTS', KEYS[2]) == 1 then
    redis.call('SADD', KEYS[1], ARGV[1])
    redis.call('SADD', KEYS[2], ARGV[2])
    return 1
end
redis.call('DEL', KEYS[1], KEYS[2])
return 0
"#;

/// 关注关系缓存接口
///
/// 每个用户两个集合：我关注的人、关注我的人。
#[async_trait]
pub trait FollowCache: Send + Sync {
    /// 新增一条边。两侧集合都在缓存中时原地更新并返回 true，
    /// 否则删除两侧集合并返回 false。
    async fn add(&self, follower_id: i64, following_id: i64) -> RedisResult<bool>;

    /// 用存储中的完整列表重建“我关注的人”集合
    async fn add_followings(&self, user_id: i64, following_ids: &[i64]) -> RedisResult<()>;

    /// 用存储中的完整列表重建“关注我的人”集合
    async fn add_followers(&self, user_id: i64, follower_ids: &[i64]) -> RedisResult<()>;

    /// 从 `user_a` 的视角判断关系。`user_a` 的两个集合与两次成员检查在同一次
    /// 原子往返中完成，任一集合不在缓存中时返回 `None`。
    async fn get_relation(&self, user_a: i64, user_b: i64) -> RedisResult<Option<Relationship>>;

    /// 集合不存在时返回空列表
    async fn get_following_ids(&self, user_id: i64) -> RedisResult<Vec<i64>>;

    /// 集合不存在时返回空列表
    async fn get_follower_ids(&self, user_id: i64) -> RedisResult<Vec<i64>>;

    /// 成对删除一条边两侧的集合
    async fn invalidate(&self, follower_id: i64, following_id: i64) -> RedisResult<()>;
}

/// Redis 关注关系缓存
#[derive(Clone)]
pub struct RedisFollowCache {
    conn: ConnectionManager,
    settings: CacheSettings,
}

impl RedisFollowCache {
    pub fn new(conn: ConnectionManager, settings: CacheSettings) -> Self {
        Self { conn, settings }
    }

    async fn replace_set(&self, key: String, members: &[i64]) -> RedisResult<()> {
        if members.is_empty() {
            return Ok(());
        }
        let mut conn = self.conn.clone();
        let ttl = random_expiration(self.settings.follow_ttl, self.settings.follow_jitter);

        let _: () = redis::pipe()
            .atomic()
            .del(&key)
            .ignore()
            .sadd(&key, members)
            .ignore()
            .expire(&key, ttl_secs(ttl) as i64)
            .ignore()
            .query_async(&mut conn)
            .await?;

        Ok(())
    }
}

#[async_trait]
impl FollowCache for RedisFollowCache {
    async fn add(&self, follower_id: i64, following_id: i64) -> RedisResult<bool> {
        let mut conn = self.conn.clone();
        let applied: i64 = Script::new(ADD_EDGE_OR_INVALIDATE)
            .key(follow_keys::followings_key(follower_id))
            .key(follow_keys::followers_key(following_id))
            .arg(following_id)
            .arg(follower_id)
            .invoke_async(&mut conn)
            .await?;
        Ok(applied == 1)
    }

    async fn add_followings(&self, user_id: i64, following_ids: &[i64]) -> RedisResult<()> {
        self.replace_set(follow_keys::followings_key(user_id), following_ids).await
    }

    async fn add_followers(&self, user_id: i64, follower_ids: &[i64]) -> RedisResult<()> {
        self.replace_set(follow_keys::followers_key(user_id), follower_ids).await
    }

    async fn get_relation(&self, user_a: i64, user_b: i64) -> RedisResult<Option<Relationship>> {
        let mut conn = self.conn.clone();
        let followings = follow_keys::followings_key(user_a);
        let followers = follow_keys::followers_key(user_a);
        let (has_followings, has_followers, following, followed_by): (bool, bool, bool, bool) =
            redis::pipe()
                .atomic()
                .exists(&followings)
                .exists(&followers)
                .sismember(&followings, user_b)
                .sismember(&followers, user_b)
                .query_async(&mut conn)
                .await?;

        if !(has_followings && has_followers) {
            return Ok(None);
        }
        Ok(Some(Relationship { following, followed_by }))
    }

    async fn get_following_ids(&self, user_id: i64) -> RedisResult<Vec<i64>> {
        let mut conn = self.conn.clone();
        conn.smembers(follow_keys::followings_key(user_id)).await
    }

    async fn get_follower_ids(&self, user_id: i64) -> RedisResult<Vec<i64>> {
        let mut conn = self.conn.clone();
        conn.smembers(follow_keys::followers_key(user_id)).await
    }

    async fn invalidate(&self, follower_id: i64, following_id: i64) -> RedisResult<()> {
        let mut conn = self.conn.clone();
        let _: () = conn
            .del(&[
                follow_keys::followings_key(follower_id),
                follow_keys::followers_key(following_id),
            ])
            .await?;
        Ok(())
    }
}
