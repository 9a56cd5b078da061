use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::database::models::User;

/// 用户资料缓存数据模型（不含计数，计数单独存放在哈希中）
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct CachedUser {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub created_at: i64, // Unix timestamp
}

/// 用户计数缓存
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UserCounters {
    pub follower: i64,
    pub following: i64,
}

impl From<&User> for CachedUser {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            username: user.username.clone(),
            email: user.email.clone(),
            password_hash: user.password_hash.clone(),
            created_at: user.created_at.timestamp(),
        }
    }
}

impl CachedUser {
    /// 与计数合并还原为完整用户
    pub fn into_user(self, counters: UserCounters) -> User {
        User {
            id: self.id,
            username: self.username,
            email: self.email,
            password_hash: self.password_hash,
            created_at: DateTime::<Utc>::from_timestamp(self.created_at, 0).unwrap_or_default(),
            follower_count: counters.follower,
            following_count: counters.following,
        }
    }
}

impl From<&User> for UserCounters {
    fn from(user: &User) -> Self {
        Self {
            follower: user.follower_count,
            following: user.following_count,
        }
    }
}
