use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// 关注关系（有向边），同一对用户唯一
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Follow {
    pub id: i64,
    pub follower_id: i64,
    pub following_id: i64,
    pub created_at: DateTime<Utc>,
}

/// 从第一个用户视角看两人的关系
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Relationship {
    /// 前者关注了后者
    pub following: bool,
    /// 后者关注了前者
    pub followed_by: bool,
}

impl Relationship {
    pub fn is_mutual(&self) -> bool {
        self.following && self.followed_by
    }

    /// 换到另一方视角
    pub fn reversed(self) -> Self {
        Self {
            following: self.followed_by,
            followed_by: self.following,
        }
    }
}
