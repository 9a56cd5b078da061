use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::database::models::User;
use crate::error::AppResult;

/// 签发结果，原始令牌只会在这里出现一次
#[derive(Debug, Clone, Serialize)]
pub struct SessionResponse {
    pub user_id: i64,
    pub token: String,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// 会话校验时用于确认用户仍然存在
#[async_trait]
pub trait UserInfoProvider: Send + Sync {
    async fn to_my_page(&self, user_id: i64) -> AppResult<User>;
}
