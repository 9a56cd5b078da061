use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::database::models::Session;

/// 会话缓存数据模型
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct CachedSession {
    pub id: i64,
    pub user_id: i64,
    pub token_hash: String,
    pub expires_at: i64, // Unix timestamp
    pub created_at: i64, // Unix timestamp
}

impl From<&Session> for CachedSession {
    fn from(session: &Session) -> Self {
        Self {
            id: session.id,
            user_id: session.user_id,
            token_hash: session.token_hash.clone(),
            expires_at: session.expires_at.timestamp(),
            created_at: session.created_at.timestamp(),
        }
    }
}

impl From<CachedSession> for Session {
    fn from(cached: CachedSession) -> Self {
        Self {
            id: cached.id,
            user_id: cached.user_id,
            token_hash: cached.token_hash,
            expires_at: DateTime::<Utc>::from_timestamp(cached.expires_at, 0).unwrap_or_default(),
            created_at: DateTime::<Utc>::from_timestamp(cached.created_at, 0).unwrap_or_default(),
        }
    }
}
