use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, RedisResult};

use crate::cache::keys::session_keys;
use crate::cache::models::session::CachedSession;
use crate::cache::operations::{deserialization_error, serialization_error};
use crate::database::models::{NewSession, Session};
use crate::database::operations::SessionStore;
use crate::error::{AppError, AppResult};
use crate::utils::ttl_secs;

/// 用户会话索引比最长会话多保留的时长
const INDEX_TTL_LEAD: Duration = Duration::from_secs(24 * 3600);

/// 基于 Redis 的会话存储
///
/// 每个会话一个数据键，过期时间等于剩余有效期；
/// 另有按用户划分的令牌哈希集合，用于一次性删除用户的全部会话。
#[derive(Clone)]
pub struct RedisSessionStore {
    conn: ConnectionManager,
    max_lifetime: Duration,
}

impl RedisSessionStore {
    pub fn new(conn: ConnectionManager, max_lifetime: Duration) -> Self {
        Self { conn, max_lifetime }
    }

    async fn write(&self, session: &Session, nx: bool) -> RedisResult<bool> {
        let mut conn = self.conn.clone();

        let data_key = session_keys::session_data_key(&session.token_hash);
        let index_key = session_keys::user_sessions_key(session.user_id);
        let json = serde_json::to_string(&CachedSession::from(session)).map_err(serialization_error)?;

        let remaining = (session.expires_at - Utc::now()).to_std().unwrap_or_default();
        let index_ttl = self.max_lifetime.saturating_add(INDEX_TTL_LEAD);

        let mut options = redis::SetOptions::default()
            .with_expiration(redis::SetExpiry::EX(ttl_secs(remaining)));
        if nx {
            options = options.conditional_set(redis::ExistenceCheck::NX);
        } else {
            options = options.conditional_set(redis::ExistenceCheck::XX);
        }

        let (written,): (Option<String>,) = redis::pipe()
            .atomic()
            .set_options(&data_key, json, options)
            .sadd(&index_key, &session.token_hash)
            .ignore()
            .expire(&index_key, ttl_secs(index_ttl) as i64)
            .ignore()
            .query_async(&mut conn)
            .await?;

        Ok(written.is_some())
    }

    async fn fetch(&self, token_hash: &str) -> RedisResult<Option<Session>> {
        let mut conn = self.conn.clone();
        let json: Option<String> = conn.get(session_keys::session_data_key(token_hash)).await?;

        match json {
            Some(json) => {
                let cached: CachedSession = serde_json::from_str(&json).map_err(deserialization_error)?;
                Ok(Some(cached.into()))
            }
            None => Ok(None),
        }
    }
}

fn store_error(context: &'static str) -> impl FnOnce(redis::RedisError) -> AppError {
    move |e| AppError::internal(context, e)
}

#[async_trait]
impl SessionStore for RedisSessionStore {
    async fn create(&self, session: NewSession) -> AppResult<Session> {
        let session = Session {
            id: 0,
            user_id: session.user_id,
            token_hash: session.token_hash,
            expires_at: session.expires_at,
            created_at: session.created_at,
        };

        let written = self
            .write(&session, true)
            .await
            .map_err(store_error("failed to create session"))?;
        if !written {
            return Err(AppError::TokenConflict);
        }
        // 与读取路径保持相同的秒级精度
        Ok(CachedSession::from(&session).into())
    }

    async fn get(&self, token_hash: &str) -> AppResult<Session> {
        self.fetch(token_hash)
            .await
            .map_err(store_error("failed to load session by token hash"))?
            .ok_or(AppError::SessionNotFound)
    }

    async fn update(&self, session: &Session) -> AppResult<()> {
        let written = self
            .write(session, false)
            .await
            .map_err(store_error("failed to update session expiry"))?;
        if !written {
            return Err(AppError::SessionNotFound);
        }
        Ok(())
    }

    async fn delete(&self, session: &Session) -> AppResult<()> {
        let mut conn = self.conn.clone();
        let (deleted,): (i64,) = redis::pipe()
            .atomic()
            .del(session_keys::session_data_key(&session.token_hash))
            .srem(session_keys::user_sessions_key(session.user_id), &session.token_hash)
            .ignore()
            .query_async(&mut conn)
            .await
            .map_err(store_error("failed to delete session"))?;

        if deleted == 0 {
            return Err(AppError::SessionNotFound);
        }
        Ok(())
    }

    async fn delete_by_user_id(&self, user_id: i64) -> AppResult<()> {
        let mut conn = self.conn.clone();
        let index_key = session_keys::user_sessions_key(user_id);

        let hashes: Vec<String> = conn
            .smembers(&index_key)
            .await
            .map_err(store_error("failed to list sessions of user"))?;

        let mut pipe = redis::pipe();
        pipe.atomic();
        for hash in &hashes {
            pipe.del(session_keys::session_data_key(hash)).ignore();
        }
        pipe.del(&index_key).ignore();

        let _: () = pipe
            .query_async(&mut conn)
            .await
            .map_err(store_error("failed to delete sessions of user"))?;
        Ok(())
    }
}
