use std::sync::Arc;

use chrono::Utc;

use crate::config::SessionSettings;
use crate::database::models::session::add_saturating;
use crate::database::models::{NewSession, Session};
use crate::database::operations::SessionStore;
use crate::error::{AppError, AppResult};
use crate::session::types::{SessionResponse, UserInfoProvider};
use crate::utils::token::{TOKEN_BYTES, validate_token_format};
use crate::utils::{BackgroundTasks, TokenCodec};

/// 会话服务
///
/// 会话状态：有效 -> 过期（下次校验时发现）或 有效 -> 吊销。
/// 续期只延长过期时间，不改变创建时间，且不超过最长生命周期。
pub struct SessionService {
    store: Arc<dyn SessionStore>,
    users: Arc<dyn UserInfoProvider>,
    codec: Arc<dyn TokenCodec>,
    settings: SessionSettings,
    background: BackgroundTasks,
}

impl SessionService {
    pub fn new(
        store: Arc<dyn SessionStore>,
        users: Arc<dyn UserInfoProvider>,
        codec: Arc<dyn TokenCodec>,
        settings: SessionSettings,
        background: BackgroundTasks,
    ) -> Self {
        Self {
            store,
            users,
            codec,
            settings,
            background,
        }
    }

    /// 签发新会话
    pub async fn issue(&self, user_id: i64) -> AppResult<SessionResponse> {
        if user_id <= 0 {
            return Err(AppError::RequiredFieldMissing);
        }

        let token = self
            .codec
            .generate(TOKEN_BYTES)
            .map_err(|e| AppError::internal("failed to generate session token", e))?;

        let now = Utc::now();
        let session = self
            .store
            .create(NewSession {
                user_id,
                token_hash: self.codec.hash(&token),
                expires_at: add_saturating(now, self.settings.duration)
                    .min(add_saturating(now, self.settings.max_lifetime)),
                created_at: now,
            })
            .await
            .map_err(|e| AppError::internal("failed to persist session", e))?;

        tracing::info!("Issued session for user {}", user_id);
        Ok(SessionResponse {
            user_id: session.user_id,
            token,
            expires_at: session.expires_at,
            created_at: session.created_at,
        })
    }

    /// 校验令牌；处于续期窗口时异步续期，返回的是续期前的会话
    pub async fn validate(&self, token: &str) -> AppResult<Session> {
        let session = self.authenticate(token).await?;
        if session.should_refresh_at(Utc::now()) {
            self.refresh_async(token);
        }
        Ok(session)
    }

    /// 在后台续期，不等待结果。任务被丢弃时返回 false。
    pub fn refresh_async(&self, token: &str) -> bool {
        let store = Arc::clone(&self.store);
        let token_hash = self.codec.hash(token);
        let settings = self.settings;

        self.background.spawn("session refresh", async move {
            let refresh = execute_refresh(store, token_hash, settings);
            match tokio::time::timeout(settings.refresh_timeout, refresh).await {
                Ok(result) => result,
                Err(e) => Err(AppError::internal("session refresh timed out", e)),
            }
        })
    }

    /// 吊销会话，只有会话所有者可以操作
    pub async fn revoke(&self, user_id: i64, token: &str) -> AppResult<()> {
        let session = self.authenticate(token).await?;
        if session.user_id != user_id {
            tracing::warn!(
                "User {} attempted to revoke a session owned by user {}",
                user_id,
                session.user_id
            );
            return Err(AppError::Forbidden);
        }

        self.store.delete(&session).await?;
        tracing::info!("Revoked session for user {}", user_id);
        Ok(())
    }

    /// 吊销用户的全部会话
    pub async fn revoke_all(&self, user_id: i64) -> AppResult<()> {
        if user_id <= 0 {
            return Err(AppError::InvalidUserId);
        }
        self.store.delete_by_user_id(user_id).await?;
        tracing::info!("Revoked all sessions for user {}", user_id);
        Ok(())
    }

    // 格式 -> 查询 -> 过期 -> 用户仍存在
    async fn authenticate(&self, token: &str) -> AppResult<Session> {
        validate_token_format(token)?;

        let session = self.store.get(&self.codec.hash(token)).await?;
        if session.expires_at <= session.created_at
            || session.is_expired_at(Utc::now(), self.settings.max_lifetime)
        {
            tracing::debug!("Session of user {} expired", session.user_id);
            return Err(AppError::SessionExpired);
        }

        self.users.to_my_page(session.user_id).await?;
        Ok(session)
    }
}

async fn execute_refresh(
    store: Arc<dyn SessionStore>,
    token_hash: String,
    settings: SessionSettings,
) -> AppResult<()> {
    let mut session = store.get(&token_hash).await?;
    let now = Utc::now();
    if session.is_expired_at(now, settings.max_lifetime) {
        tracing::debug!("Skipping refresh of expired session for user {}", session.user_id);
        return Ok(());
    }

    let expires_at = session.refreshed_expiry(now, settings.duration, settings.max_lifetime);
    if expires_at <= session.expires_at {
        return Ok(());
    }

    session.expires_at = expires_at;
    store.update(&session).await?;
    tracing::debug!("Refreshed session for user {} until {}", session.user_id, expires_at);
    Ok(())
}
