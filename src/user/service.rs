use std::sync::Arc;

use async_trait::async_trait;

use crate::database::models::{NewUser, User};
use crate::database::repositories::UserRepository;
use crate::error::{AppError, AppResult};
use crate::session::UserInfoProvider;
use crate::utils::{hash_password, verify_password};

/// 用户服务
pub struct UserService {
    users: Arc<UserRepository>,
    bcrypt_cost: u32,
}

impl UserService {
    pub fn new(users: Arc<UserRepository>, bcrypt_cost: u32) -> Self {
        Self { users, bcrypt_cost }
    }

    /// 注册用户，密码以 bcrypt 哈希保存
    pub async fn register(&self, username: &str, email: &str, password: &str) -> AppResult<User> {
        let username = username.trim();
        let email = email.trim();
        if username.is_empty() || email.is_empty() || password.is_empty() {
            return Err(AppError::RequiredFieldMissing);
        }

        let password = password.to_string();
        let cost = self.bcrypt_cost;
        let password_hash = tokio::task::spawn_blocking(move || hash_password(&password, cost))
            .await
            .map_err(|e| AppError::internal("password hashing task failed", e))?
            .map_err(|e| AppError::internal("failed to hash password", e))?;

        self.users
            .create(NewUser {
                username: username.to_string(),
                email: email.to_string(),
                password_hash,
            })
            .await
    }

    /// 邮箱密码登录，邮箱不存在与密码错误返回同一个错误
    pub async fn login(&self, email: &str, password: &str) -> AppResult<User> {
        if email.trim().is_empty() || password.is_empty() {
            return Err(AppError::RequiredFieldMissing);
        }

        let user = match self.users.get_by_email(email.trim()).await {
            Ok(user) => user,
            Err(AppError::UserNotFound) => return Err(AppError::InvalidCredentials),
            Err(e) => return Err(e),
        };

        let password = password.to_string();
        let hash = user.password_hash.clone();
        let matches = tokio::task::spawn_blocking(move || verify_password(&password, &hash))
            .await
            .map_err(|e| AppError::internal("password verification task failed", e))?
            .map_err(|e| AppError::internal("failed to verify password", e))?;

        if !matches {
            tracing::debug!("Wrong password for user {}", user.id);
            return Err(AppError::InvalidCredentials);
        }
        Ok(user)
    }

    /// 个人主页数据
    pub async fn to_my_page(&self, user_id: i64) -> AppResult<User> {
        check_id(user_id)?;
        self.users.get_by_id(user_id).await
    }

    pub async fn update_follower_count(&self, user_id: i64, delta: i64) -> AppResult<()> {
        check_id(user_id)?;
        self.users.increase_follower_count(user_id, delta).await
    }

    pub async fn update_following_count(&self, user_id: i64, delta: i64) -> AppResult<()> {
        check_id(user_id)?;
        self.users.increase_following_count(user_id, delta).await
    }

    pub async fn exists(&self, user_id: i64) -> AppResult<bool> {
        check_id(user_id)?;
        self.users.exists(user_id).await
    }
}

fn check_id(user_id: i64) -> AppResult<()> {
    if user_id <= 0 {
        return Err(AppError::InvalidUserId);
    }
    Ok(())
}

#[async_trait]
impl UserInfoProvider for UserService {
    async fn to_my_page(&self, user_id: i64) -> AppResult<User> {
        UserService::to_my_page(self, user_id).await
    }
}
