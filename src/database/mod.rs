// 数据库模块
// 实体定义、存储接口与 Postgres 实现、缓存协同的仓储层

pub mod models;
pub mod operations;
pub mod repositories;

pub use models::{Follow, NewSession, NewUser, Relationship, Session, User};
pub use operations::{FollowStore, SessionStore, UserStore};
pub use repositories::{FollowRepository, UserRepository};

pub(crate) const ERR_STRING_DATA_RIGHT_TRUNCATION: &str = "22001";
pub(crate) const ERR_FOREIGN_KEY_VIOLATION: &str = "23503";
pub(crate) const ERR_UNIQUE_VIOLATION: &str = "23505";
pub(crate) const ERR_CHECK_VIOLATION: &str = "23514";

pub(crate) const CONSTRAINT_SESSION_USER_FK: &str = "sessions_user_id_fkey";
pub(crate) const CONSTRAINT_TOKEN_HASH_UNIQUE: &str = "sessions_token_hash_key";
pub(crate) const CONSTRAINT_USERNAME_UNIQUE: &str = "users_username_key";
pub(crate) const CONSTRAINT_EMAIL_UNIQUE: &str = "users_email_key";
pub(crate) const CONSTRAINT_UNIQUE_FOLLOW: &str = "follows_follower_id_following_id_key";
pub(crate) const CONSTRAINT_NO_SELF_FOLLOW: &str = "follows_no_self_follow";

/// 取出数据库错误的 SQLSTATE 与约束名，驱动未提供时返回 None
pub(crate) fn violation(err: &sqlx::Error) -> Option<(String, Option<String>)> {
    match err {
        sqlx::Error::Database(db_err) => {
            let code = db_err.code()?.into_owned();
            Some((code, db_err.constraint().map(str::to_owned)))
        }
        _ => None,
    }
}
