/// 缓存操作
/// 提供缓存操作的功能实现

// 用户缓存操作
pub mod user;

// 关注关系缓存操作
pub mod follow;

// 会话存储（Redis 后端）
pub mod session;

// 重新导出常用操作
pub use follow::{FollowCache, RedisFollowCache};
pub use session::RedisSessionStore;
pub use user::{RedisUserCache, UserCache};

/// 序列化失败转换为 Redis 错误
pub(crate) fn serialization_error(e: serde_json::Error) -> redis::RedisError {
    redis::RedisError::from((redis::ErrorKind::IoError, "Serialization error", e.to_string()))
}

/// 反序列化失败转换为 Redis 错误
pub(crate) fn deserialization_error(e: serde_json::Error) -> redis::RedisError {
    redis::RedisError::from((redis::ErrorKind::IoError, "Deserialization error", e.to_string()))
}
