/// 缓存数据模型

// 用户缓存模型
pub mod user;

// 会话缓存模型
pub mod session;

pub use session::CachedSession;
pub use user::{CachedUser, UserCounters};
