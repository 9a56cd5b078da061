/// 缓存键模块
/// 提供各种缓存键生成函数

// 用户缓存键模块
pub mod user_keys;

// 关注关系缓存键模块
pub mod follow_keys;

// 会话缓存键模块
pub mod session_keys;

// 重新导出常用的键生成函数
pub use follow_keys::{followers_key, followings_key};
pub use session_keys::{session_data_key, user_sessions_key};
pub use user_keys::{user_count_key, user_data_key};
