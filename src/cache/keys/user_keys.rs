/// 用户资料缓存键前缀
const USER_DATA_PREFIX: &str = "user:data:";

/// 用户计数缓存键前缀
const USER_COUNT_PREFIX: &str = "user:count:";

/// 计数哈希中的粉丝数字段
pub const FOLLOWER_FIELD: &str = "follower";

/// 计数哈希中的关注数字段
pub const FOLLOWING_FIELD: &str = "following";

/// 生成用户资料缓存键
pub fn user_data_key(user_id: i64) -> String {
    format!("{}{}", USER_DATA_PREFIX, user_id)
}

/// 生成用户计数缓存键
pub fn user_count_key(user_id: i64) -> String {
    format!("{}{}", USER_COUNT_PREFIX, user_id)
}
