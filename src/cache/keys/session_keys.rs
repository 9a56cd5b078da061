/// 会话数据键前缀
const SESSION_DATA_PREFIX: &str = "session:data:";

/// 用户会话索引键前缀
const USER_SESSIONS_PREFIX: &str = "session:user:";

/// 生成会话数据键
pub fn session_data_key(token_hash: &str) -> String {
    format!("{}{}", SESSION_DATA_PREFIX, token_hash)
}

/// 生成用户会话索引键，集合成员为令牌哈希
pub fn user_sessions_key(user_id: i64) -> String {
    format!("{}{}", USER_SESSIONS_PREFIX, user_id)
}
