/// 关注列表缓存键前缀
const FOLLOWING_PREFIX: &str = "follow:following:";

/// 粉丝列表缓存键前缀
const FOLLOWER_PREFIX: &str = "follow:follower:";

/// 生成“我关注的人”集合键
pub fn followings_key(user_id: i64) -> String {
    format!("{}{}", FOLLOWING_PREFIX, user_id)
}

/// 生成“关注我的人”集合键
pub fn followers_key(user_id: i64) -> String {
    format!("{}{}", FOLLOWER_PREFIX, user_id)
}
