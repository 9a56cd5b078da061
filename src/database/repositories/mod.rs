/// 缓存协同的存储库
pub mod follow;
pub mod user;

pub use follow::FollowRepository;
pub use user::UserRepository;
