/// 存储接口及其 Postgres 实现
pub mod follow;
pub mod session;
pub mod user;

pub use follow::{FollowStore, PgFollowStore};
pub use session::{PgSessionStore, SessionStore};
pub use user::{PgUserStore, UserStore};
