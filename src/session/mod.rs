// 会话模块
// 会话签发、滑动过期校验、异步续期与吊销

mod service;
mod types;

pub use service::SessionService;
pub use types::{SessionResponse, UserInfoProvider};
