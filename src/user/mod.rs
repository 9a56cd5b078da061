// 用户模块
// 注册、登录、个人主页与计数维护

mod service;

pub use service::UserService;
