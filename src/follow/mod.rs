// 关注模块
// 关注、取关以及关系查询，关注数与粉丝数随之维护

mod service;

pub use service::FollowService;
