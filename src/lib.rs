use std::sync::Arc;

use config::{Config, SessionBackend};
use redis::aio::ConnectionManager;
use sqlx::PgPool;

pub mod cache;
pub mod config;
pub mod database;
pub mod error;
pub mod follow;
pub mod session;
pub mod user;
pub mod utils;

#[cfg(test)]
pub(crate) mod testing;

use cache::{RedisFollowCache, RedisSessionStore, RedisUserCache};
use database::operations::{PgFollowStore, PgSessionStore, PgUserStore, SessionStore};
use database::{FollowRepository, UserRepository};
use follow::FollowService;
use session::SessionService;
use user::UserService;
use utils::{BackgroundTasks, RandomTokenCodec};

#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub background: BackgroundTasks,
    pub users: Arc<UserService>,
    pub follows: Arc<FollowService>,
    pub sessions: Arc<SessionService>,
}

impl AppState {
    /// 组装存储、缓存、存储库与服务
    pub fn build(config: Config, pool: PgPool, redis: ConnectionManager) -> Self {
        let cache_settings = config.cache_settings();
        let session_settings = config.session_settings();
        let wait_timeout = config.coalesce_wait_timeout();
        let background =
            BackgroundTasks::new(config.background_max_tasks, config.background_task_timeout());

        let user_repo = Arc::new(
            UserRepository::new(
                Arc::new(PgUserStore::new(pool.clone())),
                Arc::new(RedisUserCache::new(redis.clone(), cache_settings)),
                background.clone(),
            )
            .with_wait_timeout(wait_timeout),
        );
        let follow_repo = Arc::new(
            FollowRepository::new(
                Arc::new(PgFollowStore::new(pool.clone())),
                Arc::new(RedisFollowCache::new(redis.clone(), cache_settings)),
                background.clone(),
            )
            .with_wait_timeout(wait_timeout),
        );

        let session_store: Arc<dyn SessionStore> = match config.session_backend {
            SessionBackend::Postgres => Arc::new(PgSessionStore::new(pool)),
            SessionBackend::Redis => {
                Arc::new(RedisSessionStore::new(redis, session_settings.max_lifetime))
            }
        };
        tracing::info!("Session backend: {:?}", config.session_backend);

        let users = Arc::new(UserService::new(Arc::clone(&user_repo), config.bcrypt_cost));
        let follows = Arc::new(FollowService::new(follow_repo, user_repo));
        let sessions = Arc::new(SessionService::new(
            session_store,
            users.clone(),
            Arc::new(RandomTokenCodec),
            session_settings,
            background.clone(),
        ));

        Self {
            config,
            background,
            users,
            follows,
            sessions,
        }
    }
}
