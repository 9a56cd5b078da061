use social_backend::{AppState, config::Config};
use sqlx::Executor;
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    // 初始化日志
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // 加载配置
    let config = Config::from_env().expect("Failed to load configuration");

    // 设置数据库连接池
    let pool = PgPoolOptions::new()
        .max_connections(config.db_max_connections)
        .after_connect(|conn, _meta| {
            Box::pin(async move {
                conn.execute("SET application_name = 'social_backend';").await?;
                Ok(())
            })
        })
        .connect(&config.database_url)
        .await
        .expect("Failed to connect to Postgres");

    sqlx::migrate!()
        .run(&pool)
        .await
        .expect("Failed to run database migrations");

    // 设置 Redis 连接
    let redis = redis::Client::open(config.redis_url.clone())
        .expect("Failed to create Redis client")
        .get_connection_manager()
        .await
        .expect("Failed to connect to Redis");

    // 设置应用状态
    let state = AppState::build(config, pool, redis);
    tracing::info!("Social backend ready, press Ctrl-C to stop");

    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
    }

    // 等待后台任务（续期、缓存回写）结束
    let grace = state.config.shutdown_grace();
    let aborted = state.background.shutdown(grace).await;
    tracing::info!("Shut down, {} background tasks aborted", aborted);
}
