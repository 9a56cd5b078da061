use std::env;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionBackend {
    Postgres,
    Redis,
}

impl FromStr for SessionBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "postgres" | "pg" => Ok(Self::Postgres),
            "redis" => Ok(Self::Redis),
            other => Err(format!("unknown session backend: {}", other)),
        }
    }
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct Config {
    pub database_url: String,
    pub redis_url: String,
    pub session_backend: SessionBackend,
    pub session_duration_secs: u64,
    pub max_session_lifetime_secs: u64,
    pub session_refresh_timeout_secs: u64,
    pub user_cache_ttl_secs: u64,
    pub user_cache_jitter_secs: u64,
    pub follow_cache_ttl_secs: u64,
    pub follow_cache_jitter_secs: u64,
    pub coalesce_wait_timeout_ms: u64,
    pub background_max_tasks: usize,
    pub background_task_timeout_secs: u64,
    pub shutdown_grace_secs: u64,
    pub db_max_connections: u32,
    pub bcrypt_cost: u32,
}

impl Config {
    pub fn from_env() -> Result<Self, env::VarError> {
        dotenv::dotenv().ok();

        let session_hours = env_or("SESSION_DURATION", 24u64, |v| v.trim_end_matches('h'));
        let lifetime_hours = env_or("MAX_SESSION_LIFETIME", 168u64, |v| v.trim_end_matches('h'));

        Ok(Config {
            database_url: env::var("DATABASE_URL")?,
            redis_url: env::var("REDIS_URL")?,
            session_backend: env_or("SESSION_BACKEND", SessionBackend::Postgres, str::trim),
            session_duration_secs: session_hours * 3600,
            max_session_lifetime_secs: lifetime_hours * 3600,
            session_refresh_timeout_secs: env_or("SESSION_REFRESH_TIMEOUT", 10, str::trim),
            user_cache_ttl_secs: env_or("USER_CACHE_TTL", 72 * 3600, str::trim),
            user_cache_jitter_secs: env_or("USER_CACHE_JITTER", 3600, str::trim),
            follow_cache_ttl_secs: env_or("FOLLOW_CACHE_TTL", 24 * 3600, str::trim),
            follow_cache_jitter_secs: env_or("FOLLOW_CACHE_JITTER", 3600, str::trim),
            coalesce_wait_timeout_ms: env_or("COALESCE_WAIT_TIMEOUT_MS", 5000, str::trim),
            background_max_tasks: env_or("BACKGROUND_MAX_TASKS", 1024, str::trim),
            background_task_timeout_secs: env_or("BACKGROUND_TASK_TIMEOUT", 10, str::trim),
            shutdown_grace_secs: env_or("SHUTDOWN_GRACE", 5, str::trim),
            db_max_connections: env_or("DB_MAX_CONNECTIONS", 10, str::trim),
            bcrypt_cost: env_or("BCRYPT_COST", bcrypt::DEFAULT_COST, str::trim),
        })
    }

    pub fn session_settings(&self) -> SessionSettings {
        SessionSettings {
            duration: Duration::from_secs(self.session_duration_secs),
            max_lifetime: Duration::from_secs(self.max_session_lifetime_secs),
            refresh_timeout: Duration::from_secs(self.session_refresh_timeout_secs),
        }
    }

    pub fn cache_settings(&self) -> CacheSettings {
        CacheSettings {
            user_ttl: Duration::from_secs(self.user_cache_ttl_secs),
            user_jitter: Duration::from_secs(self.user_cache_jitter_secs),
            follow_ttl: Duration::from_secs(self.follow_cache_ttl_secs),
            follow_jitter: Duration::from_secs(self.follow_cache_jitter_secs),
        }
    }

    pub fn coalesce_wait_timeout(&self) -> Duration {
        Duration::from_millis(self.coalesce_wait_timeout_ms)
    }

    pub fn background_task_timeout(&self) -> Duration {
        Duration::from_secs(self.background_task_timeout_secs)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }
}

/// Reads an optional variable, falling back to `default` when unset or unparsable.
fn env_or<T, F>(key: &str, default: T, normalize: F) -> T
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> &str,
{
    match env::var(key) {
        Ok(raw) => normalize(&raw).parse().unwrap_or_else(|e| {
            tracing::warn!("Invalid value for {}: {}, using default", key, e);
            default
        }),
        Err(_) => default,
    }
}

/// Session lifetime policy.
#[derive(Debug, Clone, Copy)]
pub struct SessionSettings {
    /// Sliding window granted on issue and on every refresh.
    pub duration: Duration,
    /// Absolute cap measured from the session's creation.
    pub max_lifetime: Duration,
    /// Budget for a single detached refresh.
    pub refresh_timeout: Duration,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            duration: Duration::from_secs(24 * 3600),
            max_lifetime: Duration::from_secs(7 * 24 * 3600),
            refresh_timeout: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct CacheSettings {
    pub user_ttl: Duration,
    pub user_jitter: Duration,
    pub follow_ttl: Duration,
    pub follow_jitter: Duration,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            user_ttl: Duration::from_secs(72 * 3600),
            user_jitter: Duration::from_secs(3600),
            follow_ttl: Duration::from_secs(24 * 3600),
            follow_jitter: Duration::from_secs(3600),
        }
    }
}
