use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// 会话实体，只保存令牌哈希，不保存原始令牌
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Session {
    pub id: i64,
    pub user_id: i64,
    pub token_hash: String,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// 待插入的会话
#[derive(Debug, Clone)]
pub struct NewSession {
    pub user_id: i64,
    pub token_hash: String,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl Session {
    /// 无论如何续期都不能超过的时间点
    pub fn hard_limit(&self, max_lifetime: Duration) -> DateTime<Utc> {
        add_saturating(self.created_at, max_lifetime)
    }

    /// 超过滑动过期时间或最长生命周期任一即为过期
    pub fn is_expired_at(&self, now: DateTime<Utc>, max_lifetime: Duration) -> bool {
        now > self.expires_at || now > self.hard_limit(max_lifetime)
    }

    /// 剩余时间不足当前窗口的四分之一时需要续期，窗口非正时从不续期
    pub fn should_refresh_at(&self, now: DateTime<Utc>) -> bool {
        let window = self.expires_at - self.created_at;
        if window <= chrono::Duration::zero() {
            return false;
        }
        let remaining = self.expires_at - now;
        remaining < window / 4
    }

    /// 在 `now` 续期后的过期时间，不超过最长生命周期
    pub fn refreshed_expiry(
        &self,
        now: DateTime<Utc>,
        duration: Duration,
        max_lifetime: Duration,
    ) -> DateTime<Utc> {
        add_saturating(now, duration).min(self.hard_limit(max_lifetime))
    }
}

pub(crate) fn add_saturating(at: DateTime<Utc>, duration: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(duration)
        .ok()
        .and_then(|d| at.checked_add_signed(d))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

#[cfg(test)]
mod tests {
    use super::*;

    const DAY: Duration = Duration::from_secs(24 * 3600);
    const WEEK: Duration = Duration::from_secs(7 * 24 * 3600);

    fn session(created_at: DateTime<Utc>, expires_at: DateTime<Utc>) -> Session {
        Session {
            id: 1,
            user_id: 1,
            token_hash: "hash".into(),
            expires_at,
            created_at,
        }
    }

    #[test]
    fn expiry_boundary_on_expires_at() {
        let created = Utc::now();
        let s = session(created, created + chrono::Duration::hours(24));

        assert!(!s.is_expired_at(s.expires_at, WEEK));
        assert!(s.is_expired_at(s.expires_at + chrono::Duration::nanoseconds(1), WEEK));
    }

    #[test]
    fn expiry_boundary_on_max_lifetime() {
        let created = Utc::now();
        // 过期时间超出上限也不能延长会话
        let s = session(created, created + chrono::Duration::days(30));
        let cap = created + chrono::Duration::days(7);

        assert!(!s.is_expired_at(cap, WEEK));
        assert!(s.is_expired_at(cap + chrono::Duration::nanoseconds(1), WEEK));
    }

    #[test]
    fn refresh_needed_in_last_quarter_only() {
        let created = Utc::now();
        let s = session(created, created + chrono::Duration::hours(24));

        assert!(!s.should_refresh_at(created + chrono::Duration::hours(17)));
        assert!(!s.should_refresh_at(created + chrono::Duration::hours(18)));
        assert!(s.should_refresh_at(created + chrono::Duration::minutes(23 * 60 + 55)));
    }

    #[test]
    fn zero_window_never_refreshes() {
        let created = Utc::now();
        let s = session(created, created);
        assert!(!s.should_refresh_at(created));
    }

    #[test]
    fn refreshed_expiry_slides_then_caps() {
        let created = Utc::now();
        let s = session(created, created + chrono::Duration::hours(24));

        let now = created + chrono::Duration::minutes(23 * 60 + 55);
        assert_eq!(s.refreshed_expiry(now, DAY, WEEK), now + chrono::Duration::hours(24));

        let late = created + chrono::Duration::days(6) + chrono::Duration::hours(20);
        assert_eq!(s.refreshed_expiry(late, DAY, WEEK), created + chrono::Duration::days(7));
    }
}
