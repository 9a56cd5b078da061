//! In-memory stand-ins for the stores and caches, used by unit tests.
//!
//! Each fake counts the calls tests care about and can be slowed down or
//! (for caches) switched into a failing mode.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use redis::RedisResult;

use crate::cache::keys::follow_keys;
use crate::cache::models::{CachedUser, UserCounters};
use crate::cache::operations::{FollowCache, UserCache};
use crate::database::models::{Follow, NewSession, NewUser, Relationship, Session, User};
use crate::database::operations::{FollowStore, SessionStore, UserStore};
use crate::error::{AppError, AppResult};
use crate::session::UserInfoProvider;

async fn delay(latency: Option<Duration>) {
    if let Some(latency) = latency {
        tokio::time::sleep(latency).await;
    }
}

fn unavailable() -> redis::RedisError {
    redis::RedisError::from((redis::ErrorKind::IoError, "cache unavailable"))
}

pub fn user(id: i64, name: &str) -> User {
    User {
        id,
        username: name.to_string(),
        email: format!("{}@example.com", name),
        password_hash: String::new(),
        created_at: Utc::now(),
        follower_count: 0,
        following_count: 0,
    }
}

#[derive(Default)]
pub struct MemoryUserStore {
    users: Mutex<HashMap<i64, User>>,
    next_id: AtomicI64,
    get_by_id_calls: AtomicUsize,
    get_by_email_calls: AtomicUsize,
    failing_counters: Mutex<HashSet<i64>>,
    latency: Option<Duration>,
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn insert(&self, user: User) {
        self.next_id.fetch_max(user.id, Ordering::SeqCst);
        self.users.lock().unwrap().insert(user.id, user);
    }

    pub fn stored(&self, user_id: i64) -> Option<User> {
        self.users.lock().unwrap().get(&user_id).cloned()
    }

    pub fn get_by_id_calls(&self) -> usize {
        self.get_by_id_calls.load(Ordering::SeqCst)
    }

    pub fn get_by_email_calls(&self) -> usize {
        self.get_by_email_calls.load(Ordering::SeqCst)
    }

    /// Counter updates for `user_id` fail from now on.
    pub fn fail_counters_for(&self, user_id: i64) {
        self.failing_counters.lock().unwrap().insert(user_id);
    }

    fn apply(&self, user_id: i64, update: impl FnOnce(&mut User)) -> AppResult<()> {
        let mut users = self.users.lock().unwrap();
        self.bump(&mut users, user_id, update)
    }

    fn bump(
        &self,
        users: &mut HashMap<i64, User>,
        user_id: i64,
        update: impl FnOnce(&mut User),
    ) -> AppResult<()> {
        if self.failing_counters.lock().unwrap().contains(&user_id) {
            return Err(AppError::internal("failed to update count", unavailable()));
        }
        let user = users.get_mut(&user_id).ok_or(AppError::UserNotFound)?;
        update(user);
        Ok(())
    }

    /// Applies `(user_id, follower_delta, following_delta)` changes all or
    /// nothing, the way a transaction would.
    fn apply_counts(&self, changes: &[(i64, i64, i64)]) -> AppResult<()> {
        let mut users = self.users.lock().unwrap();
        let mut staged = users.clone();
        for &(user_id, follower, following) in changes {
            self.bump(&mut staged, user_id, |u| {
                u.follower_count = (u.follower_count + follower).max(0);
                u.following_count = (u.following_count + following).max(0);
            })?;
        }
        *users = staged;
        Ok(())
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn create(&self, user: NewUser) -> AppResult<User> {
        delay(self.latency).await;
        let mut users = self.users.lock().unwrap();
        if users.values().any(|u| u.username == user.username) {
            return Err(AppError::UsernameConflict);
        }
        if users.values().any(|u| u.email == user.email) {
            return Err(AppError::EmailConflict);
        }
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let created = User {
            id,
            username: user.username,
            email: user.email,
            password_hash: user.password_hash,
            created_at: Utc::now(),
            follower_count: 0,
            following_count: 0,
        };
        users.insert(id, created.clone());
        Ok(created)
    }

    async fn get_by_email(&self, email: &str) -> AppResult<User> {
        self.get_by_email_calls.fetch_add(1, Ordering::SeqCst);
        delay(self.latency).await;
        self.users
            .lock()
            .unwrap()
            .values()
            .find(|u| u.email == email)
            .cloned()
            .ok_or(AppError::UserNotFound)
    }

    async fn get_by_id(&self, user_id: i64) -> AppResult<User> {
        self.get_by_id_calls.fetch_add(1, Ordering::SeqCst);
        delay(self.latency).await;
        self.stored(user_id).ok_or(AppError::UserNotFound)
    }

    async fn increase_follower_count(&self, user_id: i64, delta: i64) -> AppResult<()> {
        self.apply(user_id, |u| u.follower_count = (u.follower_count + delta).max(0))
    }

    async fn increase_following_count(&self, user_id: i64, delta: i64) -> AppResult<()> {
        self.apply(user_id, |u| u.following_count = (u.following_count + delta).max(0))
    }
}

#[derive(Default)]
pub struct MemoryFollowStore {
    edges: Mutex<Vec<Follow>>,
    next_id: AtomicI64,
    relationship_calls: AtomicUsize,
    list_calls: AtomicUsize,
    users: Option<Arc<MemoryUserStore>>,
    latency: Option<Duration>,
}

impl MemoryFollowStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Counter changes made together with edge writes land in `users`.
    pub fn with_users(mut self, users: Arc<MemoryUserStore>) -> Self {
        self.users = Some(users);
        self
    }

    fn counts(&self, changes: &[(i64, i64, i64)]) -> AppResult<()> {
        match &self.users {
            Some(users) => users.apply_counts(changes),
            None => Ok(()),
        }
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn relationship_calls(&self) -> usize {
        self.relationship_calls.load(Ordering::SeqCst)
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    fn has_edge(&self, follower_id: i64, following_id: i64) -> bool {
        self.edges
            .lock()
            .unwrap()
            .iter()
            .any(|f| f.follower_id == follower_id && f.following_id == following_id)
    }
}

#[async_trait]
impl FollowStore for MemoryFollowStore {
    async fn create(&self, follower_id: i64, following_id: i64) -> AppResult<Follow> {
        if follower_id == following_id {
            return Err(AppError::CannotFollowSelf);
        }
        if self.has_edge(follower_id, following_id) {
            return Err(AppError::AlreadyFollowing);
        }
        let follow = Follow {
            id: self.next_id.fetch_add(1, Ordering::SeqCst) + 1,
            follower_id,
            following_id,
            created_at: Utc::now(),
        };
        self.edges.lock().unwrap().push(follow.clone());
        Ok(follow)
    }

    async fn get_followings(&self, follower_id: i64) -> AppResult<Vec<Follow>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        delay(self.latency).await;
        let edges = self.edges.lock().unwrap();
        Ok(edges.iter().filter(|f| f.follower_id == follower_id).cloned().collect())
    }

    async fn get_followers(&self, following_id: i64) -> AppResult<Vec<Follow>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        delay(self.latency).await;
        let edges = self.edges.lock().unwrap();
        Ok(edges.iter().filter(|f| f.following_id == following_id).cloned().collect())
    }

    async fn get_relationship(&self, user_a: i64, user_b: i64) -> AppResult<Relationship> {
        self.relationship_calls.fetch_add(1, Ordering::SeqCst);
        delay(self.latency).await;
        Ok(Relationship {
            following: self.has_edge(user_a, user_b),
            followed_by: self.has_edge(user_b, user_a),
        })
    }

    async fn delete(&self, follower_id: i64, following_id: i64) -> AppResult<bool> {
        let mut edges = self.edges.lock().unwrap();
        let before = edges.len();
        edges.retain(|f| !(f.follower_id == follower_id && f.following_id == following_id));
        Ok(edges.len() < before)
    }

    async fn create_with_counts(&self, follower_id: i64, following_id: i64) -> AppResult<Follow> {
        if follower_id == following_id {
            return Err(AppError::CannotFollowSelf);
        }
        if self.has_edge(follower_id, following_id) {
            return Err(AppError::AlreadyFollowing);
        }
        self.counts(&[(follower_id, 0, 1), (following_id, 1, 0)])?;
        self.create(follower_id, following_id).await
    }

    async fn delete_with_counts(&self, follower_id: i64, following_id: i64) -> AppResult<bool> {
        if !self.has_edge(follower_id, following_id) {
            return Ok(false);
        }
        self.counts(&[(follower_id, 0, -1), (following_id, -1, 0)])?;
        self.delete(follower_id, following_id).await
    }
}

#[derive(Default)]
pub struct MemorySessionStore {
    sessions: Mutex<HashMap<String, Session>>,
    next_id: AtomicI64,
    update_calls: AtomicUsize,
    delete_calls: AtomicUsize,
    update_latency: Option<Duration>,
    failing: AtomicBool,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_update_latency(mut self, latency: Duration) -> Self {
        self.update_latency = Some(latency);
        self
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn insert(&self, session: Session) {
        self.sessions
            .lock()
            .unwrap()
            .insert(session.token_hash.clone(), session);
    }

    pub fn stored(&self, token_hash: &str) -> Option<Session> {
        self.sessions.lock().unwrap().get(token_hash).cloned()
    }

    pub fn len(&self) -> usize {
        self.sessions.lock().unwrap().len()
    }

    pub fn update_calls(&self) -> usize {
        self.update_calls.load(Ordering::SeqCst)
    }

    pub fn delete_calls(&self) -> usize {
        self.delete_calls.load(Ordering::SeqCst)
    }

    fn check(&self) -> AppResult<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(AppError::internal(
                "session store unavailable",
                std::io::Error::other("connection refused"),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn create(&self, session: NewSession) -> AppResult<Session> {
        self.check()?;
        let mut sessions = self.sessions.lock().unwrap();
        if sessions.contains_key(&session.token_hash) {
            return Err(AppError::TokenConflict);
        }
        let created = Session {
            id: self.next_id.fetch_add(1, Ordering::SeqCst) + 1,
            user_id: session.user_id,
            token_hash: session.token_hash,
            expires_at: session.expires_at,
            created_at: session.created_at,
        };
        sessions.insert(created.token_hash.clone(), created.clone());
        Ok(created)
    }

    async fn get(&self, token_hash: &str) -> AppResult<Session> {
        self.check()?;
        self.stored(token_hash).ok_or(AppError::SessionNotFound)
    }

    async fn update(&self, session: &Session) -> AppResult<()> {
        self.check()?;
        delay(self.update_latency).await;
        let mut sessions = self.sessions.lock().unwrap();
        let stored = sessions
            .get_mut(&session.token_hash)
            .ok_or(AppError::SessionNotFound)?;
        stored.expires_at = session.expires_at;
        self.update_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn delete(&self, session: &Session) -> AppResult<()> {
        self.check()?;
        self.delete_calls.fetch_add(1, Ordering::SeqCst);
        self.sessions
            .lock()
            .unwrap()
            .remove(&session.token_hash)
            .map(|_| ())
            .ok_or(AppError::SessionNotFound)
    }

    async fn delete_by_user_id(&self, user_id: i64) -> AppResult<()> {
        self.check()?;
        self.delete_calls.fetch_add(1, Ordering::SeqCst);
        self.sessions.lock().unwrap().retain(|_, s| s.user_id != user_id);
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryUserCache {
    data: Mutex<HashMap<i64, CachedUser>>,
    counts: Mutex<HashMap<i64, UserCounters>>,
    failing: AtomicBool,
    adds: AtomicUsize,
}

impl MemoryUserCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn adds(&self) -> usize {
        self.adds.load(Ordering::SeqCst)
    }

    pub fn counters(&self, user_id: i64) -> Option<UserCounters> {
        self.counts.lock().unwrap().get(&user_id).copied()
    }

    /// Drops only the counter record, leaving the profile behind.
    pub fn evict_counters(&self, user_id: i64) {
        self.counts.lock().unwrap().remove(&user_id);
    }

    fn check(&self) -> RedisResult<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(unavailable());
        }
        Ok(())
    }

    fn incr(&self, user_id: i64, update: impl FnOnce(&mut UserCounters) -> i64) -> RedisResult<Option<i64>> {
        self.check()?;
        Ok(self.counts.lock().unwrap().get_mut(&user_id).map(update))
    }
}

#[async_trait]
impl UserCache for MemoryUserCache {
    async fn add(&self, user: &CachedUser, counters: UserCounters) -> RedisResult<()> {
        self.check()?;
        self.adds.fetch_add(1, Ordering::SeqCst);
        self.data.lock().unwrap().insert(user.id, user.clone());
        self.counts.lock().unwrap().insert(user.id, counters);
        Ok(())
    }

    async fn get(&self, user_id: i64) -> RedisResult<Option<(CachedUser, UserCounters)>> {
        self.check()?;
        let data = self.data.lock().unwrap().get(&user_id).cloned();
        let counts = self.counters(user_id);
        Ok(data.zip(counts))
    }

    async fn exists(&self, user_id: i64) -> RedisResult<bool> {
        self.check()?;
        Ok(self.data.lock().unwrap().contains_key(&user_id) && self.counters(user_id).is_some())
    }

    async fn incr_follower(&self, user_id: i64, delta: i64) -> RedisResult<Option<i64>> {
        self.incr(user_id, |c| {
            c.follower += delta;
            c.follower
        })
    }

    async fn incr_following(&self, user_id: i64, delta: i64) -> RedisResult<Option<i64>> {
        self.incr(user_id, |c| {
            c.following += delta;
            c.following
        })
    }

    async fn invalidate(&self, user_id: i64) -> RedisResult<()> {
        self.check()?;
        self.data.lock().unwrap().remove(&user_id);
        self.counts.lock().unwrap().remove(&user_id);
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryFollowCache {
    sets: Mutex<HashMap<String, HashSet<i64>>>,
    failing: AtomicBool,
}

impl MemoryFollowCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn is_cached(&self, key: &str) -> bool {
        self.sets.lock().unwrap().contains_key(key)
    }

    fn check(&self) -> RedisResult<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(unavailable());
        }
        Ok(())
    }

    fn replace(&self, key: String, members: &[i64]) -> RedisResult<()> {
        self.check()?;
        if !members.is_empty() {
            self.sets
                .lock()
                .unwrap()
                .insert(key, members.iter().copied().collect());
        }
        Ok(())
    }

    fn members(&self, key: &str) -> RedisResult<Vec<i64>> {
        self.check()?;
        let sets = self.sets.lock().unwrap();
        let mut ids: Vec<i64> = sets.get(key).map(|s| s.iter().copied().collect()).unwrap_or_default();
        ids.sort_unstable();
        Ok(ids)
    }
}

#[async_trait]
impl FollowCache for MemoryFollowCache {
    async fn add(&self, follower_id: i64, following_id: i64) -> RedisResult<bool> {
        self.check()?;
        let followings = follow_keys::followings_key(follower_id);
        let followers = follow_keys::followers_key(following_id);
        let mut sets = self.sets.lock().unwrap();
        if sets.contains_key(&followings) && sets.contains_key(&followers) {
            sets.entry(followings).or_default().insert(following_id);
            sets.entry(followers).or_default().insert(follower_id);
            return Ok(true);
        }
        sets.remove(&followings);
        sets.remove(&followers);
        Ok(false)
    }

    async fn add_followings(&self, user_id: i64, following_ids: &[i64]) -> RedisResult<()> {
        self.replace(follow_keys::followings_key(user_id), following_ids)
    }

    async fn add_followers(&self, user_id: i64, follower_ids: &[i64]) -> RedisResult<()> {
        self.replace(follow_keys::followers_key(user_id), follower_ids)
    }

    async fn get_relation(&self, user_a: i64, user_b: i64) -> RedisResult<Option<Relationship>> {
        self.check()?;
        let sets = self.sets.lock().unwrap();
        let followings = sets.get(&follow_keys::followings_key(user_a));
        let followers = sets.get(&follow_keys::followers_key(user_a));
        Ok(match (followings, followers) {
            (Some(followings), Some(followers)) => Some(Relationship {
                following: followings.contains(&user_b),
                followed_by: followers.contains(&user_b),
            }),
            _ => None,
        })
    }

    async fn get_following_ids(&self, user_id: i64) -> RedisResult<Vec<i64>> {
        self.members(&follow_keys::followings_key(user_id))
    }

    async fn get_follower_ids(&self, user_id: i64) -> RedisResult<Vec<i64>> {
        self.members(&follow_keys::followers_key(user_id))
    }

    async fn invalidate(&self, follower_id: i64, following_id: i64) -> RedisResult<()> {
        self.check()?;
        let mut sets = self.sets.lock().unwrap();
        sets.remove(&follow_keys::followings_key(follower_id));
        sets.remove(&follow_keys::followers_key(following_id));
        Ok(())
    }
}

/// Fixed set of live users for session tests.
#[derive(Default)]
pub struct StaticUsers {
    live: Mutex<HashSet<i64>>,
    calls: AtomicUsize,
}

impl StaticUsers {
    pub fn with(ids: &[i64]) -> Self {
        Self {
            live: Mutex::new(ids.iter().copied().collect()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn retire(&self, user_id: i64) {
        self.live.lock().unwrap().remove(&user_id);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl UserInfoProvider for StaticUsers {
    async fn to_my_page(&self, user_id: i64) -> AppResult<User> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.live.lock().unwrap().contains(&user_id) {
            Ok(user(user_id, &format!("user{}", user_id)))
        } else {
            Err(AppError::UserNotFound)
        }
    }
}
