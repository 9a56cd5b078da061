use std::time::Duration;

use bcrypt::verify;
use rand::Rng;

pub mod background;
pub mod coalescer;
pub mod token;

pub use background::BackgroundTasks;
pub use coalescer::RequestCoalescer;
pub use token::{RandomTokenCodec, TokenCodec};

pub fn hash_password(password: &str, cost: u32) -> Result<String, bcrypt::BcryptError> {
    bcrypt::hash(password.as_bytes(), cost)
}

pub fn verify_password(password: &str, hash: &str) -> Result<bool, bcrypt::BcryptError> {
    verify(password.as_bytes(), hash)
}

/// Returns `base` plus a random extra in `[0, jitter)`, so keys written together
/// do not all expire in the same instant.
pub fn random_expiration(base: Duration, jitter: Duration) -> Duration {
    let jitter_ms = jitter.as_millis() as u64;
    if jitter_ms == 0 {
        return base;
    }
    base + Duration::from_millis(rand::thread_rng().gen_range(0..jitter_ms))
}

/// Redis expiry in whole seconds, never below one.
pub fn ttl_secs(ttl: Duration) -> u64 {
    ttl.as_secs().max(1)
}
