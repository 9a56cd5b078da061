//! Opaque session tokens.
//!
//! The raw token only ever leaves the process once, in the issuance response.
//! Everything persisted is the SHA-256 digest produced by [`TokenCodec::hash`].

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::RngCore;
use rand::rngs::OsRng;
use sha2::{Digest, Sha256};

use crate::error::{AppError, AppResult};

/// Random bytes drawn for a fresh session token.
pub const TOKEN_BYTES: usize = 32;
pub const MIN_TOKEN_LEN: usize = 32;
pub const MAX_TOKEN_LEN: usize = 255;

pub trait TokenCodec: Send + Sync {
    /// Generates a token from `len` random bytes.
    fn generate(&self, len: usize) -> AppResult<String>;

    /// Deterministic one-way digest of a token.
    fn hash(&self, token: &str) -> String;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct RandomTokenCodec;

impl TokenCodec for RandomTokenCodec {
    fn generate(&self, len: usize) -> AppResult<String> {
        let mut bytes = vec![0u8; len];
        OsRng
            .try_fill_bytes(&mut bytes)
            .map_err(|e| AppError::internal("failed to read random bytes", e))?;
        Ok(URL_SAFE_NO_PAD.encode(bytes))
    }

    fn hash(&self, token: &str) -> String {
        let digest = Sha256::digest(token.as_bytes());
        URL_SAFE_NO_PAD.encode(digest)
    }
}

/// Shape check performed before any I/O.
pub fn validate_token_format(token: &str) -> AppResult<()> {
    if token.is_empty() || token.len() < MIN_TOKEN_LEN || token.len() > MAX_TOKEN_LEN {
        return Err(AppError::InvalidTokenFormat);
    }
    Ok(())
}
