use std::error::Error as StdError;
use std::sync::Arc;

pub type AppResult<T> = Result<T, AppError>;

/// Broad classification used by callers that map errors onto their own transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    NotFound,
    Conflict,
    Expired,
    Forbidden,
    Unauthorized,
    Cancelled,
    Internal,
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum AppError {
    #[error("required field is missing")]
    RequiredFieldMissing,

    #[error("invalid token format (expected 32 to 255 characters)")]
    InvalidTokenFormat,

    #[error("invalid user id")]
    InvalidUserId,

    #[error("value is too long")]
    ValueTooLong,

    #[error("user not found")]
    UserNotFound,

    #[error("session not found")]
    SessionNotFound,

    #[error("session expired")]
    SessionExpired,

    #[error("operation not permitted for this user")]
    Forbidden,

    #[error("already following this user")]
    AlreadyFollowing,

    #[error("cannot follow yourself")]
    CannotFollowSelf,

    #[error("token already exists")]
    TokenConflict,

    #[error("email address is already in use")]
    EmailConflict,

    #[error("username is already in use")]
    UsernameConflict,

    #[error("invalid email or password")]
    InvalidCredentials,

    #[error("operation cancelled")]
    Cancelled,

    #[error("{context}: {source}")]
    Internal {
        context: String,
        #[source]
        source: Arc<dyn StdError + Send + Sync>,
    },
}

impl AppError {
    /// Wraps a lower-level failure with a message describing what was being attempted.
    pub fn internal<E>(context: impl Into<String>, source: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        Self::Internal {
            context: context.into(),
            source: Arc::new(source),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::RequiredFieldMissing
            | Self::InvalidTokenFormat
            | Self::InvalidUserId
            | Self::ValueTooLong => ErrorKind::Validation,
            Self::UserNotFound | Self::SessionNotFound => ErrorKind::NotFound,
            Self::AlreadyFollowing
            | Self::CannotFollowSelf
            | Self::TokenConflict
            | Self::EmailConflict
            | Self::UsernameConflict => ErrorKind::Conflict,
            Self::SessionExpired => ErrorKind::Expired,
            Self::Forbidden => ErrorKind::Forbidden,
            Self::InvalidCredentials => ErrorKind::Unauthorized,
            Self::Cancelled => ErrorKind::Cancelled,
            Self::Internal { .. } => ErrorKind::Internal,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }

    pub fn is_internal(&self) -> bool {
        self.kind() == ErrorKind::Internal
    }
}
