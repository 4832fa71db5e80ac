use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use tracing::error;

use murmur_db::StoreError;
use murmur_types::api::Envelope;

/// Coarse error classes, used for logging and by callers deciding whether to retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    Auth,
    NotFound,
    Conflict,
    TransientStore,
    Config,
    Internal,
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),

    #[error("Access denied")]
    MissingToken,

    #[error("Token not valid")]
    InvalidToken,

    #[error("Token expired")]
    TokenExpired,

    #[error("Invalid or expired token")]
    InvalidOrExpiredToken,

    #[error("User not found or password is incorrect")]
    BadCredentials,

    #[error("User not found")]
    UserNotFound,

    #[error("Conversation not found")]
    ConversationNotFound,

    #[error("Email is already registered")]
    DuplicateEmail,

    #[error("Invalid refresh token")]
    InvalidRefreshToken,

    #[error("{0}")]
    Conflict(String),

    #[error("Store unavailable: {0}")]
    TransientStore(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) => ErrorKind::Validation,
            Self::MissingToken
            | Self::InvalidToken
            | Self::TokenExpired
            | Self::InvalidOrExpiredToken
            | Self::BadCredentials => ErrorKind::Auth,
            Self::UserNotFound | Self::ConversationNotFound => ErrorKind::NotFound,
            Self::DuplicateEmail | Self::InvalidRefreshToken | Self::Conflict(_) => {
                ErrorKind::Conflict
            }
            Self::TransientStore(_) => ErrorKind::TransientStore,
            Self::Config(_) => ErrorKind::Config,
            Self::Internal(_) => ErrorKind::Internal,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::TransientStore
    }

    fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) | Self::BadCredentials | Self::InvalidOrExpiredToken => {
                StatusCode::BAD_REQUEST
            }
            Self::MissingToken => StatusCode::UNAUTHORIZED,
            Self::InvalidToken | Self::TokenExpired | Self::InvalidRefreshToken => {
                StatusCode::FORBIDDEN
            }
            Self::UserNotFound | Self::ConversationNotFound => StatusCode::NOT_FOUND,
            Self::DuplicateEmail | Self::Conflict(_) => StatusCode::CONFLICT,
            Self::TransientStore(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Config(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict(msg) => Self::Conflict(msg),
            // Users are the only rows a request can name that may not exist.
            StoreError::MissingReference(_) => Self::UserNotFound,
            StoreError::Busy(msg) => Self::TransientStore(msg),
            StoreError::Corrupt(msg) => Self::Internal(anyhow::anyhow!("corrupt row: {}", msg)),
            StoreError::Backend(e) => Self::Internal(e),
        }
    }
}

impl From<validator::ValidationErrors> for ApiError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let mut messages: Vec<String> = errors
            .field_errors()
            .into_iter()
            .flat_map(|(field, errs)| {
                errs.iter().map(move |e| match &e.message {
                    Some(message) => message.to_string(),
                    None => format!("{}: {}", field, e.code),
                })
            })
            .collect();
        messages.sort();
        Self::Validation(messages.join("; "))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            Self::Internal(e) => {
                error!("Internal error: {:?}", e);
                "Internal Server Error".to_string()
            }
            Self::Config(msg) => {
                error!("Configuration error: {}", msg);
                "Internal Server Error".to_string()
            }
            other => other.to_string(),
        };

        (status, Json(Envelope::failed(message))).into_response()
    }
}
