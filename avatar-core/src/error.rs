use thiserror::Error;

use crate::anam::SessionTokenError;
use crate::supabase::ForwardError;

#[derive(Error, Debug)]
pub enum AvatarError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Config error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Decoding error: {0}")]
    Decode(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Session {0} has already been sent")]
    AlreadySent(String),

    #[error("Session {0} is already being forwarded")]
    ForwardInProgress(String),

    #[error("Forward failed: {0}")]
    Forward(#[from] ForwardError),

    #[error("Session token request failed: {0}")]
    SessionToken(#[from] SessionTokenError),
}

impl AvatarError {
    /// Stable machine-readable code carried in response envelopes.
    pub fn code(&self) -> &'static str {
        match self {
            AvatarError::Decode(_) | AvatarError::Validation(_) => "validation",
            AvatarError::NotFound(_) => "not_found",
            AvatarError::AlreadySent(_) => "already_sent",
            AvatarError::ForwardInProgress(_) => "in_progress",
            AvatarError::Forward(ForwardError::NotConfigured)
            | AvatarError::SessionToken(SessionTokenError::MissingApiKey) => "not_configured",
            AvatarError::Forward(_) | AvatarError::SessionToken(_) => "upstream",
            AvatarError::Database(_) | AvatarError::Config(_) | AvatarError::Io(_) => "internal",
        }
    }
}

impl From<serde_json::Error> for AvatarError {
    fn from(e: serde_json::Error) -> Self {
        AvatarError::Decode(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, AvatarError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(AvatarError::Decode("x".into()).code(), "validation");
        assert_eq!(AvatarError::NotFound("s1".into()).code(), "not_found");
        assert_eq!(AvatarError::AlreadySent("s1".into()).code(), "already_sent");
        assert_eq!(
            AvatarError::Forward(ForwardError::NotConfigured).code(),
            "not_configured"
        );
        assert_eq!(
            AvatarError::Forward(ForwardError::Api {
                code: 500,
                message: "boom".into()
            })
            .code(),
            "upstream"
        );
        assert_eq!(AvatarError::ForwardInProgress("s1".into()).code(), "in_progress");
        assert_eq!(
            AvatarError::Io(std::io::Error::other("disk")).code(),
            "internal"
        );
    }

    #[test]
    fn test_already_sent_message() {
        let e = AvatarError::AlreadySent("abc".into());
        assert_eq!(e.to_string(), "Session abc has already been sent");
    }
}
