#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Success,
    Warning,
    Error,
}

/// A user-facing message published by the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
}

impl Notice {
    pub fn success(message: impl Into<String>) -> Self {
        Self { level: NoticeLevel::Success, message: message.into() }
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self { level: NoticeLevel::Warning, message: message.into() }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self { level: NoticeLevel::Error, message: message.into() }
    }
}

pub const SESSION_EXPIRED_NOTICE: &str = "Your session has expired. Please log in again.";
pub const INVALID_SESSION_NOTICE: &str = "Your session is no longer valid. Please log in again.";
pub const REFRESH_FAILED_NOTICE: &str = "Failed to refresh your session. Please log in again.";
pub const REFRESH_SUCCEEDED_NOTICE: &str = "Session refreshed.";
pub const LOGIN_SUCCEEDED_NOTICE: &str = "Logged in.";
