use crate::domain::auth::ReasonCode;
use reqwest::StatusCode;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("Request failed with status {status}")]
    Api { status: StatusCode, code: Option<ReasonCode>, message: Option<String> },
    #[error("Session refresh failed: {0}")]
    Refresh(#[from] RefreshFailure),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
    #[error("Refusing to send credentials outside the API origin: {0}")]
    ForeignOrigin(String),
    #[error("Token storage error: {0}")]
    Storage(#[from] std::io::Error),
    #[error("Access token must not be empty")]
    EmptyToken,
    #[error("Response did not contain an access token")]
    MissingAccessToken,
}

impl ClientError {
    #[must_use]
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::Api { status, .. } => Some(*status),
            Self::Refresh(RefreshFailure::Rejected { status, .. }) => StatusCode::from_u16(*status).ok(),
            _ => None,
        }
    }

    #[must_use]
    pub const fn reason(&self) -> Option<&ReasonCode> {
        match self {
            Self::Api { code, .. } => code.as_ref(),
            Self::Refresh(failure) => failure.reason(),
            _ => None,
        }
    }
}

/// Outcome of a failed refresh, shared by every request waiting on that refresh.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RefreshFailure {
    #[error("refresh request could not be sent: {0}")]
    Transport(String),
    #[error("refresh rejected with status {status}")]
    Rejected { status: u16, code: Option<ReasonCode>, message: Option<String> },
    #[error("refresh response did not contain an access token")]
    MissingToken,
    #[error("refresh ended before producing a result")]
    Abandoned,
}

impl RefreshFailure {
    #[must_use]
    pub const fn reason(&self) -> Option<&ReasonCode> {
        match self {
            Self::Rejected { code, .. } => code.as_ref(),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, ClientError>;
