use crate::domain::token::AccessToken;
use crate::error::{ClientError, Result};
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use std::fmt;

/// Machine-readable reason attached to a 401 response.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize)]
#[serde(from = "String")]
pub enum ReasonCode {
    TokenExpired,
    NoRefreshToken,
    SessionExpired,
    InvalidRefreshToken,
    SessionInvalidated,
    Other(String),
}

impl ReasonCode {
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::TokenExpired => "TOKEN_EXPIRED",
            Self::NoRefreshToken => "NO_REFRESH_TOKEN",
            Self::SessionExpired => "SESSION_EXPIRED",
            Self::InvalidRefreshToken => "INVALID_REFRESH_TOKEN",
            Self::SessionInvalidated => "SESSION_INVALIDATED",
            Self::Other(code) => code,
        }
    }

    /// Codes after which the session cannot be recovered locally.
    #[must_use]
    pub const fn is_session_ending(&self) -> bool {
        matches!(
            self,
            Self::NoRefreshToken | Self::SessionExpired | Self::InvalidRefreshToken | Self::SessionInvalidated
        )
    }
}

impl From<String> for ReasonCode {
    fn from(value: String) -> Self {
        match value.as_str() {
            "TOKEN_EXPIRED" => Self::TokenExpired,
            "NO_REFRESH_TOKEN" => Self::NoRefreshToken,
            "SESSION_EXPIRED" => Self::SessionExpired,
            "INVALID_REFRESH_TOKEN" => Self::InvalidRefreshToken,
            "SESSION_INVALIDATED" => Self::SessionInvalidated,
            _ => Self::Other(value),
        }
    }
}

impl fmt::Display for ReasonCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error body returned by the API: `{ "code": "...", "message": "..." }`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ApiErrorBody {
    #[serde(default, deserialize_with = "lenient_code")]
    pub code: Option<ReasonCode>,
    #[serde(default, alias = "error")]
    pub message: Option<String>,
}

/// Accepts numeric codes as well; any other shape counts as no code rather
/// than failing the whole body.
fn lenient_code<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Option<ReasonCode>, D::Error> {
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::String(code)) => Some(ReasonCode::from(code)),
        Some(Value::Number(code)) => Some(ReasonCode::Other(code.to_string())),
        _ => None,
    })
}

impl ApiErrorBody {
    /// Parses an error body, treating anything unreadable as an empty body.
    #[must_use]
    pub fn from_slice(body: &[u8]) -> Self {
        serde_json::from_slice(body).unwrap_or_default()
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TokenData {
    access_token: Option<String>,
}

/// Success body of the refresh and login endpoints: `{ "data": { "accessToken": "..." } }`.
#[derive(Debug, Deserialize)]
pub struct TokenEnvelope {
    data: Option<TokenData>,
}

impl TokenEnvelope {
    /// Extracts the access token.
    ///
    /// # Errors
    /// Returns `ClientError::MissingAccessToken` if the field is absent or blank.
    pub fn into_token(self) -> Result<AccessToken> {
        self.data
            .and_then(|data| data.access_token)
            .ok_or(ClientError::MissingAccessToken)
            .and_then(|raw| AccessToken::new(raw).map_err(|_| ClientError::MissingAccessToken))
    }
}
