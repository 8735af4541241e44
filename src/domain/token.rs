use crate::error::{ClientError, Result};
use std::fmt;

/// Opaque bearer token issued by the pantry API.
///
/// The client never inspects the value; expiry is only discovered when a
/// request comes back with `TOKEN_EXPIRED`.
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken(String);

impl AccessToken {
    /// Wraps a raw token string.
    ///
    /// # Errors
    /// Returns `ClientError::EmptyToken` if the value is empty or whitespace.
    pub fn new(raw: impl Into<String>) -> Result<Self> {
        let raw = raw.into();
        if raw.trim().is_empty() {
            return Err(ClientError::EmptyToken);
        }
        Ok(Self(raw))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AccessToken(***)")
    }
}
