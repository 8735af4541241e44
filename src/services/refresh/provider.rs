use crate::domain::token::AccessToken;
use crate::error::RefreshFailure;
use async_trait::async_trait;

#[async_trait]
pub trait TokenRefresher: Send + Sync + std::fmt::Debug {
    /// Exchanges the ambient refresh credential for a new access token.
    async fn refresh(&self) -> Result<AccessToken, RefreshFailure>;
}
