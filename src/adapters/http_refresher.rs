use crate::domain::auth::{ApiErrorBody, TokenEnvelope};
use crate::domain::token::AccessToken;
use crate::error::RefreshFailure;
use crate::services::refresh::provider::TokenRefresher;
use async_trait::async_trait;
use reqwest::{Client, Url};

/// Calls the API's refresh endpoint. The refresh credential travels as a
/// cookie held by the shared client's cookie jar, never as a header.
#[derive(Debug, Clone)]
pub struct HttpTokenRefresher {
    client: Client,
    refresh_url: Url,
}

impl HttpTokenRefresher {
    #[must_use]
    pub const fn new(client: Client, refresh_url: Url) -> Self {
        Self { client, refresh_url }
    }
}

#[async_trait]
impl TokenRefresher for HttpTokenRefresher {
    #[tracing::instrument(skip(self), fields(url = %self.refresh_url), err(level = "debug"))]
    async fn refresh(&self) -> Result<AccessToken, RefreshFailure> {
        let response = self
            .client
            .post(self.refresh_url.clone())
            .send()
            .await
            .map_err(|e| RefreshFailure::Transport(e.to_string()))?;

        let status = response.status();
        let body = response.bytes().await.map_err(|e| RefreshFailure::Transport(e.to_string()))?;

        if !status.is_success() {
            let error = ApiErrorBody::from_slice(&body);
            return Err(RefreshFailure::Rejected { status: status.as_u16(), code: error.code, message: error.message });
        }

        serde_json::from_slice::<TokenEnvelope>(&body)
            .map_err(|e| {
                tracing::debug!(error = %e, "Refresh response is not a token envelope");
                RefreshFailure::MissingToken
            })?
            .into_token()
            .map_err(|_| RefreshFailure::MissingToken)
    }
}
