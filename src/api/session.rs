use crate::api::client::ApiClient;
use crate::api::request::{ApiRequest, ApiResponse};
use crate::domain::auth::TokenEnvelope;
use crate::domain::notice::{LOGIN_SUCCEEDED_NOTICE, Notice};
use crate::domain::token::AccessToken;
use crate::error::Result;
use reqwest::Method;
use reqwest::header::HeaderMap;
use serde::Serialize;

#[derive(Serialize)]
struct Credentials<'a> {
    email: &'a str,
    password: &'a str,
}

impl ApiClient {
    /// Exchanges credentials for an access token and stores it. The server
    /// also sets the refresh cookie on this response.
    ///
    /// # Errors
    /// - `ClientError::Api` if the credentials are rejected.
    /// - `ClientError::MissingAccessToken` if the response carries no token.
    #[tracing::instrument(skip(self, password), err(level = "debug"))]
    pub async fn login(&self, email: &str, password: &str) -> Result<AccessToken> {
        let url = self.resolve(&self.session_paths.login, &[])?;

        let response = self.http.post(url).json(&Credentials { email, password }).send().await?;
        let status = response.status();
        let body = response.bytes().await?;

        if !status.is_success() {
            return Err(ApiResponse::new(status, HeaderMap::new(), body).into_error());
        }

        let token = serde_json::from_slice::<TokenEnvelope>(&body)?.into_token()?;
        self.token_store.save(token.clone()).await;
        self.notifier.publish(Notice::success(LOGIN_SUCCEEDED_NOTICE));

        tracing::info!("Logged in");
        Ok(token)
    }

    /// Ends the session server-side (best effort) and clears the stored token.
    #[tracing::instrument(skip(self))]
    pub async fn logout(&self) {
        if self.token_store.current().is_some()
            && let Err(e) = self.send(ApiRequest::new(Method::POST, self.session_paths.logout.clone())).await
        {
            tracing::warn!(error = %e, "Server-side logout failed");
        }

        self.token_store.clear().await;
        tracing::info!("Logged out");
    }

    /// Stores a token obtained outside this client.
    pub async fn set_access_token(&self, token: AccessToken) {
        self.token_store.save(token).await;
    }
}
