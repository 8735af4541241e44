use crate::api::request::{ApiRequest, ApiResponse};
use crate::domain::auth::ReasonCode;
use crate::domain::notice::Notice;
use crate::domain::token::AccessToken;
use crate::error::{ClientError, Result};
use crate::services::notifier::FailureNotifier;
use crate::services::refresh::{RefreshCoordinator, RefreshMode};
use crate::storage::token_store::TokenStore;
use reqwest::{Client, Method, StatusCode, Url};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::sync::broadcast;
use uuid::Uuid;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

#[derive(Clone, Debug)]
pub(crate) struct SessionPaths {
    pub(crate) login: String,
    pub(crate) logout: String,
}

/// Authenticated client for the pantry API.
///
/// Every request carries the stored bearer token. A 401 with `TOKEN_EXPIRED`
/// triggers a shared refresh and exactly one resend; session-ending codes are
/// handed to the failure notifier.
#[derive(Clone, Debug)]
pub struct ApiClient {
    pub(crate) http: Client,
    pub(crate) base_url: Url,
    pub(crate) token_store: TokenStore,
    pub(crate) coordinator: RefreshCoordinator,
    pub(crate) notifier: FailureNotifier,
    pub(crate) session_paths: SessionPaths,
}

impl ApiClient {
    pub(crate) const fn new(
        http: Client,
        base_url: Url,
        token_store: TokenStore,
        coordinator: RefreshCoordinator,
        notifier: FailureNotifier,
        session_paths: SessionPaths,
    ) -> Self {
        Self { http, base_url, token_store, coordinator, notifier, session_paths }
    }

    #[must_use]
    pub const fn token_store(&self) -> &TokenStore {
        &self.token_store
    }

    #[must_use]
    pub fn subscribe_notices(&self) -> broadcast::Receiver<Notice> {
        self.notifier.subscribe()
    }

    /// Waits for a pending login redirect, if any, to fire.
    pub async fn wait_for_redirect(&self) {
        self.notifier.wait_for_redirect().await;
    }

    /// # Errors
    /// See [`ApiClient::send`].
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        self.send(ApiRequest::new(Method::GET, path)).await?.json()
    }

    /// # Errors
    /// See [`ApiClient::send`].
    pub async fn post<B: Serialize + ?Sized, T: DeserializeOwned>(&self, path: &str, body: &B) -> Result<T> {
        self.send(ApiRequest::new(Method::POST, path).json(body)?).await?.json()
    }

    /// # Errors
    /// See [`ApiClient::send`].
    pub async fn put<B: Serialize + ?Sized, T: DeserializeOwned>(&self, path: &str, body: &B) -> Result<T> {
        self.send(ApiRequest::new(Method::PUT, path).json(body)?).await?.json()
    }

    /// # Errors
    /// See [`ApiClient::send`].
    pub async fn patch<B: Serialize + ?Sized, T: DeserializeOwned>(&self, path: &str, body: &B) -> Result<T> {
        self.send(ApiRequest::new(Method::PATCH, path).json(body)?).await?.json()
    }

    /// # Errors
    /// See [`ApiClient::send`].
    pub async fn delete<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        self.send(ApiRequest::new(Method::DELETE, path)).await?.json()
    }

    /// Sends a request through the auth pipeline.
    ///
    /// # Errors
    /// - `ClientError::Api` for any non-success response that is not recovered by a refresh.
    /// - `ClientError::Refresh` if the refresh this request waited on failed.
    /// - `ClientError::Transport` if the request could not be sent.
    #[tracing::instrument(
        skip(self, request),
        fields(method = %request.method, path = %request.path, request_id = tracing::field::Empty),
        err(level = "debug")
    )]
    pub async fn send(&self, request: ApiRequest) -> Result<ApiResponse> {
        let request_id = Uuid::new_v4();
        tracing::Span::current().record("request_id", tracing::field::display(request_id));

        let mut token = self.token_store.current();
        let mut retried = false;

        loop {
            let response = self.dispatch(&request, token.as_ref(), request_id).await?;
            let status = response.status();

            if status.is_success() {
                return Ok(response);
            }
            if status != StatusCode::UNAUTHORIZED {
                return Err(response.into_error());
            }

            let error = response.error_body();
            match &error.code {
                Some(ReasonCode::TokenExpired) if !retried && self.token_store.current().is_some() => {
                    retried = true;
                    let current = self.token_store.current();
                    if current != token {
                        tracing::debug!("Access token already replaced, resending");
                        token = current;
                    } else {
                        tracing::debug!("Access token expired, waiting for refresh");
                        token = Some(self.coordinator.refresh(RefreshMode::Silent).await?);
                    }
                    continue;
                }
                Some(ReasonCode::TokenExpired) => {
                    tracing::debug!(retried, "Expired token not recoverable for this request");
                }
                Some(code) if code.is_session_ending() => {
                    self.notifier.session_ended(code).await;
                }
                _ => {
                    if let Some(message) = &error.message {
                        self.notifier.warn(message);
                    }
                }
            }

            return Err(response.into_error());
        }
    }

    /// Refreshes the access token on demand, outside the 401 path. Joins a
    /// refresh that is already running instead of starting another.
    ///
    /// # Errors
    /// Returns `ClientError::Refresh` if the refresh fails.
    #[tracing::instrument(skip(self), err(level = "debug"))]
    pub async fn manual_refresh_token(&self) -> Result<AccessToken> {
        Ok(self.coordinator.refresh(RefreshMode::Announced).await?)
    }

    /// Resolves `path` against the base URL. Paths that resolve to another
    /// origin are rejected, since every request carries the bearer token.
    pub(crate) fn resolve(&self, path: &str, query: &[(String, String)]) -> Result<Url> {
        let mut url = self.base_url.join(path.trim_start_matches('/'))?;
        if url.origin() != self.base_url.origin() {
            return Err(ClientError::ForeignOrigin(url.origin().ascii_serialization()));
        }
        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query);
        }
        Ok(url)
    }

    async fn dispatch(
        &self,
        request: &ApiRequest,
        token: Option<&AccessToken>,
        request_id: Uuid,
    ) -> Result<ApiResponse> {
        let url = self.resolve(&request.path, &request.query)?;

        let mut builder =
            self.http.request(request.method.clone(), url).header(REQUEST_ID_HEADER, request_id.to_string());
        if let Some(token) = token {
            builder = builder.bearer_auth(token.as_str());
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await?;
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.bytes().await?;

        tracing::debug!(status = %status, authenticated = token.is_some(), "Response received");
        Ok(ApiResponse::new(status, headers, body))
    }
}
