#![forbid(unsafe_code)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::todo)]
#![warn(clippy::panic)]
#![warn(clippy::dbg_macro)]
#![warn(clippy::print_stdout)]
#![warn(clippy::print_stderr)]
#![warn(clippy::clone_on_ref_ptr)]
#![warn(unreachable_pub)]
#![warn(missing_debug_implementations)]
#![warn(unused_qualifications)]
#![deny(unused_must_use)]

pub mod adapters;
pub mod api;
pub mod config;
pub mod domain;
pub mod error;
pub mod services;
pub mod storage;
pub mod telemetry;

use crate::adapters::http_refresher::HttpTokenRefresher;
use crate::adapters::redirect::LogRedirector;
use crate::api::ApiClient;
use crate::api::client::SessionPaths;
use crate::config::Config;
use crate::error::Result;
use crate::services::notifier::{FailureNotifier, Redirector};
use crate::services::refresh::RefreshCoordinator;
use crate::services::refresh::provider::TokenRefresher;
use crate::storage::file_store::FileTokenPersistence;
use crate::storage::token_store::TokenStore;
use crate::storage::{MemoryTokenPersistence, TokenPersistence};
use reqwest::Url;
use std::sync::Arc;
use std::time::Duration;

/// Wires the token store, notifier, refresh coordinator and HTTP client
/// together. Every seam falls back to its production implementation.
#[derive(Debug)]
pub struct ClientBuilder {
    config: Config,
    persistence: Option<Arc<dyn TokenPersistence>>,
    refresher: Option<Arc<dyn TokenRefresher>>,
    redirector: Option<Arc<dyn Redirector>>,
}

impl ClientBuilder {
    #[must_use]
    pub const fn new(config: Config) -> Self {
        Self { config, persistence: None, refresher: None, redirector: None }
    }

    #[must_use]
    pub fn with_persistence(mut self, persistence: Arc<dyn TokenPersistence>) -> Self {
        self.persistence = Some(persistence);
        self
    }

    #[must_use]
    pub fn with_refresher(mut self, refresher: Arc<dyn TokenRefresher>) -> Self {
        self.refresher = Some(refresher);
        self
    }

    #[must_use]
    pub fn with_redirector(mut self, redirector: Arc<dyn Redirector>) -> Self {
        self.redirector = Some(redirector);
        self
    }

    /// Builds the client and loads any persisted token.
    ///
    /// # Errors
    /// Returns an error if the base URL is invalid or the HTTP client cannot be built.
    pub async fn build(self) -> Result<ApiClient> {
        let config = self.config;

        let mut http = reqwest::Client::builder().cookie_store(true).user_agent(config.http.user_agent.clone());
        if config.http.request_timeout_secs > 0 {
            http = http.timeout(Duration::from_secs(config.http.request_timeout_secs));
        }
        let http = http.build()?;

        let base_url = parse_base_url(&config.base_url)?;

        let persistence: Arc<dyn TokenPersistence> = match (self.persistence, &config.token_file) {
            (Some(persistence), _) => persistence,
            (None, Some(path)) => Arc::new(FileTokenPersistence::new(path.clone())),
            (None, None) => Arc::new(MemoryTokenPersistence::default()),
        };
        let token_store = TokenStore::new(persistence);
        token_store.load().await;

        let redirector = self.redirector.unwrap_or_else(|| Arc::new(LogRedirector));
        let notifier = FailureNotifier::new(
            token_store.clone(),
            redirector,
            config.auth.login_redirect.clone(),
            Duration::from_millis(config.auth.redirect_delay_ms),
            config.notices.notice_capacity,
        );

        let refresher: Arc<dyn TokenRefresher> = match self.refresher {
            Some(refresher) => refresher,
            None => {
                let refresh_url = base_url.join(config.auth.refresh_path.trim_start_matches('/'))?;
                Arc::new(HttpTokenRefresher::new(http.clone(), refresh_url))
            }
        };
        let coordinator = RefreshCoordinator::new(refresher, token_store.clone(), notifier.clone());

        tracing::debug!(base_url = %base_url, "API client ready");

        Ok(ApiClient::new(
            http,
            base_url,
            token_store,
            coordinator,
            notifier,
            SessionPaths { login: config.auth.login_path, logout: config.auth.logout_path },
        ))
    }
}

/// Parses the base URL, forcing a trailing slash so relative paths append
/// to it instead of replacing its last segment.
fn parse_base_url(raw: &str) -> Result<Url> {
    let mut url = Url::parse(raw)?;
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}
