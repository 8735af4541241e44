use crate::domain::token::AccessToken;
use crate::storage::TokenPersistence;
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::Mutex;

/// Single source of truth for the current access token.
///
/// Reads are served from memory. Writes update memory first, so the next
/// request picks the new token up immediately, then mirror the change to the
/// durable backend.
#[derive(Clone, Debug)]
pub struct TokenStore {
    current: Arc<RwLock<Option<AccessToken>>>,
    persistence: Arc<dyn TokenPersistence>,
    // Serializes durable writes so a save and a clear cannot land out of order.
    write_lock: Arc<Mutex<()>>,
}

impl TokenStore {
    #[must_use]
    pub fn new(persistence: Arc<dyn TokenPersistence>) -> Self {
        Self { current: Arc::new(RwLock::new(None)), persistence, write_lock: Arc::new(Mutex::new(())) }
    }

    /// Loads the persisted token into memory. Anything unreadable counts as no token.
    #[tracing::instrument(skip(self))]
    pub async fn load(&self) -> Option<AccessToken> {
        let _guard = self.write_lock.lock().await;

        let loaded = match self.persistence.read().await {
            Ok(Some(raw)) => AccessToken::new(raw).ok(),
            Ok(None) => None,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to read persisted access token");
                None
            }
        };

        tracing::debug!(present = loaded.is_some(), "Loaded access token");
        self.set(loaded.clone());
        loaded
    }

    #[tracing::instrument(skip(self, token))]
    pub async fn save(&self, token: AccessToken) {
        let _guard = self.write_lock.lock().await;

        let raw = token.as_str().to_string();
        self.set(Some(token));

        if let Err(e) = self.persistence.write(&raw).await {
            tracing::warn!(error = %e, "Failed to persist access token");
        }
    }

    #[tracing::instrument(skip(self))]
    pub async fn clear(&self) {
        let _guard = self.write_lock.lock().await;

        self.set(None);

        if let Err(e) = self.persistence.remove().await {
            tracing::warn!(error = %e, "Failed to remove persisted access token");
        }
    }

    #[must_use]
    pub fn current(&self) -> Option<AccessToken> {
        self.current.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    fn set(&self, token: Option<AccessToken>) {
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = token;
    }
}
