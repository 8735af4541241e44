use crate::error::Result;
use async_trait::async_trait;
use std::sync::Mutex;

pub mod file_store;
pub mod token_store;

/// Key under which the access token is persisted.
pub const ACCESS_TOKEN_KEY: &str = "accessToken";

/// Durable backing for the token store.
#[async_trait]
pub trait TokenPersistence: Send + Sync + std::fmt::Debug {
    /// Returns the persisted raw token, if any.
    async fn read(&self) -> Result<Option<String>>;

    async fn write(&self, token: &str) -> Result<()>;

    async fn remove(&self) -> Result<()>;
}

/// Process-local persistence, used when no token file is configured.
#[derive(Debug, Default)]
pub struct MemoryTokenPersistence {
    value: Mutex<Option<String>>,
}

impl MemoryTokenPersistence {
    #[must_use]
    pub fn new(initial: Option<String>) -> Self {
        Self { value: Mutex::new(initial) }
    }

    fn slot(&self) -> std::sync::MutexGuard<'_, Option<String>> {
        self.value.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

#[async_trait]
impl TokenPersistence for MemoryTokenPersistence {
    async fn read(&self) -> Result<Option<String>> {
        Ok(self.slot().clone())
    }

    async fn write(&self, token: &str) -> Result<()> {
        *self.slot() = Some(token.to_string());
        Ok(())
    }

    async fn remove(&self) -> Result<()> {
        *self.slot() = None;
        Ok(())
    }
}
