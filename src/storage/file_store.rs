use crate::error::Result;
use crate::storage::{ACCESS_TOKEN_KEY, TokenPersistence};
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// Persists the token in a small JSON key-value document.
///
/// Other keys in the document are preserved, so the file can be shared with
/// other client-side settings. Writes go through a sibling temp file and a
/// rename so a crash never leaves a half-written document behind.
#[derive(Debug, Clone)]
pub struct FileTokenPersistence {
    path: PathBuf,
}

impl FileTokenPersistence {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_document(&self) -> Result<Map<String, Value>> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) if bytes.is_empty() => Ok(Map::new()),
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(Map::new()),
            Err(e) => Err(e.into()),
        }
    }

    async fn write_document(&self, document: &Map<String, Value>) -> Result<()> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await?;
        }

        let tmp = self.path.with_extension("tmp");
        tokio::fs::write(&tmp, serde_json::to_vec_pretty(document)?).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

#[async_trait]
impl TokenPersistence for FileTokenPersistence {
    async fn read(&self) -> Result<Option<String>> {
        let document = self.read_document().await?;
        Ok(document.get(ACCESS_TOKEN_KEY).and_then(Value::as_str).map(str::to_string))
    }

    async fn write(&self, token: &str) -> Result<()> {
        // An unreadable document is replaced rather than blocking the save.
        let mut document = self.read_document().await.unwrap_or_default();
        document.insert(ACCESS_TOKEN_KEY.to_string(), Value::String(token.to_string()));
        self.write_document(&document).await
    }

    async fn remove(&self) -> Result<()> {
        let mut document = self.read_document().await.unwrap_or_default();
        if document.remove(ACCESS_TOKEN_KEY).is_none() && !tokio::fs::try_exists(&self.path).await? {
            return Ok(());
        }
        self.write_document(&document).await
    }
}
