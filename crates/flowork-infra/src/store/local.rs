//! Local filesystem store.
//!
//! Accepts absolute paths only. Saving creates any missing parent
//! directories.

use tokio::io::AsyncWriteExt;

use flowork_core::store::{ByteStream, Store};
use flowork_types::error::StoreError;
use flowork_types::files::StorePath;

#[derive(Debug, Clone, Copy, Default)]
pub struct LocalStore;

impl LocalStore {
    pub fn new() -> Self {
        Self
    }

    fn check(path: &StorePath) -> Result<(), StoreError> {
        if path.is_absolute() {
            Ok(())
        } else {
            Err(StoreError::NotAbsolute(path.to_string()))
        }
    }
}

impl Store for LocalStore {
    fn name(&self) -> &str {
        "local"
    }

    fn accepts(&self, path: &StorePath) -> bool {
        path.is_absolute()
    }

    async fn load(&self, path: &StorePath) -> Result<ByteStream, StoreError> {
        Self::check(path)?;
        let file = tokio::fs::File::open(path.as_str())
            .await
            .map_err(|e| StoreError::io(path.as_str(), e))?;
        Ok(Box::pin(file))
    }

    async fn save(&self, path: &StorePath, mut data: ByteStream) -> Result<u64, StoreError> {
        Self::check(path)?;

        let parent = path.parent();
        tokio::fs::create_dir_all(parent.as_str())
            .await
            .map_err(|e| StoreError::io(parent.as_str(), e))?;

        let mut file = tokio::fs::File::create(path.as_str())
            .await
            .map_err(|e| StoreError::io(path.as_str(), e))?;
        let written = tokio::io::copy(&mut data, &mut file)
            .await
            .map_err(|e| StoreError::io(path.as_str(), e))?;
        file.flush()
            .await
            .map_err(|e| StoreError::io(path.as_str(), e))?;

        tracing::debug!(path = %path, bytes = written, "saved local file");
        Ok(written)
    }

    async fn close(&self) -> Result<(), StoreError> {
        Ok(())
    }
}
