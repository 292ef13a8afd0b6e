//! MultiStore -- routes each path to the first store that accepts it.

use tracing::warn;

use flowork_types::error::StoreError;
use flowork_types::files::StorePath;

use super::{BoxStore, ByteStream, Store};

/// A store that delegates to a list of child stores.
///
/// Children are tried in order; the first one whose `accepts` returns true
/// handles the operation. A path no child accepts is `StoreError::Unsupported`.
#[derive(Debug, Default)]
pub struct MultiStore {
    stores: Vec<BoxStore>,
}

impl MultiStore {
    pub fn new(stores: Vec<BoxStore>) -> Self {
        Self { stores }
    }

    /// Append a child store. Earlier stores take precedence.
    pub fn with_store<T: Store + 'static>(mut self, store: T) -> Self {
        self.stores.push(BoxStore::new(store));
        self
    }

    pub fn len(&self) -> usize {
        self.stores.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stores.is_empty()
    }

    fn route(&self, path: &StorePath) -> Result<&BoxStore, StoreError> {
        self.stores
            .iter()
            .find(|s| s.accepts(path))
            .ok_or_else(|| StoreError::Unsupported(path.to_string()))
    }
}

impl Store for MultiStore {
    fn name(&self) -> &str {
        "multi"
    }

    fn accepts(&self, path: &StorePath) -> bool {
        self.stores.iter().any(|s| s.accepts(path))
    }

    async fn load(&self, path: &StorePath) -> Result<ByteStream, StoreError> {
        self.route(path)?.load(path).await
    }

    async fn save(&self, path: &StorePath, data: ByteStream) -> Result<u64, StoreError> {
        self.route(path)?.save(path, data).await
    }

    /// Closes every child, even after a failure, and reports the first error.
    async fn close(&self) -> Result<(), StoreError> {
        let mut first_err = None;
        for store in &self.stores {
            if let Err(e) = store.close().await {
                warn!(store = store.name(), error = %e, "failed to close store");
                first_err.get_or_insert(e);
            }
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
