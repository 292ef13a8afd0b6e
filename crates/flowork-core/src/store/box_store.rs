//! BoxStore -- object-safe dynamic dispatch wrapper for Store.

use std::future::Future;
use std::pin::Pin;

use flowork_types::error::StoreError;
use flowork_types::files::StorePath;

use super::{ByteStream, Store};

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + Send + 'a>>;

/// Object-safe version of [`Store`] with boxed futures.
pub trait StoreDyn: Send + Sync {
    fn name(&self) -> &str;

    fn accepts(&self, path: &StorePath) -> bool;

    fn load_boxed<'a>(&'a self, path: &'a StorePath) -> BoxFuture<'a, ByteStream>;

    fn save_boxed<'a>(&'a self, path: &'a StorePath, data: ByteStream) -> BoxFuture<'a, u64>;

    fn close_boxed(&self) -> BoxFuture<'_, ()>;
}

impl<T: Store> StoreDyn for T {
    fn name(&self) -> &str {
        Store::name(self)
    }

    fn accepts(&self, path: &StorePath) -> bool {
        Store::accepts(self, path)
    }

    fn load_boxed<'a>(&'a self, path: &'a StorePath) -> BoxFuture<'a, ByteStream> {
        Box::pin(self.load(path))
    }

    fn save_boxed<'a>(&'a self, path: &'a StorePath, data: ByteStream) -> BoxFuture<'a, u64> {
        Box::pin(self.save(path, data))
    }

    fn close_boxed(&self) -> BoxFuture<'_, ()> {
        Box::pin(self.close())
    }
}

/// Type-erased store, used wherever the concrete store is chosen at runtime.
pub struct BoxStore {
    inner: Box<dyn StoreDyn + Send + Sync>,
}

impl BoxStore {
    pub fn new<T: Store + 'static>(store: T) -> Self {
        Self {
            inner: Box::new(store),
        }
    }
}

impl std::fmt::Debug for BoxStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoxStore")
            .field("name", &self.inner.name())
            .finish()
    }
}

impl Store for BoxStore {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn accepts(&self, path: &StorePath) -> bool {
        self.inner.accepts(path)
    }

    async fn load(&self, path: &StorePath) -> Result<ByteStream, StoreError> {
        self.inner.load_boxed(path).await
    }

    async fn save(&self, path: &StorePath, data: ByteStream) -> Result<u64, StoreError> {
        self.inner.save_boxed(path, data).await
    }

    async fn close(&self) -> Result<(), StoreError> {
        self.inner.close_boxed().await
    }
}
