//! Store abstractions for Flowork.
//!
//! A store moves bytes to and from a [`StorePath`]. Runners use stores to
//! stage job inputs into volumes and to extract outputs from them.
//!
//! - `Store`: RPITIT trait for concrete stores (local filesystem, HTTP)
//! - `BoxStore`: object-safe wrapper for runtime store selection
//! - `MultiStore`: first-match-wins fan-out over several stores

pub mod box_store;
pub mod multi;

use std::future::Future;
use std::pin::Pin;

use tokio::io::AsyncRead;

use flowork_types::error::StoreError;
use flowork_types::files::StorePath;

pub use box_store::{BoxStore, StoreDyn};
pub use multi::MultiStore;

/// A readable byte stream handed between stores and runners.
pub type ByteStream = Pin<Box<dyn AsyncRead + Send>>;

/// Trait for byte-stream storage backends.
pub trait Store: Send + Sync {
    /// Human-readable store name (e.g., "local", "http").
    fn name(&self) -> &str;

    /// Whether this store can handle `path`.
    fn accepts(&self, path: &StorePath) -> bool;

    /// Open `path` for reading.
    fn load(&self, path: &StorePath) -> impl Future<Output = Result<ByteStream, StoreError>> + Send;

    /// Write `data` to `path`, returning the number of bytes written.
    fn save(
        &self,
        path: &StorePath,
        data: ByteStream,
    ) -> impl Future<Output = Result<u64, StoreError>> + Send;

    /// Release any resources held by the store.
    fn close(&self) -> impl Future<Output = Result<(), StoreError>> + Send;
}
