//! Concrete stores.

pub mod http;
pub mod local;

use flowork_core::store::MultiStore;

pub use http::HttpStore;
pub use local::LocalStore;

/// The store used by the CLI: local absolute paths first, then HTTP(S).
pub fn default_store() -> MultiStore {
    MultiStore::default()
        .with_store(LocalStore::new())
        .with_store(HttpStore::new())
}
