//! Infrastructure layer for Flowork.
//!
//! Contains implementations of the traits defined in `flowork-core`:
//! Docker and SSH runners, local filesystem and HTTP stores, the local
//! directory input source, and the `flowork.toml` loader.

pub mod config;
pub mod inputs;
pub mod runner;
pub mod store;
