//! Shared domain types for Flowork.
//!
//! This crate contains the core domain types used across the Flowork workspace:
//! task specifications and instances, workflows, store paths, volumes,
//! configuration, and the error types shared by runners and stores.
//!
//! Zero infrastructure dependencies -- only serde, uuid, chrono, thiserror.

pub mod config;
pub mod error;
pub mod files;
pub mod task;
pub mod volume;
pub mod workflow;
