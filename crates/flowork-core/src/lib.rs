//! Job orchestration and collaborator trait definitions for Flowork.
//!
//! This crate defines the "ports" (runner, store, engine and sink traits) that
//! the infrastructure layer implements, plus the orchestration pipeline that
//! drives one job per input path. It depends only on `flowork-types` -- never
//! on `flowork-infra` or any process/network crate.

pub mod engine;
pub mod error_set;
pub mod inputs;
pub mod job;
pub mod pipeline;
pub mod retry;
pub mod runner;
pub mod sink;
pub mod store;
pub mod workflow;
