//! # vexil-std
//!
//! Evaluation engines for the Vexil feature-flag client.
//!
//! This crate provides:
//! - **Hook Pipeline Executor**: [`HookPipeline`]
//! - **Status Tracker**: [`StatusTracker`]
//! - **Evaluation Strategy Engine**: [`multi::MultiProvider`] and its strategies
//! - **Provider Transition Manager**: [`ProviderRegistry`]
//! - **Bundled providers**: No-op, In-memory
//! - **Bundled hooks**: Logging
//! - **Transaction context propagation**: [`propagation`]

#![deny(clippy::wildcard_imports)]
#![warn(missing_docs)]

// Re-export core contracts
pub use vexil_core;

// Modules
pub mod hooks;
pub mod multi;
pub mod pipeline;
pub mod propagation;
pub mod providers;
pub mod registry;
pub mod status;
pub mod testing;

pub use pipeline::HookPipeline;
pub use registry::{ProviderRegistry, ProviderTransition};
pub use status::StatusTracker;
