//! # vexil-core
//!
//! Core contracts for the Vexil feature-flag evaluation client.
//!
//! This crate has minimal dependencies and is designed to be imported by
//! provider and hook authors who don't need the evaluation engines in
//! `vexil-std`.
//!
//! # Contents
//!
//! - **Data model**: [`Value`], [`EvaluationContext`], [`ResolutionDetails`],
//!   [`EvaluationDetails`], [`FlagMetadata`], [`Reason`]
//! - **Context Merger**: [`merge_contexts`]
//! - **Contracts**: [`Provider`] (backends), [`Hook`] / [`DynHook`] (lifecycle
//!   extensions)
//! - **Lifecycle**: [`ProviderStatus`] and the typed event bus [`EventEmitter`]
//!
//! # Error Types
//!
//! - [`EvaluationError`] - A failure with a canonical [`ErrorCode`]
//! - [`AggregateError`] - Failures collected across providers
//! - [`ConfigError`] - Build-time configuration mistakes
//! - [`VexilError`] - Top-level error type

#![deny(clippy::wildcard_imports)]
#![warn(missing_docs)]

mod context;
mod details;
mod error;
mod events;
mod hook;
mod metadata;
mod provider;
mod status;
mod value;

// Re-exports
pub use context::{EvaluationContext, TARGETING_KEY, merge_contexts};
pub use details::{EvaluationDetails, FlagMetadata, MetadataValue, Reason, ResolutionDetails};
pub use error::{
    AggregateError, BoxError, ConfigError, ErrorCode, EvaluationError, ProviderFailure, VexilError,
};
pub use events::{
    EventDetails, EventEmitter, EventHandler, HandlerId, ProviderEventKind, Subscription,
};
pub use hook::{
    ContextFrozen, DynHook, EvaluationId, Hook, HookContext, HookFuture, HookHints, HookStage,
    SharedHook,
};
pub use metadata::{ClientMetadata, ProviderMetadata};
pub use provider::{
    Provider, ProviderCapabilities, SharedProvider, TrackingEventDetails,
};
pub use status::ProviderStatus;
pub use value::{FlagType, FlagValue, FlagValueType, ResolveFuture, Value};

// Provider implementations use `#[async_trait]`.
pub use async_trait::async_trait;
