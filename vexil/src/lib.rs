//! # vexil - Feature-Flag Evaluation Client
//!
//! `vexil` resolves typed feature flags through pluggable providers, runs a
//! four-stage hook pipeline around every evaluation and never fails a flag
//! lookup: errors come back as details carrying the caller's default.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use vexil::prelude::*;
//! use vexil::providers::{InMemoryFlag, InMemoryProvider};
//!
//! let flags = FeatureFlags::new();
//! flags
//!     .set_provider_and_wait(Arc::new(InMemoryProvider::new([
//!         ("new-checkout", InMemoryFlag::toggle(true)),
//!     ])))
//!     .await?;
//!
//! let client = flags.client();
//! let context = EvaluationContext::new().with_targeting_key("user-42");
//! if client.get_boolean_value("new-checkout", false, Some(&context), None).await {
//!     // ...
//! }
//! ```
//!
//! ## Several providers
//!
//! ```rust,ignore
//! let multi = MultiProvider::builder()
//!     .named("local", Arc::new(local))
//!     .named("remote", Arc::new(remote))
//!     .strategy(FirstSuccessfulStrategy)
//!     .build()?;
//! flags.set_provider(Arc::new(multi)).await?;
//! ```

#![deny(clippy::wildcard_imports)]
#![warn(missing_docs)]

mod api;
mod client;
mod options;

pub use api::{FeatureFlags, FeatureFlagsBuilder};
pub use client::Client;
pub use options::EvaluationOptions;

pub use vexil_core::{
    // Errors
    AggregateError,
    BoxError,
    // Metadata
    ClientMetadata,
    ConfigError,
    // Hooks
    DynHook,
    ErrorCode,
    // Context
    EvaluationContext,
    // Details
    EvaluationDetails,
    EvaluationError,
    EvaluationId,
    // Events
    EventDetails,
    EventEmitter,
    EventHandler,
    FlagMetadata,
    // Values
    FlagType,
    FlagValue,
    FlagValueType,
    Hook,
    HookContext,
    HookHints,
    HookStage,
    MetadataValue,
    // Providers
    Provider,
    ProviderCapabilities,
    ProviderEventKind,
    ProviderFailure,
    ProviderMetadata,
    ProviderStatus,
    Reason,
    ResolutionDetails,
    SharedHook,
    SharedProvider,
    Subscription,
    TARGETING_KEY,
    TrackingEventDetails,
    Value,
    VexilError,
    async_trait,
    merge_contexts,
};

pub use vexil_std::{HookPipeline, ProviderRegistry, ProviderTransition, StatusTracker};

/// Multi-provider evaluation.
pub mod multi {
    pub use vexil_std::multi::{
        ComparisonStrategy, EvaluationStrategy, FinalResult, FirstMatchStrategy,
        FirstSuccessfulStrategy, MULTI_PROVIDER_NAME, MismatchHandler, MultiProvider,
        MultiProviderBuilder, MultiResolution, ProviderEntry, ProviderResolution, RunMode,
        StrategyEvaluationContext, StrategyProviderContext, collect_provider_errors,
    };
}

/// Bundled providers.
pub mod providers {
    pub use vexil_std::providers::{
        ContextEvaluator, InMemoryFlag, InMemoryProvider, NoopProvider,
    };
}

/// Bundled hooks.
pub mod hooks {
    pub use vexil_std::hooks::LoggingHook;
}

/// Transaction context propagation.
pub mod propagation {
    #[cfg(feature = "task-local")]
    pub use vexil_std::propagation::TaskLocalTransactionContextPropagator;
    pub use vexil_std::propagation::{
        NoopTransactionContextPropagator, TransactionContextPropagator,
    };
}

/// Testing utilities.
pub mod testing {
    pub use vexil_std::testing::{InitGate, Observation, RecordingHook, ScriptedProvider};
}

/// Prelude module for convenient imports.
///
/// ```rust,ignore
/// use vexil::prelude::*;
/// ```
pub mod prelude {
    pub use crate::{
        Client, ErrorCode, EvaluationContext, EvaluationDetails, EvaluationError,
        EvaluationOptions, FeatureFlags, FlagType, Hook, HookContext, HookHints, Provider,
        ProviderEventKind, ProviderStatus, Reason, ResolutionDetails, Value,
        multi::{ComparisonStrategy, FirstMatchStrategy, FirstSuccessfulStrategy, MultiProvider},
    };
}

#[cfg(feature = "macros")]
pub use vexil_macros::IntoContext;
