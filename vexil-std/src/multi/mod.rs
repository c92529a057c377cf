//! # Evaluation Strategy Engine
//!
//! [`MultiProvider`] fans a single evaluation out to several providers and
//! reduces their results under a pluggable [`EvaluationStrategy`]:
//!
//! - [`FirstMatchStrategy`]: sequential, stops at the first result that is not
//!   `FLAG_NOT_FOUND`
//! - [`FirstSuccessfulStrategy`]: sequential, skips every failing provider
//! - [`ComparisonStrategy`]: parallel, compares every value against a fallback

mod comparison;
mod entry;
mod first_match;
mod first_successful;
mod provider;
mod strategy;

pub use comparison::{ComparisonStrategy, MismatchHandler};
pub use entry::ProviderEntry;
pub use first_match::FirstMatchStrategy;
pub use first_successful::FirstSuccessfulStrategy;
pub use provider::{MULTI_PROVIDER_NAME, MultiProvider, MultiProviderBuilder, MultiResolution};
pub use strategy::{
    EvaluationStrategy, FinalResult, ProviderResolution, RunMode, StrategyEvaluationContext,
    StrategyProviderContext, collect_provider_errors,
};
