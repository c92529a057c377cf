//! Bundled providers.

mod in_memory;
mod noop;

pub use in_memory::{ContextEvaluator, InMemoryFlag, InMemoryProvider};
pub use noop::NoopProvider;
