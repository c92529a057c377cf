//! Per-call evaluation options.

use std::{fmt, sync::Arc};
use vexil_core::{Hook, HookHints, SharedHook, Value};

/// Hooks and hook hints for a single evaluation.
///
/// Invocation hooks run after global and client hooks and before provider
/// hooks.
///
/// # Example
///
/// ```rust,ignore
/// let options = EvaluationOptions::new()
///     .hook(LoggingHook::new())
///     .hint("request_id", "abc-123");
///
/// client.get_boolean_value("new-checkout", false, None, Some(&options)).await;
/// ```
#[derive(Clone, Default)]
pub struct EvaluationOptions {
    /// Invocation hooks, in registration order.
    pub hooks: Vec<SharedHook>,
    /// Hints handed to every hook stage.
    pub hook_hints: HookHints,
}

impl fmt::Debug for EvaluationOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EvaluationOptions")
            .field("hooks", &self.hooks.len())
            .field("hook_hints", &self.hook_hints)
            .finish()
    }
}

impl EvaluationOptions {
    /// Empty options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an invocation hook.
    pub fn hook<H: Hook>(self, hook: H) -> Self {
        self.shared_hook(Arc::new(hook))
    }

    /// Adds an already shared invocation hook.
    pub fn shared_hook(mut self, hook: SharedHook) -> Self {
        self.hooks.push(hook);
        self
    }

    /// Adds a hook hint.
    pub fn hint(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.hook_hints.insert(key.into(), value.into());
        self
    }
}
