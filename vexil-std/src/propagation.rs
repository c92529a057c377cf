//! # Transaction Context Propagation
//!
//! A transaction context is evaluation context scoped to one unit of work,
//! such as a request. It is merged after the global context and before the
//! client context.

use vexil_core::EvaluationContext;

/// Supplies the transaction context of the current unit of work.
pub trait TransactionContextPropagator: Send + Sync + 'static {
    /// The current transaction context; empty when there is none.
    fn transaction_context(&self) -> EvaluationContext;
}

/// Propagates nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopTransactionContextPropagator;

impl TransactionContextPropagator for NoopTransactionContextPropagator {
    fn transaction_context(&self) -> EvaluationContext {
        EvaluationContext::new()
    }
}

#[cfg(feature = "task-local")]
mod task_local {
    use super::TransactionContextPropagator;
    use std::future::Future;
    use vexil_core::EvaluationContext;

    tokio::task_local! {
        static TRANSACTION_CONTEXT: EvaluationContext;
    }

    /// Propagates a transaction context through a tokio task-local.
    ///
    /// # Example
    ///
    /// ```rust,ignore
    /// TaskLocalTransactionContextPropagator::scope(request_context, async {
    ///     client.get_boolean_value("new-checkout", false, None, None).await
    /// })
    /// .await
    /// ```
    #[derive(Debug, Clone, Copy, Default)]
    pub struct TaskLocalTransactionContextPropagator;

    impl TaskLocalTransactionContextPropagator {
        /// Runs `future` with `context` as its transaction context.
        pub async fn scope<F: Future>(context: EvaluationContext, future: F) -> F::Output {
            TRANSACTION_CONTEXT.scope(context, future).await
        }
    }

    impl TransactionContextPropagator for TaskLocalTransactionContextPropagator {
        fn transaction_context(&self) -> EvaluationContext {
            TRANSACTION_CONTEXT
                .try_with(Clone::clone)
                .unwrap_or_default()
        }
    }

}

#[cfg(feature = "task-local")]
pub use task_local::TaskLocalTransactionContextPropagator;
