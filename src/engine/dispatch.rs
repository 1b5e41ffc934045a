// src/engine/dispatch.rs

//! Asynchronous callback dispatch.
//!
//! Completion logic never invokes a caller's callback on the worker or
//! manager thread that detected the completion; a finished result is always
//! handed to a [`CallbackExecutor`], which schedules it for later execution
//! on some unspecified context. FIFO ordering is not guaranteed.

use tokio::runtime::Handle;

use crate::errors::EngineError;

/// A zero-argument unit of work, typically a closure capturing a finished
/// `ProcessResult` and the caller's callback.
pub type UnitOfWork = Box<dyn FnOnce() + Send + 'static>;

/// Collaborator contract for delivering finished results.
///
/// `enqueue` accepts a unit of work and returns immediately; the work runs
/// later, never synchronously inside the call and never while any engine
/// lock is held.
pub trait CallbackExecutor: Send + Sync + 'static {
    fn enqueue(&self, work: UnitOfWork);
}

/// Default executor: spawns each unit of work as a task on a captured tokio
/// runtime handle.
#[derive(Debug, Clone)]
pub struct RuntimeExecutor {
    handle: Handle,
}

impl RuntimeExecutor {
    /// Capture the current runtime. Fails if called outside a tokio context.
    pub fn current() -> Result<Self, EngineError> {
        Handle::try_current()
            .map(|handle| Self { handle })
            .map_err(|_| EngineError::NoRuntime)
    }

    pub fn new(handle: Handle) -> Self {
        Self { handle }
    }
}

impl CallbackExecutor for RuntimeExecutor {
    fn enqueue(&self, work: UnitOfWork) {
        self.handle.spawn(async move {
            work();
        });
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tokio::sync::oneshot;

    use super::*;

    #[tokio::test]
    async fn enqueued_work_runs_asynchronously() {
        let executor: Arc<dyn CallbackExecutor> = Arc::new(RuntimeExecutor::current().unwrap());
        let (tx, rx) = oneshot::channel();

        executor.enqueue(Box::new(move || {
            let _ = tx.send(7);
        }));

        assert_eq!(rx.await.unwrap(), 7);
    }
}
