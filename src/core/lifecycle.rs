//! After-stop hooks of the owning service.
use std::{
    future::Future,
    sync::{
        Mutex,
        atomic::{AtomicBool, Ordering},
    },
};

use eyre::Result;
use futures_util::{FutureExt, future::BoxFuture};

/// Zero-argument, fallible callback run once when the service stops.
pub type ShutdownHook = Box<dyn FnOnce() -> BoxFuture<'static, Result<()>> + Send>;

/// Ordered list of after-stop hooks. `stop` drains it exactly once.
#[derive(Default)]
pub struct Lifecycle {
    after_stop: Mutex<Vec<ShutdownHook>>,
    stopped: AtomicBool,
}

impl Lifecycle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a hook to run after the service stops. Hooks registered after
    /// `stop` has run are never invoked.
    pub fn after_stop<F, Fut>(&self, hook: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        let hook: ShutdownHook = Box::new(move || hook().boxed());
        self.after_stop
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(hook);
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    /// Run every registered hook in registration order. All hooks run even
    /// if one fails; the first error is returned. Later calls are no-ops.
    pub async fn stop(&self) -> Result<()> {
        if self.stopped.swap(true, Ordering::AcqRel) {
            tracing::debug!("lifecycle already stopped");
            return Ok(());
        }

        let hooks = std::mem::take(
            &mut *self
                .after_stop
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner()),
        );

        let mut first_error = None;
        for hook in hooks {
            if let Err(e) = hook().await {
                tracing::error!(error = %e, "after-stop hook failed");
                first_error.get_or_insert(e);
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
