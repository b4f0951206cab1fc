use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;

use crate::record::TimerPayload;

/// Future returned by a timer handler.
pub type HandlerFuture = Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send>>;

/// A registered timer callback.
pub type Handler = dyn Fn(TimerPayload) -> HandlerFuture + Send + Sync;

/// Process-wide mapping from an `(owner, action)` name pair to an invokable
/// handler.
///
/// Every component that wants to be a timer target registers its handlers
/// here during process initialization, before the scheduler starts; the
/// registry is then frozen into an `Arc` and only resolved from. A timer
/// whose pair no longer resolves (the owning component was removed or
/// renamed between versions) is dropped at dispatch time, never retried.
///
/// Handlers receive the raw payload map and are responsible for validating
/// and parsing their own expected keys.
#[derive(Default)]
pub struct CallbackRegistry {
    handlers: HashMap<(String, String), Box<Handler>>,
}

impl CallbackRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the handler invoked for timers naming `owner` / `action`.
    ///
    /// Registering the same pair again replaces the previous handler.
    pub fn register<F, Fut>(&mut self, owner: &str, action: &str, handler: F)
    where
        F: Fn(TimerPayload) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.handlers.insert(
            (owner.to_owned(), action.to_owned()),
            Box::new(move |payload| -> HandlerFuture { Box::pin(handler(payload)) }),
        );
    }

    /// Look up the handler for a name pair.
    pub fn resolve(&self, owner: &str, action: &str) -> Option<&Handler> {
        self.handlers
            .get(&(owner.to_owned(), action.to_owned()))
            .map(Box::as_ref)
    }

    /// Number of registered handlers.
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// Whether no handler has been registered yet.
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}
