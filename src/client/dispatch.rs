//! Handler dispatch registry
//!
//! Maps an envelope `type` to an ordered list of handlers. Handlers under
//! the wildcard key [`WILDCARD`] see every envelope, after the type-specific
//! ones.

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use tracing::error;

use crate::error::HandlerError;
use crate::message::{Envelope, WILDCARD};

/// Inbound envelope handler
///
/// Identity is the `Arc` itself: keep a clone to pass to `off` later.
pub type Handler = Arc<dyn Fn(&Envelope) -> Result<(), HandlerError> + Send + Sync>;

/// Receives handler failures as `(envelope type, error)`
pub type ErrorSink = Arc<dyn Fn(&str, &HandlerError) + Send + Sync>;

/// Wrap a closure as a [`Handler`]
pub fn handler<F>(f: F) -> Handler
where
    F: Fn(&Envelope) -> Result<(), HandlerError> + Send + Sync + 'static,
{
    Arc::new(f)
}

fn log_failure(kind: &str, err: &HandlerError) {
    error!("Handler for '{}' failed: {}", kind, err);
}

/// Type-keyed handler lists
pub struct HandlerRegistry {
    handlers: HashMap<String, Vec<Handler>>,
    sink: ErrorSink,
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        Self {
            handlers: HashMap::new(),
            sink: Arc::new(log_failure),
        }
    }
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let counts: HashMap<&str, usize> = self
            .handlers
            .iter()
            .map(|(k, v)| (k.as_str(), v.len()))
            .collect();
        f.debug_struct("HandlerRegistry")
            .field("handlers", &counts)
            .finish()
    }
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the default `tracing` error sink
    pub fn with_error_sink(mut self, sink: ErrorSink) -> Self {
        self.sink = sink;
        self
    }

    /// Append a handler for `kind`; duplicates are kept and called again
    pub fn on(&mut self, kind: impl Into<String>, handler: Handler) {
        self.handlers.entry(kind.into()).or_default().push(handler);
    }

    /// Remove the first registration of `handler` under `kind`
    ///
    /// Returns false when it wasn't registered.
    pub fn off(&mut self, kind: &str, handler: &Handler) -> bool {
        let Some(list) = self.handlers.get_mut(kind) else {
            return false;
        };
        let Some(index) = list.iter().position(|h| Arc::ptr_eq(h, handler)) else {
            return false;
        };
        list.remove(index);
        if list.is_empty() {
            self.handlers.remove(kind);
        }
        true
    }

    pub fn handler_count(&self, kind: &str) -> usize {
        self.handlers.get(kind).map_or(0, Vec::len)
    }

    /// Invoke the handlers for the envelope's type, then the wildcard ones
    ///
    /// Failures (errors or panics) go to the error sink and don't stop the
    /// remaining handlers. Returns the number of handlers invoked.
    pub fn dispatch(&self, envelope: &Envelope) -> usize {
        let kind = envelope.kind();
        let specific = self.handlers.get(kind).into_iter().flatten();
        let wildcard = self.handlers.get(WILDCARD).into_iter().flatten();

        let mut invoked = 0;
        for handler in specific.chain(wildcard) {
            invoked += 1;
            let outcome = catch_unwind(AssertUnwindSafe(|| handler(envelope)))
                .unwrap_or_else(|panic| Err(panic_message(panic).into()));
            if let Err(err) = outcome {
                (self.sink)(kind, &err);
            }
        }
        invoked
    }
}

fn panic_message(panic: Box<dyn std::any::Any + Send>) -> String {
    if let Some(msg) = panic.downcast_ref::<&str>() {
        format!("handler panicked: {}", msg)
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        format!("handler panicked: {}", msg)
    } else {
        "handler panicked".to_string()
    }
}
