// Budfs generative filesystem overlay.
// Copyright 2025 Martin Pool.

//! Cooperative cancellation for generator callbacks.

use std::sync::atomic::{AtomicBool, Ordering::Relaxed};
use std::sync::Arc;

/// An ambient flag asking long-running generation to stop.
///
/// Clones share the flag. The overlay only surfaces the context to
/// producers; honouring it is the producer's business. A producer that
/// fails after cancellation leaves no cache entry behind, so the next
/// read starts over.
#[derive(Clone, Debug, Default)]
pub struct Context {
    cancelled: Arc<AtomicBool>,
}

impl Context {
    pub fn new() -> Context {
        Context::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Relaxed)
    }
}
