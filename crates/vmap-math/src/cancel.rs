use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

/// Token to cancel an in-progress view-map computation
///
/// Clones share the same flag, so a token handed to a worker thread can be
/// cancelled from the thread that owns the original.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    /// Build a new token, initialized as "not cancelled"
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark this token as cancelled
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    /// Check if the token is cancelled
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}
