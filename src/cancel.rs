//! Cooperative cancellation for sync runs
//!
//! A token is cloned into every collaborator call. The walker checks it
//! before each source sub-query; once cancelled, the run unwinds with
//! [`IngestError::Cancelled`](crate::error::IngestError::Cancelled) and the
//! partial graph is dropped.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Shared cancellation flag
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Signal cancellation to every clone of this token
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}
