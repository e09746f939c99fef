//! Guard predicates for transition conditions.
//!
//! Guards are boolean functions over a node's read-only context. They are
//! the usual way to give a transition its condition without writing a full
//! [`NodeInstance`](super::NodeInstance) implementation.

use super::instance::NodeContext;
use std::fmt;
use std::sync::Arc;

/// Shared predicate deciding whether a transition may be taken.
///
/// # Example
///
/// ```rust
/// use statewright::core::{Guard, NodeContext, NodeGuid, NodeKind};
///
/// let after_two_seconds = Guard::new(|ctx: &NodeContext<'_>| ctx.time_in_state >= 2.0);
///
/// let mut ctx = NodeContext::detached("Wait", NodeKind::Transition, NodeGuid::NIL);
/// ctx.time_in_state = 1.0;
/// assert!(!after_two_seconds.check(&ctx));
///
/// ctx.time_in_state = 2.5;
/// assert!(after_two_seconds.check(&ctx));
/// ```
#[derive(Clone)]
pub struct Guard {
    predicate: Arc<dyn Fn(&NodeContext<'_>) -> bool + Send + Sync>,
}

impl Guard {
    /// Create a guard from a predicate.
    ///
    /// The predicate must be thread-safe (Send + Sync); it should not rely on
    /// being called a particular number of times.
    pub fn new<F>(predicate: F) -> Self
    where
        F: Fn(&NodeContext<'_>) -> bool + Send + Sync + 'static,
    {
        Guard {
            predicate: Arc::new(predicate),
        }
    }

    /// A guard that always passes.
    pub fn always() -> Self {
        Self::new(|_| true)
    }

    /// A guard that never passes.
    pub fn never() -> Self {
        Self::new(|_| false)
    }

    pub fn check(&self, ctx: &NodeContext<'_>) -> bool {
        (self.predicate)(ctx)
    }
}

impl fmt::Debug for Guard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Guard").finish_non_exhaustive()
    }
}
