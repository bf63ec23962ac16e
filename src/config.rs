use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// How the 256 candidate values for one byte are submitted to the oracle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SearchStrategy {
    /// Ascending order, stopping at the first `MacInvalid`.
    #[default]
    Sequential,
    /// Every candidate is queried so a second `MacInvalid` can be reported.
    Exhaustive,
    /// Candidates are queried concurrently on the rayon pool.
    Parallel,
}

/// Shared flag checked between oracle queries.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Default)]
pub struct AttackConfig {
    pub strategy: SearchStrategy,
    pub cancel: Option<CancelToken>,
    /// Attack the blocks of a message concurrently.
    pub parallel_blocks: bool,
}

impl AttackConfig {
    pub fn new(strategy: SearchStrategy) -> Self {
        Self {
            strategy,
            ..Default::default()
        }
    }

    pub fn with_cancel_token(mut self, token: CancelToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn with_parallel_blocks(mut self, enabled: bool) -> Self {
        self.parallel_blocks = enabled;
        self
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(CancelToken::is_cancelled)
    }
}
