//! Resampling machinery: vertex alignment, stability bootstraps, the
//! permutation null model and model selection across archetype counts

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

pub mod alignment;
pub mod bootstrap;
pub mod permutation;
pub mod selection;

/// Cooperative cancellation handle for long resampling batches
///
/// Iterations that already finished are kept; iterations not yet started are
/// skipped once the token fires. Cloning shares the underlying flag.
#[derive(Clone, Debug, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        CancelToken::default()
    }

    /// Request cancellation of the batch holding this token
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }
}

/// Outcome of a single resample iteration
pub(crate) enum ResampleOutcome<T> {
    /// Iteration ran and converged
    Done(T),
    /// Iteration ran but is excluded from aggregation (non-convergence or a
    /// degenerate subsample)
    Excluded,
    /// Iteration never ran because the batch was cancelled
    Skipped,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancel_token_shared() {
        let token = CancelToken::new();
        let clone = token.clone();
        assert!(!clone.is_cancelled());
        token.cancel();
        assert!(clone.is_cancelled());
    }
}
