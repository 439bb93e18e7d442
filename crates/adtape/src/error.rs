//! Error types for adtape.

use std::fmt;

use thiserror::Error;

/// Errors that can occur while building or differentiating a tape.
///
/// Allocation exhaustion is not represented here: running out of arena
/// space is fatal and aborts through the allocator.
#[derive(Debug, Error)]
pub enum AdError {
    /// Argument outside the domain of an elementary function.
    #[error("{function}: {message}")]
    Domain {
        function: &'static str,
        message: String,
    },

    /// A handle was used after the context that created it was left.
    #[error("variable {id} is stale: its context has been left or the tape was cleared")]
    StaleVar { id: u32 },

    /// A checkpoint was released while a more deeply nested one is still open.
    #[error("contexts must be left in LIFO order: innermost open context is at depth {expected}, got checkpoint for depth {actual}")]
    ContextOrder { expected: usize, actual: usize },

    /// A checkpoint was released on a tape other than the one that issued it.
    #[error("checkpoint belongs to a different tape")]
    ForeignContext,

    /// Operation requires that no nested context is open.
    #[error("operation requires no open nested context, but {depth} are open")]
    ContextsOpen { depth: usize },

    /// Container arguments have different lengths.
    #[error("shape mismatch: expected {expected} elements, got {actual}")]
    ShapeMismatch { expected: usize, actual: usize },

    /// One or more elements of a parallel region failed.
    #[error(
        "{} of {total} elements failed in parallel region; first failure: {}",
        .failures.len(),
        .failures.first().map(ToString::to_string).unwrap_or_default()
    )]
    Parallel {
        total: usize,
        failures: Vec<ElementFailure>,
    },

    /// An element function panicked on a worker thread.
    #[error("worker panicked: {message}")]
    WorkerPanic { message: String },

    /// The dedicated worker pool could not be created.
    #[cfg(feature = "parallel")]
    #[error("failed to build worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

impl AdError {
    /// Shorthand for a [`AdError::Domain`] error.
    pub fn domain(function: &'static str, message: impl Into<String>) -> Self {
        Self::Domain {
            function,
            message: message.into(),
        }
    }
}

/// Failure of a single element inside a parallel region.
#[derive(Debug)]
pub struct ElementFailure {
    /// Flat index of the failing element.
    pub index: usize,
    /// The error raised while evaluating it.
    pub error: AdError,
}

impl fmt::Display for ElementFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "element {}: {}", self.index, self.error)
    }
}
