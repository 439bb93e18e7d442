//! Nested differentiation contexts.
//!
//! Entering a context records the tape position; leaving it drops every node
//! created since, in one step, and turns every handle created inside stale.
//! Contexts nest strictly LIFO.
//!
//! # Example
//!
//! ```
//! use adtape::{Var, gradient, nested, tape_len};
//!
//! let outer = Var::new(1.0);
//! let before = tape_len();
//!
//! let inner_grad = nested(|| {
//!     let x = Var::new(2.0);
//!     let y = x * x;
//!     gradient(y, &[x]).unwrap().get(x).unwrap()
//! });
//!
//! assert_eq!(inner_grad, 4.0);
//! assert_eq!(tape_len(), before);
//! assert!(outer.is_live());
//! ```

use std::marker::PhantomData;
use std::thread;

use log::warn;
use thiserror::Error;

use crate::error::AdError;
use crate::tape::{try_with_tape, with_tape};

/// Token for an open context, consumed by [`leave_context`].
///
/// Neither `Clone` nor `Send`: each context is left at most once and only on
/// the thread that entered it. Dropping a checkpoint without leaving its
/// context abandons it: the context is closed as soon as no deeper context
/// is open.
#[derive(Debug)]
#[must_use = "a context stays open until its checkpoint is passed to leave_context"]
pub struct Checkpoint {
    pub(crate) tape_id: u64,
    pub(crate) depth: usize,
    pub(crate) armed: bool,
    pub(crate) _local: PhantomData<*const ()>,
}

impl Checkpoint {
    /// Nesting depth of the context this checkpoint opened (1 = outermost).
    pub fn depth(&self) -> usize {
        self.depth
    }

    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for Checkpoint {
    fn drop(&mut self) {
        if self.armed {
            try_with_tape(|t| t.abandon(self));
        }
    }
}

/// A rejected [`leave_context`]. Owns the checkpoint so it can be left later.
#[derive(Debug, Error)]
#[error("{source}")]
pub struct LeaveError {
    checkpoint: Checkpoint,
    source: AdError,
}

impl LeaveError {
    /// Why the context could not be left.
    pub fn error(&self) -> &AdError {
        &self.source
    }

    /// Take back the checkpoint, e.g. to leave it after the deeper context.
    pub fn into_checkpoint(self) -> Checkpoint {
        self.checkpoint
    }
}

impl From<LeaveError> for AdError {
    /// Keeps the error and abandons the checkpoint.
    fn from(err: LeaveError) -> Self {
        let LeaveError { checkpoint, source } = err;
        drop(checkpoint);
        source
    }
}

/// Open a nested context on this thread's tape.
pub fn enter_context() -> Checkpoint {
    with_tape(|t| t.enter())
}

/// Close the context opened by `checkpoint`, discarding its nodes.
///
/// # Errors
///
/// The tape is left unchanged and the checkpoint is handed back in the
/// [`LeaveError`] when:
/// - a more deeply nested context is still open ([`AdError::ContextOrder`]);
/// - the checkpoint came from another tape, e.g. one replaced by
///   [`configure_tape`](crate::configure_tape) ([`AdError::ForeignContext`]).
pub fn leave_context(checkpoint: Checkpoint) -> Result<(), LeaveError> {
    match with_tape(|t| t.leave(&checkpoint)) {
        Ok(()) => {
            checkpoint.disarm();
            Ok(())
        }
        Err(source) => Err(LeaveError { checkpoint, source }),
    }
}

/// RAII guard for a nested context. The context is left when the guard drops.
///
/// Dropping guards out of order panics, unless the thread is already
/// panicking, in which case the error is logged. Either way the misplaced
/// context is abandoned, so the stack unwinds once the deeper guards drop.
#[derive(Debug)]
pub struct NestedScope {
    checkpoint: Option<Checkpoint>,
}

impl NestedScope {
    /// Enter a new context.
    pub fn enter() -> Self {
        Self {
            checkpoint: Some(enter_context()),
        }
    }

    /// Depth of this scope's context.
    pub fn depth(&self) -> usize {
        self.checkpoint.as_ref().map_or(0, Checkpoint::depth)
    }

    /// Leave the context explicitly, reporting misuse as an error. A
    /// rejected context is abandoned.
    pub fn leave(mut self) -> Result<(), AdError> {
        match self.checkpoint.take() {
            Some(checkpoint) => leave_context(checkpoint).map_err(AdError::from),
            None => Ok(()),
        }
    }
}

impl Drop for NestedScope {
    fn drop(&mut self) {
        let Some(checkpoint) = self.checkpoint.take() else {
            return;
        };
        match try_with_tape(|t| t.leave(&checkpoint)) {
            Some(Ok(())) | None => checkpoint.disarm(),
            Some(Err(err)) => {
                drop(checkpoint);
                if thread::panicking() {
                    warn!("failed to leave nested context while unwinding: {err}");
                } else {
                    panic!("failed to leave nested context: {err}");
                }
            }
        }
    }
}

/// Run `f` inside a fresh nested context and return its result.
///
/// Handles created inside `f` are stale once this returns, so results should
/// be extracted as plain values.
pub fn nested<R>(f: impl FnOnce() -> R) -> R {
    let _scope = NestedScope::enter();
    f()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backward::gradient;
    use crate::tape::{context_depth, tape_len, tape_stats};
    use crate::var::Var;

    #[test]
    fn test_enter_leave_restores_length() {
        Var::new(1.0);
        let before = tape_len();
        let depth = context_depth();
        let cp = enter_context();
        assert_eq!(context_depth(), depth + 1);
        for i in 0..100 {
            Var::new(i as f64);
        }
        leave_context(cp).unwrap();
        assert_eq!(tape_len(), before);
        assert_eq!(context_depth(), depth);
    }

    #[test]
    fn test_out_of_order_leave_rejected() {
        let base = context_depth();
        let before = tape_len();
        let outer = enter_context();
        let inner = enter_context();
        let err = leave_context(outer).unwrap_err();
        assert!(matches!(
            err.error(),
            AdError::ContextOrder {
                expected,
                actual
            } if *expected == base + 2 && *actual == base + 1
        ));
        assert_eq!(context_depth(), base + 2);

        let outer = err.into_checkpoint();
        Var::new(1.0);
        leave_context(inner).unwrap();
        leave_context(outer).unwrap();
        assert_eq!(context_depth(), base);
        assert_eq!(tape_len(), before);
    }

    #[test]
    fn test_dropped_checkpoint_is_closed_with_inner_context() {
        let base = context_depth();
        let before = tape_len();
        let outer = enter_context();
        Var::new(1.0);
        let inner = enter_context();
        Var::new(2.0);

        drop(outer);
        assert_eq!(context_depth(), base + 2);
        leave_context(inner).unwrap();
        assert_eq!(context_depth(), base);
        assert_eq!(tape_len(), before);
    }

    #[test]
    fn test_dropped_innermost_checkpoint_closes_at_once() {
        let base = context_depth();
        let before = tape_len();
        {
            let _cp = enter_context();
            Var::new(1.0);
        }
        assert_eq!(context_depth(), base);
        assert_eq!(tape_len(), before);
    }

    #[test]
    fn test_rejected_scope_leave_recovers() {
        let base = context_depth();
        let outer = NestedScope::enter();
        let inner = enter_context();
        assert!(matches!(outer.leave(), Err(AdError::ContextOrder { .. })));
        leave_context(inner).unwrap();
        assert_eq!(context_depth(), base);
    }

    #[test]
    fn test_scope_dropped_out_of_order_panics() {
        let (message, depth) = std::thread::spawn(|| {
            let result = std::panic::catch_unwind(|| {
                let outer = NestedScope::enter();
                let _inner = NestedScope::enter();
                drop(outer);
            });
            let message = result
                .unwrap_err()
                .downcast_ref::<String>()
                .cloned()
                .unwrap_or_default();
            (message, context_depth())
        })
        .join()
        .unwrap();
        assert!(message.contains("failed to leave nested context"));
        // Unwinding dropped the inner scope, which closed the abandoned outer one.
        assert_eq!(depth, 0);
    }

    #[test]
    fn test_scope_guard_leaves_on_drop() {
        let depth = context_depth();
        {
            let scope = NestedScope::enter();
            assert_eq!(scope.depth(), depth + 1);
            Var::new(3.0);
        }
        assert_eq!(context_depth(), depth);
    }

    #[test]
    fn test_nested_gradient_does_not_disturb_outer() {
        let a = Var::new(2.0);
        let b = a * 3.0;

        let inner = nested(|| {
            let x = Var::new(5.0);
            let y = x.square();
            gradient(y, &[x]).unwrap().get(x).unwrap()
        });
        assert_eq!(inner, 10.0);

        let g = gradient(b, &[a]).unwrap();
        assert_eq!(g.get(a), Some(3.0));
    }

    #[test]
    fn test_deep_nesting() {
        fn recurse(level: usize) -> usize {
            if level == 0 {
                return context_depth();
            }
            nested(|| {
                Var::new(level as f64);
                recurse(level - 1)
            })
        }
        let base = context_depth();
        assert_eq!(recurse(5), base + 5);
        assert_eq!(context_depth(), base);
    }

    #[test]
    fn test_repeated_contexts_reuse_memory() {
        let round = || {
            nested(|| {
                for i in 0..10_000 {
                    Var::new(i as f64);
                }
            })
        };
        Var::new(0.0);
        round();
        let warm = tape_stats();
        for _ in 0..50 {
            round();
        }
        let after = tape_stats();
        assert_eq!(after.len, warm.len);
        assert_eq!(after.arena.chunks_allocated, warm.arena.chunks_allocated);
    }
}
