//! `Var` - the user-facing differentiable scalar.

use std::cmp::Ordering;
use std::fmt;
use std::marker::PhantomData;

use crate::error::AdError;
use crate::node::{NodeId, Op};
use crate::tape::with_tape;

/// Handle to a node on the current thread's tape.
///
/// `Var` is `Copy` and never owns memory: the node lives in the tape's arena
/// until the enclosing context is left. Arithmetic on handles records new
/// nodes in the current context and returns new handles.
///
/// Handles are neither `Send` nor `Sync`, so they cannot reach a tape other
/// than the one that created them. Using a handle after its context was left
/// is detected: accessors with a `try_` prefix return
/// [`AdError::StaleVar`], everything else panics.
///
/// Equality and ordering compare forward values and never create nodes.
///
/// # Example
///
/// ```
/// use adtape::{Var, gradient};
///
/// let a = Var::new(2.0);
/// let b = Var::new(5.0);
/// let c = a * b;
///
/// let grads = gradient(c, &[a, b]).unwrap();
/// assert_eq!(grads.get(a), Some(5.0));
/// assert_eq!(grads.get(b), Some(2.0));
/// ```
#[derive(Clone, Copy)]
pub struct Var {
    id: NodeId,
    stamp: u64,
    _local: PhantomData<*const ()>,
}

impl Var {
    /// Create an independent variable in the current context.
    pub fn new(value: f64) -> Self {
        with_tape(|t| t.push(value, Op::Leaf))
    }

    /// Create a constant. Identical to [`Var::new`]; the name documents that
    /// nothing is differentiated against it.
    pub fn constant(value: f64) -> Self {
        Self::new(value)
    }

    pub(crate) fn from_parts(id: NodeId, stamp: u64) -> Self {
        Self {
            id,
            stamp,
            _local: PhantomData,
        }
    }

    /// Position of the node on the tape.
    pub fn id(&self) -> NodeId {
        self.id
    }

    pub(crate) fn stamp(&self) -> u64 {
        self.stamp
    }

    /// Whether the handle still refers to its node.
    pub fn is_live(&self) -> bool {
        with_tape(|t| t.live(*self).is_ok())
    }

    /// Forward value.
    ///
    /// # Panics
    ///
    /// Panics if the handle is stale.
    pub fn value(&self) -> f64 {
        match self.try_value() {
            Ok(v) => v,
            Err(err) => panic!("{err}"),
        }
    }

    /// Forward value, or an error if the handle is stale.
    pub fn try_value(&self) -> Result<f64, AdError> {
        with_tape(|t| t.node(*self).map(|n| n.value()))
    }

    /// Adjoint accumulated by the most recent reverse pass.
    ///
    /// # Panics
    ///
    /// Panics if the handle is stale.
    pub fn adjoint(&self) -> f64 {
        match self.try_adjoint() {
            Ok(v) => v,
            Err(err) => panic!("{err}"),
        }
    }

    /// Adjoint, or an error if the handle is stale.
    pub fn try_adjoint(&self) -> Result<f64, AdError> {
        with_tape(|t| t.node(*self).map(|n| n.adjoint()))
    }
}

impl From<f64> for Var {
    fn from(value: f64) -> Self {
        Var::new(value)
    }
}

impl fmt::Debug for Var {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("Var");
        s.field("id", &self.id);
        match self.try_value() {
            Ok(v) => s.field("value", &v),
            Err(_) => s.field("value", &"<stale>"),
        };
        s.finish()
    }
}

impl fmt::Display for Var {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.value(), f)
    }
}

impl PartialEq for Var {
    fn eq(&self, other: &Self) -> bool {
        self.value() == other.value()
    }
}

impl PartialEq<f64> for Var {
    fn eq(&self, other: &f64) -> bool {
        self.value() == *other
    }
}

impl PartialEq<Var> for f64 {
    fn eq(&self, other: &Var) -> bool {
        *self == other.value()
    }
}

impl PartialOrd for Var {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        self.value().partial_cmp(&other.value())
    }
}

impl PartialOrd<f64> for Var {
    fn partial_cmp(&self, other: &f64) -> Option<Ordering> {
        self.value().partial_cmp(other)
    }
}

impl PartialOrd<Var> for f64 {
    fn partial_cmp(&self, other: &Var) -> Option<Ordering> {
        self.partial_cmp(&other.value())
    }
}
