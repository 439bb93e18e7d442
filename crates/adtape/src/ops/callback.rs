//! Nodes whose backward step is an arbitrary closure.

use crate::node::{Callback, ChainScope, Op};
use crate::tape::with_tape;
use crate::var::Var;

/// Record a node with a user-supplied backward step.
///
/// `chain` runs once during the reverse pass. It reads the node's adjoint
/// through the [`ChainScope`] and pushes contributions into the variables it
/// captured with [`ChainScope::accumulate`]. Captured variables must have
/// been created before this call. The closure must not touch the tape
/// in any other way.
///
/// # Example
///
/// ```
/// use adtape::{Var, gradient, make_callback_var};
///
/// let x = Var::new(3.0);
/// // y = 2x with a hand-written backward step.
/// let y = make_callback_var(2.0 * x.value(), move |scope| {
///     scope.accumulate(x, 2.0 * scope.adjoint());
/// });
/// assert_eq!(gradient(y, &[x]).unwrap().get(x), Some(2.0));
/// ```
pub fn make_callback_var<F>(value: f64, chain: F) -> Var
where
    F: Fn(&ChainScope<'_>) + 'static,
{
    with_tape(|t| t.push(value, Op::Callback(Callback(Box::new(chain)))))
}

/// Sum of squares as a single node that back-propagates to the whole slice.
///
/// # Panics
///
/// Panics if any handle is stale.
pub fn squared_norm(xs: &[Var]) -> Var {
    let captured: Vec<Var> = xs.to_vec();
    let value = captured.iter().map(|x| x.value() * x.value()).sum();
    make_callback_var(value, move |scope| {
        let g = scope.adjoint();
        for &x in &captured {
            scope.accumulate(x, 2.0 * g * scope.value_of(x));
        }
    })
}
