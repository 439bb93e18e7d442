//! Differentiable operations on [`Var`].
//!
//! Each operation validates its operands, evaluates the forward value and
//! records one node whose [`Op`] variant carries what the backward step
//! needs. Derivatives are evaluated lazily during the reverse pass.

mod arith;
mod callback;
mod precomputed;
mod reduce;
mod unary;

pub use callback::{make_callback_var, squared_norm};
pub use precomputed::precomputed_gradients;
pub use reduce::{dot, log_sum_exp, log_sum_exp_f64, sum};
pub use unary::{cos, exp, inv_logit, inv_logit_f64, log, sin, sqrt, square};

use crate::error::AdError;
use crate::node::{NodeId, Op};
use crate::tape::{Tape, with_tape};
use crate::var::Var;

/// Record a node with one operand.
pub(crate) fn record_unary(a: Var, build: impl FnOnce(NodeId, f64) -> (f64, Op)) -> Var {
    with_tape(|t| {
        let (id, value) = t.operand(a);
        let (out, op) = build(id, value);
        t.push(out, op)
    })
}

/// Record a node with one operand, letting `build` reject the input.
pub(crate) fn try_record_unary(
    a: Var,
    build: impl FnOnce(NodeId, f64) -> Result<(f64, Op), AdError>,
) -> Result<Var, AdError> {
    with_tape(|t| {
        let value = t.node(a)?.value();
        let (out, op) = build(a.id(), value)?;
        Ok(t.push(out, op))
    })
}

/// Record a node with two operands.
pub(crate) fn record_binary(
    a: Var,
    b: Var,
    build: impl FnOnce((NodeId, f64), (NodeId, f64)) -> (f64, Op),
) -> Var {
    with_tape(|t| {
        let lhs = t.operand(a);
        let rhs = t.operand(b);
        let (out, op) = build(lhs, rhs);
        t.push(out, op)
    })
}

/// Resolve a slice of handles into ids and forward values.
pub(crate) fn resolve_all(t: &Tape, vars: &[Var]) -> Result<(Box<[NodeId]>, Box<[f64]>), AdError> {
    let mut ids = Vec::with_capacity(vars.len());
    let mut values = Vec::with_capacity(vars.len());
    for &var in vars {
        let node = t.node(var)?;
        ids.push(var.id());
        values.push(node.value());
    }
    Ok((ids.into_boxed_slice(), values.into_boxed_slice()))
}
