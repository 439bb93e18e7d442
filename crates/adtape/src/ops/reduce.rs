//! Reductions over slices of variables, each recorded as one n-ary node.

use super::resolve_all;
use crate::domain::{check_not_nan, check_same_len};
use crate::error::AdError;
use crate::node::Op;
use crate::tape::with_tape;
use crate::var::Var;

/// Sum of `xs`. An empty slice yields the constant 0.
///
/// # Panics
///
/// Panics if any handle is stale.
pub fn sum(xs: &[Var]) -> Var {
    with_tape(|t| {
        let (ids, values) = match resolve_all(t, xs) {
            Ok(resolved) => resolved,
            Err(err) => panic!("{err}"),
        };
        let total = values.iter().sum();
        t.push(total, Op::Sum(ids))
    })
}

/// Inner product of two equally long slices.
pub fn dot(a: &[Var], b: &[Var]) -> Result<Var, AdError> {
    check_same_len(a.len(), b.len())?;
    with_tape(|t| {
        let (a_ids, a_vals) = resolve_all(t, a)?;
        let (b_ids, b_vals) = resolve_all(t, b)?;
        let value = a_vals.iter().zip(b_vals.iter()).map(|(x, y)| x * y).sum();
        Ok(t.push(
            value,
            Op::Dot {
                a: a_ids,
                b: b_ids,
                a_vals,
                b_vals,
            },
        ))
    })
}

/// `log(sum(exp(x)))` on plain floats, shifted by the maximum to avoid
/// overflow. Returns -inf for an empty slice.
///
/// # Example
///
/// ```
/// use adtape::log_sum_exp_f64;
///
/// let v = log_sum_exp_f64(&[1000.0, 1000.0]);
/// assert!((v - (1000.0 + 2f64.ln())).abs() < 1e-9);
/// ```
pub fn log_sum_exp_f64(xs: &[f64]) -> f64 {
    let max = xs.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if !max.is_finite() {
        return max;
    }
    let sum: f64 = xs.iter().map(|x| (x - max).exp()).sum();
    max + sum.ln()
}

/// `log(sum(exp(x)))` over variables.
///
/// The partial with respect to `x_i` is the softmax weight `exp(x_i - lse)`.
/// Fails if any value is NaN; an empty slice yields the constant -inf.
pub fn log_sum_exp(xs: &[Var]) -> Result<Var, AdError> {
    with_tape(|t| {
        let (operands, values) = resolve_all(t, xs)?;
        for &x in values.iter() {
            check_not_nan("log_sum_exp", "x", x)?;
        }
        let value = log_sum_exp_f64(&values);
        Ok(t.push(value, Op::LogSumExp { operands, values }))
    })
}
