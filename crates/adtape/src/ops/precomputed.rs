//! Nodes with partial derivatives supplied by the caller.

use super::resolve_all;
use crate::domain::check_same_len;
use crate::error::AdError;
use crate::node::Op;
use crate::tape::with_tape;
use crate::var::Var;

/// Record a node whose value and partials were computed elsewhere.
///
/// The backward step adds `adjoint * partials[i]` to `operands[i]`. This is
/// how results of an inner differentiation (for example a nested gradient or
/// a parallel region) are spliced back into the enclosing tape.
///
/// # Example
///
/// ```
/// use adtape::{Var, gradient, precomputed_gradients};
///
/// let x = Var::new(2.0);
/// let y = Var::new(3.0);
/// // f(x, y) = x * y, evaluated by hand.
/// let f = precomputed_gradients(6.0, &[x, y], &[3.0, 2.0]).unwrap();
/// let g = gradient(f, &[x, y]).unwrap();
/// assert_eq!(g.to_vec(), vec![3.0, 2.0]);
/// ```
pub fn precomputed_gradients(
    value: f64,
    operands: &[Var],
    partials: &[f64],
) -> Result<Var, AdError> {
    check_same_len(operands.len(), partials.len())?;
    with_tape(|t| {
        let (ids, _) = resolve_all(t, operands)?;
        Ok(t.push(
            value,
            Op::Precomputed {
                operands: ids,
                partials: partials.into(),
            },
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backward::gradient;
    use crate::nested::nested;

    #[test]
    fn test_precomputed_chain_rule() {
        let x = Var::new(0.5);
        let f = precomputed_gradients(1.0, &[x], &[4.0]).unwrap();
        let y = f * 3.0;
        let g = gradient(y, &[x]).unwrap();
        assert_eq!(g.get(x), Some(12.0));
    }

    #[test]
    fn test_precomputed_length_mismatch() {
        let x = Var::new(0.5);
        assert!(matches!(
            precomputed_gradients(1.0, &[x], &[1.0, 2.0]),
            Err(AdError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn test_precomputed_rejects_stale_operand() {
        let stale = nested(|| Var::new(1.0));
        assert!(matches!(
            precomputed_gradients(1.0, &[stale], &[1.0]),
            Err(AdError::StaleVar { .. })
        ));
    }
}
