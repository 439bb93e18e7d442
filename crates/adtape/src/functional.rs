//! Differentiate whole functions inside their own nested context.
//!
//! These wrappers take plain `f64` inputs, build the computation in a fresh
//! context, run the reverse pass and hand back plain numbers, leaving the
//! caller's tape exactly as it was.

use crate::backward::gradient;
use crate::error::AdError;
use crate::nested::nested;
use crate::var::Var;

/// Value and gradient of a scalar function at `x`.
///
/// # Example
///
/// ```
/// use adtape::gradient_of;
///
/// // f(x, y) = x^2 * y
/// let (fx, grad) = gradient_of(|v| Ok(v[0] * v[0] * v[1]), &[3.0, 2.0]).unwrap();
/// assert_eq!(fx, 18.0);
/// assert_eq!(grad, vec![12.0, 9.0]);
/// ```
pub fn gradient_of<F>(f: F, x: &[f64]) -> Result<(f64, Vec<f64>), AdError>
where
    F: FnOnce(&[Var]) -> Result<Var, AdError>,
{
    nested(|| {
        let inputs: Vec<Var> = x.iter().map(|&v| Var::new(v)).collect();
        let output = f(&inputs)?;
        let grads = gradient(output, &inputs)?;
        Ok((output.try_value()?, grads.to_vec()))
    })
}

/// Values and Jacobian of a vector function at `x`.
///
/// Row `i` of the returned Jacobian holds the gradient of output `i`. The
/// forward computation runs once; each row is one reverse pass.
pub fn jacobian_of<F>(f: F, x: &[f64]) -> Result<(Vec<f64>, Vec<Vec<f64>>), AdError>
where
    F: FnOnce(&[Var]) -> Result<Vec<Var>, AdError>,
{
    nested(|| {
        let inputs: Vec<Var> = x.iter().map(|&v| Var::new(v)).collect();
        let outputs = f(&inputs)?;
        let mut values = Vec::with_capacity(outputs.len());
        let mut rows = Vec::with_capacity(outputs.len());
        for output in outputs {
            values.push(output.try_value()?);
            rows.push(gradient(output, &inputs)?.to_vec());
        }
        Ok((values, rows))
    })
}

/// Central finite-difference gradient of a plain function.
///
/// `grad_i ≈ (f(x + eps*e_i) - f(x - eps*e_i)) / (2*eps)`. Intended as a
/// numeric oracle for checking reverse-mode results.
pub fn finite_diff_gradient<F>(f: F, x: &[f64], eps: f64) -> Vec<f64>
where
    F: Fn(&[f64]) -> f64,
{
    let mut grad = vec![0.0; x.len()];
    let mut x_plus = x.to_vec();
    let mut x_minus = x.to_vec();

    for i in 0..x.len() {
        x_plus[i] = x[i] + eps;
        x_minus[i] = x[i] - eps;
        grad[i] = (f(&x_plus) - f(&x_minus)) / (2.0 * eps);
        x_plus[i] = x[i];
        x_minus[i] = x[i];
    }
    grad
}
