//! Elementary unary functions.
//!
//! Functions that are defined everywhere return `Var`; functions with a
//! restricted domain check their argument and return `Result`.

use super::{record_unary, try_record_unary};
use crate::domain::{check_nonnegative, check_positive};
use crate::error::AdError;
use crate::node::Op;
use crate::var::Var;

/// `ln(f64::EPSILON)`; below this `1 + e^u` rounds to 1.
const LOG_EPSILON: f64 = -36.043_653_389_117_15;

/// Numerically stable logistic sigmoid on plain floats.
///
/// # Example
///
/// ```
/// use adtape::inv_logit_f64;
///
/// assert_eq!(inv_logit_f64(0.0), 0.5);
/// assert!(inv_logit_f64(-800.0) >= 0.0);
/// ```
pub fn inv_logit_f64(u: f64) -> f64 {
    if u < 0.0 {
        let exp_u = u.exp();
        if u < LOG_EPSILON {
            return exp_u;
        }
        return exp_u / (1.0 + exp_u);
    }
    1.0 / (1.0 + (-u).exp())
}

impl Var {
    /// `e^self`. The node caches its own value, which is also the derivative.
    pub fn exp(self) -> Var {
        record_unary(self, |a, av| (av.exp(), Op::Exp(a)))
    }

    /// Natural logarithm. Fails unless the argument is positive.
    pub fn ln(self) -> Result<Var, AdError> {
        try_record_unary(self, |a, a_val| {
            check_positive("log", "x", a_val)?;
            Ok((a_val.ln(), Op::Log { a, a_val }))
        })
    }

    /// Square root. Fails for negative arguments.
    pub fn sqrt(self) -> Result<Var, AdError> {
        try_record_unary(self, |a, av| {
            check_nonnegative("sqrt", "x", av)?;
            Ok((av.sqrt(), Op::Sqrt(a)))
        })
    }

    /// Logistic sigmoid `1 / (1 + e^-self)`.
    pub fn inv_logit(self) -> Var {
        record_unary(self, |a, av| (inv_logit_f64(av), Op::InvLogit(a)))
    }

    pub fn sin(self) -> Var {
        record_unary(self, |a, a_val| (a_val.sin(), Op::Sin { a, a_val }))
    }

    pub fn cos(self) -> Var {
        record_unary(self, |a, a_val| (a_val.cos(), Op::Cos { a, a_val }))
    }

    pub fn square(self) -> Var {
        record_unary(self, |a, a_val| (a_val * a_val, Op::Square { a, a_val }))
    }

    /// `self^exponent` for a constant exponent.
    ///
    /// Fails for a negative base with a non-integer exponent.
    pub fn powf(self, exponent: f64) -> Result<Var, AdError> {
        try_record_unary(self, |a, a_val| {
            if a_val < 0.0 && exponent.fract() != 0.0 {
                return Err(AdError::domain(
                    "pow",
                    format!("base is {a_val}, but exponent {exponent} is not an integer"),
                ));
            }
            Ok((
                a_val.powf(exponent),
                Op::PowConst {
                    a,
                    a_val,
                    exponent,
                },
            ))
        })
    }
}

/// `e^x`, see [`Var::exp`].
pub fn exp(x: Var) -> Var {
    x.exp()
}

/// Natural logarithm, see [`Var::ln`].
pub fn log(x: Var) -> Result<Var, AdError> {
    x.ln()
}

/// Square root, see [`Var::sqrt`].
pub fn sqrt(x: Var) -> Result<Var, AdError> {
    x.sqrt()
}

/// Logistic sigmoid, see [`Var::inv_logit`].
pub fn inv_logit(x: Var) -> Var {
    x.inv_logit()
}

pub fn sin(x: Var) -> Var {
    x.sin()
}

pub fn cos(x: Var) -> Var {
    x.cos()
}

pub fn square(x: Var) -> Var {
    x.square()
}
