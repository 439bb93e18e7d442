//! Arithmetic operator overloads for `Var`.

use std::iter::{Product, Sum};
use std::ops::{Add, AddAssign, Div, DivAssign, Mul, MulAssign, Neg, Sub, SubAssign};

use super::{record_binary, record_unary, reduce};
use crate::node::Op;
use crate::var::Var;

impl Add for Var {
    type Output = Var;

    fn add(self, rhs: Var) -> Var {
        record_binary(self, rhs, |(a, av), (b, bv)| (av + bv, Op::Add(a, b)))
    }
}

impl Add<f64> for Var {
    type Output = Var;

    fn add(self, rhs: f64) -> Var {
        record_unary(self, |a, av| (av + rhs, Op::Shift(a)))
    }
}

impl Add<Var> for f64 {
    type Output = Var;

    fn add(self, rhs: Var) -> Var {
        rhs + self
    }
}

impl Sub for Var {
    type Output = Var;

    fn sub(self, rhs: Var) -> Var {
        record_binary(self, rhs, |(a, av), (b, bv)| (av - bv, Op::Sub(a, b)))
    }
}

impl Sub<f64> for Var {
    type Output = Var;

    fn sub(self, rhs: f64) -> Var {
        record_unary(self, |a, av| (av - rhs, Op::Shift(a)))
    }
}

impl Sub<Var> for f64 {
    type Output = Var;

    fn sub(self, rhs: Var) -> Var {
        record_unary(rhs, |a, av| (self - av, Op::Scale { a, factor: -1.0 }))
    }
}

impl Mul for Var {
    type Output = Var;

    fn mul(self, rhs: Var) -> Var {
        record_binary(self, rhs, |(a, a_val), (b, b_val)| {
            (
                a_val * b_val,
                Op::Mul {
                    a,
                    b,
                    a_val,
                    b_val,
                },
            )
        })
    }
}

impl Mul<f64> for Var {
    type Output = Var;

    fn mul(self, rhs: f64) -> Var {
        record_unary(self, |a, av| (av * rhs, Op::Scale { a, factor: rhs }))
    }
}

impl Mul<Var> for f64 {
    type Output = Var;

    fn mul(self, rhs: Var) -> Var {
        rhs * self
    }
}

impl Div for Var {
    type Output = Var;

    fn div(self, rhs: Var) -> Var {
        record_binary(self, rhs, |(a, a_val), (b, b_val)| {
            (a_val / b_val, Op::Div { a, b, b_val })
        })
    }
}

impl Div<f64> for Var {
    type Output = Var;

    fn div(self, rhs: f64) -> Var {
        record_unary(self, |a, av| {
            (
                av / rhs,
                Op::Scale {
                    a,
                    factor: 1.0 / rhs,
                },
            )
        })
    }
}

impl Div<Var> for f64 {
    type Output = Var;

    fn div(self, rhs: Var) -> Var {
        record_unary(rhs, |a, a_val| (self / a_val, Op::Recip { a, a_val }))
    }
}

impl Neg for Var {
    type Output = Var;

    fn neg(self) -> Var {
        record_unary(self, |a, av| (-av, Op::Neg(a)))
    }
}

macro_rules! impl_assign_op {
    ($trait:ident, $method:ident, $op:tt) => {
        impl $trait for Var {
            fn $method(&mut self, rhs: Var) {
                *self = *self $op rhs;
            }
        }

        impl $trait<f64> for Var {
            fn $method(&mut self, rhs: f64) {
                *self = *self $op rhs;
            }
        }
    };
}

impl_assign_op!(AddAssign, add_assign, +);
impl_assign_op!(SubAssign, sub_assign, -);
impl_assign_op!(MulAssign, mul_assign, *);
impl_assign_op!(DivAssign, div_assign, /);

/// Sums are recorded as a single n-ary node.
impl Sum for Var {
    fn sum<I: Iterator<Item = Var>>(iter: I) -> Var {
        let vars: Vec<Var> = iter.collect();
        reduce::sum(&vars)
    }
}

impl<'a> Sum<&'a Var> for Var {
    fn sum<I: Iterator<Item = &'a Var>>(iter: I) -> Var {
        iter.copied().sum()
    }
}

impl Product for Var {
    fn product<I: Iterator<Item = Var>>(iter: I) -> Var {
        iter.reduce(|acc, x| acc * x)
            .unwrap_or_else(|| Var::constant(1.0))
    }
}
