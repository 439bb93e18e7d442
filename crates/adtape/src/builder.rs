//! Chained construction of variable arrays from mixed inputs.

use crate::var::Var;

/// Conversion into a [`Var`], promoting plain numbers to constants.
pub trait IntoVar {
    fn into_var(self) -> Var;
}

impl IntoVar for Var {
    fn into_var(self) -> Var {
        self
    }
}

impl IntoVar for &Var {
    fn into_var(self) -> Var {
        *self
    }
}

impl IntoVar for f64 {
    fn into_var(self) -> Var {
        Var::constant(self)
    }
}

/// Builds a `Vec<Var>` with chained `add` calls, promoting `f64`s.
///
/// # Example
///
/// ```
/// use adtape::{Var, VarArrayBuilder};
///
/// let x = Var::new(2.0);
/// let xs = VarArrayBuilder::new().add(x).add(1.5).extend([3.0, 4.0]).build();
/// assert_eq!(xs.len(), 4);
/// assert_eq!(xs[1].value(), 1.5);
/// ```
#[derive(Debug, Default)]
pub struct VarArrayBuilder {
    items: Vec<Var>,
}

impl VarArrayBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one element.
    pub fn add(mut self, item: impl IntoVar) -> Self {
        self.items.push(item.into_var());
        self
    }

    /// Append every element of `items`.
    pub fn extend<I>(mut self, items: I) -> Self
    where
        I: IntoIterator,
        I::Item: IntoVar,
    {
        self.items.extend(items.into_iter().map(IntoVar::into_var));
        self
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Finish and return the array.
    pub fn build(self) -> Vec<Var> {
        self.items
    }
}
