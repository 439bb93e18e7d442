//! Gradient result container.

use std::collections::HashMap;

use crate::node::NodeId;
use crate::var::Var;

/// Gradients of one output with respect to a list of inputs.
///
/// Keeps the order in which inputs were requested; an input requested twice
/// appears twice in [`to_vec`](Self::to_vec) with the same value.
/// Entries are plain numbers and stay valid after the inputs' context is left.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Gradients {
    grads: HashMap<NodeId, f64>,
    order: Vec<NodeId>,
}

impl Gradients {
    /// Create empty gradient container.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the gradient for `id`. A repeated id keeps its first value.
    pub(crate) fn insert(&mut self, id: NodeId, grad: f64) {
        self.grads.entry(id).or_insert(grad);
        self.order.push(id);
    }

    /// Gradient with respect to `var`, if it was requested.
    pub fn get(&self, var: Var) -> Option<f64> {
        self.get_id(var.id())
    }

    /// Gradient with respect to the node `id`, if it was requested.
    pub fn get_id(&self, id: NodeId) -> Option<f64> {
        self.grads.get(&id).copied()
    }

    /// Check if gradient exists for node.
    pub fn contains(&self, id: NodeId) -> bool {
        self.grads.contains_key(&id)
    }

    /// Gradients in request order.
    pub fn to_vec(&self) -> Vec<f64> {
        self.order.iter().map(|id| self.grads[id]).collect()
    }

    /// Iterate over `(input, gradient)` pairs in request order.
    pub fn iter(&self) -> impl Iterator<Item = (NodeId, f64)> + '_ {
        self.order.iter().map(|id| (*id, self.grads[id]))
    }

    /// Number of requested inputs, counting repeats.
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Check if no gradients stored.
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}
