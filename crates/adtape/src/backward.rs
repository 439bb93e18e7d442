//! Reverse pass: adjoint propagation in reverse creation order.
//!
//! Node ids are a topological order of the graph (operands are always created
//! before the nodes that use them), so walking ids from high to low visits a
//! node only after every node that reads it. The walk order is the whole
//! correctness argument; nothing here may reorder nodes.

use log::trace;

use crate::domain::check_same_len;
use crate::error::AdError;
use crate::gradients::Gradients;
use crate::node::NodeId;
use crate::tape::{Tape, with_tape};
use crate::var::Var;

/// Zero adjoints in `[lower, len)`, apply `seeds`, then run every backward
/// step from the highest seeded node down to `lower`.
///
/// Nodes created after the highest seed cannot reach it, so the walk starts
/// there rather than at the end of the tape. Nodes with a zero adjoint are
/// off every path to a seed and are skipped, so an infinite local partial on
/// an unrelated node never turns into `0 * inf`.
fn propagate(tape: &Tape, lower: usize, seeds: &[(NodeId, f64)]) {
    let nodes = tape.nodes();
    let len = nodes.len();
    for node in nodes.iter_range(lower..len) {
        node.zero_adjoint();
    }
    let Some(upper) = seeds.iter().map(|(id, _)| id.index() + 1).max() else {
        return;
    };
    for &(id, seed) in seeds {
        nodes[id.index()].accumulate(seed);
    }
    let lower = lower.min(upper);
    trace!("reverse pass over nodes {lower}..{upper}");
    for node in nodes.iter_rev(lower..upper) {
        if node.adjoint() != 0.0 {
            node.chain(nodes);
        }
    }
}

/// Adjoints of enclosing-context nodes a pass starting at `lower` will
/// overwrite.
fn save_outer_adjoints(tape: &Tape, lower: usize) -> Vec<f64> {
    let upper = tape.boundary().max(lower);
    tape.nodes()
        .iter_range(lower..upper)
        .map(|node| node.adjoint())
        .collect()
}

fn restore_outer_adjoints(tape: &Tape, lower: usize, saved: &[f64]) {
    let nodes = tape.nodes();
    for (node, &adjoint) in nodes.iter_range(lower..lower + saved.len()).zip(saved) {
        node.set_adjoint(adjoint);
    }
}

/// Lowest node index whose adjoint the pass must produce.
fn lower_bound(tape: &Tape, seeds: &[(NodeId, f64)], inputs: &[NodeId]) -> usize {
    inputs
        .iter()
        .chain(seeds.iter().map(|(id, _)| id))
        .map(NodeId::index)
        .fold(tape.boundary(), usize::min)
}

/// Run a reverse pass from `output` over the current context.
///
/// Afterwards every node in the context holds its adjoint, readable through
/// [`Var::adjoint`]. Adjoints from earlier passes are cleared first. If
/// `output` belongs to an enclosing context, the pass also overwrites the
/// adjoints of that context's nodes.
///
/// # Example
///
/// ```
/// use adtape::{Var, grad};
///
/// let x = Var::new(3.0);
/// let y = x * x;
/// grad(y).unwrap();
/// assert_eq!(x.adjoint(), 6.0);
/// ```
pub fn grad(output: Var) -> Result<(), AdError> {
    with_tape(|t| {
        let seeds = [(t.live(output)?, 1.0)];
        let lower = lower_bound(t, &seeds, &[]);
        propagate(t, lower, &seeds);
        Ok(())
    })
}

/// Gradient of a scalar `output` with respect to `inputs`.
///
/// Inputs may come from the current context or from any enclosing context
/// that is still open; the pass extends down to the oldest input. Adjoints
/// of enclosing-context nodes are restored afterwards, so values left by an
/// earlier [`grad`] in the outer context survive a nested gradient.
///
/// # Errors
///
/// [`AdError::StaleVar`] if the output or any input is stale.
///
/// # Example
///
/// ```
/// use adtape::{Var, gradient};
///
/// let x = Var::new(3.0);
/// let y = x.exp();
/// let g = gradient(y, &[x]).unwrap();
/// assert!((g.get(x).unwrap() - 3f64.exp()).abs() < 1e-12);
/// ```
pub fn gradient(output: Var, inputs: &[Var]) -> Result<Gradients, AdError> {
    vjp(&[output], &[1.0], inputs)
}

/// Vector-Jacobian product: seeds each output with the matching upstream
/// adjoint and returns the accumulated adjoints of `inputs`.
///
/// Like [`gradient`], leaves enclosing-context adjoints as it found them.
///
/// # Errors
///
/// [`AdError::ShapeMismatch`] if `outputs` and `seeds` differ in length,
/// [`AdError::StaleVar`] for stale handles.
pub fn vjp(outputs: &[Var], seeds: &[f64], inputs: &[Var]) -> Result<Gradients, AdError> {
    check_same_len(outputs.len(), seeds.len())?;
    with_tape(|t| {
        let seeded = outputs
            .iter()
            .zip(seeds)
            .map(|(out, &seed)| Ok((t.live(*out)?, seed)))
            .collect::<Result<Vec<_>, AdError>>()?;
        let input_ids = inputs
            .iter()
            .map(|input| t.live(*input))
            .collect::<Result<Vec<_>, AdError>>()?;

        let lower = lower_bound(t, &seeded, &input_ids);
        let saved = save_outer_adjoints(t, lower);
        propagate(t, lower, &seeded);

        let nodes = t.nodes();
        let mut grads = Gradients::new();
        for id in input_ids {
            grads.insert(id, nodes[id.index()].adjoint());
        }
        restore_outer_adjoints(t, lower, &saved);
        Ok(grads)
    })
}

/// Reset every adjoint in the current context to zero.
pub fn set_zero_all_adjoints() {
    with_tape(|t| {
        let nodes = t.nodes();
        for node in nodes.iter_range(t.boundary()..nodes.len()) {
            node.zero_adjoint();
        }
    })
}
