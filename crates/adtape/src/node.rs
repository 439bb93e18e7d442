//! Tape nodes and their backward steps.
//!
//! Every differentiable primitive is one variant of [`Op`]. A variant holds
//! the ids of its operands plus whatever forward values it needs to evaluate
//! the local partial derivatives when the reverse pass reaches it.

use std::cell::Cell;
use std::fmt;

use crate::arena::ChunkArena;
use crate::var::Var;

/// Position of a node on its thread's tape.
///
/// Ids are assigned in creation order, so an id is also the node's global
/// sequence number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u32);

impl NodeId {
    /// Get the internal index.
    pub fn index(&self) -> usize {
        self.0 as usize
    }

    pub(crate) fn from_index(index: usize) -> Self {
        match u32::try_from(index) {
            Ok(raw) => Self(raw),
            Err(_) => panic!("tape exhausted: node index {index} exceeds u32::MAX"),
        }
    }

    pub(crate) fn raw(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Backward step supplied as a closure, see [`make_callback_var`](crate::make_callback_var).
pub type CallbackFn = Box<dyn Fn(&ChainScope<'_>)>;

/// Wrapper giving callback closures a `Debug` impl.
pub struct Callback(pub(crate) CallbackFn);

impl fmt::Debug for Callback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Callback(..)")
    }
}

/// Operation that produced a node.
#[derive(Debug)]
pub(crate) enum Op {
    /// Independent variable or constant.
    Leaf,
    Add(NodeId, NodeId),
    Sub(NodeId, NodeId),
    Mul {
        a: NodeId,
        b: NodeId,
        a_val: f64,
        b_val: f64,
    },
    Div {
        a: NodeId,
        b: NodeId,
        b_val: f64,
    },
    Neg(NodeId),
    /// `a + c` or `a - c` for a constant `c`.
    Shift(NodeId),
    /// Linear in `a` with slope `factor`.
    Scale {
        a: NodeId,
        factor: f64,
    },
    /// `c / a` for a constant `c`.
    Recip {
        a: NodeId,
        a_val: f64,
    },
    Exp(NodeId),
    Log {
        a: NodeId,
        a_val: f64,
    },
    Sqrt(NodeId),
    InvLogit(NodeId),
    Sin {
        a: NodeId,
        a_val: f64,
    },
    Cos {
        a: NodeId,
        a_val: f64,
    },
    Square {
        a: NodeId,
        a_val: f64,
    },
    /// `a^p` for a constant exponent `p`.
    PowConst {
        a: NodeId,
        a_val: f64,
        exponent: f64,
    },
    Sum(Box<[NodeId]>),
    LogSumExp {
        operands: Box<[NodeId]>,
        values: Box<[f64]>,
    },
    Dot {
        a: Box<[NodeId]>,
        b: Box<[NodeId]>,
        a_vals: Box<[f64]>,
        b_vals: Box<[f64]>,
    },
    /// Partials computed ahead of time.
    Precomputed {
        operands: Box<[NodeId]>,
        partials: Box<[f64]>,
    },
    Callback(Callback),
}

impl Op {
    /// Operand ids referenced by this op. Callbacks report none since their
    /// captures are opaque.
    pub(crate) fn operands(&self) -> Vec<NodeId> {
        match self {
            Op::Leaf | Op::Callback(_) => Vec::new(),
            Op::Add(a, b) | Op::Sub(a, b) => vec![*a, *b],
            Op::Mul { a, b, .. } | Op::Div { a, b, .. } => vec![*a, *b],
            Op::Neg(a) | Op::Shift(a) | Op::Exp(a) | Op::Sqrt(a) | Op::InvLogit(a) => vec![*a],
            Op::Scale { a, .. }
            | Op::Recip { a, .. }
            | Op::Log { a, .. }
            | Op::Sin { a, .. }
            | Op::Cos { a, .. }
            | Op::Square { a, .. }
            | Op::PowConst { a, .. } => vec![*a],
            Op::Sum(ids) => ids.to_vec(),
            Op::LogSumExp { operands, .. } | Op::Precomputed { operands, .. } => operands.to_vec(),
            Op::Dot { a, b, .. } => a.iter().chain(b.iter()).copied().collect(),
        }
    }
}

/// A value on the tape together with its adjoint accumulator.
#[derive(Debug)]
pub struct Node {
    value: f64,
    adjoint: Cell<f64>,
    stamp: u64,
    op: Op,
}

impl Node {
    pub(crate) fn new(value: f64, op: Op, stamp: u64) -> Self {
        Self {
            value,
            adjoint: Cell::new(0.0),
            stamp,
            op,
        }
    }

    /// Forward value.
    pub fn value(&self) -> f64 {
        self.value
    }

    /// Accumulated adjoint.
    pub fn adjoint(&self) -> f64 {
        self.adjoint.get()
    }

    pub(crate) fn stamp(&self) -> u64 {
        self.stamp
    }

    pub(crate) fn accumulate(&self, delta: f64) {
        self.adjoint.set(self.adjoint.get() + delta);
    }

    pub(crate) fn zero_adjoint(&self) {
        self.adjoint.set(0.0);
    }

    pub(crate) fn set_adjoint(&self, adjoint: f64) {
        self.adjoint.set(adjoint);
    }

    /// Propagate this node's adjoint into its operands.
    ///
    /// Operands always have smaller ids than `self`, so calling this in
    /// reverse creation order sees every adjoint fully accumulated.
    pub(crate) fn chain(&self, nodes: &ChunkArena<Node>) {
        let g = self.adjoint.get();
        let v = self.value;
        let acc = |id: NodeId, delta: f64| nodes[id.index()].accumulate(delta);

        match &self.op {
            Op::Leaf => {}
            Op::Add(a, b) => {
                acc(*a, g);
                acc(*b, g);
            }
            Op::Sub(a, b) => {
                acc(*a, g);
                acc(*b, -g);
            }
            Op::Mul { a, b, a_val, b_val } => {
                acc(*a, g * b_val);
                acc(*b, g * a_val);
            }
            Op::Div { a, b, b_val } => {
                acc(*a, g / b_val);
                acc(*b, -g * v / b_val);
            }
            Op::Neg(a) => acc(*a, -g),
            Op::Shift(a) => acc(*a, g),
            Op::Scale { a, factor } => acc(*a, g * factor),
            Op::Recip { a, a_val } => acc(*a, -g * v / a_val),
            Op::Exp(a) => acc(*a, g * v),
            Op::Log { a, a_val } => acc(*a, g / a_val),
            Op::Sqrt(a) => acc(*a, g * 0.5 / v),
            Op::InvLogit(a) => acc(*a, g * v * (1.0 - v)),
            Op::Sin { a, a_val } => acc(*a, g * a_val.cos()),
            Op::Cos { a, a_val } => acc(*a, -g * a_val.sin()),
            Op::Square { a, a_val } => acc(*a, g * 2.0 * a_val),
            Op::PowConst { a, a_val, exponent } => {
                acc(*a, g * exponent * a_val.powf(exponent - 1.0));
            }
            Op::Sum(ids) => {
                for id in ids.iter() {
                    acc(*id, g);
                }
            }
            Op::LogSumExp { operands, values } => {
                // Undefined at ±inf; leave the operands untouched there.
                if v.is_finite() {
                    for (id, x) in operands.iter().zip(values.iter()) {
                        acc(*id, g * (x - v).exp());
                    }
                }
            }
            Op::Dot {
                a,
                b,
                a_vals,
                b_vals,
            } => {
                for i in 0..a.len() {
                    acc(a[i], g * b_vals[i]);
                    acc(b[i], g * a_vals[i]);
                }
            }
            Op::Precomputed { operands, partials } => {
                for (id, partial) in operands.iter().zip(partials.iter()) {
                    acc(*id, g * partial);
                }
            }
            Op::Callback(callback) => (callback.0)(&ChainScope { node: self, nodes }),
        }
    }
}

/// View handed to a callback node's backward closure.
///
/// The tape is borrowed while callbacks run, so a callback must not create
/// new variables or call other tape functions.
pub struct ChainScope<'a> {
    node: &'a Node,
    nodes: &'a ChunkArena<Node>,
}

impl ChainScope<'_> {
    /// Adjoint of the callback node itself.
    pub fn adjoint(&self) -> f64 {
        self.node.adjoint()
    }

    /// Forward value of the callback node.
    pub fn value(&self) -> f64 {
        self.node.value
    }

    /// Forward value of a captured operand.
    pub fn value_of(&self, var: Var) -> f64 {
        self.operand(var).value
    }

    /// Add `delta` to a captured operand's adjoint.
    pub fn accumulate(&self, var: Var, delta: f64) {
        self.operand(var).accumulate(delta);
    }

    fn operand(&self, var: Var) -> &Node {
        match self.nodes.get(var.id().index()) {
            Some(node) if node.stamp == var.stamp() => node,
            _ => panic!("callback captured stale variable {}", var.id()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn arena_with(values: &[f64]) -> ChunkArena<Node> {
        let mut arena = ChunkArena::new(8);
        for &v in values {
            arena.alloc(Node::new(v, Op::Leaf, 1));
        }
        arena
    }

    #[test]
    fn test_mul_chain() {
        let mut arena = arena_with(&[2.0, 5.0]);
        let (a, b) = (NodeId::from_index(0), NodeId::from_index(1));
        let idx = arena.alloc(Node::new(
            10.0,
            Op::Mul {
                a,
                b,
                a_val: 2.0,
                b_val: 5.0,
            },
            1,
        ));
        arena[idx].accumulate(1.0);
        arena[idx].chain(&arena);
        assert_eq!(arena[0].adjoint(), 5.0);
        assert_eq!(arena[1].adjoint(), 2.0);
    }

    #[test]
    fn test_exp_uses_cached_value() {
        let mut arena = arena_with(&[3.0]);
        let v = 3.0f64.exp();
        let idx = arena.alloc(Node::new(v, Op::Exp(NodeId::from_index(0)), 1));
        arena[idx].accumulate(2.0);
        arena[idx].chain(&arena);
        assert_eq!(arena[0].adjoint(), 2.0 * v);
    }

    #[test]
    fn test_chain_accumulates_across_uses() {
        let mut arena = arena_with(&[1.5]);
        let a = NodeId::from_index(0);
        let idx = arena.alloc(Node::new(3.0, Op::Add(a, a), 1));
        arena[idx].accumulate(1.0);
        arena[idx].chain(&arena);
        assert_eq!(arena[0].adjoint(), 2.0);
    }

    #[test]
    fn test_operands() {
        let a = NodeId::from_index(0);
        let b = NodeId::from_index(1);
        assert_eq!(Op::Sub(a, b).operands(), vec![a, b]);
        assert!(Op::Leaf.operands().is_empty());
        let dot = Op::Dot {
            a: vec![a].into(),
            b: vec![b].into(),
            a_vals: vec![1.0].into(),
            b_vals: vec![2.0].into(),
        };
        assert_eq!(dot.operands(), vec![a, b]);
    }

    #[test]
    fn test_node_id_display() {
        assert_eq!(NodeId::from_index(42).to_string(), "#42");
        assert_eq!(NodeId::from_index(42).index(), 42);
    }
}
