//! adtape - tape-based reverse-mode automatic differentiation
//!
//! Every operation on a [`Var`] appends a node to a thread-local tape. A
//! reverse pass walks the tape from the newest node to the oldest and
//! accumulates adjoints, so creation order doubles as the topological order
//! of the graph.
//!
//! # Architecture
//!
//! ```text
//! Level 1: Handles and operators (var, ops)
//!     → Var arithmetic, exp/log/inv_logit/..., sum/dot/log_sum_exp
//!
//! Level 2: Reverse pass and composition (backward, nested, functional, parallel)
//!     → grad, gradient, vjp
//!     → enter_context / leave_context, NestedScope, nested
//!     → parallel_map (index-sequenced merge of per-worker results)
//!
//! Level 3: Storage (tape, node, arena)
//!     → thread-local Tape, tagged Op nodes, ChunkArena with bulk reset
//! ```
//!
//! # Example
//!
//! ```
//! use adtape::{Var, gradient};
//!
//! let x = Var::new(3.0);
//! let y = x.exp();
//! let g = gradient(y, &[x]).unwrap();
//! assert!((g.get(x).unwrap() - 20.085536923187668).abs() < 1e-12);
//!
//! let a = Var::new(2.0);
//! let b = Var::new(5.0);
//! let g = gradient(a * b, &[a, b]).unwrap();
//! assert_eq!(g.to_vec(), vec![5.0, 2.0]);
//! ```

pub mod arena;
pub mod backward;
pub mod builder;
pub mod config;
pub mod domain;
pub mod error;
pub mod functional;
pub mod gradients;
pub mod nested;
mod node;
pub mod ops;
#[cfg(feature = "parallel")]
pub mod parallel;
mod tape;
mod var;

pub use arena::{ArenaMark, ArenaStats, ChunkArena};
pub use backward::{grad, gradient, set_zero_all_adjoints, vjp};
pub use builder::{IntoVar, VarArrayBuilder};
pub use config::{ParallelConfig, TapeConfig};
pub use error::{AdError, ElementFailure};
pub use functional::{finite_diff_gradient, gradient_of, jacobian_of};
pub use gradients::Gradients;
pub use nested::{Checkpoint, LeaveError, NestedScope, enter_context, leave_context, nested};
pub use node::{CallbackFn, ChainScope, NodeId};
pub use ops::{
    cos, dot, exp, inv_logit, inv_logit_f64, log, log_sum_exp, log_sum_exp_f64,
    make_callback_var, precomputed_gradients, sin, sqrt, square, squared_norm, sum,
};
#[cfg(feature = "parallel")]
pub use parallel::{exp_all, inv_logit_all, parallel_map, parallel_map_with};
pub use tape::{
    TapeStats, clear_tape, configure_tape, context_depth, tape_config, tape_len, tape_stats,
};
pub use var::Var;
