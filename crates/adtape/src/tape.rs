//! Per-thread tape: the node arena plus the stack of nested contexts.
//!
//! ```text
//! Var (Copy, !Send) ──id,stamp──►  Tape (thread_local)
//!                                   ├── ChunkArena<Node>
//!                                   ├── frames: [ArenaMark, ...]   (LIFO)
//!                                   └── generation
//! ```
//!
//! A handle is live while its node is still on the tape with the same
//! generation stamp. Leaving a context resets the arena and advances the
//! generation, so every handle created inside becomes detectably stale.

use std::cell::RefCell;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};

use log::{debug, warn};

use crate::arena::{ArenaMark, ArenaStats, ChunkArena};
use crate::config::TapeConfig;
use crate::error::AdError;
use crate::nested::Checkpoint;
use crate::node::{Node, NodeId, Op};
use crate::var::Var;

static NEXT_GENERATION: AtomicU64 = AtomicU64::new(1);
static NEXT_TAPE_ID: AtomicU64 = AtomicU64::new(1);

// Generations are unique process-wide so a handle smuggled onto another
// tape never matches a stamp there. 64 bits never wrap in practice.
fn next_generation() -> u64 {
    NEXT_GENERATION.fetch_add(1, Ordering::Relaxed)
}

#[derive(Debug)]
struct ContextFrame {
    mark: ArenaMark,
    // Checkpoint dropped while a deeper context was open; closed as soon as
    // it becomes innermost.
    abandoned: bool,
}

/// Usage snapshot of the current thread's tape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TapeStats {
    /// Nodes on the tape.
    pub len: usize,
    /// Open nested contexts.
    pub depth: usize,
    /// First node of the innermost context.
    pub boundary: usize,
    /// Bytes held by the arena, including spare chunks.
    pub reserved_bytes: usize,
    /// Arena counters.
    pub arena: ArenaStats,
}

/// Tape of nodes owned by one thread.
#[derive(Debug)]
pub(crate) struct Tape {
    id: u64,
    nodes: ChunkArena<Node>,
    frames: Vec<ContextFrame>,
    generation: u64,
    config: TapeConfig,
}

impl Tape {
    pub(crate) fn new(config: TapeConfig) -> Self {
        Self {
            id: NEXT_TAPE_ID.fetch_add(1, Ordering::Relaxed),
            nodes: ChunkArena::new(config.chunk_capacity),
            frames: Vec::new(),
            generation: next_generation(),
            config,
        }
    }

    /// Append a node and return a handle to it.
    pub(crate) fn push(&mut self, value: f64, op: Op) -> Var {
        let id = NodeId::from_index(self.nodes.len());
        debug_assert!(op.operands().iter().all(|operand| *operand < id));
        self.nodes.alloc(Node::new(value, op, self.generation));
        Var::from_parts(id, self.generation)
    }

    /// Resolve a handle to its node id, failing if it is stale.
    pub(crate) fn live(&self, var: Var) -> Result<NodeId, AdError> {
        self.node(var).map(|_| var.id())
    }

    /// Resolve a handle to its node, failing if it is stale.
    pub(crate) fn node(&self, var: Var) -> Result<&Node, AdError> {
        match self.nodes.get(var.id().index()) {
            Some(node) if node.stamp() == var.stamp() => Ok(node),
            _ => Err(AdError::StaleVar { id: var.id().raw() }),
        }
    }

    /// Resolve an operand for node construction. Panics on stale handles
    /// since operators cannot report errors.
    pub(crate) fn operand(&self, var: Var) -> (NodeId, f64) {
        match self.node(var) {
            Ok(node) => (var.id(), node.value()),
            Err(err) => panic!("{err}"),
        }
    }

    pub(crate) fn nodes(&self) -> &ChunkArena<Node> {
        &self.nodes
    }

    pub(crate) fn len(&self) -> usize {
        self.nodes.len()
    }

    pub(crate) fn depth(&self) -> usize {
        self.frames.len()
    }

    /// First index belonging to the innermost open context.
    pub(crate) fn boundary(&self) -> usize {
        self.frames.last().map_or(0, |frame| frame.mark.len())
    }

    pub(crate) fn config(&self) -> TapeConfig {
        self.config
    }

    pub(crate) fn stats(&self) -> TapeStats {
        TapeStats {
            len: self.nodes.len(),
            depth: self.frames.len(),
            boundary: self.boundary(),
            reserved_bytes: self.nodes.reserved_bytes(),
            arena: self.nodes.stats(),
        }
    }

    pub(crate) fn enter(&mut self) -> Checkpoint {
        let mark = self.nodes.mark();
        self.frames.push(ContextFrame {
            mark,
            abandoned: false,
        });
        debug!(
            "tape {}: entered context depth {} at node {}",
            self.id,
            self.frames.len(),
            mark.len()
        );
        Checkpoint {
            tape_id: self.id,
            depth: self.frames.len(),
            armed: true,
            _local: PhantomData,
        }
    }

    /// Close the innermost context. The checkpoint is only inspected, so a
    /// rejected one stays usable.
    pub(crate) fn leave(&mut self, checkpoint: &Checkpoint) -> Result<(), AdError> {
        if checkpoint.tape_id != self.id {
            return Err(AdError::ForeignContext);
        }
        let depth = self.frames.len();
        if depth == 0 {
            return Err(AdError::ContextOrder {
                expected: 0,
                actual: checkpoint.depth,
            });
        }
        if checkpoint.depth != depth {
            return Err(AdError::ContextOrder {
                expected: depth,
                actual: checkpoint.depth,
            });
        }
        self.pop_frame();
        self.close_abandoned();
        Ok(())
    }

    /// Mark the context of a checkpoint dropped without being left. It is
    /// closed now if innermost, otherwise once every deeper context closes.
    pub(crate) fn abandon(&mut self, checkpoint: &Checkpoint) {
        if checkpoint.tape_id != self.id {
            return;
        }
        let Some(frame) = checkpoint
            .depth
            .checked_sub(1)
            .and_then(|index| self.frames.get_mut(index))
        else {
            return;
        };
        frame.abandoned = true;
        warn!(
            "tape {}: checkpoint for context depth {} dropped without leave_context",
            self.id, checkpoint.depth
        );
        self.close_abandoned();
    }

    fn close_abandoned(&mut self) {
        while self.frames.last().is_some_and(|frame| frame.abandoned) {
            self.pop_frame();
        }
    }

    fn pop_frame(&mut self) {
        let depth = self.frames.len();
        if let Some(frame) = self.frames.pop() {
            let discarded = self.nodes.len() - frame.mark.len();
            self.nodes.reset(frame.mark);
            self.generation = next_generation();
            debug!(
                "tape {}: left context depth {depth}, discarded {discarded} nodes",
                self.id
            );
        }
    }

    /// Drop every node. Fails while nested contexts are open.
    pub(crate) fn clear(&mut self) -> Result<(), AdError> {
        if !self.frames.is_empty() {
            return Err(AdError::ContextsOpen {
                depth: self.frames.len(),
            });
        }
        self.nodes.clear();
        self.generation = next_generation();
        Ok(())
    }
}

thread_local! {
    static TAPE: RefCell<Tape> = RefCell::new(Tape::new(TapeConfig::from_env()));
}

/// Run `f` with exclusive access to this thread's tape.
///
/// Must not be re-entered from inside `f`.
pub(crate) fn with_tape<R>(f: impl FnOnce(&mut Tape) -> R) -> R {
    TAPE.with(|t| f(&mut t.borrow_mut()))
}

/// Like [`with_tape`], but returns `None` during thread teardown or when the
/// tape is already borrowed. Used from destructors.
pub(crate) fn try_with_tape<R>(f: impl FnOnce(&mut Tape) -> R) -> Option<R> {
    TAPE.try_with(|t| t.try_borrow_mut().ok().map(|mut tape| f(&mut tape)))
        .ok()
        .flatten()
}

/// Drop every node on this thread's tape.
///
/// Every existing handle becomes stale. Fails with
/// [`AdError::ContextsOpen`] while a nested context is open.
pub fn clear_tape() -> Result<(), AdError> {
    with_tape(|t| t.clear())
}

/// Replace this thread's tape with an empty one built from `config`.
///
/// Fails with [`AdError::ContextsOpen`] while a nested context is open.
///
/// # Example
///
/// ```
/// use adtape::{TapeConfig, configure_tape, tape_stats};
///
/// configure_tape(TapeConfig::default().with_chunk_capacity(64)).unwrap();
/// assert_eq!(tape_stats().len, 0);
/// ```
pub fn configure_tape(config: TapeConfig) -> Result<(), AdError> {
    with_tape(|t| {
        if t.depth() > 0 {
            return Err(AdError::ContextsOpen { depth: t.depth() });
        }
        debug!("tape {}: reconfigured with {config:?}", t.id);
        *t = Tape::new(config);
        Ok(())
    })
}

/// Configuration of this thread's tape.
pub fn tape_config() -> TapeConfig {
    with_tape(|t| t.config())
}

/// Number of nodes on this thread's tape.
pub fn tape_len() -> usize {
    with_tape(|t| t.len())
}

/// Number of open nested contexts on this thread.
pub fn context_depth() -> usize {
    with_tape(|t| t.depth())
}

/// Usage snapshot of this thread's tape.
pub fn tape_stats() -> TapeStats {
    with_tape(|t| t.stats())
}
