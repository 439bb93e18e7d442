//! Chunked bump arena with bulk reset.
//!
//! Elements are appended into fixed-capacity chunks. A chunk is never grown
//! past its initial capacity, so an element never moves once stored and its
//! index stays valid until the arena is reset below it. There is no way to
//! free a single element: [`ChunkArena::reset`] drops everything allocated
//! after an [`ArenaMark`] in one step.
//!
//! ```text
//! chunks:  [0 .. cap) [cap .. 2cap) [2cap .. len)   spare: [ ] [ ]
//!                                         ▲
//!                                   bump position
//! ```

use std::mem;
use std::ops::{Index, Range};

use log::debug;

/// Position in a [`ChunkArena`] that it can later be reset to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct ArenaMark {
    len: usize,
}

impl ArenaMark {
    /// Number of elements that existed when the mark was taken.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the mark was taken on an empty arena.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// Usage counters for a [`ChunkArena`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ArenaStats {
    /// Elements currently stored.
    pub len: usize,
    /// Chunks holding live elements.
    pub chunks_in_use: usize,
    /// Emptied chunks kept for reuse.
    pub spare_chunks: usize,
    /// Highest `len` ever reached.
    pub peak_len: usize,
    /// Chunks obtained from the system allocator over the arena's lifetime.
    pub chunks_allocated: usize,
    /// Number of `reset` calls that discarded at least one element.
    pub resets: usize,
}

/// Append-only arena of `T` stored in fixed-size chunks.
#[derive(Debug)]
pub struct ChunkArena<T> {
    chunks: Vec<Vec<T>>,
    spare: Vec<Vec<T>>,
    chunk_capacity: usize,
    len: usize,
    peak_len: usize,
    chunks_allocated: usize,
    resets: usize,
}

impl<T> ChunkArena<T> {
    /// Create an empty arena. No memory is reserved until the first `alloc`.
    pub fn new(chunk_capacity: usize) -> Self {
        Self {
            chunks: Vec::new(),
            spare: Vec::new(),
            chunk_capacity: chunk_capacity.max(1),
            len: 0,
            peak_len: 0,
            chunks_allocated: 0,
            resets: 0,
        }
    }

    /// Store `value` and return its index.
    pub fn alloc(&mut self, value: T) -> usize {
        let full = self
            .chunks
            .last()
            .is_none_or(|chunk| chunk.len() == self.chunk_capacity);
        if full {
            self.grow();
        }
        let last = self.chunks.len() - 1;
        self.chunks[last].push(value);

        let index = self.len;
        self.len += 1;
        self.peak_len = self.peak_len.max(self.len);
        index
    }

    fn grow(&mut self) {
        let chunk = match self.spare.pop() {
            Some(chunk) => chunk,
            None => {
                self.chunks_allocated += 1;
                debug!(
                    "arena: allocating chunk #{} ({} slots of {} bytes)",
                    self.chunks_allocated,
                    self.chunk_capacity,
                    mem::size_of::<T>()
                );
                Vec::with_capacity(self.chunk_capacity)
            }
        };
        self.chunks.push(chunk);
    }

    /// Get the element at `index`.
    pub fn get(&self, index: usize) -> Option<&T> {
        if index >= self.len {
            return None;
        }
        self.chunks
            .get(index / self.chunk_capacity)
            .and_then(|chunk| chunk.get(index % self.chunk_capacity))
    }

    /// Current position, for a later [`reset`](Self::reset).
    pub fn mark(&self) -> ArenaMark {
        ArenaMark { len: self.len }
    }

    /// Drop every element allocated after `mark`.
    ///
    /// Chunks emptied by the reset are kept as spares and reused before new
    /// memory is requested. A mark at or beyond the current length is a no-op.
    pub fn reset(&mut self, mark: ArenaMark) {
        if mark.len >= self.len {
            return;
        }
        let keep_chunks = mark.len.div_ceil(self.chunk_capacity);
        while self.chunks.len() > keep_chunks {
            if let Some(mut chunk) = self.chunks.pop() {
                chunk.clear();
                self.spare.push(chunk);
            }
        }
        if let Some(last) = self.chunks.last_mut() {
            let in_last = mark.len - (keep_chunks - 1) * self.chunk_capacity;
            last.truncate(in_last);
        }
        self.len = mark.len;
        self.resets += 1;
    }

    /// Drop every element.
    pub fn clear(&mut self) {
        self.reset(ArenaMark { len: 0 });
    }

    /// Return spare chunks to the system allocator.
    pub fn release_spare(&mut self) {
        self.spare = Vec::new();
    }

    /// Number of stored elements.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the arena holds no elements.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Slots per chunk.
    pub fn chunk_capacity(&self) -> usize {
        self.chunk_capacity
    }

    /// Bytes held by live and spare chunks.
    pub fn reserved_bytes(&self) -> usize {
        (self.chunks.len() + self.spare.len()) * self.chunk_capacity * mem::size_of::<T>()
    }

    /// Snapshot of the usage counters.
    pub fn stats(&self) -> ArenaStats {
        ArenaStats {
            len: self.len,
            chunks_in_use: self.chunks.len(),
            spare_chunks: self.spare.len(),
            peak_len: self.peak_len,
            chunks_allocated: self.chunks_allocated,
            resets: self.resets,
        }
    }

    /// Iterate over `range` from its last index down to its first.
    ///
    /// Panics if the range extends past the end of the arena.
    pub fn iter_rev(&self, range: Range<usize>) -> impl Iterator<Item = &T> + '_ {
        assert!(range.end <= self.len, "range {range:?} out of arena bounds {}", self.len);
        range.rev().map(move |i| &self[i])
    }

    /// Iterate over `range` in allocation order.
    pub fn iter_range(&self, range: Range<usize>) -> impl Iterator<Item = &T> + '_ {
        assert!(range.end <= self.len, "range {range:?} out of arena bounds {}", self.len);
        range.map(move |i| &self[i])
    }
}

impl<T> Index<usize> for ChunkArena<T> {
    type Output = T;

    fn index(&self, index: usize) -> &T {
        match self.get(index) {
            Some(value) => value,
            None => panic!("arena index {index} out of bounds (len {})", self.len),
        }
    }
}
