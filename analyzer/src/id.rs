// id.rs: Stable identifiers for program graph entities
//
// `BlockId` and `OpId` are allocated in construction order by the graph
// builder and never change afterwards. `BlockLabel` is the separate,
// traversal-derived id assigned by `label::label_blocks`.

use std::fmt;

use serde::Serialize;

/// Construction-order identifier of a basic block within its function.
/// Doubles as the index into `Function::blocks`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockId(pub u32);

/// Function-wide identifier of an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct OpId(pub u32);

/// Reachability label of a basic block: first-discovery order from the entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct BlockLabel(pub u32);

impl BlockId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for BlockLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Allocator for stable IDs. Produces monotonically increasing IDs in
/// allocation order, ensuring deterministic assignment.
#[derive(Debug, Default)]
pub struct IdAllocator {
    next_block: u32,
    next_op: u32,
}

impl IdAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn alloc_block(&mut self) -> BlockId {
        let id = BlockId(self.next_block);
        self.next_block += 1;
        id
    }

    pub fn alloc_op(&mut self) -> OpId {
        let id = OpId(self.next_op);
        self.next_op += 1;
        id
    }
}
