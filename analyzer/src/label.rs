// label.rs: Reachability labeling of basic blocks
//
// Pops blocks from a FIFO worklist seeded with the entry, assigns each
// newly seen block the next sequential label, and enqueues its successors
// in declared order. The result depends only on the entry block and the
// successor order. Unreachable blocks get no label.

use std::collections::{HashMap, HashSet, VecDeque};

use crate::graph::Function;
use crate::id::{BlockId, BlockLabel};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Labeling {
    labels: HashMap<BlockId, BlockLabel>,
    /// Blocks in label order: `order[l]` carries label `l`.
    order: Vec<BlockId>,
}

impl Labeling {
    pub fn label_of(&self, block: BlockId) -> Option<BlockLabel> {
        self.labels.get(&block).copied()
    }

    pub fn block_at(&self, label: BlockLabel) -> Option<BlockId> {
        self.order.get(label.0 as usize).copied()
    }

    /// Labeled blocks, ascending by label.
    pub fn order(&self) -> &[BlockId] {
        &self.order
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn is_reachable(&self, block: BlockId) -> bool {
        self.labels.contains_key(&block)
    }
}

pub fn label_blocks(func: &Function) -> Labeling {
    let mut labeling = Labeling::default();
    let Some(entry) = func.entry() else {
        return labeling;
    };

    let mut work = VecDeque::from([entry]);
    let mut seen: HashSet<BlockId> = HashSet::new();

    while let Some(block) = work.pop_front() {
        if !seen.insert(block) {
            continue;
        }
        let label = BlockLabel(labeling.order.len() as u32);
        labeling.labels.insert(block, label);
        labeling.order.push(block);
        work.extend(func.block(block).succs.iter().copied());
    }

    tracing::debug!(
        function = %func.name,
        labeled = labeling.len(),
        blocks = func.blocks.len(),
        "labeled blocks"
    );
    labeling
}
