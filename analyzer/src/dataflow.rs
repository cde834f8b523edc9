// dataflow.rs: Generic forward dataflow fixpoint
//
// Runs a `ForwardAnalysis` over the labeled blocks of one function until no
// block's outgoing state changes, recording the incoming and outgoing state
// of every operation.
//
// Preconditions: `labeling` was computed from `func`.
// Postconditions: on success, every operation of a labeled block has an
//                 `OpState`, and each op's incoming state is the join of its
//                 true predecessors' outgoing states.
// Failure modes: more than `max_iterations` block visits yields
//                `FixpointError::IterationLimit`.
// Side effects: emits `tracing` events only.

use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;

use tracing::{debug, trace};

use crate::graph::{Function, Operation};
use crate::id::{BlockId, OpId};
use crate::label::Labeling;

/// A forward may-analysis over operations.
pub trait ForwardAnalysis {
    type State: Clone + Eq + fmt::Debug;

    /// State before anything reaches a point.
    fn bottom(&self) -> Self::State;

    /// State entering the first operation of the entry block.
    fn entry_state(&self) -> Self::State;

    fn join_into(&self, acc: &mut Self::State, other: &Self::State);

    fn transfer(&self, op: &Operation, incoming: &Self::State) -> Self::State;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpState<S> {
    pub incoming: S,
    pub outgoing: S,
}

#[derive(Debug, Clone)]
pub struct Fixpoint<S> {
    pub states: HashMap<OpId, OpState<S>>,
    pub block_in: HashMap<BlockId, S>,
    pub block_out: HashMap<BlockId, S>,
    /// Block visits performed.
    pub iterations: usize,
}

impl<S> Fixpoint<S> {
    pub fn state(&self, op: OpId) -> Option<&OpState<S>> {
        self.states.get(&op)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FixpointError {
    IterationLimit { iterations: usize },
}

impl fmt::Display for FixpointError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FixpointError::IterationLimit { iterations } => {
                write!(f, "no fixpoint after {iterations} block visits")
            }
        }
    }
}

impl std::error::Error for FixpointError {}

/// FIFO of blocks with membership dedup.
struct BlockWorklist {
    queue: VecDeque<BlockId>,
    queued: HashSet<BlockId>,
}

impl BlockWorklist {
    fn seeded(labeling: &Labeling) -> Self {
        let mut queue = VecDeque::with_capacity(labeling.len());
        let mut queued = HashSet::with_capacity(labeling.len());
        for &block in labeling.order() {
            queue.push_back(block);
            queued.insert(block);
        }
        BlockWorklist { queue, queued }
    }

    fn pop(&mut self) -> Option<BlockId> {
        let block = self.queue.pop_front()?;
        self.queued.remove(&block);
        Some(block)
    }

    fn push(&mut self, block: BlockId) {
        if self.queued.insert(block) {
            self.queue.push_back(block);
        }
    }
}

/// Labeled predecessors of each labeled block, deduplicated, in label order.
fn predecessors(func: &Function, labeling: &Labeling) -> HashMap<BlockId, Vec<BlockId>> {
    let mut preds: HashMap<BlockId, Vec<BlockId>> = labeling
        .order()
        .iter()
        .map(|&b| (b, Vec::new()))
        .collect();
    for &block in labeling.order() {
        for &succ in &func.block(block).succs {
            if let Some(list) = preds.get_mut(&succ) {
                if !list.contains(&block) {
                    list.push(block);
                }
            }
        }
    }
    preds
}

pub fn solve_forward<A: ForwardAnalysis>(
    func: &Function,
    labeling: &Labeling,
    analysis: &A,
    max_iterations: usize,
) -> Result<Fixpoint<A::State>, FixpointError> {
    let preds = predecessors(func, labeling);
    let entry = func.entry();

    let mut fix = Fixpoint {
        states: HashMap::with_capacity(func.op_count()),
        block_in: HashMap::with_capacity(labeling.len()),
        block_out: labeling
            .order()
            .iter()
            .map(|&b| (b, analysis.bottom()))
            .collect(),
        iterations: 0,
    };
    let mut worklist = BlockWorklist::seeded(labeling);

    while let Some(block) = worklist.pop() {
        fix.iterations += 1;
        if fix.iterations > max_iterations {
            debug!(function = %func.name, max_iterations, "fixpoint iteration limit exceeded");
            return Err(FixpointError::IterationLimit {
                iterations: max_iterations,
            });
        }

        let mut state = if Some(block) == entry {
            analysis.entry_state()
        } else {
            analysis.bottom()
        };
        for pred in preds.get(&block).map(Vec::as_slice).unwrap_or_default() {
            if let Some(out) = fix.block_out.get(pred) {
                analysis.join_into(&mut state, out);
            }
        }
        fix.block_in.insert(block, state.clone());

        for op in &func.block(block).ops {
            let outgoing = analysis.transfer(op, &state);
            fix.states.insert(
                op.id,
                OpState {
                    incoming: state,
                    outgoing: outgoing.clone(),
                },
            );
            state = outgoing;
        }

        let changed = fix.block_out.get(&block) != Some(&state);
        trace!(
            block = block.0,
            iteration = fix.iterations,
            changed,
            "visited block"
        );
        if changed {
            fix.block_out.insert(block, state);
            for &succ in &func.block(block).succs {
                if labeling.is_reachable(succ) {
                    worklist.push(succ);
                }
            }
        }
    }

    debug!(
        function = %func.name,
        iterations = fix.iterations,
        ops = fix.states.len(),
        "fixpoint reached"
    );
    Ok(fix)
}
