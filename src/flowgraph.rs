//! A control flow graph over MIR blocks, represented as parallel mappings
//! of block ids to their predecessors and successors.
//!
//! Edges come from two places: explicit branch targets, and the implicit
//! fall-through from a block that ends without a return or unconditional
//! branch to the block labeled `id + 1`. Adjacency lists are sets over
//! multi-edges — a conditional and an unconditional branch to the same
//! label contribute one edge — and the two directions are kept in lockstep.
//! Blocks are resolved through the function's block map on demand; the
//! graph itself stores ids only.

use crate::isa::TargetInstrAdapter;
use crate::mir::{BlockId, Function};
use log::trace;

/// The control flow graph of one function.
pub struct ControlFlowGraph {
    succ: Vec<Vec<BlockId>>,
    pred: Vec<Vec<BlockId>>,
    present: Vec<bool>,
    /// The entry block, when the function has a block 0.
    pub entry: Option<BlockId>,
    /// The first block whose terminator is a return.
    pub ret_block: Option<BlockId>,
    /// The largest registered block id.
    pub max_label: u32,
}

impl ControlFlowGraph {
    /// Allocate a new blank control flow graph.
    pub fn new() -> Self {
        Self {
            succ: Vec::new(),
            pred: Vec::new(),
            present: Vec::new(),
            entry: None,
            ret_block: None,
            max_label: 0,
        }
    }

    /// Allocate and compute the control flow graph of `func`.
    pub fn with_function(func: &Function, adapter: &dyn TargetInstrAdapter) -> Self {
        let mut cfg = Self::new();
        cfg.compute(func, adapter);
        cfg
    }

    /// Compute the control flow graph of `func`, overwriting any previous
    /// contents.
    pub fn compute(&mut self, func: &Function, adapter: &dyn TargetInstrAdapter) {
        *self = Self::new();

        for &id in func.blocks.keys() {
            self.add_block(id);
        }
        if func.blocks.contains_key(&BlockId(0)) {
            self.entry = Some(BlockId(0));
        }

        for (&id, block) in &func.blocks {
            // Scan to the first return or unconditional branch; conditional
            // branches along the way contribute edges, and a block that
            // never terminates falls through to `id + 1`.
            let mut terminated = false;
            for inst in &block.insts {
                if adapter.is_return(inst) {
                    terminated = true;
                    break;
                }
                let uncond = adapter.is_uncond_branch(inst);
                if uncond || adapter.is_cond_branch(inst) {
                    if let Some(target) = adapter.branch_target(inst) {
                        if func.blocks.contains_key(&target) {
                            self.add_edge(id, target);
                        }
                    }
                    if uncond {
                        terminated = true;
                        break;
                    }
                }
            }
            if !terminated && func.blocks.contains_key(&id.next()) {
                self.add_edge(id, id.next());
            }
        }

        self.ret_block = func
            .blocks
            .iter()
            .find(|(_, block)| {
                block.insts.last().is_some_and(|inst| adapter.is_return(inst))
            })
            .map(|(&id, _)| id);

        trace!(
            "cfg for {}: {} blocks, ret {:?}",
            func.name,
            func.blocks.len(),
            self.ret_block
        );
    }

    /// Register a block id.
    pub fn add_block(&mut self, id: BlockId) {
        self.grow(id);
        self.present[id.index()] = true;
        if id.0 > self.max_label {
            self.max_label = id.0;
        }
    }

    fn grow(&mut self, id: BlockId) {
        if self.succ.len() <= id.index() {
            self.succ.resize_with(id.index() + 1, Vec::new);
            self.pred.resize_with(id.index() + 1, Vec::new);
            self.present.resize(id.index() + 1, false);
        }
    }

    /// Add the edge `from → to`. Both blocks must be registered; duplicate
    /// edges are ignored.
    pub fn add_edge(&mut self, from: BlockId, to: BlockId) {
        self.grow(BlockId(from.0.max(to.0)));
        if !self.present[from.index()] || !self.present[to.index()] {
            return;
        }
        if self.succ[from.index()].contains(&to) {
            return;
        }
        self.succ[from.index()].push(to);
        self.pred[to.index()].push(from);
    }

    /// Remove the edge `from → to` from both directions.
    pub fn remove_edge(&mut self, from: BlockId, to: BlockId) {
        if from.index() >= self.succ.len() || to.index() >= self.pred.len() {
            return;
        }
        if let Some(pos) = self.succ[from.index()].iter().position(|&b| b == to) {
            self.succ[from.index()].remove(pos);
        }
        if let Some(pos) = self.pred[to.index()].iter().position(|&b| b == from) {
            self.pred[to.index()].remove(pos);
        }
    }

    /// The successors of `id`, in insertion order.
    pub fn succs(&self, id: BlockId) -> &[BlockId] {
        self.succ.get(id.index()).map_or(&[], Vec::as_slice)
    }

    /// The predecessors of `id`, in insertion order.
    pub fn preds(&self, id: BlockId) -> &[BlockId] {
        self.pred.get(id.index()).map_or(&[], Vec::as_slice)
    }

    /// An edge is critical iff its source has multiple successors and its
    /// destination has multiple predecessors.
    pub fn is_critical_edge(&self, from: BlockId, to: BlockId) -> bool {
        self.succs(from).len() > 1 && self.preds(to).len() > 1
    }

    /// Reverse post-order over the graph, starting at the entry block.
    /// Successors are visited in ascending id order, so the result is
    /// deterministic; unreachable blocks are appended in ascending order.
    pub fn reverse_post_order(&self) -> Vec<BlockId> {
        let mut post = Vec::new();
        let mut visited = vec![false; self.succ.len()];
        if let Some(entry) = self.entry {
            self.post_order(entry, &mut visited, &mut post);
        }
        post.reverse();
        for (index, &present) in self.present.iter().enumerate() {
            if present && !visited[index] {
                post.push(BlockId(index as u32));
            }
        }
        post
    }

    fn post_order(&self, block: BlockId, visited: &mut Vec<bool>, out: &mut Vec<BlockId>) {
        if visited[block.index()] {
            return;
        }
        visited[block.index()] = true;
        let mut succs = self.succs(block).to_vec();
        succs.sort_unstable();
        for succ in succs {
            self.post_order(succ, visited, out);
        }
        out.push(block);
    }
}

impl Default for ControlFlowGraph {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::isa::aarch64::AArch64Target;
    use crate::isa::TargetIsa;
    use crate::mir::{BlockId, Function};
    use crate::test_util::{b, bcond, ret};

    fn target() -> AArch64Target {
        AArch64Target::new()
    }

    #[test]
    fn edges_are_bidirectional_and_deduped() {
        let mut cfg = ControlFlowGraph::new();
        cfg.add_block(BlockId(0));
        cfg.add_block(BlockId(1));
        cfg.add_edge(BlockId(0), BlockId(1));
        cfg.add_edge(BlockId(0), BlockId(1));
        assert_eq!(cfg.succs(BlockId(0)), [BlockId(1)]);
        assert_eq!(cfg.preds(BlockId(1)), [BlockId(0)]);

        cfg.remove_edge(BlockId(0), BlockId(1));
        assert!(cfg.succs(BlockId(0)).is_empty());
        assert!(cfg.preds(BlockId(1)).is_empty());
    }

    #[test]
    fn edges_to_unknown_blocks_are_ignored() {
        let mut cfg = ControlFlowGraph::new();
        cfg.add_block(BlockId(0));
        cfg.add_edge(BlockId(0), BlockId(9));
        assert!(cfg.succs(BlockId(0)).is_empty());
    }

    #[test]
    fn conditional_branch_gains_fallthrough() {
        // Scenario: a conditional branch to 7 in a function where id + 1
        // exists yields successors {7, id + 1}.
        let target = target();
        let mut func = Function::new("f");
        func.ensure_block(BlockId(0));
        func.push_inst(BlockId(0), bcond(7));
        func.ensure_block(BlockId(1));
        func.push_inst(BlockId(1), ret());
        func.ensure_block(BlockId(7));
        func.push_inst(BlockId(7), ret());

        let cfg = ControlFlowGraph::with_function(&func, target.adapter());
        assert_eq!(cfg.succs(BlockId(0)), [BlockId(7), BlockId(1)]);
        assert_eq!(cfg.preds(BlockId(7)), [BlockId(0)]);
        assert_eq!(cfg.preds(BlockId(1)), [BlockId(0)]);
    }

    #[test]
    fn scan_stops_at_unconditional_branch() {
        let target = target();
        let mut func = Function::new("f");
        func.ensure_block(BlockId(0));
        func.push_inst(BlockId(0), b(2));
        // Unreachable garbage after the terminator must not add edges.
        func.push_inst(BlockId(0), b(1));
        func.ensure_block(BlockId(1));
        func.push_inst(BlockId(1), ret());
        func.ensure_block(BlockId(2));
        func.push_inst(BlockId(2), ret());

        let cfg = ControlFlowGraph::with_function(&func, target.adapter());
        assert_eq!(cfg.succs(BlockId(0)), [BlockId(2)]);
        assert!(cfg.preds(BlockId(1)).is_empty());
    }

    #[test]
    fn ret_block_is_first_returning_block() {
        let target = target();
        let mut func = Function::new("f");
        func.ensure_block(BlockId(0));
        func.push_inst(BlockId(0), b(1));
        func.ensure_block(BlockId(1));
        func.push_inst(BlockId(1), ret());
        let cfg = ControlFlowGraph::with_function(&func, target.adapter());
        assert_eq!(cfg.entry, Some(BlockId(0)));
        assert_eq!(cfg.ret_block, Some(BlockId(1)));
    }

    #[test]
    fn critical_edge_detection() {
        let mut cfg = ControlFlowGraph::new();
        for id in 0..4 {
            cfg.add_block(BlockId(id));
        }
        // 0 → {1, 2}, 1 → 2: the edge 0 → 2 is critical.
        cfg.add_edge(BlockId(0), BlockId(1));
        cfg.add_edge(BlockId(0), BlockId(2));
        cfg.add_edge(BlockId(1), BlockId(2));
        assert!(cfg.is_critical_edge(BlockId(0), BlockId(2)));
        assert!(!cfg.is_critical_edge(BlockId(0), BlockId(1)));
    }

    #[test]
    fn rpo_visits_entry_first() {
        let target = target();
        let mut func = Function::new("f");
        func.ensure_block(BlockId(0));
        func.push_inst(BlockId(0), bcond(2));
        func.ensure_block(BlockId(1));
        func.push_inst(BlockId(1), b(3));
        func.ensure_block(BlockId(2));
        func.push_inst(BlockId(2), b(3));
        func.ensure_block(BlockId(3));
        func.push_inst(BlockId(3), ret());
        let cfg = ControlFlowGraph::with_function(&func, target.adapter());
        let rpo = cfg.reverse_post_order();
        assert_eq!(rpo[0], BlockId(0));
        assert_eq!(*rpo.last().unwrap(), BlockId(3));
        assert_eq!(rpo.len(), 4);
    }
}
