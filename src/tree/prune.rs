use super::node::{ChildRange, NodeId};
use super::pool::NodePool;
use super::Tree;
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use tracing::{debug, warn};

/// Summary of a pruning pass.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PruneReport {
    /// Nodes in the tree afterwards.
    pub kept: usize,
    /// Expanded nodes whose children were dropped.
    pub cut: usize,
}

/// Which child blocks survive a prune.
struct RetentionPlan {
    /// Nodes whose children are kept, parents before children.
    kept: Vec<NodeId>,
    /// Expanded nodes whose children are dropped.
    cut: Vec<NodeId>,
    nodes: usize,
    /// A dropped node was visited more often than a kept one.
    inverted: bool,
}

impl Tree {
    /// Reduces the tree to at most `budget` nodes.
    ///
    /// Child blocks are kept best-first: the expanded node with the most
    /// playouts claims its children first, ties go to the earlier sibling.
    /// Nodes with fewer than `min_playouts` playouts lose their children.
    /// A block that does not fit is dropped whole; smaller blocks of less
    /// visited nodes may still fit afterwards, in which case the tree is
    /// marked untrustworthy.
    pub fn prune(&mut self, budget: usize, min_playouts: u32) -> PruneReport {
        let plan = self.plan_retention(budget.max(1), min_playouts);
        if plan.inverted {
            warn!("pruning dropped a branch more visited than one it kept");
            self.untrustworthy = true;
        }
        let report = PruneReport {
            kept: plan.nodes,
            cut: plan.cut.len(),
        };

        if self.limits.fast_alloc {
            self.compact(&plan);
        } else {
            for &id in &plan.cut {
                if let (Some(block), Some(reaper)) =
                    (self.node(id).detach_children(), self.reaper.as_ref())
                {
                    reaper.reclaim(block);
                }
            }
        }
        debug!(kept = report.kept, cut = report.cut, budget, "pruned tree");
        report
    }

    fn plan_retention(&self, budget: usize, min_playouts: u32) -> RetentionPlan {
        let mut plan = RetentionPlan {
            kept: Vec::new(),
            cut: Vec::new(),
            nodes: 1,
            inverted: false,
        };
        let mut min_kept = u32::MAX;
        let mut max_cut = 0;

        let mut seq = 0u64;
        let mut heap = BinaryHeap::new();
        heap.push((self.root_node().u.playouts(), Reverse(seq), self.root));
        while let Some((playouts, _, id)) = heap.pop() {
            let Some(children) = self.children(id) else {
                continue;
            };
            let fits = plan.nodes + children.len() <= budget;
            if !fits || (playouts < min_playouts && id != self.root) {
                // Collapsing for low visits is not an inversion.
                if !fits {
                    max_cut = max_cut.max(playouts);
                }
                plan.cut.push(id);
                continue;
            }
            if id != self.root {
                min_kept = min_kept.min(playouts);
            }
            plan.nodes += children.len();
            plan.kept.push(id);
            for child in children.iter() {
                if self.node(child).children().is_some() {
                    seq += 1;
                    heap.push((self.node(child).u.playouts(), Reverse(seq), child));
                }
            }
        }
        plan.inverted = max_cut > min_kept && min_kept != u32::MAX;
        plan
    }

    /// Copies the retained part of the arena into a scratch arena, then back
    /// to the start of the main one.
    fn compact(&mut self, plan: &RetentionPlan) {
        let scratch = NodePool::new(plan.nodes, false);
        let mut moved: HashMap<NodeId, NodeId> = HashMap::with_capacity(plan.kept.len() + 1);

        let Some(root_block) = scratch.alloc(1) else {
            return;
        };
        let new_root = root_block.first();
        scratch.get(new_root).init(None, self.root_node().coord(), 0);
        scratch.get(new_root).copy_payload(self.root_node());
        moved.insert(self.root, new_root);

        for &old in &plan.kept {
            let (Some(&new_parent), Some(children)) = (moved.get(&old), self.children(old)) else {
                continue;
            };
            let Some(block) = scratch.alloc(children.len() as u32) else {
                // Sized from the plan, so this is unreachable in practice.
                warn!("scratch arena exhausted during compaction");
                break;
            };
            for (src, dst) in children.iter().zip(block.iter()) {
                let src_node = self.node(src);
                let dst_node = scratch.get(dst);
                dst_node.init(Some(new_parent), src_node.coord(), 0);
                dst_node.copy_payload(src_node);
                moved.insert(src, dst);
            }
            let parent = scratch.get(new_parent);
            parent.try_begin_expansion();
            parent.publish_children(block);
        }

        let len = scratch.high_water();
        self.pool.clear();
        for i in 0..len as u32 {
            let (src, dst) = (scratch.get(NodeId(i)), self.pool.get(NodeId(i)));
            dst.init(src.parent(), src.coord(), 0);
            dst.copy_payload(src);
            if let Some(children) = src.children() {
                dst.try_begin_expansion();
                dst.publish_children(ChildRange {
                    first: children.first,
                    len: children.len,
                });
            }
        }
        self.pool.truncate(len);
        self.root = new_root;
    }
}

#[cfg(test)]
mod tests {
    use crate::board::{Board, Coord, Move, Stone};
    use crate::games::stones::StonesBoard;
    use crate::prior::EvenPrior;
    use crate::tree::{Tree, TreeLimits};

    /// Root with children on a 2x2 board; A1 gets `v1` playouts, B2 gets
    /// `v2`, and both are expanded.
    fn two_branches(fast_alloc: bool, v1: u32, v2: u32) -> (Tree, Coord, Coord) {
        let board = StonesBoard::new(2, 0.5);
        let tree = Tree::new(Stone::White, TreeLimits::with_nodes(1_000, fast_alloc), 1.0).unwrap();
        tree.expand(tree.root(), &board, Stone::Black, &EvenPrior::default());
        let a = board.parse_vertex("A1").unwrap();
        let b = board.parse_vertex("B2").unwrap();
        for (coord, visits) in [(a, v1), (b, v2)] {
            let id = tree.find_child(tree.root(), coord).unwrap();
            tree.node(id).u.add_result(0.5, visits);
            let mut b2 = board.clone();
            b2.play(Move::new(coord, Stone::Black)).unwrap();
            tree.expand(id, &b2, Stone::White, &EvenPrior::default());
        }
        tree.root_node().u.add_result(0.5, v1 + v2);
        (tree, a, b)
    }

    fn retains_more_visited_branch(fast_alloc: bool) {
        let (mut tree, a, b) = two_branches(fast_alloc, 100, 10);
        // Root + 5 root children + one block of 4 grandchildren.
        let report = tree.prune(10, 0);
        assert_eq!(report.kept, 10);
        assert_eq!(report.cut, 1);
        let a_id = tree.find_child(tree.root(), a).unwrap();
        let b_id = tree.find_child(tree.root(), b).unwrap();
        assert!(tree.children(a_id).is_some(), "V1 subtree must be retained");
        assert!(tree.children(b_id).is_none(), "V2 subtree must be dropped");
        assert_eq!(tree.node(a_id).u.playouts(), 100);
        assert!(!tree.is_untrustworthy());
    }

    #[test]
    fn test_prune_retains_more_visited_branch_arena() {
        retains_more_visited_branch(true);
    }

    #[test]
    fn test_prune_retains_more_visited_branch_recycling() {
        retains_more_visited_branch(false);
    }

    #[test]
    fn test_prune_order_does_not_depend_on_sibling_position() {
        // B2 comes after A1 among the children; give it the higher count.
        let (mut tree, a, b) = two_branches(true, 10, 100);
        tree.prune(10, 0);
        assert!(tree.children(tree.find_child(tree.root(), b).unwrap()).is_some());
        assert!(tree.children(tree.find_child(tree.root(), a).unwrap()).is_none());
    }

    #[test]
    fn test_compaction_preserves_stats_and_links() {
        let (mut tree, a, _) = two_branches(true, 100, 10);
        let before = tree.nodes();
        let report = tree.prune(1_000, 0);
        assert_eq!(report.kept, before);
        assert_eq!(tree.nodes(), before);
        let a_id = tree.find_child(tree.root(), a).unwrap();
        for child in tree.children(a_id).unwrap().iter() {
            assert_eq!(tree.node(child).parent(), Some(a_id));
        }
        assert_eq!(tree.root_node().u.playouts(), 110);
    }

    #[test]
    fn test_low_visit_nodes_are_collapsed() {
        let (mut tree, a, b) = two_branches(false, 100, 10);
        let report = tree.prune(1_000, 50);
        assert_eq!(report.cut, 1);
        assert!(tree.children(tree.find_child(tree.root(), a).unwrap()).is_some());
        assert!(tree.children(tree.find_child(tree.root(), b).unwrap()).is_none());
        assert!(!tree.is_untrustworthy(), "collapsing by threshold is not an inversion");
    }

    #[test]
    fn test_inversion_marks_tree_untrustworthy() {
        let board = StonesBoard::new(2, 0.5);
        let mut tree = Tree::new(Stone::White, TreeLimits::with_nodes(1_000, true), 1.0).unwrap();
        let prior = EvenPrior::default();
        tree.expand(tree.root(), &board, Stone::Black, &prior);
        let a = board.parse_vertex("A1").unwrap();
        let b = board.parse_vertex("B2").unwrap();
        let a_id = tree.find_child(tree.root(), a).unwrap();
        let b_id = tree.find_child(tree.root(), b).unwrap();
        tree.node(a_id).u.add_result(0.5, 100);
        tree.node(b_id).u.add_result(0.5, 10);

        let mut after_a = board.clone();
        after_a.play(Move::new(a, Stone::Black)).unwrap();
        tree.expand(a_id, &after_a, Stone::White, &prior);
        // A crowded position leaves only pass and A2 below B2.
        let mut crowded = board.clone();
        crowded.play_sequence(&["B2", "A1", "B1"]).unwrap();
        tree.expand(b_id, &crowded, Stone::White, &prior);
        assert_eq!(tree.children(a_id).unwrap().len(), 4);
        assert_eq!(tree.children(b_id).unwrap().len(), 2);

        // Root and its 5 children leave room for 2 more: A1's block does
        // not fit, B2's does.
        let report = tree.prune(8, 0);
        assert_eq!(report.cut, 1);
        assert!(tree.children(tree.find_child(tree.root(), b).unwrap()).is_some());
        assert!(tree.is_untrustworthy(), "A1 (100) dropped while B2 (10) kept");
    }
}
