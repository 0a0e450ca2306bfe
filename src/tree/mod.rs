//! # Search tree
//!
//! Nodes live in a [`NodePool`] and refer to each other by [`NodeId`]. The
//! children of a node form one contiguous block, so siblings are implicit
//! and a child set is published with a single atomic store.
//!
//! Two allocation strategies are supported:
//!
//! - **fast_alloc** (arena): blocks are carved sequentially and never freed
//!   individually. After a move, if the arena is fuller than the pruning
//!   threshold, the subtree of the played move is copied best-first into a
//!   temporary arena capped at `max_pruned_size`, then copied back.
//! - **recycling**: discarded subtrees are handed to a background reaper
//!   thread which returns their blocks to a free list, so a move is never
//!   delayed by freeing a large tree.
//!
//! Everything that restructures the tree (`promote`, `prune`) takes
//! `&mut self` and therefore cannot overlap with workers holding `&Tree`.

pub mod book;
mod node;
mod pool;
mod prune;

pub use node::{ChildRange, Node, NodeId};
pub use prune::PruneReport;

use crate::board::{Board, Coord, Stone};
use crate::error::{Result, UctError};
use crate::prior::{Prior, PriorMap};
use crate::stats::{AtomicF32, AtomicStats, MoveStats};
use pool::{NodePool, Reaper};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, trace};

/// Bytes accounted per node.
pub const NODE_SIZE: usize = std::mem::size_of::<Node>();

/// Memory limits of a tree, in bytes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TreeLimits {
    /// Maximum size of the live tree.
    pub max_tree_size: usize,
    /// Arena fill level that triggers compaction after a move.
    pub pruning_threshold: usize,
    /// Size of the temporary arena used by compaction and garbage collection.
    pub max_pruned_size: usize,
    pub fast_alloc: bool,
}

impl TreeLimits {
    /// Limits for a node budget, mostly for tests and tools.
    pub fn with_nodes(max_nodes: usize, fast_alloc: bool) -> Self {
        TreeLimits {
            max_tree_size: max_nodes * NODE_SIZE,
            pruning_threshold: max_nodes * NODE_SIZE / 2,
            max_pruned_size: max_nodes * NODE_SIZE / 5,
            fast_alloc,
        }
    }
}

/// Outcome of an expansion attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Expansion {
    /// This call allocated and published the children.
    Expanded,
    /// Another thread expanded or is expanding the node.
    Busy,
    /// No memory left for the child block; the node stays a leaf.
    Full,
}

pub struct Tree {
    pool: Arc<NodePool>,
    reaper: Option<Reaper>,
    root: NodeId,
    root_color: Stone,
    limits: TreeLimits,
    aging: f32,
    full: AtomicBool,
    untrustworthy: bool,
    /// Whether simulations are scored with `extra_komi`.
    pub use_extra_komi: bool,
    extra_komi: AtomicF32,
    /// Playout scores of the current search episode, Black's perspective.
    pub avg_score: AtomicStats,
}

impl Tree {
    /// Creates a tree with a single unexpanded root. `root_color` is the
    /// color of the player who made the root move, i.e. the opponent of the
    /// player to move.
    pub fn new(root_color: Stone, limits: TreeLimits, aging: f32) -> Result<Self> {
        let capacity = limits.max_tree_size / NODE_SIZE;
        let pool = Arc::new(NodePool::new(capacity, !limits.fast_alloc));
        let reaper = if limits.fast_alloc {
            None
        } else {
            Some(Reaper::spawn(Arc::clone(&pool)).map_err(UctError::Spawn)?)
        };
        // A fresh pool always has room for the root.
        let root = pool.alloc(1).map_or(NodeId(0), |r| r.first());
        pool.get(root).init(None, Coord::Pass, 0);
        debug!(
            capacity,
            fast_alloc = limits.fast_alloc,
            node_size = NODE_SIZE,
            "created search tree"
        );
        Ok(Tree {
            pool,
            reaper,
            root,
            root_color,
            limits,
            aging,
            full: AtomicBool::new(false),
            untrustworthy: false,
            use_extra_komi: false,
            extra_komi: AtomicF32::new(0.0),
            avg_score: AtomicStats::default(),
        })
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn root_node(&self) -> &Node {
        self.node(self.root)
    }

    pub fn node(&self, id: NodeId) -> &Node {
        self.pool.get(id)
    }

    pub fn children(&self, id: NodeId) -> Option<ChildRange> {
        self.node(id).children()
    }

    pub fn root_color(&self) -> Stone {
        self.root_color
    }

    pub fn limits(&self) -> &TreeLimits {
        &self.limits
    }

    pub fn extra_komi(&self) -> f32 {
        self.extra_komi.load()
    }

    pub fn set_extra_komi(&self, komi: f32) {
        self.extra_komi.store(komi);
    }

    /// Set when pruning may have dropped a branch better than one it kept.
    /// Such a tree is neither trusted for resignation nor reused.
    pub fn is_untrustworthy(&self) -> bool {
        self.untrustworthy
    }

    pub fn mark_untrustworthy(&mut self) {
        self.untrustworthy = true;
    }

    /// Nodes in use.
    pub fn nodes(&self) -> usize {
        self.pool.live()
    }

    /// Bytes in use.
    pub fn nodes_size(&self) -> usize {
        self.nodes() * NODE_SIZE
    }

    /// Whether growth has stopped for lack of memory.
    pub fn is_full(&self) -> bool {
        self.full.load(Ordering::Relaxed) || self.nodes_size() >= self.limits.max_tree_size
    }

    /// Whether the background reaper has returned every discarded subtree.
    pub fn is_reclaimed(&self) -> bool {
        self.reaper.as_ref().map_or(true, Reaper::is_idle)
    }

    /// Sign telling whose perspective `parity` stands for: positive for
    /// Black.
    pub fn tree_parity(&self, parity: i32) -> i32 {
        if self.root_color == Stone::White {
            parity
        } else {
            -parity
        }
    }

    /// Converts a stored (Black's perspective) value into a value to
    /// maximize for the player choosing among the children of a node with
    /// `parity`.
    pub fn node_value(&self, parity: i32, value: f32) -> f32 {
        if self.tree_parity(parity) > 0 {
            value
        } else {
            1.0 - value
        }
    }

    /// Parity of a node: `1` for the root and every other level below it.
    pub fn node_parity(&self, id: NodeId) -> i32 {
        if (self.node(id).depth() ^ self.root_node().depth()) & 1 == 1 {
            -1
        } else {
            1
        }
    }

    /// Expands `id` with a child for pass and for every legal move of
    /// `color`, seeding priors. Safe to call from any number of threads;
    /// exactly one of them performs the expansion.
    pub fn expand<B: Board>(
        &self,
        id: NodeId,
        board: &B,
        color: Stone,
        prior: &dyn Prior<B>,
    ) -> Expansion {
        let node = self.node(id);
        if !node.try_begin_expansion() {
            return Expansion::Busy;
        }

        let mut moves = Vec::with_capacity(board.points() + 1);
        moves.push(Coord::Pass);
        moves.extend(board.legal_moves(color));
        let mut map = PriorMap::new(board.points(), color);
        prior.assign(board, color, &moves, &mut map);

        let Some(block) = self.pool.alloc(moves.len() as u32) else {
            node.abort_expansion();
            if !self.full.swap(true, Ordering::Relaxed) {
                debug!(nodes = self.nodes(), "tree memory exhausted");
            }
            return Expansion::Full;
        };

        node.set_hash(board.hash());
        let depth = node.depth() + 1;
        for (child, &coord) in block.iter().zip(&moves) {
            let n = self.node(child);
            n.init(Some(id), coord, depth);
            let p = map.get(coord);
            if !p.is_empty() {
                let value = if color == Stone::Black { p.value } else { 1.0 - p.value };
                n.prior.store(MoveStats::new(value, p.playouts));
            }
        }
        node.publish_children(block);
        trace!(node = id.index(), children = block.len(), "expanded node");
        Expansion::Expanded
    }

    pub fn find_child(&self, id: NodeId, coord: Coord) -> Option<NodeId> {
        self.children(id)?
            .iter()
            .find(|&c| self.node(c).coord() == coord)
    }

    /// Child of `id` for `coord`, expanding `id` first if it is a leaf.
    pub fn get_or_create_child<B: Board>(
        &self,
        id: NodeId,
        coord: Coord,
        board: &B,
        color: Stone,
        prior: &dyn Prior<B>,
    ) -> Option<NodeId> {
        if self.node(id).is_leaf() {
            self.expand(id, board, color, prior);
        }
        self.find_child(id, coord)
    }

    /// Makes `child` (a child of the root) the new root and discards its
    /// siblings.
    ///
    /// The new root takes over the slot of the old one, so the root keeps
    /// its id and always sits in a block of its own.
    pub fn promote(&mut self, child: NodeId) {
        debug_assert_eq!(self.node(child).parent(), Some(self.root));
        let root = self.root;
        let Some(siblings) = self.node(root).detach_children() else {
            return;
        };

        let promoted = self.node(child);
        let grandchildren = promoted.detach_children();
        let root_node = self.node(root);
        root_node.copy_payload(promoted);
        if let Some(block) = grandchildren {
            for g in block.iter() {
                self.node(g).set_parent(Some(root));
            }
            root_node.try_begin_expansion();
            root_node.publish_children(block);
        }

        match &self.reaper {
            Some(reaper) => reaper.reclaim(siblings),
            // Abandoned in the arena until the next compaction.
            None => {}
        }

        self.root_color = self.root_color.other();
        self.untrustworthy = false;
        self.full.store(false, Ordering::Relaxed);
        if self.aging != 1.0 {
            self.age(self.aging);
        }

        if self.limits.fast_alloc && self.nodes_size() >= self.limits.pruning_threshold {
            let budget = self.limits.max_pruned_size / NODE_SIZE;
            let report = self.prune(budget, 0);
            debug!(
                kept = report.kept,
                cut = report.cut,
                "compacted tree after promotion"
            );
        }
    }

    /// Promotes the root child for `coord`. Returns `false` if there is none.
    pub fn promote_at(&mut self, coord: Coord) -> bool {
        match self.find_child(self.root, coord) {
            Some(child) => {
                self.promote(child);
                true
            }
            None => false,
        }
    }

    /// Shrinks the tree to the pruned-copy budget, keeping the most visited
    /// parts. Collapses nodes visited fewer than `min_playouts` times.
    pub fn garbage_collect(&mut self, min_playouts: u32) -> PruneReport {
        let budget = self.limits.max_pruned_size / NODE_SIZE;
        self.prune(budget, min_playouts)
    }

    fn age(&self, factor: f32) {
        self.walk(|id, _| self.node(id).age(factor));
    }

    /// Visits every node depth-first, pre-order, with its depth below the
    /// root.
    pub(crate) fn walk(&self, mut f: impl FnMut(NodeId, usize)) {
        let mut stack = vec![(self.root, 0)];
        while let Some((id, depth)) = stack.pop() {
            f(id, depth);
            if let Some(children) = self.children(id) {
                stack.extend(children.iter().rev().map(|c| (c, depth + 1)));
            }
        }
    }

    /// Child of `id` with the most playouts.
    pub fn most_visited_child(&self, id: NodeId) -> Option<NodeId> {
        self.children(id)?
            .iter()
            .filter(|&c| !self.node(c).is_invalid())
            .max_by_key(|&c| self.node(c).u.playouts())
    }

    /// The most visited line of play from the root.
    pub fn principal_variation(&self, max_len: usize) -> Vec<Coord> {
        let mut line = Vec::new();
        let mut node = self.root;
        while line.len() < max_len {
            match self.most_visited_child(node) {
                Some(child) if self.node(child).u.playouts() > 0 => {
                    line.push(self.node(child).coord());
                    node = child;
                }
                _ => break,
            }
        }
        line
    }

    /// Logs every node with at least `threshold` playouts.
    pub fn dump<B: Board>(&self, board: &B, threshold: u32) {
        self.walk(|id, depth| {
            let node = self.node(id);
            let u = node.u.load();
            if u.playouts < threshold && id != self.root {
                return;
            }
            debug!(
                "{:indent$}[{}] {:.3}/{} prior {:.3}/{} amaf {:.3}/{} crit {:.3}",
                "",
                board.vertex(node.coord()),
                u.value,
                u.playouts,
                node.prior.value(),
                node.prior.playouts(),
                node.amaf.value(),
                node.amaf.playouts(),
                node.criticality(),
                indent = depth * 2,
            );
        });
    }
}
