use crate::board::Coord;
use crate::stats::{AtomicStats, MoveStats};
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU32, AtomicU64, AtomicU8, Ordering};

/// Handle of a node inside a tree's node pool.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) u32);

impl NodeId {
    pub(crate) const NONE: u32 = u32::MAX;

    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Contiguous block of sibling nodes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChildRange {
    pub(crate) first: u32,
    pub(crate) len: u32,
}

impl ChildRange {
    pub fn len(&self) -> usize {
        self.len as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn first(&self) -> NodeId {
        NodeId(self.first)
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = NodeId> {
        (self.first..self.first + self.len).map(NodeId)
    }
}

const HINT_INVALID: u8 = 1;

/// One move of the search tree.
///
/// Every field is atomic so that slots can be initialized by the expanding
/// worker while other workers descend through published parts of the tree.
/// Expansion goes through three states:
///
/// 1. `children == NONE`, `is_expanded == false`: leaf
/// 2. `children == NONE`, `is_expanded == true`: some thread is expanding it
/// 3. `children != NONE`, `is_expanded == true`: fully expanded
#[derive(Debug)]
pub struct Node {
    hash: AtomicU64,
    parent: AtomicU32,
    children: AtomicU32,
    nchildren: AtomicU32,
    coord: AtomicI32,
    depth: AtomicU32,
    descents: AtomicI32,
    hints: AtomicU8,
    is_expanded: AtomicBool,

    /// Raw playout outcomes, Black's perspective.
    pub u: AtomicStats,
    /// Heuristic seed statistics.
    pub prior: AtomicStats,
    /// All-moves-as-first statistics.
    pub amaf: AtomicStats,
    /// How often the final owner of this point was the winner.
    pub winner_owner: AtomicStats,
    /// How often the final owner of this point was Black.
    pub black_owner: AtomicStats,
}

impl Default for Node {
    fn default() -> Self {
        Node {
            hash: AtomicU64::new(0),
            parent: AtomicU32::new(NodeId::NONE),
            children: AtomicU32::new(NodeId::NONE),
            nchildren: AtomicU32::new(0),
            coord: AtomicI32::new(Coord::Pass.to_raw()),
            depth: AtomicU32::new(0),
            descents: AtomicI32::new(0),
            hints: AtomicU8::new(0),
            is_expanded: AtomicBool::new(false),
            u: AtomicStats::default(),
            prior: AtomicStats::default(),
            amaf: AtomicStats::default(),
            winner_owner: AtomicStats::default(),
            black_owner: AtomicStats::default(),
        }
    }
}

impl Node {
    /// Resets a pool slot into a fresh leaf.
    pub(crate) fn init(&self, parent: Option<NodeId>, coord: Coord, depth: u32) {
        self.hash.store(0, Ordering::Relaxed);
        self.parent
            .store(parent.map_or(NodeId::NONE, |p| p.0), Ordering::Relaxed);
        self.children.store(NodeId::NONE, Ordering::Relaxed);
        self.nchildren.store(0, Ordering::Relaxed);
        self.coord.store(coord.to_raw(), Ordering::Relaxed);
        self.depth.store(depth, Ordering::Relaxed);
        self.descents.store(0, Ordering::Relaxed);
        self.hints.store(0, Ordering::Relaxed);
        self.is_expanded.store(false, Ordering::Relaxed);
        self.u.reset();
        self.prior.reset();
        self.amaf.reset();
        self.winner_owner.reset();
        self.black_owner.reset();
    }

    /// Copies the payload of `other` (everything but the links).
    pub(crate) fn copy_payload(&self, other: &Node) {
        self.hash.store(other.hash(), Ordering::Relaxed);
        self.coord
            .store(other.coord.load(Ordering::Relaxed), Ordering::Relaxed);
        self.depth.store(other.depth(), Ordering::Relaxed);
        self.descents.store(0, Ordering::Relaxed);
        self.hints
            .store(other.hints.load(Ordering::Relaxed), Ordering::Relaxed);
        self.u.store(other.u.load());
        self.prior.store(other.prior.load());
        self.amaf.store(other.amaf.load());
        self.winner_owner.store(other.winner_owner.load());
        self.black_owner.store(other.black_owner.load());
    }

    pub fn coord(&self) -> Coord {
        Coord::from_raw(self.coord.load(Ordering::Relaxed))
    }

    /// Hash of the position the node was expanded in, 0 for leaves.
    pub fn hash(&self) -> u64 {
        self.hash.load(Ordering::Relaxed)
    }

    pub(crate) fn set_hash(&self, hash: u64) {
        self.hash.store(hash, Ordering::Relaxed);
    }

    pub fn depth(&self) -> u32 {
        self.depth.load(Ordering::Relaxed)
    }

    pub fn parent(&self) -> Option<NodeId> {
        match self.parent.load(Ordering::Relaxed) {
            NodeId::NONE => None,
            p => Some(NodeId(p)),
        }
    }

    pub(crate) fn set_parent(&self, parent: Option<NodeId>) {
        self.parent
            .store(parent.map_or(NodeId::NONE, |p| p.0), Ordering::Relaxed);
    }

    /// Published children, if the node is fully expanded.
    pub fn children(&self) -> Option<ChildRange> {
        // Acquire pairs with the Release in `publish_children`, making the
        // initialized child slots visible.
        match self.children.load(Ordering::Acquire) {
            NodeId::NONE => None,
            first => Some(ChildRange {
                first,
                len: self.nchildren.load(Ordering::Relaxed),
            }),
        }
    }

    pub fn is_leaf(&self) -> bool {
        self.children().is_none()
    }

    pub fn is_expanded(&self) -> bool {
        self.is_expanded.load(Ordering::Acquire)
    }

    /// Test-and-set of the expansion flag. Only the caller that gets `true`
    /// may allocate and publish the children.
    pub(crate) fn try_begin_expansion(&self) -> bool {
        !self.is_expanded.swap(true, Ordering::AcqRel)
    }

    pub(crate) fn abort_expansion(&self) {
        self.is_expanded.store(false, Ordering::Release);
    }

    pub(crate) fn publish_children(&self, range: ChildRange) {
        self.nchildren.store(range.len, Ordering::Relaxed);
        self.children.store(range.first, Ordering::Release);
    }

    /// Drops the link to the children. The caller owns what it detached.
    pub(crate) fn detach_children(&self) -> Option<ChildRange> {
        let range = self.children();
        self.children.store(NodeId::NONE, Ordering::Release);
        self.nchildren.store(0, Ordering::Relaxed);
        self.is_expanded.store(false, Ordering::Release);
        range
    }

    pub fn descents(&self) -> i32 {
        self.descents.load(Ordering::Relaxed)
    }

    pub(crate) fn add_virtual_loss(&self, amount: i32) {
        self.descents.fetch_add(amount, Ordering::Relaxed);
    }

    pub(crate) fn remove_virtual_loss(&self, amount: i32) {
        self.descents.fetch_sub(amount, Ordering::Relaxed);
    }

    pub fn is_invalid(&self) -> bool {
        self.hints.load(Ordering::Relaxed) & HINT_INVALID != 0
    }

    pub(crate) fn mark_invalid(&self) {
        self.hints.fetch_or(HINT_INVALID, Ordering::Relaxed);
    }

    pub(crate) fn age(&self, factor: f32) {
        for stats in [&self.u, &self.amaf] {
            let mut s: MoveStats = stats.load();
            s.age(factor);
            stats.store(s);
        }
    }

    /// Covariance between owning this point and winning the game.
    pub fn criticality(&self) -> f32 {
        let winner_gets = self.winner_owner.value();
        let black_gets = self.black_owner.value();
        let black_wins = self.u.value();
        winner_gets - (2.0 * black_gets * black_wins - black_gets - black_wins + 1.0)
    }
}
