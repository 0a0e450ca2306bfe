//! Tree policies: how children are picked during descent, how the final
//! move is chosen, and how simulation results flow back up the tree.

pub mod ucb1;
pub mod ucb1amaf;

use crate::board::{Coord, Stone};
use crate::playout::AmafMap;
use crate::tree::{NodeId, Tree};
use crate::SearchRng;
use rand::Rng;

pub use ucb1::Ucb1;
pub use ucb1amaf::Ucb1Amaf;

/// Urgencies closer than this are ties.
pub const URGENCY_EPSILON: f32 = f32::EPSILON;

/// What one simulation reports to [`Policy::update`].
#[derive(Clone, Debug)]
pub struct SimulationResult {
    /// Outcome from Black's perspective: 1.0 for a Black win, 0.0 for a
    /// White win.
    pub result: f32,
    /// First color to play at each point, tree part included.
    pub amaf: AmafMap,
    /// Final owner of every point.
    pub owners: Vec<Stone>,
}

impl SimulationResult {
    pub fn winner(&self) -> Stone {
        if self.result > 0.5 {
            Stone::Black
        } else {
            Stone::White
        }
    }

    pub fn owner(&self, c: Coord) -> Stone {
        c.point()
            .and_then(|p| self.owners.get(p))
            .copied()
            .unwrap_or(Stone::None)
    }
}

/// A node-selection and backup strategy.
pub trait Policy: Send + Sync {
    fn name(&self) -> &'static str;

    /// Child of `node` to descend into. `parity` is the parity of `node`.
    fn descend(
        &self,
        tree: &Tree,
        node: NodeId,
        parity: i32,
        allow_pass: bool,
        rng: &mut SearchRng,
    ) -> Option<NodeId>;

    /// Child of `node` to play: the most simulated one.
    fn choose(&self, tree: &Tree, node: NodeId, exclude: Coord, rng: &mut SearchRng) -> Option<NodeId> {
        generic_choose(tree, node, exclude, rng)
    }

    /// Value of `child` for the player choosing at a node of `parity`,
    /// without exploration. `None` if the policy has no such notion.
    fn evaluate(&self, _tree: &Tree, _child: NodeId, _parity: i32) -> Option<f32> {
        None
    }

    /// Child of `node` with the best evaluation. `None` if the policy does
    /// not evaluate.
    fn winner(&self, tree: &Tree, node: NodeId, rng: &mut SearchRng) -> Option<NodeId> {
        let parity = tree.node_parity(node);
        best_child(tree, node, false, rng, |child| self.evaluate(tree, child, parity))
    }

    /// Backs up one simulation along `path` (root first).
    fn update(&self, tree: &Tree, path: &[NodeId], sim: &SimulationResult);
}

/// Picks uniformly among the children of `node` with the highest urgency.
///
/// Children marked invalid, and pass unless `allow_pass`, are skipped, as
/// are children for which `urgency` returns `None`. When pass is the only
/// best candidate so far and another child ties with it, pass is dropped.
pub fn best_child(
    tree: &Tree,
    node: NodeId,
    allow_pass: bool,
    rng: &mut SearchRng,
    mut urgency: impl FnMut(NodeId) -> Option<f32>,
) -> Option<NodeId> {
    let children = tree.children(node)?;
    let mut best = f32::NEG_INFINITY;
    let mut candidates: Vec<NodeId> = Vec::new();

    for child in children.iter() {
        let n = tree.node(child);
        if n.is_invalid() || (!allow_pass && n.coord().is_pass()) {
            continue;
        }
        let Some(u) = urgency(child).filter(|u| !u.is_nan()) else {
            continue;
        };
        if u > best + URGENCY_EPSILON || candidates.is_empty() {
            best = u;
            candidates.clear();
        }
        if u >= best - URGENCY_EPSILON {
            if candidates.len() == 1 && tree.node(candidates[0]).coord().is_pass() {
                candidates.clear();
            }
            candidates.push(child);
        }
    }

    match candidates.len() {
        0 => None,
        1 => Some(candidates[0]),
        n => Some(candidates[rng.random_range(0..n)]),
    }
}

/// Most simulated child of `node` other than `exclude`.
pub fn generic_choose(tree: &Tree, node: NodeId, exclude: Coord, rng: &mut SearchRng) -> Option<NodeId> {
    let children = tree.children(node)?;
    let mut best = 0;
    let mut candidates: Vec<NodeId> = Vec::new();

    for child in children.iter() {
        let n = tree.node(child);
        if n.coord() == exclude || n.is_invalid() {
            continue;
        }
        let playouts = n.u.playouts();
        if playouts > best || candidates.is_empty() {
            best = playouts;
            candidates.clear();
        }
        if playouts == best {
            if candidates.len() == 1 && tree.node(candidates[0]).coord().is_pass() {
                candidates.clear();
            }
            candidates.push(child);
        }
    }

    match candidates.len() {
        0 => None,
        1 => Some(candidates[0]),
        n => Some(candidates[rng.random_range(0..n)]),
    }
}

/// Adds the result and the ownership records to every node of `path`.
pub(crate) fn update_path(tree: &Tree, path: &[NodeId], sim: &SimulationResult) {
    let winner = sim.winner();
    for &id in path.iter().rev() {
        let node = tree.node(id);
        node.u.add_result(sim.result, 1);
        let coord = node.coord();
        if coord.is_pass() {
            continue;
        }
        let owner = sim.owner(coord);
        node.winner_owner
            .add_result(if owner == winner { 1.0 } else { 0.0 }, 1);
        node.black_owner
            .add_result(if owner == Stone::Black { 1.0 } else { 0.0 }, 1);
    }
}
