//! One simulation: descend the tree, grow it, play out, back up.

use crate::board::{Board, Coord, Move, Stone};
use crate::ownermap::OwnerMap;
use crate::playout::{AmafMap, PlayoutPolicy};
use crate::policy::{Policy, SimulationResult};
use crate::prior::Prior;
use crate::tree::{NodeId, Tree};
use crate::SearchRng;
use std::sync::Arc;
use tracing::trace;

/// The pluggable parts of a search and the knobs of a single simulation.
pub struct Strategy<B: Board> {
    pub policy: Arc<dyn Policy>,
    pub playout: Arc<dyn PlayoutPolicy<B>>,
    pub prior: Arc<dyn Prior<B>>,
    /// Visits of a leaf before it is expanded.
    pub expand_p: u32,
    pub virtual_loss: i32,
    /// Move limit of the random part.
    pub gamelen: usize,
}

impl<B: Board> Clone for Strategy<B> {
    fn clone(&self) -> Self {
        Strategy {
            policy: Arc::clone(&self.policy),
            playout: Arc::clone(&self.playout),
            prior: Arc::clone(&self.prior),
            expand_p: self.expand_p,
            virtual_loss: self.virtual_loss,
            gamelen: self.gamelen,
        }
    }
}

/// Releases the virtual loss of a path however the simulation ends.
struct VirtualLoss<'a> {
    tree: &'a Tree,
    amount: i32,
    nodes: Vec<NodeId>,
}

impl VirtualLoss<'_> {
    fn add(&mut self, id: NodeId) {
        if self.amount != 0 {
            self.tree.node(id).add_virtual_loss(self.amount);
            self.nodes.push(id);
        }
    }
}

impl Drop for VirtualLoss<'_> {
    fn drop(&mut self) {
        for &id in &self.nodes {
            self.tree.node(id).remove_virtual_loss(self.amount);
        }
    }
}

impl<B: Board> Strategy<B> {
    /// Runs one simulation from the root of `tree`, with `board` the root
    /// position and `color` to play.
    ///
    /// Returns the result from Black's perspective, or `None` when the
    /// descent ran into a move the board rejected; that child is then
    /// marked invalid and nothing is backed up.
    pub fn simulate(
        &self,
        tree: &Tree,
        board: &B,
        color: Stone,
        ownermap: &OwnerMap,
        rng: &mut SearchRng,
    ) -> Option<f32> {
        let mut b = board.clone();
        if tree.use_extra_komi {
            b.set_komi(b.komi() + tree.extra_komi());
        }
        let pass_limit = b.points() / 4;
        let mut passes = usize::from(b.last_move().is_some_and(|m| m.coord.is_pass()));

        let mut amaf = AmafMap::new(b.points());
        let mut vl = VirtualLoss {
            tree,
            amount: self.virtual_loss,
            nodes: Vec::new(),
        };
        let mut path = vec![tree.root()];
        let mut node = tree.root();
        let mut next_color = color;
        let mut parity = tree.node_parity(node);

        while passes < 2 && !tree.node(node).is_leaf() {
            let allow_pass = passes > 0 || b.moves() > pass_limit;
            let Some(child) = self.policy.descend(tree, node, parity, allow_pass, rng) else {
                break;
            };
            vl.add(child);
            path.push(child);

            let coord = tree.node(child).coord();
            let mv = Move::new(coord, next_color);
            if b.play(mv).is_err() {
                trace!(coord = %b.vertex(coord), "tree move rejected by the board");
                tree.node(child).mark_invalid();
                return None;
            }
            if coord.is_pass() {
                passes += 1;
            } else {
                passes = 0;
                amaf.record(mv);
            }
            next_color = next_color.other();
            parity = -parity;
            node = child;

            let n = tree.node(node);
            if n.is_leaf() && !coord.is_pass() && n.u.playouts() >= self.expand_p && !tree.is_full() {
                tree.expand(node, &b, next_color, self.prior.as_ref());
            }
        }

        // Score from `next_color`'s point of view.
        let score = if passes >= 2 {
            let white_lead = b.official_score(&[]).white_lead;
            if next_color == Stone::White {
                white_lead
            } else {
                -white_lead
            }
        } else {
            let outcome = self.playout.simulate(&mut b, next_color, self.gamelen, rng);
            for (mv, &ko) in outcome.moves.iter().zip(&outcome.ko_captures) {
                if !ko && !mv.coord.is_pass() {
                    amaf.record(*mv);
                }
            }
            outcome.score
        };

        let black_score = if next_color == Stone::Black { score } else { -score };
        let result = if black_score > 0.0 {
            1.0
        } else if black_score < 0.0 {
            0.0
        } else {
            0.5
        };
        tree.avg_score.add_result(black_score, 1);

        let owners: Vec<Stone> = (0..b.points())
            .map(|p| b.owner(Coord::Point(p as u16)))
            .collect();
        ownermap.fill(&owners);
        self.policy
            .update(tree, &path, &SimulationResult { result, amaf, owners });
        Some(result)
    }
}
