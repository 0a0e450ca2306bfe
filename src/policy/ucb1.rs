use super::{best_child, update_path, Policy, SimulationResult};
use crate::tree::{NodeId, Tree};
use crate::SearchRng;

/// Plain UCB1 over raw outcomes and priors.
#[derive(Clone, Copy, Debug)]
pub struct Ucb1 {
    /// Exploration coefficient. Classic UCB1 uses 2, which searches far
    /// too wide for Go; smaller values read deeper and narrower.
    pub explore_p: f32,
    /// First play urgency: unvisited children are tried only while no
    /// visited sibling is more urgent than this.
    pub fpu: f32,
}

impl Default for Ucb1 {
    fn default() -> Self {
        Ucb1 {
            explore_p: 0.2,
            fpu: 1.1,
        }
    }
}

impl Ucb1 {
    /// Urgency of `child` for the player choosing at a node of `parity`,
    /// `xpl` being the log of the parent's visits.
    fn urgency(&self, tree: &Tree, child: NodeId, parity: i32, xpl: f32) -> f32 {
        let n = tree.node(child);
        let u = n.u.load();
        let prior = n.prior.load();
        // In-flight descents count as visits that have not won yet.
        let visits = u.playouts as f32 + prior.playouts as f32 + n.descents().max(0) as f32;
        if visits == 0.0 {
            return self.fpu;
        }
        let wins = u.playouts as f32 * tree.node_value(parity, u.value)
            + prior.playouts as f32 * tree.node_value(parity, prior.value);
        wins / visits + self.explore_p * (xpl / visits).sqrt()
    }
}

impl Policy for Ucb1 {
    fn name(&self) -> &'static str {
        "ucb1"
    }

    fn descend(
        &self,
        tree: &Tree,
        node: NodeId,
        parity: i32,
        allow_pass: bool,
        rng: &mut SearchRng,
    ) -> Option<NodeId> {
        let n = tree.node(node);
        let xpl = ((n.u.playouts() + n.prior.playouts()).max(1) as f32).ln();
        best_child(tree, node, allow_pass, rng, |child| {
            Some(self.urgency(tree, child, parity, xpl))
        })
    }

    fn update(&self, tree: &Tree, path: &[NodeId], sim: &SimulationResult) {
        update_path(tree, path, sim);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::{Coord, Stone};
    use crate::games::stones::StonesBoard;
    use crate::prior::EvenPrior;
    use crate::stats::MoveStats;
    use crate::tree::TreeLimits;
    use rand::SeedableRng;

    fn setup(root_color: Stone) -> (Tree, StonesBoard) {
        let board = StonesBoard::new(3, 0.5);
        let tree = Tree::new(root_color, TreeLimits::with_nodes(1_000, true), 1.0).unwrap();
        tree.expand(tree.root(), &board, root_color.other(), &EvenPrior { eqex: 0 });
        tree.root_node().u.store(MoveStats::new(0.5, 1_000));
        (tree, board)
    }

    #[test]
    fn test_unvisited_children_get_fpu() {
        let (tree, board) = setup(Stone::White);
        let policy = Ucb1::default();
        let a1 = tree.find_child(tree.root(), board.parse_vertex("A1").unwrap()).unwrap();
        // A visited child worse than fpu loses to the unvisited ones.
        tree.node(a1).u.store(MoveStats::new(0.6, 100));
        let mut rng = SearchRng::seed_from_u64(5);
        let picked = policy.descend(&tree, tree.root(), 1, true, &mut rng).unwrap();
        assert_ne!(picked, a1);
        assert_eq!(tree.node(picked).u.playouts(), 0);
    }

    #[test]
    fn test_descend_follows_chooser_perspective() {
        // Black to move at the root: high Black values attract.
        let (tree, board) = setup(Stone::White);
        let policy = Ucb1 {
            explore_p: 0.2,
            fpu: 0.0,
        };
        let good = tree.find_child(tree.root(), board.parse_vertex("C3").unwrap()).unwrap();
        let bad = tree.find_child(tree.root(), board.parse_vertex("A1").unwrap()).unwrap();
        tree.node(good).u.store(MoveStats::new(0.9, 100));
        tree.node(bad).u.store(MoveStats::new(0.1, 100));
        let mut rng = SearchRng::seed_from_u64(5);
        assert_eq!(policy.descend(&tree, tree.root(), 1, true, &mut rng), Some(good));

        // White to move: the same stored values repel.
        let (tree, board) = setup(Stone::Black);
        let good = tree.find_child(tree.root(), board.parse_vertex("C3").unwrap()).unwrap();
        let bad = tree.find_child(tree.root(), board.parse_vertex("A1").unwrap()).unwrap();
        tree.node(good).u.store(MoveStats::new(0.9, 100));
        tree.node(bad).u.store(MoveStats::new(0.1, 100));
        assert_eq!(policy.descend(&tree, tree.root(), 1, true, &mut rng), Some(bad));
    }

    #[test]
    fn test_virtual_loss_diverts_descent() {
        let (tree, board) = setup(Stone::White);
        let policy = Ucb1 {
            explore_p: 0.0,
            fpu: 0.0,
        };
        let a = tree.find_child(tree.root(), board.parse_vertex("A1").unwrap()).unwrap();
        let b = tree.find_child(tree.root(), board.parse_vertex("B1").unwrap()).unwrap();
        tree.node(a).u.store(MoveStats::new(0.6, 10));
        tree.node(b).u.store(MoveStats::new(0.55, 10));
        let mut rng = SearchRng::seed_from_u64(3);
        assert_eq!(policy.descend(&tree, tree.root(), 1, true, &mut rng), Some(a));
        tree.node(a).add_virtual_loss(2);
        assert_eq!(policy.descend(&tree, tree.root(), 1, true, &mut rng), Some(b));
        tree.node(a).remove_virtual_loss(2);
        assert_eq!(tree.node(a).descents(), 0);
    }

    #[test]
    fn test_pass_is_skipped_when_not_allowed() {
        let (tree, _) = setup(Stone::White);
        let policy = Ucb1::default();
        let pass = tree.find_child(tree.root(), Coord::Pass).unwrap();
        tree.node(pass).u.store(MoveStats::new(1.0, 500));
        let mut rng = SearchRng::seed_from_u64(9);
        let picked = policy.descend(&tree, tree.root(), 1, false, &mut rng).unwrap();
        assert_ne!(picked, pass);
        assert!(policy.winner(&tree, tree.root(), &mut rng).is_none(), "ucb1 does not evaluate");
    }
}
