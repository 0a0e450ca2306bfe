//! UCB1 with RAVE: node values are blended with all-moves-as-first
//! statistics, leaning on AMAF while a node has few real visits.

use super::{best_child, update_path, Policy, SimulationResult};
use crate::tree::{NodeId, Tree};
use crate::SearchRng;

#[derive(Clone, Copy, Debug)]
pub struct Ucb1Amaf {
    pub explore_p: f32,
    pub fpu: f32,
    /// Number of real visits at which AMAF and real statistics weigh the
    /// same.
    pub equiv_rave: f32,
    /// Weight of the criticality bonus; 0 disables it.
    pub crit_coef: f32,
}

impl Default for Ucb1Amaf {
    fn default() -> Self {
        Ucb1Amaf {
            explore_p: 0.2,
            fpu: 1.1,
            equiv_rave: 3000.0,
            crit_coef: 0.0,
        }
    }
}

impl Ucb1Amaf {
    /// Blended value of `child` and the number of visits behind it.
    /// `virtual_loss` counts in-flight descents as unfinished visits.
    fn value(&self, tree: &Tree, child: NodeId, parity: i32, virtual_loss: bool) -> Option<(f32, f32)> {
        let n = tree.node(child);
        let u = n.u.load();
        let prior = n.prior.load();
        let amaf = n.amaf.load();

        let descents = if virtual_loss { n.descents().max(0) as f32 } else { 0.0 };
        let visits = u.playouts as f32 + prior.playouts as f32;
        let denom = visits + descents;
        let rave = amaf.playouts as f32;
        if denom == 0.0 && rave == 0.0 {
            return None;
        }

        let direct = if denom > 0.0 {
            (u.playouts as f32 * tree.node_value(parity, u.value)
                + prior.playouts as f32 * tree.node_value(parity, prior.value))
                / denom
        } else {
            0.0
        };
        let mut value = if rave > 0.0 {
            let beta = rave / (rave + visits + visits * rave / self.equiv_rave);
            let amaf_value = tree.node_value(parity, amaf.value);
            if denom > 0.0 {
                beta * amaf_value + (1.0 - beta) * direct
            } else {
                amaf_value
            }
        } else {
            direct
        };

        if self.crit_coef > 0.0 && u.playouts > 0 {
            let crit = n.criticality();
            if crit > 0.0 {
                value += self.crit_coef * crit;
            }
        }
        Some((value, denom))
    }
}

impl Policy for Ucb1Amaf {
    fn name(&self) -> &'static str {
        "ucb1amaf"
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
            Some(match self.value(tree, child, parity, true) {
                None => self.fpu,
                Some((value, visits)) if visits > 0.0 && self.explore_p > 0.0 => {
                    value + self.explore_p * (xpl / visits).sqrt()
                }
                Some((value, _)) => value,
            })
        })
    }

    fn evaluate(&self, tree: &Tree, child: NodeId, parity: i32) -> Option<f32> {
        Some(self.value(tree, child, parity, false).map_or(0.0, |(v, _)| v))
    }

    fn update(&self, tree: &Tree, path: &[NodeId], sim: &SimulationResult) {
        update_path(tree, path, sim);

        // Credit the siblings of every step whose move the same color
        // played first at some point in the simulation.
        for &id in path {
            let Some(children) = tree.children(id) else {
                continue;
            };
            let child_color = if tree.node_parity(id) > 0 {
                tree.root_color().other()
            } else {
                tree.root_color()
            };
            for child in children.iter() {
                let c = tree.node(child);
                let coord = c.coord();
                if coord.is_pass() || sim.amaf.first_player(coord) != child_color {
                    continue;
                }
                c.amaf.add_result(sim.result, 1);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::{Board, Coord, Move, Stone};
    use crate::games::stones::StonesBoard;
    use crate::playout::AmafMap;
    use crate::prior::EvenPrior;
    use crate::stats::MoveStats;
    use crate::tree::TreeLimits;
    use rand::SeedableRng;

    fn setup() -> (Tree, StonesBoard) {
        let board = StonesBoard::new(3, 0.5);
        let tree = Tree::new(Stone::White, TreeLimits::with_nodes(1_000, true), 1.0).unwrap();
        tree.expand(tree.root(), &board, Stone::Black, &EvenPrior { eqex: 0 });
        tree.root_node().u.store(MoveStats::new(0.5, 100));
        (tree, board)
    }

    #[test]
    fn test_amaf_dominates_with_few_visits() {
        let (tree, board) = setup();
        let policy = Ucb1Amaf {
            explore_p: 0.0,
            fpu: 0.0,
            ..Ucb1Amaf::default()
        };
        let a = tree.find_child(tree.root(), board.parse_vertex("A1").unwrap()).unwrap();
        let b = tree.find_child(tree.root(), board.parse_vertex("B2").unwrap()).unwrap();
        // A1 looks better on two real visits, B2 on a thousand AMAF ones.
        tree.node(a).u.store(MoveStats::new(1.0, 2));
        tree.node(a).amaf.store(MoveStats::new(0.3, 1_000));
        tree.node(b).u.store(MoveStats::new(0.5, 2));
        tree.node(b).amaf.store(MoveStats::new(0.8, 1_000));
        let mut rng = SearchRng::seed_from_u64(4);
        assert_eq!(policy.descend(&tree, tree.root(), 1, true, &mut rng), Some(b));
        assert_eq!(policy.winner(&tree, tree.root(), &mut rng), Some(b));
        let va = policy.evaluate(&tree, a, 1).unwrap();
        let vb = policy.evaluate(&tree, b, 1).unwrap();
        assert!(vb > va, "va={} vb={}", va, vb);
    }

    #[test]
    fn test_update_credits_first_player_siblings() {
        let (tree, board) = setup();
        let policy = Ucb1Amaf::default();
        let a1 = board.parse_vertex("A1").unwrap();
        let c3 = board.parse_vertex("C3").unwrap();
        let b2 = board.parse_vertex("B2").unwrap();
        let a1_id = tree.find_child(tree.root(), a1).unwrap();

        let mut amaf = AmafMap::new(board.points());
        amaf.record(Move::new(a1, Stone::Black));
        amaf.record(Move::new(b2, Stone::White));
        amaf.record(Move::new(c3, Stone::Black));
        let sim = SimulationResult {
            result: 1.0,
            amaf,
            owners: vec![Stone::Black; board.points()],
        };
        policy.update(&tree, &[tree.root(), a1_id], &sim);

        let amaf_of = |c: Coord| tree.node(tree.find_child(tree.root(), c).unwrap()).amaf.playouts();
        assert_eq!(amaf_of(a1), 1);
        assert_eq!(amaf_of(c3), 1, "played later by the same color");
        assert_eq!(amaf_of(b2), 0, "first played by the opponent");
        assert_eq!(amaf_of(Coord::Pass), 0);
        assert_eq!(tree.node(a1_id).u.playouts(), 1);
    }
}
