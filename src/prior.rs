//! Prior knowledge plug for freshly expanded nodes.
//!
//! When a node is expanded every child may receive a seed statistics record
//! ("prior") expressed as a number of virtual playouts and a value from the
//! perspective of the player making the move. The search core only defines
//! the interface; heuristic priors live with the board-specific code.

use crate::board::{Board, Coord, Stone};
use crate::stats::MoveStats;

/// Prior values for every candidate move of one expansion.
#[derive(Clone, Debug)]
pub struct PriorMap {
    /// Player making the candidate moves.
    pub color: Stone,
    points: Vec<MoveStats>,
    pass: MoveStats,
}

impl PriorMap {
    pub fn new(points: usize, color: Stone) -> Self {
        PriorMap {
            color,
            points: vec![MoveStats::default(); points],
            pass: MoveStats::default(),
        }
    }

    fn slot(&mut self, c: Coord) -> Option<&mut MoveStats> {
        match c {
            Coord::Pass => Some(&mut self.pass),
            Coord::Point(p) => self.points.get_mut(p as usize),
            Coord::Resign => None,
        }
    }

    /// Adds `playouts` virtual results of `value` for move `c`.
    pub fn add(&mut self, c: Coord, value: f32, playouts: u32) {
        if let Some(s) = self.slot(c) {
            s.add_result(value, playouts);
        }
    }

    pub fn get(&self, c: Coord) -> MoveStats {
        match c {
            Coord::Pass => self.pass,
            Coord::Point(p) => self.points.get(p as usize).copied().unwrap_or_default(),
            Coord::Resign => MoveStats::default(),
        }
    }
}

/// Source of prior statistics.
pub trait Prior<B: Board>: Send + Sync {
    /// Seeds `map` for the candidate `moves` of `color` in `board`.
    fn assign(&self, board: &B, color: Stone, moves: &[Coord], map: &mut PriorMap);
}

/// Every candidate starts as an even game worth `eqex` playouts.
///
/// This keeps freshly expanded children from being judged on their first
/// few playouts alone.
#[derive(Clone, Copy, Debug)]
pub struct EvenPrior {
    pub eqex: u32,
}

impl Default for EvenPrior {
    fn default() -> Self {
        EvenPrior { eqex: 10 }
    }
}

impl<B: Board> Prior<B> for EvenPrior {
    fn assign(&self, _board: &B, _color: Stone, moves: &[Coord], map: &mut PriorMap) {
        if self.eqex == 0 {
            return;
        }
        for &c in moves {
            map.add(c, 0.5, self.eqex);
        }
    }
}
