//! Playout collaborator interface.
//!
//! A playout continues a position with (semi-)random moves until both sides
//! pass or a move limit is hit, then scores the result. Move-selection
//! heuristics belong to the implementation; the search only consumes the
//! outcome, the move list (for AMAF) and the final position (for ownership).

pub mod light;

use crate::board::{Board, Coord, Move, Stone};
use crate::SearchRng;

pub use light::LightPlayout;

/// What a playout reports back to the search.
#[derive(Clone, Debug, Default)]
pub struct PlayoutOutcome {
    /// Final score from the starting color's point of view: positive means
    /// the starting color won, the magnitude is the margin.
    pub score: f32,
    /// Moves played during the playout, in order.
    pub moves: Vec<Move>,
    /// Whether each move captured a ko.
    pub ko_captures: Vec<bool>,
}

pub trait PlayoutPolicy<B: Board>: Send + Sync {
    /// Plays `board` out with `starting_color` to move, for at most
    /// `max_moves` moves. The board is left at the final position.
    fn simulate(
        &self,
        board: &mut B,
        starting_color: Stone,
        max_moves: usize,
        rng: &mut SearchRng,
    ) -> PlayoutOutcome;
}

/// First color to play at each point during one simulation (tree part and
/// playout part together).
#[derive(Clone, Debug)]
pub struct AmafMap {
    first: Vec<Stone>,
}

impl AmafMap {
    pub fn new(points: usize) -> Self {
        AmafMap {
            first: vec![Stone::None; points],
        }
    }

    pub fn record(&mut self, mv: Move) {
        if let Some(slot) = mv.coord.point().and_then(|p| self.first.get_mut(p)) {
            if *slot == Stone::None {
                *slot = mv.color;
            }
        }
    }

    pub fn first_player(&self, c: Coord) -> Stone {
        c.point()
            .and_then(|p| self.first.get(p))
            .copied()
            .unwrap_or(Stone::None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_amaf_keeps_first_player_only() {
        let mut map = AmafMap::new(4);
        map.record(Move::new(Coord::Point(2), Stone::White));
        map.record(Move::new(Coord::Point(2), Stone::Black));
        map.record(Move::new(Coord::Pass, Stone::Black));
        assert_eq!(map.first_player(Coord::Point(2)), Stone::White);
        assert_eq!(map.first_player(Coord::Point(0)), Stone::None);
        assert_eq!(map.first_player(Coord::Pass), Stone::None);
    }
}
