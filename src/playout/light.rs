use super::{PlayoutOutcome, PlayoutPolicy};
use crate::board::{Board, Coord, Move, Stone};
use crate::SearchRng;
use rand::Rng;

/// Uniformly random playout that never fills its own one-point eyes.
#[derive(Clone, Copy, Debug, Default)]
pub struct LightPlayout;

impl<B: Board> PlayoutPolicy<B> for LightPlayout {
    fn simulate(
        &self,
        board: &mut B,
        starting_color: Stone,
        max_moves: usize,
        rng: &mut SearchRng,
    ) -> PlayoutOutcome {
        let mut color = starting_color;
        let mut moves = Vec::new();

        while moves.len() < max_moves && !board.is_game_over() {
            let candidates: Vec<Coord> = board
                .legal_moves(color)
                .into_iter()
                .filter(|&c| !board.is_one_point_eye(c, color))
                .collect();
            let coord = if candidates.is_empty() {
                Coord::Pass
            } else {
                candidates[rng.random_range(0..candidates.len())]
            };
            let mut mv = Move::new(coord, color);
            if board.play(mv).is_err() {
                mv = Move::new(Coord::Pass, color);
                // Passing is always legal.
                let _ = board.play(mv);
            }
            moves.push(mv);
            color = color.other();
        }

        let white_lead = board.official_score(&[]).white_lead;
        let score = match starting_color {
            Stone::White => white_lead,
            _ => -white_lead,
        };
        PlayoutOutcome {
            score,
            ko_captures: vec![false; moves.len()],
            moves,
        }
    }
}
