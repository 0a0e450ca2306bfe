//! Dynamic komi: extra points handed to White while simulating, so that
//! lopsided positions still produce informative win rates.
//!
//! A positive extra komi makes the search play as if White had that many
//! more points.

use crate::board::Stone;
use crate::tree::Tree;

pub trait Dynkomi: Send + Sync {
    fn name(&self) -> &'static str;

    /// Extra komi to use for a search starting after `moves` moves, with
    /// `color` to play.
    fn permove(&self, moves: usize, color: Stone, tree: &Tree) -> f32;

    /// Readjustment in the middle of a search, given the playouts since
    /// the last one (`tree.avg_score`). `None` keeps the current value.
    fn persim(&self, moves: usize, color: Stone, tree: &Tree) -> Option<f32>;
}

/// Always zero.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoDynkomi;

impl Dynkomi for NoDynkomi {
    fn name(&self) -> &'static str {
        "none"
    }

    fn permove(&self, _moves: usize, _color: Stone, _tree: &Tree) -> f32 {
        0.0
    }

    fn persim(&self, _moves: usize, _color: Stone, _tree: &Tree) -> Option<f32> {
        None
    }
}

/// Starts at `base` points against the player to move and shrinks
/// linearly to zero at move `moves_end`.
#[derive(Clone, Copy, Debug)]
pub struct LinearDynkomi {
    pub base: f32,
    pub moves_end: usize,
}

impl Default for LinearDynkomi {
    fn default() -> Self {
        LinearDynkomi {
            base: 7.0,
            moves_end: 200,
        }
    }
}

impl Dynkomi for LinearDynkomi {
    fn name(&self) -> &'static str {
        "linear"
    }

    fn permove(&self, moves: usize, color: Stone, _tree: &Tree) -> f32 {
        if moves >= self.moves_end || self.moves_end == 0 {
            return 0.0;
        }
        let komi = self.base * (1.0 - moves as f32 / self.moves_end as f32);
        match color {
            Stone::White => -komi,
            _ => komi,
        }
    }

    /// Re-evaluated from the move count, so a value changed by someone
    /// else during the search is put back.
    fn persim(&self, moves: usize, color: Stone, tree: &Tree) -> Option<f32> {
        Some(self.permove(moves, color, tree))
    }
}

/// Follows the average playout score: every readjustment moves the extra
/// komi by `rate` times Black's average lead, so that the side ahead has
/// to keep winning by more. Bounded by `max` points either way.
#[derive(Clone, Copy, Debug)]
pub struct AdaptiveDynkomi {
    pub rate: f32,
    pub max: f32,
    /// Scored playouts needed before the average is trusted.
    pub min_games: u32,
}

impl Default for AdaptiveDynkomi {
    fn default() -> Self {
        AdaptiveDynkomi {
            rate: 0.5,
            max: 7.0,
            min_games: 50,
        }
    }
}

impl Dynkomi for AdaptiveDynkomi {
    fn name(&self) -> &'static str {
        "adaptive"
    }

    /// Keeps whatever the previous move ended with.
    fn permove(&self, _moves: usize, _color: Stone, tree: &Tree) -> f32 {
        tree.extra_komi().clamp(-self.max, self.max)
    }

    fn persim(&self, _moves: usize, _color: Stone, tree: &Tree) -> Option<f32> {
        let avg = tree.avg_score.load();
        if avg.playouts < self.min_games {
            return None;
        }
        // Black's lead already has the current extra komi taken off.
        let komi = tree.extra_komi() + self.rate * avg.value;
        Some(komi.clamp(-self.max, self.max))
    }
}

/// Whether dynamic komi applies when `color` is to play. Bit 1 of `mask`
/// enables it for Black, bit 2 for White.
pub fn mask_allows(mask: u8, color: Stone) -> bool {
    mask as usize & color.index() != 0
}
