//! # Board collaborator interface
//!
//! The search core never looks inside a position. Everything it needs from
//! the rules of the game goes through the [`Board`] trait: move generation,
//! playing moves, hashing, final ownership for the ownership estimator and
//! an authoritative score for the pass-safety check.
//!
//! Coordinates are plain point indices in `0..points()`, plus the two
//! special moves `pass` and `resign`.

use crate::error::BoardError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Color of a stone, of a player, or of a point owner.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Stone {
    #[default]
    None,
    Black,
    White,
}

impl Stone {
    /// The opposing color. `None` stays `None`.
    pub fn other(self) -> Stone {
        match self {
            Stone::Black => Stone::White,
            Stone::White => Stone::Black,
            Stone::None => Stone::None,
        }
    }

    /// Index usable for per-color tables (`None` = 0, `Black` = 1, `White` = 2).
    pub fn index(self) -> usize {
        match self {
            Stone::None => 0,
            Stone::Black => 1,
            Stone::White => 2,
        }
    }
}

impl fmt::Display for Stone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Stone::None => "none",
            Stone::Black => "black",
            Stone::White => "white",
        };
        f.write_str(s)
    }
}

/// A move target: a board point, a pass, or a resignation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Coord {
    Pass,
    Resign,
    Point(u16),
}

impl Coord {
    pub fn is_pass(self) -> bool {
        self == Coord::Pass
    }

    pub fn is_resign(self) -> bool {
        self == Coord::Resign
    }

    /// Point index, if this is a board point.
    pub fn point(self) -> Option<usize> {
        match self {
            Coord::Point(p) => Some(p as usize),
            _ => None,
        }
    }

    /// Compact integer form used inside tree nodes.
    pub(crate) fn to_raw(self) -> i32 {
        match self {
            Coord::Pass => -1,
            Coord::Resign => -2,
            Coord::Point(p) => p as i32,
        }
    }

    pub(crate) fn from_raw(raw: i32) -> Coord {
        match raw {
            -2 => Coord::Resign,
            r if r < 0 => Coord::Pass,
            r => Coord::Point(r as u16),
        }
    }
}

impl fmt::Display for Coord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Coord::Pass => f.write_str("pass"),
            Coord::Resign => f.write_str("resign"),
            Coord::Point(p) => write!(f, "#{}", p),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Move {
    pub coord: Coord,
    pub color: Stone,
}

impl Move {
    pub fn new(coord: Coord, color: Stone) -> Self {
        Move { coord, color }
    }
}

/// Result of an authoritative count.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Score {
    /// White's lead including komi; negative when Black is ahead.
    pub white_lead: f32,
    /// Number of neutral points.
    pub dame: usize,
}

/// A Go position as seen by the search.
///
/// `Clone` must produce an independent copy: every playout works on its own
/// copy of the position. `Send + Sync` are required because the position is
/// shared read-only between worker threads.
pub trait Board: Clone + Send + Sync + 'static {
    /// Number of points; valid point coordinates are `Point(0..points())`.
    fn points(&self) -> usize;

    /// Legal, non-pass moves for `color`.
    fn legal_moves(&self, color: Stone) -> Vec<Coord>;

    /// Plays a move. Passing is always legal.
    fn play(&mut self, mv: Move) -> Result<(), BoardError>;

    /// Hash of the current position.
    fn hash(&self) -> u64;

    /// Stone occupying a point (`None` for empty points and non-points).
    fn at(&self, c: Coord) -> Stone;

    /// Final owner of a point at the end of a playout: the stone on it, or
    /// the color that surrounds an empty point, otherwise `None`.
    fn owner(&self, c: Coord) -> Stone;

    /// Whether `c` is a single-point eye of `color`. Random playouts never
    /// fill their own eyes.
    fn is_one_point_eye(&self, c: Coord, color: Stone) -> bool;

    fn last_move(&self) -> Option<Move>;

    /// Number of moves played so far, passes included.
    fn moves(&self) -> usize;

    fn komi(&self) -> f32;

    fn set_komi(&mut self, komi: f32);

    /// All stones of the group containing `c`.
    fn group_stones(&self, c: Coord) -> Vec<Coord>;

    /// Official count treating the stones in `dead` as captured.
    fn official_score(&self, dead: &[Coord]) -> Score;

    /// Whether the last two moves were passes.
    fn is_game_over(&self) -> bool;

    /// Human readable vertex name.
    fn vertex(&self, c: Coord) -> String {
        c.to_string()
    }
}
