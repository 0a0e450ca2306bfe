//! Error types shared by the search core, the engine facade and the
//! bundled reference board.

use crate::board::{Coord, Stone};
use std::path::PathBuf;
use thiserror::Error;

/// Rejections raised by a [`Board`](crate::board::Board) implementation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BoardError {
    #[error("illegal move {coord} for {color}")]
    IllegalMove { coord: Coord, color: Stone },

    #[error("point {0} is outside the board")]
    OffBoard(Coord),

    #[error("cannot parse vertex {0:?}")]
    BadVertex(String),
}

/// Problems found while reading engine configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unknown engine option {0:?}")]
    UnknownOption(String),

    #[error("option {name:?} requires a value")]
    MissingValue { name: String },

    #[error("invalid value {value:?} for option {name:?}")]
    InvalidValue { name: String, value: String },

    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse configuration: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("invalid time budget {0:?}")]
    TimeInfo(String),
}

/// Failures surfaced by the engine facade.
#[derive(Debug, Error)]
pub enum UctError {
    /// Two consecutive moves were requested for the same color. The caller
    /// broke the protocol; the engine state cannot be trusted afterwards.
    #[error("non-alternating play detected: {color} to play but root was played by {root_color}")]
    NonAlternatingPlay { color: Stone, root_color: Stone },

    #[error("the search tree is still shared with running workers")]
    TreeBusy,

    #[error(transparent)]
    Board(#[from] BoardError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("tree book {}: {message}", path.display())]
    Book { path: PathBuf, message: String },

    #[error("failed to spawn search thread: {0}")]
    Spawn(#[source] std::io::Error),
}

pub type Result<T, E = UctError> = std::result::Result<T, E>;
