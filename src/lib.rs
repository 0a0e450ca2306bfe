//! # Parallel UCT search core
//!
//! A multi-threaded Monte Carlo tree search for Go-like games. Worker
//! threads share one tree: descents are lock-free, expansion happens exactly
//! once per node, and statistics are merged with compare-and-swap.
//!
//! ## Layout
//! - [`tree`]: arena-backed search tree, promotion, pruning, tree book
//! - [`policy`]: UCB1 and UCB1-AMAF selection and backup
//! - [`walk`]: one simulation from root to playout and back
//! - [`search`]: worker pool, stop rules and the search controller
//! - [`engine`]: stateful facade used by game front ends
//! - [`ownermap`]: ownership statistics for pass safety and dead stones
//!
//! The rules of the game stay outside: everything goes through the
//! [`Board`] trait. [`games::stones`] is a small reference board.
//!
//! ## Usage
//! ```no_run
//! use std::sync::Arc;
//! use uct::{Board, Stone, TimeInfo, UctConfig, UctEngine};
//! use uct::games::stones::StonesBoard;
//! use uct::playout::LightPlayout;
//! use uct::prior::EvenPrior;
//!
//! let mut engine = UctEngine::new(
//!     UctConfig::default(),
//!     Arc::new(LightPlayout),
//!     Arc::new(EvenPrior::default()),
//! );
//! let board = StonesBoard::new(9, 7.5);
//! let mv = engine.genmove(&board, TimeInfo::Games(2000), Stone::Black, false).unwrap();
//! println!("black plays {}", board.vertex(mv));
//! ```

pub mod board;
pub mod config;
pub mod dynkomi;
pub mod engine;
pub mod error;
pub mod games;
pub mod ownermap;
pub mod playout;
pub mod policy;
pub mod prior;
pub mod search;
pub mod stats;
pub mod time;
pub mod tree;
pub mod walk;

pub use board::{Board, Coord, Move, Score, Stone};
pub use config::UctConfig;
pub use engine::{EngineResult, UctEngine};
pub use error::{BoardError, ConfigError, Result, UctError};
pub use time::TimeInfo;
pub use tree::Tree;

/// Generator used by every search thread.
pub type SearchRng = rand_xoshiro::Xoshiro256PlusPlus;
