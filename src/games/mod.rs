//! # Reference Board Implementations
//!
//! The search core is generic over the [`Board`](crate::board::Board)
//! trait. This module ships the board used by the binaries and the tests.
//!
//! ## Boards
//! - **Stones-only Go**: placement without captures, area scoring with komi.
//!   Small enough to read in one sitting, rich enough to exercise passes,
//!   ownership, dead groups and scoring.
//!
//! ## Adding New Boards
//! Implement `Board` for the position type. Move generation must never
//! include pass; the search adds it to every expansion itself.

pub mod stones;
