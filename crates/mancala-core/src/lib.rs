//! Game-tree solver for 14-pit sowing games.
//!
//! The crate computes, for a given position, the score differential under
//! perfect play and a principal move, optionally under depth or time
//! budgets. Two rulesets are supported (classic capture and avalanche
//! chain-sowing), backed by a lock-free transposition cache and a
//! retrograde endgame database.

pub mod board;
pub mod cache;
pub mod constants;
pub mod egdb;
pub mod search;
pub mod types;
