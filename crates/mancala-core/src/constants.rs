//! Board geometry and search limits.
//!
//! The board is laid out as 14 cells: pits 0-5 belong to player one with
//! their store at cell 6, pits 7-12 belong to player two with their store
//! at cell 13. Sowing walks the indices counter-clockwise.

use crate::types::Depth;

pub const LBOUND_P1: usize = 0;
pub const HBOUND_P1: usize = 5;
pub const STORE_P1: usize = 6;

pub const LBOUND_P2: usize = 7;
pub const HBOUND_P2: usize = 12;
pub const STORE_P2: usize = 13;

pub const BOARD_CELLS: usize = 14;

/// Pits per side (excluding the store).
pub const PITS_PER_SIDE: usize = 6;

/// Upper bound on iterative deepening; also the one-shot search depth.
pub const MAX_DEPTH: Depth = 100;
