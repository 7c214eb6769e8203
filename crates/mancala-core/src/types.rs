//! Common type aliases used throughout the solver.

/// Search depth in plies
pub type Depth = u32;

/// Score (store differential, side-to-move relative in search code)
pub type Score = i32;

/// Side to move: `+1` for player one, `-1` for player two
pub type Color = i8;
