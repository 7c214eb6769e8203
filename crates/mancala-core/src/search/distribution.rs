//! Root-level per-move evaluation vector.

use crate::board::{Board, MoveRules};
use crate::constants::MAX_DEPTH;
use crate::types::{Depth, Score};

use super::driver::DriverEnv;
use super::negamax::negamax;
use super::SolverConfig;

/// Signed score of every root move, indexed by pit offset within the side
/// to move (0..6). Empty pits carry the `i32::MIN` sentinel.
#[derive(Debug, Clone, Copy)]
pub struct Distribution {
    pub scores: [Score; 6],
    pub solved: bool,
}

impl Distribution {
    /// Sentinel marking an empty pit.
    pub const EMPTY: Score = Score::MIN;
}

pub(super) fn distribution_root<R: MoveRules, const USE_CACHE: bool>(
    env: DriverEnv<'_>,
    board: &Board,
    config: &SolverConfig,
) -> Distribution {
    use std::sync::atomic::Ordering;

    env.abort.store(false, Ordering::Release);

    let depth: Depth = if config.depth == 0 {
        MAX_DEPTH
    } else {
        config.depth
    };
    let (alpha, beta) = if config.clip {
        (0, 1)
    } else {
        (Score::MIN + 1, Score::MAX)
    };

    let mut ctx = env.context(0);
    let (lo, hi) = board.own_pits();

    let mut scores = [Distribution::EMPTY; 6];
    let mut solved = true;

    for pit in (lo..=hi).rev() {
        let index = pit - lo;
        if board.cells[pit] == 0 {
            continue;
        }

        let mut next = *board;
        R::sow(&mut next, pit);

        let mut child_solved = true;
        let mut score = if board.color == next.color {
            negamax::<R, USE_CACHE>(&mut ctx, &mut next, alpha, beta, depth, &mut child_solved)
        } else {
            -negamax::<R, USE_CACHE>(&mut ctx, &mut next, -beta, -alpha, depth, &mut child_solved)
        };
        solved = solved && child_solved;

        if config.clip && score > 1 {
            score = 1;
        }
        scores[index] = score;
    }

    ctx.flush_nodes();
    Distribution { scores, solved }
}
