//! Principal-variation extraction by bounded re-search.
//!
//! Given the evaluation of a completed root search, a re-search inside the
//! window `(eval - 1, eval + 1)` threads the chosen move through every
//! level, yielding the move sequence of the principal line.

use crate::board::{Avalanche, Board, Classic, MoveRules, RuleSet};
use crate::types::{Depth, Score};

/// A principal line: `moves[depth - 1]` is the first move, descending to
/// index 0; `-1` marks levels below the reached horizon.
#[derive(Debug, Clone)]
pub struct NegamaxTrace {
    pub score: Score,
    pub moves: Vec<i8>,
}

impl NegamaxTrace {
    /// The traced moves in play order.
    pub fn line(&self) -> Vec<usize> {
        self.moves
            .iter()
            .rev()
            .filter(|&&m| m >= 0)
            .map(|&m| m as usize)
            .collect()
    }
}

pub fn negamax_with_trace<R: MoveRules>(
    board: &Board,
    mut alpha: Score,
    beta: Score,
    depth: Depth,
) -> NegamaxTrace {
    let mut result = NegamaxTrace {
        score: Score::MIN,
        moves: vec![-1; depth as usize + 1],
    };

    let mut current = *board;
    if current.process_terminal() || depth == 0 {
        result.score = current.color as Score * current.evaluate();
        return result;
    }

    let (lo, hi) = current.own_pits();
    for pit in (lo..=hi).rev() {
        if current.cells[pit] == 0 {
            continue;
        }

        let mut next = current;
        R::sow(&mut next, pit);

        let child = if current.color == next.color {
            negamax_with_trace::<R>(&next, alpha, beta, depth - 1)
        } else {
            let mut child = negamax_with_trace::<R>(&next, -beta, -alpha, depth - 1);
            child.score = -child.score;
            child
        };

        if child.score > result.score {
            result.score = child.score;
            let keep = depth as usize;
            result.moves[..keep].copy_from_slice(&child.moves[..keep]);
            result.moves[depth as usize - 1] = pit as i8;
        }

        alpha = alpha.max(result.score);
        if alpha >= beta {
            break;
        }
    }

    result
}

/// Re-derives the principal variation from a prior `(depth, evaluation)`
/// result.
pub fn trace_root(
    board: &Board,
    rules: RuleSet,
    evaluation: Score,
    depth: Depth,
) -> NegamaxTrace {
    let (alpha, beta) = (evaluation - 1, evaluation + 1);
    match rules {
        RuleSet::Classic => negamax_with_trace::<Classic>(board, alpha, beta, depth),
        RuleSet::Avalanche => negamax_with_trace::<Avalanche>(board, alpha, beta, depth),
    }
}
