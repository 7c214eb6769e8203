//! The negamax alpha-beta kernel.
//!
//! Both rulesets and both solver kinds run through the same two functions,
//! monomorphized over the [`MoveRules`] strategy and a `USE_CACHE` flag so
//! the inner loop carries no dispatch. A node's `solved` flag means its
//! subtree was fully resolved (terminal sweeps and endgame-table hits
//! only); it AND-aggregates across children and is cleared by depth-zero
//! truncation and by aborts.

use arrayvec::ArrayVec;

use crate::board::{Board, MoveRules};
use crate::cache::Bound;
use crate::types::{Color, Depth, Score};

use super::context::SearchContext;

struct Child {
    board: Board,
    key: i32,
    pit: usize,
}

/// Move ordering: keeping the turn outranks everything, otherwise order by
/// the mover's immediate store differential.
#[inline]
fn order_key(child: &Board, parent_color: Color) -> i32 {
    if parent_color == child.color {
        1000
    } else {
        parent_color as i32 * child.evaluate()
    }
}

/// Legal children sorted by descending ordering key. `boost` marks the
/// previous iteration's best move at the root.
fn ordered_children<R: MoveRules>(board: &Board, boost: Option<usize>) -> ArrayVec<Child, 6> {
    let (lo, hi) = board.own_pits();
    let mut children: ArrayVec<Child, 6> = ArrayVec::new();

    for pit in (lo..=hi).rev() {
        if board.cells[pit] == 0 {
            continue;
        }

        let mut next = *board;
        R::sow(&mut next, pit);

        let mut key = order_key(&next, board.color);
        if boost == Some(pit) {
            key += 100_000;
        }

        let mut j = children.len();
        children.push(Child {
            board: next,
            key,
            pit,
        });
        while j > 0 && children[j - 1].key < key {
            children.swap(j - 1, j);
            j -= 1;
        }
    }
    children
}

/// PV-preserving rotation for helper threads: the first ordered move stays
/// put, the tail is rotated by the thread id so helpers explore
/// complementary orders into the shared cache.
#[inline]
fn rotated_index(i: usize, valid: usize, thread_id: usize) -> usize {
    if i > 0 && valid > 2 && thread_id > 0 {
        1 + (i - 1 + thread_id) % (valid - 1)
    } else {
        i
    }
}

pub fn negamax<R: MoveRules, const USE_CACHE: bool>(
    ctx: &mut SearchContext,
    board: &mut Board,
    mut alpha: Score,
    mut beta: Score,
    depth: Depth,
    solved: &mut bool,
) -> Score {
    if ctx.is_aborted() {
        *solved = false;
        return 0;
    }

    if board.process_terminal() {
        *solved = true;
        return board.color as Score * board.evaluate();
    }

    ctx.nodes += 1;

    let key = if USE_CACHE {
        ctx.cache().translate(board)
    } else {
        None
    };

    if USE_CACHE
        && let Some((value, bound, cached_solved)) = ctx.cache().lookup(board, key, depth)
    {
        match bound {
            Bound::Exact => {
                *solved = cached_solved;
                return value;
            }
            Bound::Lower => alpha = alpha.max(value),
            Bound::Upper => beta = beta.min(value),
        }
        if alpha >= beta {
            *solved = cached_solved;
            return value;
        }
    }

    if let Some(egdb) = ctx.egdb()
        && let Some(value) = egdb.probe(board)
    {
        *solved = true;
        return value;
    }

    if depth == 0 {
        *solved = false;
        return board.color as Score * board.evaluate();
    }

    let alpha_original = alpha;
    let mut reference = Score::MIN;
    let mut node_solved = true;

    let children = ordered_children::<R>(board, None);
    let valid = children.len();

    for i in 0..valid {
        let idx = rotated_index(i, valid, ctx.thread_id);
        let mut child_board = children[idx].board;
        let mut child_solved = true;

        let score = if board.color == child_board.color {
            negamax::<R, USE_CACHE>(ctx, &mut child_board, alpha, beta, depth - 1, &mut child_solved)
        } else {
            -negamax::<R, USE_CACHE>(
                ctx,
                &mut child_board,
                -beta,
                -alpha,
                depth - 1,
                &mut child_solved,
            )
        };
        node_solved = node_solved && child_solved;

        reference = reference.max(score);
        alpha = alpha.max(reference);
        if alpha >= beta {
            break;
        }
    }

    if USE_CACHE {
        let bound = if reference <= alpha_original {
            Bound::Upper
        } else if reference >= beta {
            Bound::Lower
        } else {
            Bound::Exact
        };
        ctx.cache().store(board, key, reference, bound, depth, node_solved);
    }

    *solved = node_solved;
    reference
}

/// Root variant: returns the best score together with the move producing
/// it. `previous_best` is boosted to the front of the move order.
pub fn negamax_with_move<R: MoveRules, const USE_CACHE: bool>(
    ctx: &mut SearchContext,
    board: &mut Board,
    mut alpha: Score,
    beta: Score,
    depth: Depth,
    previous_best: Option<usize>,
    solved: &mut bool,
) -> (Score, Option<usize>) {
    if ctx.is_aborted() {
        *solved = false;
        return (0, None);
    }

    if board.process_terminal() {
        *solved = true;
        return (board.color as Score * board.evaluate(), None);
    }

    if depth == 0 {
        *solved = false;
        return (board.color as Score * board.evaluate(), None);
    }

    ctx.nodes += 1;

    let mut reference = Score::MIN;
    let mut best_move = None;
    let mut node_solved = true;

    let children = ordered_children::<R>(board, previous_best);
    let valid = children.len();

    for i in 0..valid {
        let idx = rotated_index(i, valid, ctx.thread_id);
        let mut child_board = children[idx].board;
        let mut child_solved = true;

        let score = if board.color == child_board.color {
            negamax::<R, USE_CACHE>(ctx, &mut child_board, alpha, beta, depth - 1, &mut child_solved)
        } else {
            -negamax::<R, USE_CACHE>(
                ctx,
                &mut child_board,
                -beta,
                -alpha,
                depth - 1,
                &mut child_solved,
            )
        };
        node_solved = node_solved && child_solved;

        if score > reference {
            reference = score;
            best_move = Some(children[idx].pit);
        }

        alpha = alpha.max(reference);
        if alpha >= beta {
            break;
        }
    }

    *solved = node_solved;
    (reference, best_move)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::{Avalanche, Classic};
    use crate::cache::TranspositionCache;
    use crate::constants::{STORE_P1, STORE_P2};
    use std::sync::atomic::{AtomicBool, AtomicU64};

    fn run<R: MoveRules>(
        board: &Board,
        alpha: Score,
        beta: Score,
        depth: Depth,
    ) -> (Score, bool) {
        let cache = TranspositionCache::new(0);
        let abort = AtomicBool::new(false);
        let nodes = AtomicU64::new(0);
        let mut ctx = SearchContext::new(&cache, None, &abort, &nodes, 0);
        let mut b = *board;
        let mut solved = true;
        let score = negamax::<R, false>(&mut ctx, &mut b, alpha, beta, depth, &mut solved);
        (score, solved)
    }

    /// Reference minimax without pruning, move ordering, or caching.
    fn plain_minimax<R: MoveRules>(board: &Board, depth: Depth) -> Score {
        let mut b = *board;
        if b.process_terminal() {
            return b.color as Score * b.evaluate();
        }
        if depth == 0 {
            return b.color as Score * b.evaluate();
        }

        let (lo, hi) = b.own_pits();
        let mut best = Score::MIN;
        for pit in lo..=hi {
            if b.cells[pit] == 0 {
                continue;
            }
            let mut next = b;
            R::sow(&mut next, pit);
            let score = if b.color == next.color {
                plain_minimax::<R>(&next, depth - 1)
            } else {
                -plain_minimax::<R>(&next, depth - 1)
            };
            best = best.max(score);
        }
        best
    }

    #[test]
    fn matches_plain_minimax() {
        for seed in 0..4u64 {
            let board = Board::random(2, seed);
            for depth in [1, 3, 6] {
                let expected = plain_minimax::<Classic>(&board, depth);
                let (score, _) = run::<Classic>(&board, Score::MIN + 1, Score::MAX, depth);
                assert_eq!(score, expected, "classic seed {seed} depth {depth}");

                let expected = plain_minimax::<Avalanche>(&board, depth);
                let (score, _) = run::<Avalanche>(&board, Score::MIN + 1, Score::MAX, depth);
                assert_eq!(score, expected, "avalanche seed {seed} depth {depth}");
            }
        }
    }

    /// Any window bracketing the true value returns the true value.
    #[test]
    fn alpha_beta_window_equivalence() {
        let board = Board::random(2, 11);
        let depth = 6;
        let truth = plain_minimax::<Classic>(&board, depth);

        for (alpha, beta) in [
            (truth - 1, truth + 1),
            (truth - 10, truth + 3),
            (Score::MIN + 1, Score::MAX),
        ] {
            let (score, _) = run::<Classic>(&board, alpha, beta, depth);
            assert_eq!(score, truth);
        }
    }

    #[test]
    fn depth_zero_is_not_solved() {
        let board = Board::uniform(4);
        let (score, solved) = run::<Classic>(&board, Score::MIN + 1, Score::MAX, 0);
        assert_eq!(score, 0);
        assert!(!solved);
    }

    #[test]
    fn terminal_position_is_solved() {
        let mut board = Board::empty();
        board.cells[9] = 2;
        board.cells[STORE_P1] = 5;
        board.cells[STORE_P2] = 1;

        let (score, solved) = run::<Classic>(&board, Score::MIN + 1, Score::MAX, 0);
        // The sweep moves both stones to the second store: 5 vs 3.
        assert_eq!(score, 2);
        assert!(solved);
    }

    #[test]
    fn solved_propagates_only_when_all_children_finish() {
        // Few stones: a deep search fully resolves the game.
        let board = Board::random(1, 2);
        let (_, solved) = run::<Classic>(&board, Score::MIN + 1, Score::MAX, 100);
        assert!(solved);

        let big = Board::uniform(4);
        let (_, solved) = run::<Classic>(&big, Score::MIN + 1, Score::MAX, 3);
        assert!(!solved);
    }

    #[test]
    fn abort_returns_unsolved_zero() {
        let cache = TranspositionCache::new(0);
        let abort = AtomicBool::new(true);
        let nodes = AtomicU64::new(0);
        let mut ctx = SearchContext::new(&cache, None, &abort, &nodes, 0);

        let mut board = Board::uniform(4);
        let mut solved = true;
        let score =
            negamax::<Classic, false>(&mut ctx, &mut board, Score::MIN + 1, Score::MAX, 10, &mut solved);
        assert_eq!(score, 0);
        assert!(!solved);
        assert_eq!(ctx.nodes, 0);
    }

    #[test]
    fn rotation_preserves_the_pv_candidate() {
        assert_eq!(rotated_index(0, 5, 3), 0);
        // Thread 0 searches in order.
        for i in 0..5 {
            assert_eq!(rotated_index(i, 5, 0), i);
        }
        // Helpers permute the tail only.
        let order: Vec<usize> = (0..5).map(|i| rotated_index(i, 5, 1)).collect();
        assert_eq!(order[0], 0);
        let mut tail = order[1..].to_vec();
        tail.sort_unstable();
        assert_eq!(tail, vec![1, 2, 3, 4]);
        assert_ne!(order, vec![0, 1, 2, 3, 4]);

        // Two moves: no rotation (nothing to diverge on).
        assert_eq!(rotated_index(1, 2, 3), 1);
    }

    #[test]
    fn root_returns_argmax_move() {
        // Pit 5 banks a stone and keeps the turn; the solver must find the
        // forced sequence that empties the side for a clean win.
        let mut board = Board::empty();
        board.cells[4] = 1;
        board.cells[5] = 1;
        board.cells[10] = 2;

        let cache = TranspositionCache::new(0);
        let abort = AtomicBool::new(false);
        let nodes = AtomicU64::new(0);
        let mut ctx = SearchContext::new(&cache, None, &abort, &nodes, 0);
        let mut b = board;
        let mut solved = true;
        let (score, best) = negamax_with_move::<Classic, false>(
            &mut ctx,
            &mut b,
            Score::MIN + 1,
            Score::MAX,
            20,
            None,
            &mut solved,
        );

        assert!(solved);
        assert!(best.is_some());
        assert_eq!(score, plain_minimax::<Classic>(&board, 20));
    }
}
