//! Iterative-deepening driver with aspiration windows.
//!
//! The main thread owns the authoritative best move and the termination
//! decision. Helper threads run the same deepening loop with a rotated move
//! order and contribute only through the shared transposition cache; they
//! are reaped by the abort flag when the main thread finishes.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Instant;

use crate::board::{Board, MoveRules};
use crate::cache::TranspositionCache;
use crate::constants::MAX_DEPTH;
use crate::egdb::Egdb;
use crate::types::{Depth, Score};

use super::context::SearchContext;
use super::negamax::negamax_with_move;
use super::{Prefix, SearchObserver, SearchResult, SolverConfig};

/// Shared pieces handed to the driver and its helper threads.
#[derive(Clone, Copy)]
pub(super) struct DriverEnv<'a> {
    pub cache: &'a TranspositionCache,
    pub egdb: Option<&'a Egdb>,
    pub abort: &'a AtomicBool,
    pub global_nodes: &'a AtomicU64,
    pub observer: &'a dyn SearchObserver,
}

impl<'a> DriverEnv<'a> {
    pub(super) fn context(&self, thread_id: usize) -> SearchContext<'a> {
        SearchContext::new(self.cache, self.egdb, self.abort, self.global_nodes, thread_id)
    }
}

pub(super) fn aspiration_root<R: MoveRules, const USE_CACHE: bool>(
    env: DriverEnv<'_>,
    board: &Board,
    config: &SolverConfig,
) -> SearchResult {
    env.abort.store(false, Ordering::Release);
    env.global_nodes.store(0, Ordering::Relaxed);

    let one_shot = config.depth == 0 && config.time_limit == 0.0;
    let threads = config.threads.max(1).min(num_cpus::get().max(1));

    if config.progress {
        env.observer.progress_start(config);
    }

    let mut result = SearchResult {
        depth_times: vec![-1.0; MAX_DEPTH as usize + 1],
        ..SearchResult::default()
    };

    let start = Instant::now();

    std::thread::scope(|scope| {
        for thread_id in 1..threads {
            let board = *board;
            scope.spawn(move || {
                aspiration_worker::<R, USE_CACHE>(env, board, config, thread_id);
            });
        }

        run_main_loop::<R, USE_CACHE>(env, board, config, one_shot, start, &mut result);

        env.abort.store(true, Ordering::Release);
    });

    if config.progress {
        env.observer.progress_finish();
    }

    if config.clip && result.evaluation > 1 {
        result.evaluation = 1;
    }

    result.time = start.elapsed().as_secs_f64();
    result.nodes = env.global_nodes.load(Ordering::Relaxed);

    if !config.clip && result.window_misses > result.depth {
        env.observer
            .message(Prefix::Play, "[WARNING]: High window misses!");
    }
    if config.clip && result.evaluation < 0 {
        env.observer.message(
            Prefix::Cheat,
            "[WARNING]: Clipped solver used in losing position!",
        );
    }

    result
}

fn run_main_loop<R: MoveRules, const USE_CACHE: bool>(
    env: DriverEnv<'_>,
    board: &Board,
    config: &SolverConfig,
    one_shot: bool,
    start: Instant,
    result: &mut SearchResult,
) {
    let mut ctx = env.context(0);

    let mut current_depth: Depth = 1;
    if one_shot {
        current_depth = MAX_DEPTH;
    }

    let mut best_move: Option<usize> = None;
    let mut score: Score;
    let mut solved: bool;

    let window_size: Score = 1;
    let mut window = window_size;
    let mut alpha = Score::MIN + 1;
    let mut beta = Score::MAX;
    let mut window_misses: u32 = 0;

    let mut last_time_captured = 0.0;

    loop {
        solved = true;
        let mut search_valid = false;
        let previous_best = best_move;
        let mut root = *board;

        if config.clip {
            (score, best_move) = negamax_with_move::<R, USE_CACHE>(
                &mut ctx,
                &mut root,
                0,
                1,
                current_depth,
                previous_best,
                &mut solved,
            );
            search_valid = true;
        } else if one_shot {
            (score, best_move) = negamax_with_move::<R, USE_CACHE>(
                &mut ctx,
                &mut root,
                Score::MIN + 1,
                Score::MAX,
                current_depth,
                previous_best,
                &mut solved,
            );
            search_valid = true;
        } else {
            (score, best_move) = negamax_with_move::<R, USE_CACHE>(
                &mut ctx,
                &mut root,
                alpha,
                beta,
                current_depth,
                previous_best,
                &mut solved,
            );

            if score > alpha && score < beta {
                search_valid = true;
                window = window_size;
                alpha = score - window;
                beta = score + window;
            } else {
                // Miss: re-search the same depth with a doubled window
                // recentered on the returned score.
                window_misses += 1;
                window *= 2;
                alpha = score - window;
                beta = score + window;
            }
        }

        if search_valid {
            let elapsed = start.elapsed().as_secs_f64();
            let time_index = if one_shot { 1 } else { current_depth as usize };
            result.depth_times[time_index] = elapsed - last_time_captured;
            last_time_captured = elapsed;

            let total_nodes = ctx.flush_nodes();
            if config.progress {
                env.observer
                    .progress_update(current_depth, best_move, score, total_nodes);
            }

            if solved {
                break;
            }
            if one_shot {
                break;
            }
            if config.depth > 0 && current_depth >= config.depth {
                break;
            }
            if config.time_limit > 0.0 && elapsed >= config.time_limit {
                break;
            }

            current_depth += 1;
        }
    }

    result.evaluation = score;
    result.best_move = best_move;
    result.depth = current_depth;
    result.solved = solved;
    result.window_misses = window_misses;
}

/// Helper-thread loop: same deepening ladder over the full window; its only
/// output is what it writes into the shared cache.
fn aspiration_worker<R: MoveRules, const USE_CACHE: bool>(
    env: DriverEnv<'_>,
    board: Board,
    config: &SolverConfig,
    thread_id: usize,
) {
    let mut ctx = env.context(thread_id);

    let one_shot = config.depth == 0 && config.time_limit == 0.0;
    let mut current_depth: Depth = 1;
    if one_shot {
        current_depth = MAX_DEPTH;
    }

    let alpha = Score::MIN + 1;
    let beta = Score::MAX;

    while !ctx.is_aborted() {
        let mut solved = true;
        let mut root = board;

        if config.clip {
            negamax_with_move::<R, USE_CACHE>(
                &mut ctx,
                &mut root,
                0,
                1,
                current_depth,
                None,
                &mut solved,
            );
        } else {
            negamax_with_move::<R, USE_CACHE>(
                &mut ctx,
                &mut root,
                alpha,
                beta,
                current_depth,
                None,
                &mut solved,
            );
        }

        if solved {
            break;
        }
        if one_shot {
            break;
        }
        if config.depth > 0 && current_depth >= config.depth {
            break;
        }
        current_depth += 1;
    }

    ctx.flush_nodes();
}
