//! Search facade: configuration, result metadata, and the solver entry
//! points.

pub mod context;
mod distribution;
mod driver;
mod negamax;
mod trace;

pub use distribution::Distribution;
pub use negamax::{negamax, negamax_with_move};
pub use trace::{NegamaxTrace, negamax_with_trace, trace_root};

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64};

use crate::board::{Avalanche, Board, Classic, RuleSet};
use crate::cache::{CacheConfigError, CompressMode, TranspositionCache};
use crate::egdb::Egdb;
use crate::types::{Depth, Score};

use driver::DriverEnv;

/// Which solver runs: the cached local solver or the uncached global one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SolverKind {
    #[default]
    LocalCached,
    GlobalUncached,
}

/// Message class for the external renderer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Prefix {
    Config,
    Cheat,
    Play,
}

/// Rendering callbacks published by the core; the outside decides how (and
/// whether) to display them.
pub trait SearchObserver: Send + Sync {
    fn message(&self, _prefix: Prefix, _text: &str) {}
    fn progress_start(&self, _config: &SolverConfig) {}
    fn progress_update(&self, _depth: Depth, _best_move: Option<usize>, _score: Score, _nodes: u64) {
    }
    fn progress_finish(&self) {}
}

/// Observer that swallows everything.
pub struct SilentSearchObserver;

impl SearchObserver for SilentSearchObserver {}

#[derive(Debug, Clone)]
pub struct SolverConfig {
    pub solver: SolverKind,
    /// Depth limit in plies; 0 means unlimited.
    pub depth: Depth,
    /// Wall-clock limit in seconds; 0 means unlimited.
    pub time_limit: f64,
    /// Null-window search: only the sign of the evaluation survives.
    pub clip: bool,
    pub compress_cache: CompressMode,
    pub threads: usize,
    pub progress: bool,
}

impl Default for SolverConfig {
    fn default() -> Self {
        SolverConfig {
            solver: SolverKind::LocalCached,
            depth: 0,
            time_limit: 0.0,
            clip: false,
            compress_cache: CompressMode::Auto,
            threads: 1,
            progress: false,
        }
    }
}

/// Metadata of a completed root search.
#[derive(Debug, Clone, Default)]
pub struct SearchResult {
    pub evaluation: Score,
    pub best_move: Option<usize>,
    pub depth: Depth,
    pub solved: bool,
    pub time: f64,
    pub nodes: u64,
    pub window_misses: u32,
    /// Seconds spent per completed depth; `-1.0` for depths never reached.
    pub depth_times: Vec<f64>,
}

/// Owns the transposition cache and the optional endgame database, and
/// drives searches against them.
pub struct Search {
    cache: TranspositionCache,
    egdb: Option<Egdb>,
    abort: AtomicBool,
    global_nodes: AtomicU64,
    observer: Arc<dyn SearchObserver>,
}

impl Default for Search {
    fn default() -> Self {
        Search::new()
    }
}

impl Search {
    pub fn new() -> Search {
        Search {
            cache: TranspositionCache::default(),
            egdb: None,
            abort: AtomicBool::new(false),
            global_nodes: AtomicU64::new(0),
            observer: Arc::new(SilentSearchObserver),
        }
    }

    pub fn cache(&self) -> &TranspositionCache {
        &self.cache
    }

    /// Cache reconfiguration handle; only valid between searches.
    pub fn cache_mut(&mut self) -> &mut TranspositionCache {
        &mut self.cache
    }

    pub fn egdb(&self) -> Option<&Egdb> {
        self.egdb.as_ref()
    }

    pub fn egdb_mut(&mut self) -> Option<&mut Egdb> {
        self.egdb.as_mut()
    }

    pub fn set_egdb(&mut self, egdb: Option<Egdb>) {
        self.egdb = egdb;
    }

    pub fn set_observer(&mut self, observer: Arc<dyn SearchObserver>) {
        self.observer = observer;
    }

    fn env(&self, rules: RuleSet) -> DriverEnv<'_> {
        // The endgame tables are generated under classic sowing; they do
        // not apply to avalanche games.
        let egdb = match rules {
            RuleSet::Classic => self.egdb.as_ref(),
            RuleSet::Avalanche => None,
        };
        DriverEnv {
            cache: &self.cache,
            egdb,
            abort: &self.abort,
            global_nodes: &self.global_nodes,
            observer: self.observer.as_ref(),
        }
    }

    fn prepare_cache(&mut self, config: &SolverConfig) -> Result<(), CacheConfigError> {
        if config.solver == SolverKind::LocalCached {
            let one_shot = config.depth == 0 && config.time_limit == 0.0;
            self.cache.set_mode(!one_shot, config.compress_cache)?;
        }
        Ok(())
    }

    /// Runs the iterative-deepening aspiration search and returns the
    /// evaluation, principal move, and timing metadata.
    pub fn solve(
        &mut self,
        board: &Board,
        rules: RuleSet,
        config: &SolverConfig,
    ) -> Result<SearchResult, CacheConfigError> {
        self.prepare_cache(config)?;

        let env = self.env(rules);
        let result = match (rules, config.solver) {
            (RuleSet::Classic, SolverKind::LocalCached) => {
                driver::aspiration_root::<Classic, true>(env, board, config)
            }
            (RuleSet::Classic, SolverKind::GlobalUncached) => {
                driver::aspiration_root::<Classic, false>(env, board, config)
            }
            (RuleSet::Avalanche, SolverKind::LocalCached) => {
                driver::aspiration_root::<Avalanche, true>(env, board, config)
            }
            (RuleSet::Avalanche, SolverKind::GlobalUncached) => {
                driver::aspiration_root::<Avalanche, false>(env, board, config)
            }
        };

        if config.solver == SolverKind::LocalCached {
            self.cache.take_snapshot();
        }
        Ok(result)
    }

    /// Evaluates every root move to full (or configured) depth.
    pub fn distribution(
        &mut self,
        board: &Board,
        rules: RuleSet,
        config: &SolverConfig,
    ) -> Result<Distribution, CacheConfigError> {
        self.prepare_cache(config)?;

        let env = self.env(rules);
        let result = match (rules, config.solver) {
            (RuleSet::Classic, SolverKind::LocalCached) => {
                distribution::distribution_root::<Classic, true>(env, board, config)
            }
            (RuleSet::Classic, SolverKind::GlobalUncached) => {
                distribution::distribution_root::<Classic, false>(env, board, config)
            }
            (RuleSet::Avalanche, SolverKind::LocalCached) => {
                distribution::distribution_root::<Avalanche, true>(env, board, config)
            }
            (RuleSet::Avalanche, SolverKind::GlobalUncached) => {
                distribution::distribution_root::<Avalanche, false>(env, board, config)
            }
        };

        if config.solver == SolverKind::LocalCached {
            self.cache.take_snapshot();
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn depth_config(depth: Depth) -> SolverConfig {
        SolverConfig {
            depth,
            ..SolverConfig::default()
        }
    }

    #[test]
    fn solver_kinds_agree_on_solved_games() {
        let board = Board::uniform(1);
        let mut search = Search::new();

        let local = search
            .solve(&board, RuleSet::Classic, &SolverConfig::default())
            .unwrap();
        let global = search
            .solve(
                &board,
                RuleSet::Classic,
                &SolverConfig {
                    solver: SolverKind::GlobalUncached,
                    ..SolverConfig::default()
                },
            )
            .unwrap();

        assert!(local.solved);
        assert!(global.solved);
        assert_eq!(local.evaluation, global.evaluation);
    }

    #[test]
    fn driver_is_idempotent() {
        let board = Board::random(4, 5);
        let mut search = Search::new();

        let first = search
            .solve(&board, RuleSet::Classic, &depth_config(8))
            .unwrap();
        search.cache_mut().invalidate();
        let second = search
            .solve(&board, RuleSet::Classic, &depth_config(8))
            .unwrap();

        assert_eq!(first.evaluation, second.evaluation);
        assert_eq!(first.best_move, second.best_move);
        assert_eq!(first.solved, second.solved);
    }

    #[test]
    fn one_shot_solves_tiny_game() {
        let board = Board::uniform(1);
        let mut search = Search::new();

        let result = search
            .solve(&board, RuleSet::Classic, &SolverConfig::default())
            .unwrap();
        assert!(result.solved);
        assert!(result.evaluation.abs() <= 12);
    }

    #[test]
    fn clip_reports_sign_only() {
        let board = Board::uniform(1);
        let mut search = Search::new();

        let full = search
            .solve(&board, RuleSet::Classic, &SolverConfig::default())
            .unwrap();
        let clipped = search
            .solve(
                &board,
                RuleSet::Classic,
                &SolverConfig {
                    clip: true,
                    depth: 30,
                    ..SolverConfig::default()
                },
            )
            .unwrap();

        assert!(clipped.evaluation <= 1);
        assert_eq!(
            clipped.evaluation > 0,
            full.evaluation > 0,
            "clip must preserve the winning sign"
        );
    }

    #[test]
    fn helper_threads_do_not_change_the_result() {
        let board = Board::random(1, 17);
        let mut search = Search::new();

        let single = search
            .solve(&board, RuleSet::Classic, &SolverConfig::default())
            .unwrap();
        search.cache_mut().invalidate();
        let multi = search
            .solve(
                &board,
                RuleSet::Classic,
                &SolverConfig {
                    threads: 4,
                    ..SolverConfig::default()
                },
            )
            .unwrap();

        assert!(single.solved);
        assert!(multi.solved);
        assert_eq!(single.evaluation, multi.evaluation);
    }

    #[test]
    fn distribution_marks_empty_pits() {
        let mut board = Board::uniform(2);
        board.cells[3] = 0;
        board.cells[9] += 2;

        let mut search = Search::new();
        let dist = search
            .distribution(&board, RuleSet::Classic, &depth_config(6))
            .unwrap();

        assert_eq!(dist.scores[3], Distribution::EMPTY);
        for (i, &score) in dist.scores.iter().enumerate() {
            if i != 3 {
                assert_ne!(score, Distribution::EMPTY);
            }
        }
    }

    #[test]
    fn distribution_best_matches_solver() {
        let board = Board::uniform(2);
        let mut search = Search::new();
        let uncached = |depth| SolverConfig {
            solver: SolverKind::GlobalUncached,
            ..depth_config(depth)
        };

        let result = search
            .solve(&board, RuleSet::Classic, &uncached(7))
            .unwrap();

        // Distribution children are searched at the configured depth, one
        // ply less deep than the root they hang from.
        let dist = search
            .distribution(&board, RuleSet::Classic, &uncached(6))
            .unwrap();

        let best = dist.scores.iter().max().unwrap();
        assert_eq!(*best, result.evaluation);
    }

    #[test]
    fn window_miss_widens_at_the_same_depth() {
        // The mover's two legal moves each leave one of the opponent's
        // capture threats open: depth 1 looks level, depth 2 is -3. The
        // depth-2 iteration must fall outside the (score-1, score+1)
        // window and re-search.
        let board = Board {
            cells: [2, 0, 2, 0, 0, 0, 0, 0, 0, 1, 0, 1, 0, 0],
            color: 1,
        };

        let mut search = Search::new();
        let result = search
            .solve(
                &board,
                RuleSet::Classic,
                &SolverConfig {
                    solver: SolverKind::GlobalUncached,
                    ..depth_config(4)
                },
            )
            .unwrap();

        assert!(result.window_misses >= 1);

        let reference = search
            .solve(
                &board,
                RuleSet::Classic,
                &SolverConfig {
                    solver: SolverKind::GlobalUncached,
                    depth: 2,
                    ..SolverConfig::default()
                },
            )
            .unwrap();
        assert_eq!(reference.evaluation, -3);
    }
}
